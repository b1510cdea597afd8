//! Portable fixture encoding: a gzip-compressed,
//! line-delimited canonical JSON stream of `{ns, doc}` records. Used for
//! cross-ecosystem interchange wherever a widely-portable deflate format
//! is needed.

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};

use crate::canonical::canonicalize;
use crate::fixture::manifest::FileDigest;
use crate::value::Value;

/// Write every document across every namespace as one gzip-compressed
/// NDJSON stream, namespaces in lexicographic order (guaranteed by the
/// `BTreeMap` the caller passes in), documents in their given order.
pub fn write_portable(path: &Path, collections: &BTreeMap<String, Vec<Value>>) -> std::io::Result<FileDigest> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut document_count = 0u64;
    for (namespace, docs) in collections {
        for doc in docs {
            let record = Value::object([
                ("ns".to_string(), Value::String(namespace.clone())),
                ("doc".to_string(), canonicalize(doc)),
            ]);
            let line = serde_json::to_string(&record.into_json())?;
            encoder.write_all(line.as_bytes())?;
            encoder.write_all(b"\n")?;
            document_count += 1;
        }
    }
    let bytes = encoder.finish()?;
    let sha256 = hex::encode(Sha256::digest(&bytes));
    fs::write(path, &bytes)?;

    Ok(FileDigest {
        file: path.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string(),
        sha256,
        document_count,
    })
}

/// Read a portable fixture back into `namespace -> documents`, as a
/// lazy line iterator under the hood.
pub fn read_portable(path: &Path) -> std::io::Result<BTreeMap<String, Vec<Value>>> {
    let file = fs::File::open(path)?;
    let decoder = GzDecoder::new(file);
    let reader = BufReader::new(decoder);

    let mut collections: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let json: serde_json::Value = serde_json::from_str(&line)?;
        let record = Value::from_json(&json);
        let Some(obj) = record.as_object() else {
            continue;
        };
        let Some(ns) = obj.get("ns").and_then(Value::as_str) else {
            continue;
        };
        let doc = obj.get("doc").cloned().unwrap_or(Value::Null);
        collections.entry(ns.to_string()).or_default().push(doc);
    }
    Ok(collections)
}

/// Verify a file's recorded sha256 against its bytes on disk.
pub fn verify_sha256(path: &Path, expected: &str) -> std::io::Result<bool> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()) == expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_collections() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("fixture.portable.gz");

        let mut collections = BTreeMap::new();
        collections.insert(
            "db.users".to_string(),
            vec![
                Value::object([("_id".to_string(), Value::Int32(1)), ("name".to_string(), Value::String("a".to_string()))]),
                Value::object([("_id".to_string(), Value::Int32(2)), ("name".to_string(), Value::String("b".to_string()))]),
            ],
        );

        let digest = write_portable(&path, &collections).unwrap();
        assert_eq!(digest.document_count, 2);
        assert!(verify_sha256(&path, &digest.sha256).unwrap());

        let loaded = read_portable(&path).unwrap();
        assert_eq!(loaded.get("db.users").unwrap().len(), 2);
    }
}
