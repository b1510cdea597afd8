//! Fast fixture encoding: a length-framed binary, big-endian
//! throughout, optimized for zero-parse warm loads.
//!
//! Layout: 4-byte magic `0x4a464658`, 4-byte layout version, 4-byte
//! namespace count; then per namespace: length-prefixed UTF-8 name,
//! 4-byte document count, then per document a 4-byte payload length
//! followed by canonical JSON payload bytes.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use sha2::{Digest, Sha256};

use crate::canonical::canonicalize;
use crate::errors::ArtifactError;
use crate::fixture::manifest::{FileDigest, CURRENT_FAST_FORMAT_VERSION};
use crate::value::Value;

pub const FAST_MAGIC: u32 = 0x4a46_4658;

pub fn write_fast(path: &Path, collections: &BTreeMap<String, Vec<Value>>) -> std::io::Result<FileDigest> {
    let mut buf = Vec::new();
    buf.write_u32::<BigEndian>(FAST_MAGIC)?;
    buf.write_u32::<BigEndian>(CURRENT_FAST_FORMAT_VERSION)?;
    buf.write_u32::<BigEndian>(collections.len() as u32)?;

    let mut document_count = 0u64;
    for (namespace, docs) in collections {
        let name_bytes = namespace.as_bytes();
        buf.write_u32::<BigEndian>(name_bytes.len() as u32)?;
        buf.write_all(name_bytes)?;
        buf.write_u32::<BigEndian>(docs.len() as u32)?;
        for doc in docs {
            let canonical = canonicalize(doc);
            let payload = serde_json::to_vec(&canonical.into_json())?;
            buf.write_u32::<BigEndian>(payload.len() as u32)?;
            buf.write_all(&payload)?;
            document_count += 1;
        }
    }

    let sha256 = hex::encode(Sha256::digest(&buf));
    fs::write(path, &buf)?;

    Ok(FileDigest {
        file: path.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string(),
        sha256,
        document_count,
    })
}

/// Read a fast snapshot back into `namespace -> documents`, in their
/// declared (written) order, random-access by namespace once loaded.
pub fn read_fast(path: &Path) -> Result<BTreeMap<String, Vec<Value>>, crate::errors::HarnessError> {
    let bytes = fs::read(path)?;
    let mut cursor = Cursor::new(&bytes);

    let magic = cursor.read_u32::<BigEndian>()?;
    if magic != FAST_MAGIC {
        return Err(ArtifactError::BadMagic {
            file: path.display().to_string(),
            expected: FAST_MAGIC,
            actual: magic,
        }
        .into());
    }
    let version = cursor.read_u32::<BigEndian>()?;
    if version != CURRENT_FAST_FORMAT_VERSION {
        return Err(ArtifactError::UnsupportedVersion {
            kind: "fast",
            found: version,
            supported: CURRENT_FAST_FORMAT_VERSION,
        }
        .into());
    }

    let namespace_count = cursor.read_u32::<BigEndian>()?;
    let mut collections = BTreeMap::new();
    for _ in 0..namespace_count {
        let name_len = cursor.read_u32::<BigEndian>()? as usize;
        let mut name_bytes = vec![0u8; name_len];
        cursor.read_exact(&mut name_bytes)?;
        let namespace = String::from_utf8_lossy(&name_bytes).to_string();

        let doc_count = cursor.read_u32::<BigEndian>()?;
        let mut docs = Vec::with_capacity(doc_count as usize);
        for _ in 0..doc_count {
            let payload_len = cursor.read_u32::<BigEndian>()? as usize;
            let mut payload = vec![0u8; payload_len];
            cursor.read_exact(&mut payload)?;
            let json: serde_json::Value = serde_json::from_slice(&payload)?;
            docs.push(Value::from_json(&json));
        }
        collections.insert(namespace, docs);
    }

    Ok(collections)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_as_canonical_map() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("fixture.fast");

        let mut collections = BTreeMap::new();
        collections.insert(
            "db.widgets".to_string(),
            vec![Value::object([("b".to_string(), Value::Int32(2)), ("a".to_string(), Value::Int32(1))])],
        );

        write_fast(&path, &collections).unwrap();
        let loaded = read_fast(&path).unwrap();

        let original_canonical = canonicalize(&collections["db.widgets"][0]);
        let loaded_canonical = canonicalize(&loaded["db.widgets"][0]);
        assert_eq!(original_canonical, loaded_canonical);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("garbage.fast");
        fs::write(&path, [0u8; 16]).unwrap();
        let err = read_fast(&path).unwrap_err();
        assert!(matches!(err, crate::errors::HarnessError::Artifact(ArtifactError::BadMagic { .. })));
    }
}
