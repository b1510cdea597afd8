//! Manifest tool: inspects a fixture manifest and reports its
//! integrity and contents at a chosen level of detail.

use std::path::PathBuf;

use mongo_diff_harness::fixture::manifest::FixtureManifest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Profile {
    Dev,
    Smoke,
    Full,
}

struct Config {
    manifest: PathBuf,
    profile: Profile,
    json: bool,
}

fn print_usage_and_exit(code: i32) -> ! {
    eprintln!(
        "Usage: manifest-tool --manifest <FILE> [OPTIONS]\n\
         \n\
         Options:\n\
           --manifest <FILE>      Path to a fixture manifest.json\n\
           --profile <NAME>       dev | smoke | full (default: dev)\n\
           --json                 Emit the report as JSON instead of text\n\
           --help, -h             Show help\n"
    );
    std::process::exit(code);
}

fn parse_profile(value: &str) -> Result<Profile, String> {
    match value {
        "dev" => Ok(Profile::Dev),
        "smoke" => Ok(Profile::Smoke),
        "full" => Ok(Profile::Full),
        other => Err(format!("invalid --profile value '{other}' (expected dev, smoke, or full)")),
    }
}

fn parse_args() -> Result<Config, String> {
    let mut manifest: Option<PathBuf> = None;
    let mut profile = Profile::Dev;
    let mut json = false;

    let mut iter = std::env::args().skip(1).peekable();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => print_usage_and_exit(0),
            "--manifest" => manifest = Some(PathBuf::from(iter.next().ok_or("--manifest requires a value")?)),
            "--profile" => profile = parse_profile(&iter.next().ok_or("--profile requires a value")?)?,
            "--json" => json = true,
            _ if arg.starts_with("--manifest=") => manifest = Some(PathBuf::from(&arg["--manifest=".len()..])),
            _ if arg.starts_with("--profile=") => profile = parse_profile(&arg["--profile=".len()..])?,
            _ if arg.starts_with('-') => return Err(format!("unknown option '{arg}'")),
            _ => return Err(format!("unexpected positional argument '{arg}'")),
        }
    }

    Ok(Config {
        manifest: manifest.ok_or("--manifest is required")?,
        profile,
        json,
    })
}

fn sibling_integrity_ok(manifest_path: &PathBuf, manifest: &FixtureManifest) -> Vec<String> {
    let dir = manifest_path.parent().unwrap_or_else(|| std::path::Path::new("."));
    let mut problems = Vec::new();
    for digest in [&manifest.portable, &manifest.fast].into_iter().flatten() {
        let file_path = dir.join(&digest.file);
        match mongo_diff_harness::fixture::portable::verify_sha256(&file_path, &digest.sha256) {
            Ok(true) => {}
            Ok(false) => problems.push(format!("{}: sha256 mismatch", digest.file)),
            Err(e) => problems.push(format!("{}: {e}", digest.file)),
        }
    }
    problems
}

fn main() {
    let config = match parse_args() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            print_usage_and_exit(2);
        }
    };

    let bytes = match std::fs::read(&config.manifest) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("error: failed to read manifest: {e}");
            std::process::exit(1);
        }
    };
    let manifest: FixtureManifest = match serde_json::from_slice(&bytes) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("error: failed to parse manifest: {e}");
            std::process::exit(1);
        }
    };

    let problems = if matches!(config.profile, Profile::Smoke | Profile::Full) {
        sibling_integrity_ok(&config.manifest, &manifest)
    } else {
        Vec::new()
    };

    if config.json {
        let report = serde_json::json!({
            "manifest": manifest,
            "integrityProblems": problems,
        });
        println!("{}", serde_json::to_string_pretty(&report).expect("manifest report serializes"));
    } else {
        println!("fixtureVersion: {}", manifest.fixture_version);
        println!("engineVersion: {}", manifest.engine_version);
        println!("dataSchemaHash: {}", manifest.data_schema_hash);
        println!("namespaces: {}", manifest.totals.namespace_count);
        println!("documents: {}", manifest.totals.document_count);
        if matches!(config.profile, Profile::Full) {
            for ns in &manifest.namespaces {
                println!("  {}: {} docs", ns.namespace, ns.document_count);
            }
            println!("changelog:");
            for line in &manifest.changelog {
                println!("  - {line}");
            }
        }
        if matches!(config.profile, Profile::Smoke | Profile::Full) {
            if problems.is_empty() {
                println!("integrity: OK");
            } else {
                println!("integrity: FAILED");
                for problem in &problems {
                    println!("  - {problem}");
                }
            }
        }
    }

    if !problems.is_empty() {
        std::process::exit(1);
    }
}
