//! Fixture sanitizer tool: pseudonymizes an NDJSON
//! fixture tree under a deterministic seed and lints the result for
//! residual PII.

use std::fs;
use std::path::PathBuf;

use mongo_diff_harness::fixture::read_ndjson_dir;
use mongo_diff_harness::fixture::sanitize::{lint_lines, sanitize_namespace, SanitizePolicy};

struct Config {
    input_dir: PathBuf,
    output_dir: PathBuf,
    policy_file: Option<PathBuf>,
    seed: String,
    fail_on_pii: bool,
}

fn print_usage_and_exit(code: i32) -> ! {
    eprintln!(
        "Usage: fixture-sanitize --input-dir <DIR> --output-dir <DIR> [OPTIONS]\n\
         \n\
         Options:\n\
           --input-dir <DIR>     NDJSON fixture directory to sanitize\n\
           --output-dir <DIR>    Where sanitized NDJSON files are written\n\
           --policy-file <FILE>  JSON sanitize policy (default: built-in volatile-fields-only policy)\n\
           --seed <STRING>       Pseudonymization seed (default: default-seed)\n\
           --fail-on-pii         Exit 1 if any PII-like pattern survives sanitization\n\
           --help, -h            Show help\n"
    );
    std::process::exit(code);
}

fn parse_args() -> Result<Config, String> {
    let mut input_dir: Option<PathBuf> = None;
    let mut output_dir: Option<PathBuf> = None;
    let mut policy_file: Option<PathBuf> = None;
    let mut seed = "default-seed".to_string();
    let mut fail_on_pii = false;

    let mut iter = std::env::args().skip(1).peekable();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => print_usage_and_exit(0),
            "--input-dir" => input_dir = Some(PathBuf::from(iter.next().ok_or("--input-dir requires a value")?)),
            "--output-dir" => output_dir = Some(PathBuf::from(iter.next().ok_or("--output-dir requires a value")?)),
            "--policy-file" => policy_file = Some(PathBuf::from(iter.next().ok_or("--policy-file requires a value")?)),
            "--seed" => seed = iter.next().ok_or("--seed requires a value")?,
            "--fail-on-pii" => fail_on_pii = true,
            _ if arg.starts_with("--input-dir=") => input_dir = Some(PathBuf::from(&arg["--input-dir=".len()..])),
            _ if arg.starts_with("--output-dir=") => output_dir = Some(PathBuf::from(&arg["--output-dir=".len()..])),
            _ if arg.starts_with("--policy-file=") => policy_file = Some(PathBuf::from(&arg["--policy-file=".len()..])),
            _ if arg.starts_with("--seed=") => seed = arg["--seed=".len()..].to_string(),
            _ if arg.starts_with('-') => return Err(format!("unknown option '{arg}'")),
            _ => return Err(format!("unexpected positional argument '{arg}'")),
        }
    }

    Ok(Config {
        input_dir: input_dir.ok_or("--input-dir is required")?,
        output_dir: output_dir.ok_or("--output-dir is required")?,
        policy_file,
        seed,
        fail_on_pii,
    })
}

fn load_policy(path: &Option<PathBuf>) -> Result<SanitizePolicy, String> {
    match path {
        None => Ok(SanitizePolicy::default()),
        Some(path) => {
            let bytes = fs::read(path).map_err(|e| format!("failed to read policy file: {e}"))?;
            serde_json::from_slice(&bytes).map_err(|e| format!("failed to parse policy file: {e}"))
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match parse_args() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            print_usage_and_exit(2);
        }
    };

    let policy = match load_policy(&config.policy_file) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    let collections = match read_ndjson_dir(&config.input_dir) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: failed to read input directory: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = fs::create_dir_all(&config.output_dir) {
        eprintln!("error: failed to create output directory: {e}");
        std::process::exit(1);
    }

    let mut total_violations = 0usize;
    for (namespace, docs) in &collections {
        let lines = sanitize_namespace(&policy, &config.seed, docs);
        let file = format!("{namespace}.ndjson");
        let path = config.output_dir.join(&file);
        let body = lines.join("\n") + if lines.is_empty() { "" } else { "\n" };
        if let Err(e) = fs::write(&path, body) {
            eprintln!("error: failed to write '{}': {e}", path.display());
            std::process::exit(1);
        }

        let violations = lint_lines(&file, &lines);
        for violation in &violations {
            tracing::warn!(%violation, "PII-like pattern survived sanitization");
        }
        total_violations += violations.len();
    }

    println!("namespaces sanitized: {}", collections.len());
    println!("PII violations remaining: {total_violations}");

    if total_violations > 0 && config.fail_on_pii {
        std::process::exit(1);
    }
}
