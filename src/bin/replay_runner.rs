//! Replay runner: replays one persisted failure bundle through
//! the in-process backend and checks its probe assertion.

use std::path::PathBuf;

use mongo_diff_harness::backend::in_process::InProcessBackend;
use mongo_diff_harness::replay::{replay_bundle, BundleStore};

struct Config {
    bundle_dir: PathBuf,
    failure_id: String,
}

fn print_usage_and_exit(code: i32) -> ! {
    eprintln!(
        "Usage: replay-runner --bundle-dir <DIR> --failure-id <ID>\n\
         \n\
         Options:\n\
           --bundle-dir <DIR>   Directory containing a failure-bundle manifest\n\
           --failure-id <ID>    The failureId to replay\n\
           --help, -h           Show help\n"
    );
    std::process::exit(code);
}

fn parse_args() -> Result<Config, String> {
    let mut bundle_dir: Option<PathBuf> = None;
    let mut failure_id: Option<String> = None;

    let mut iter = std::env::args().skip(1).peekable();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => print_usage_and_exit(0),
            "--bundle-dir" => {
                let value = iter.next().ok_or_else(|| "--bundle-dir requires a value".to_string())?;
                bundle_dir = Some(PathBuf::from(value));
            }
            "--failure-id" => {
                failure_id = Some(iter.next().ok_or_else(|| "--failure-id requires a value".to_string())?);
            }
            _ if arg.starts_with("--bundle-dir=") => {
                bundle_dir = Some(PathBuf::from(&arg["--bundle-dir=".len()..]));
            }
            _ if arg.starts_with("--failure-id=") => {
                failure_id = Some(arg["--failure-id=".len()..].to_string());
            }
            _ => return Err(format!("unknown option '{arg}'")),
        }
    }

    Ok(Config {
        bundle_dir: bundle_dir.ok_or_else(|| "--bundle-dir is required".to_string())?,
        failure_id: failure_id.ok_or_else(|| "--failure-id is required".to_string())?,
    })
}

#[tokio::main]
async fn main() {
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

    let store = BundleStore::new(&config.bundle_dir);
    let bundle = match store.load(&config.failure_id) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("error: failed to load bundle '{}': {e}", config.failure_id);
            std::process::exit(1);
        }
    };

    let backend = InProcessBackend::new();
    let outcome = match replay_bundle(&bundle, &backend).await {
        Ok(o) => o,
        Err(e) => {
            eprintln!("error: replay failed: {e}");
            std::process::exit(1);
        }
    };

    println!("failureId: {}", bundle.failure_id);
    println!("probeMatched: {}", outcome.probe_matched);

    if outcome.probe_matched {
        std::process::exit(0);
    }
    tracing::warn!(failure_id = %bundle.failure_id, "replay probe did not match");
    std::process::exit(1);
}
