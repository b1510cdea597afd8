//! Corpus runner: imports a unified-spec corpus, runs it
//! in seeded deterministic order through the in-process vs. reference
//! differential harness, and materializes replay bundles for every
//! non-MATCH result.

use std::path::PathBuf;

use bson::doc;
use mongodb::{options::ClientOptions, Client};

use mongo_diff_harness::backend::in_process::InProcessBackend;
use mongo_diff_harness::backend::reference::ReferenceBackend;
use mongo_diff_harness::corpus::{run_corpus, CorpusConfig};
use mongo_diff_harness::harness::DifferentialHarness;
use mongo_diff_harness::importer::{import_spec_root, ImportProfile, RunOnContext, ServerVersion, Topology};
use mongo_diff_harness::replay::BundleStore;

const ENV_MONGO_URI: &str = "JONGODB_REAL_MONGOD_URI";

struct Config {
    spec_root: PathBuf,
    output_dir: PathBuf,
    seed: String,
    mongo_uri: Option<String>,
    replay_limit: usize,
    import_profile: ImportProfile,
}

fn print_usage_and_exit(code: i32) -> ! {
    eprintln!(
        "Usage: corpus-runner --spec-root <DIR> --output-dir <DIR> [OPTIONS]\n\
         \n\
         Options:\n\
           --spec-root <DIR>          Unified-spec corpus root\n\
           --output-dir <DIR>         Where the report and bundles are written\n\
           --seed <STRING>            Deterministic ordering seed (default: default-seed)\n\
           --mongo-uri <URI>          Reference server URI (default: $JONGODB_REAL_MONGOD_URI)\n\
           --replay-limit <N>         Max replay verifications to run (default: 20)\n\
           --import-profile <NAME>    strict | compat (default: compat)\n\
           --help, -h                 Show help\n"
    );
    std::process::exit(code);
}

fn parse_profile(value: &str) -> Result<ImportProfile, String> {
    match value {
        "strict" => Ok(ImportProfile::Strict),
        "compat" => Ok(ImportProfile::Compat),
        other => Err(format!("invalid --import-profile value '{other}' (expected strict or compat)")),
    }
}

fn parse_args() -> Result<Config, String> {
    let mut spec_root: Option<PathBuf> = None;
    let mut output_dir: Option<PathBuf> = None;
    let mut seed = "default-seed".to_string();
    let mut mongo_uri = std::env::var(ENV_MONGO_URI).ok();
    let mut replay_limit: usize = 20;
    let mut import_profile = ImportProfile::Compat;

    let mut iter = std::env::args().skip(1).peekable();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => print_usage_and_exit(0),
            "--spec-root" => spec_root = Some(PathBuf::from(iter.next().ok_or("--spec-root requires a value")?)),
            "--output-dir" => output_dir = Some(PathBuf::from(iter.next().ok_or("--output-dir requires a value")?)),
            "--seed" => seed = iter.next().ok_or("--seed requires a value")?,
            "--mongo-uri" => mongo_uri = Some(iter.next().ok_or("--mongo-uri requires a value")?),
            "--replay-limit" => {
                let value = iter.next().ok_or("--replay-limit requires a value")?;
                replay_limit = value
                    .parse()
                    .map_err(|e| format!("invalid --replay-limit value '{value}': {e}"))?;
            }
            "--import-profile" => {
                import_profile = parse_profile(&iter.next().ok_or("--import-profile requires a value")?)?;
            }
            _ if arg.starts_with("--spec-root=") => spec_root = Some(PathBuf::from(&arg["--spec-root=".len()..])),
            _ if arg.starts_with("--output-dir=") => output_dir = Some(PathBuf::from(&arg["--output-dir=".len()..])),
            _ if arg.starts_with("--seed=") => seed = arg["--seed=".len()..].to_string(),
            _ if arg.starts_with("--mongo-uri=") => mongo_uri = Some(arg["--mongo-uri=".len()..].to_string()),
            _ if arg.starts_with("--replay-limit=") => {
                let value = &arg["--replay-limit=".len()..];
                replay_limit = value
                    .parse()
                    .map_err(|e| format!("invalid --replay-limit value '{value}': {e}"))?;
            }
            _ if arg.starts_with("--import-profile=") => {
                import_profile = parse_profile(&arg["--import-profile=".len()..])?;
            }
            _ => return Err(format!("unknown option '{arg}'")),
        }
    }

    Ok(Config {
        spec_root: spec_root.ok_or("--spec-root is required")?,
        output_dir: output_dir.ok_or("--output-dir is required")?,
        seed,
        mongo_uri,
        replay_limit,
        import_profile,
    })
}

/// Gather a `RunOnContext` from the reference server's `hello` and
/// `buildInfo` responses. Serverless detection is always reported
/// `false`: no reachable reference deployment exposes it.
async fn gather_run_on_context(client: &Client) -> Result<RunOnContext, String> {
    let admin = client.database("admin");
    let hello = admin
        .run_command(doc! { "hello": 1 })
        .await
        .map_err(|e| format!("hello command failed: {e}"))?;
    let build_info = admin
        .run_command(doc! { "buildInfo": 1 })
        .await
        .map_err(|e| format!("buildInfo command failed: {e}"))?;

    let version_str = build_info
        .get_str("version")
        .map_err(|_| "buildInfo response missing 'version'".to_string())?;
    let server_version =
        ServerVersion::parse(version_str).map_err(|e| format!("unparseable server version: {e}"))?;

    let topology = if hello.get_str("msg").map(|m| m == "isdbgrid").unwrap_or(false) {
        Topology::Sharded
    } else if hello.contains_key("setName") {
        Topology::ReplicaSet
    } else {
        Topology::Single
    };

    Ok(RunOnContext {
        server_version,
        topology,
        is_serverless: false,
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

    let Some(mongo_uri) = &config.mongo_uri else {
        eprintln!("error: --mongo-uri is required (or set {ENV_MONGO_URI})");
        print_usage_and_exit(2);
    };

    let client = match ClientOptions::parse(mongo_uri)
        .await
        .map_err(|e| format!("{e}"))
        .and_then(|opts| Client::with_options(opts).map_err(|e| format!("{e}")))
    {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: failed to connect to reference server: {e}");
            std::process::exit(1);
        }
    };

    let ctx = match gather_run_on_context(&client).await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    let import = match import_spec_root(&config.spec_root, &ctx, config.import_profile) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!(
        imported = import.imported.len(),
        skipped = import.skipped.len(),
        "imported unified-spec corpus"
    );

    let harness = DifferentialHarness::new(InProcessBackend::new(), ReferenceBackend::new(mongo_uri));
    let replay_backend = InProcessBackend::new();
    let corpus_config = CorpusConfig {
        seed: config.seed.clone(),
        replay_limit: config.replay_limit,
    };
    let generated_at = chrono::Utc::now().to_rfc3339();

    let result = run_corpus(
        &harness,
        "unified-spec",
        import.imported,
        &corpus_config,
        &replay_backend,
        &generated_at,
    )
    .await;

    if let Err(e) = std::fs::create_dir_all(&config.output_dir) {
        eprintln!("error: failed to create output directory: {e}");
        std::process::exit(1);
    }

    let report_path = config.output_dir.join("differential-report.json");
    match serde_json::to_vec_pretty(&result.report) {
        Ok(bytes) => {
            if let Err(e) = std::fs::write(&report_path, bytes) {
                eprintln!("error: failed to write report: {e}");
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("error: failed to serialize report: {e}");
            std::process::exit(1);
        }
    }

    let bundle_store = BundleStore::new(config.output_dir.join("bundles"));
    for bundle in &result.bundles {
        if let Err(e) = bundle_store.save(bundle) {
            eprintln!("error: failed to persist bundle '{}': {e}", bundle.failure_id);
            std::process::exit(1);
        }
    }

    let verified = result.replays.iter().filter(|r| r.probe_matched).count();
    println!("scenarios run: {}", result.report.counters.total);
    println!("matched: {}", result.report.counters.matched);
    println!("mismatched: {}", result.report.counters.mismatched);
    println!("errored: {}", result.report.counters.errored);
    println!("bundles written: {}", result.bundles.len());
    println!("replays verified: {verified}/{}", result.replays.len());
    println!("report: {}", report_path.display());
}
