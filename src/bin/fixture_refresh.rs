//! Fixture refresh tool: diffs a baseline and candidate
//! NDJSON fixture set per namespace, gates the drift, and (if approved or
//! non-breaking) writes the candidate's namespaces to `--output-dir`.

use std::path::PathBuf;

use mongo_diff_harness::fixture::drift::{classify, diff_fixture_sets, DriftSeverity};
use mongo_diff_harness::fixture::read_ndjson_dir;
use mongo_diff_harness::fixture::refresh::{execute, plan, RefreshMode};

struct Config {
    baseline_dir: PathBuf,
    candidate_dir: PathBuf,
    output_dir: PathBuf,
    mode: RefreshMode,
    require_approval: bool,
    approved: bool,
    warn_threshold: f64,
    fail_threshold: f64,
    fail_on_threshold: bool,
}

fn print_usage_and_exit(code: i32) -> ! {
    eprintln!(
        "Usage: fixture-refresh --baseline-dir <DIR> --candidate-dir <DIR> --output-dir <DIR> [OPTIONS]\n\
         \n\
         Options:\n\
           --baseline-dir <DIR>     Baseline NDJSON fixture directory\n\
           --candidate-dir <DIR>    Candidate NDJSON fixture directory\n\
           --output-dir <DIR>       Where the refreshed NDJSON files are written\n\
           --mode <full|incremental>  Refresh mode (default: full)\n\
           --require-approval       Treat any drift as requiring --approved\n\
           --approved               Authorize a breaking refresh\n\
           --warn-threshold <N>     Drift-score warn threshold (default: 0.15)\n\
           --fail-threshold <N>     Drift-score fail threshold (default: 0.30)\n\
           --fail-on-threshold      Exit 1 if any namespace is classified Fail\n\
           --help, -h               Show help\n"
    );
    std::process::exit(code);
}

fn parse_f64(value: &str, flag: &str) -> Result<f64, String> {
    value.parse().map_err(|e| format!("invalid {flag} value '{value}': {e}"))
}

fn parse_mode(value: &str) -> Result<RefreshMode, String> {
    match value {
        "full" => Ok(RefreshMode::Full),
        "incremental" => Ok(RefreshMode::Incremental),
        other => Err(format!("invalid --mode value '{other}' (expected full or incremental)")),
    }
}

fn parse_args() -> Result<Config, String> {
    let mut baseline_dir: Option<PathBuf> = None;
    let mut candidate_dir: Option<PathBuf> = None;
    let mut output_dir: Option<PathBuf> = None;
    let mut mode = RefreshMode::Full;
    let mut require_approval = false;
    let mut approved = false;
    let mut warn_threshold = 0.15;
    let mut fail_threshold = 0.30;
    let mut fail_on_threshold = false;

    let mut iter = std::env::args().skip(1).peekable();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => print_usage_and_exit(0),
            "--baseline-dir" => baseline_dir = Some(PathBuf::from(iter.next().ok_or("--baseline-dir requires a value")?)),
            "--candidate-dir" => candidate_dir = Some(PathBuf::from(iter.next().ok_or("--candidate-dir requires a value")?)),
            "--output-dir" => output_dir = Some(PathBuf::from(iter.next().ok_or("--output-dir requires a value")?)),
            "--mode" => mode = parse_mode(&iter.next().ok_or("--mode requires a value")?)?,
            "--require-approval" => require_approval = true,
            "--approved" => approved = true,
            "--fail-on-threshold" => fail_on_threshold = true,
            "--warn-threshold" => {
                let value = iter.next().ok_or("--warn-threshold requires a value")?;
                warn_threshold = parse_f64(&value, "--warn-threshold")?;
            }
            "--fail-threshold" => {
                let value = iter.next().ok_or("--fail-threshold requires a value")?;
                fail_threshold = parse_f64(&value, "--fail-threshold")?;
            }
            _ if arg.starts_with("--baseline-dir=") => baseline_dir = Some(PathBuf::from(&arg["--baseline-dir=".len()..])),
            _ if arg.starts_with("--candidate-dir=") => candidate_dir = Some(PathBuf::from(&arg["--candidate-dir=".len()..])),
            _ if arg.starts_with("--output-dir=") => output_dir = Some(PathBuf::from(&arg["--output-dir=".len()..])),
            _ if arg.starts_with("--mode=") => mode = parse_mode(&arg["--mode=".len()..])?,
            _ if arg.starts_with("--warn-threshold=") => warn_threshold = parse_f64(&arg["--warn-threshold=".len()..], "--warn-threshold")?,
            _ if arg.starts_with("--fail-threshold=") => fail_threshold = parse_f64(&arg["--fail-threshold=".len()..], "--fail-threshold")?,
            _ if arg.starts_with('-') => return Err(format!("unknown option '{arg}'")),
            _ => return Err(format!("unexpected positional argument '{arg}'")),
        }
    }

    if fail_threshold < warn_threshold {
        return Err("--fail-threshold must be >= --warn-threshold".to_string());
    }

    Ok(Config {
        baseline_dir: baseline_dir.ok_or("--baseline-dir is required")?,
        candidate_dir: candidate_dir.ok_or("--candidate-dir is required")?,
        output_dir: output_dir.ok_or("--output-dir is required")?,
        mode,
        require_approval,
        approved,
        warn_threshold,
        fail_threshold,
        fail_on_threshold,
    })
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

    let baseline = match read_ndjson_dir(&config.baseline_dir) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("error: failed to read baseline directory: {e}");
            std::process::exit(1);
        }
    };
    let candidate = match read_ndjson_dir(&config.candidate_dir) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: failed to read candidate directory: {e}");
            std::process::exit(1);
        }
    };

    let drifts = diff_fixture_sets(&baseline, &candidate);
    let mut any_fail = false;
    for drift in &drifts {
        let severity = classify(drift.score(), config.warn_threshold, config.fail_threshold);
        if severity == DriftSeverity::Fail {
            any_fail = true;
        }
        println!(
            "{}: added={} removed={} changed={} unchanged={} score={:.3} severity={:?}",
            drift.namespace, drift.added, drift.removed, drift.changed, drift.unchanged, drift.score(), severity
        );
    }

    let refresh_plan = plan(&baseline, &candidate, config.mode);
    let any_drift = drifts.iter().any(|d| d.added > 0 || d.removed > 0 || d.changed > 0);
    let approval_required = refresh_plan.requires_approval() || (config.require_approval && any_drift);

    if approval_required && !config.approved {
        eprintln!("error: refresh requires --approved (breaking change or --require-approval with drift present)");
        std::process::exit(1);
    }

    match execute(&config.output_dir, &refresh_plan, true) {
        Ok(()) => println!("refresh written to {}", config.output_dir.display()),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }

    if any_fail && config.fail_on_threshold {
        std::process::exit(1);
    }
}
