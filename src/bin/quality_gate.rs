//! Quality-gate CLI: runs one of the R1/R2/R3 aggregators
//! or the in-process PoC gate and renders a JSON report plus a Markdown
//! summary, exiting non-zero when `--fail-on-gate-failure` is set and a
//! gate failed.

use std::fs;
use std::path::PathBuf;

use bson::doc;
use mongodb::{options::ClientOptions, Client};

use mongo_diff_harness::backend::in_process::InProcessBackend;
use mongo_diff_harness::backend::reference::ReferenceBackend;
use mongo_diff_harness::backend::Backend;
use mongo_diff_harness::harness::DifferentialHarness;
use mongo_diff_harness::importer::{ImportProfile, RunOnContext, ServerVersion, Topology};
use mongo_diff_harness::quality_gate::poc::{self, BenchmarkPoint, TraceAnalysisSummary};
use mongo_diff_harness::quality_gate::r1;
use mongo_diff_harness::quality_gate::r2::{self, CanaryProjects, SpringMatrixReport};
use mongo_diff_harness::quality_gate::r3::{self, SuiteConfig};
use mongo_diff_harness::quality_gate::QualityGateReport;
use mongo_diff_harness::scenario::{Scenario, ScenarioCommand};
use mongo_diff_harness::value::OrderedMap2;

const ENV_MONGO_URI: &str = "JONGODB_REAL_MONGOD_URI";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    R1,
    R2Scorecard,
    R2Canary,
    R3,
    Poc,
}

struct Config {
    mode: Mode,
    mongo_uri: Option<String>,
    output_dir: Option<PathBuf>,
    fail_on_gate_failure: bool,
    // r1
    warmup: usize,
    measured: usize,
    repetitions: usize,
    // r2-scorecard
    report_file: Option<PathBuf>,
    spring_matrix_file: Option<PathBuf>,
    // r2-canary
    canary_file: Option<PathBuf>,
    // r3
    suites_file: Option<PathBuf>,
    seed: String,
    import_profile: ImportProfile,
    // poc
    tcp_file: Option<PathBuf>,
    in_process_file: Option<PathBuf>,
    trace_file: Option<PathBuf>,
    p95_improvement_threshold: f64,
    throughput_improvement_threshold: f64,
}

fn print_usage_and_exit(code: i32) -> ! {
    eprintln!(
        "Usage: quality-gate --mode <MODE> [OPTIONS]\n\
         \n\
         Modes:\n\
           r1              Benchmarker + flake evaluator (four-gate report)\n\
           r2-scorecard    Differential report + Spring matrix scorecard\n\
           r2-canary       Canary certification\n\
           r3              Failure ledger across configured suites\n\
           poc             In-process PoC gate\n\
         \n\
         Common options:\n\
           --output-dir <DIR>          Write report.json and report.md here (default: stdout JSON only)\n\
           --fail-on-gate-failure      Exit 1 if any gate failed\n\
           --help, -h                  Show help\n\
         \n\
         r1 options:\n\
           --mongo-uri <URI>           Reference server for the flake evaluator (default: in-process self-check)\n\
           --warmup <N>                Discarded iterations before measuring (default: 5)\n\
           --measured <N>              Measured CRUD iterations (default: 50)\n\
           --repetitions <N>           Flake-rate repetitions (default: 5)\n\
         \n\
         r2-scorecard options:\n\
           --report-file <FILE>        DifferentialReport JSON\n\
           --spring-matrix-file <FILE> SpringMatrixReport JSON\n\
         \n\
         r2-canary options:\n\
           --canary-file <FILE>        CanaryProjects JSON\n\
         \n\
         r3 options:\n\
           --suites-file <FILE>        JSON array of {{\"suiteId\", \"specRoot\"}}\n\
           --mongo-uri <URI>           Reference server (default: $JONGODB_REAL_MONGOD_URI)\n\
           --seed <STRING>             Deterministic ordering seed (default: default-seed)\n\
           --import-profile <NAME>     strict | compat (default: compat)\n\
         \n\
         poc options:\n\
           --tcp-file <FILE>               BenchmarkPoint JSON for the TCP-framed path\n\
           --in-process-file <FILE>        BenchmarkPoint JSON for the in-process path\n\
           --trace-file <FILE>             TraceAnalysisSummary JSON\n\
           --p95-improvement-threshold <N>        default 0.3\n\
           --throughput-improvement-threshold <N> default 0.3\n"
    );
    std::process::exit(code);
}

fn parse_mode(value: &str) -> Result<Mode, String> {
    match value {
        "r1" => Ok(Mode::R1),
        "r2-scorecard" => Ok(Mode::R2Scorecard),
        "r2-canary" => Ok(Mode::R2Canary),
        "r3" => Ok(Mode::R3),
        "poc" => Ok(Mode::Poc),
        other => Err(format!(
            "invalid --mode value '{other}' (expected r1, r2-scorecard, r2-canary, r3, or poc)"
        )),
    }
}

fn parse_profile(value: &str) -> Result<ImportProfile, String> {
    match value {
        "strict" => Ok(ImportProfile::Strict),
        "compat" => Ok(ImportProfile::Compat),
        other => Err(format!("invalid --import-profile value '{other}' (expected strict or compat)")),
    }
}

fn parse_usize(value: &str, flag: &str) -> Result<usize, String> {
    value.parse().map_err(|e| format!("invalid {flag} value '{value}': {e}"))
}

fn parse_f64(value: &str, flag: &str) -> Result<f64, String> {
    value.parse().map_err(|e| format!("invalid {flag} value '{value}': {e}"))
}

fn parse_args() -> Result<Config, String> {
    let mut mode: Option<Mode> = None;
    let mut mongo_uri = std::env::var(ENV_MONGO_URI).ok();
    let mut output_dir: Option<PathBuf> = None;
    let mut fail_on_gate_failure = false;
    let mut warmup = 5usize;
    let mut measured = 50usize;
    let mut repetitions = 5usize;
    let mut report_file: Option<PathBuf> = None;
    let mut spring_matrix_file: Option<PathBuf> = None;
    let mut canary_file: Option<PathBuf> = None;
    let mut suites_file: Option<PathBuf> = None;
    let mut seed = "default-seed".to_string();
    let mut import_profile = ImportProfile::Compat;
    let mut tcp_file: Option<PathBuf> = None;
    let mut in_process_file: Option<PathBuf> = None;
    let mut trace_file: Option<PathBuf> = None;
    let mut p95_improvement_threshold = 0.3;
    let mut throughput_improvement_threshold = 0.3;

    let mut iter = std::env::args().skip(1).peekable();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => print_usage_and_exit(0),
            "--mode" => mode = Some(parse_mode(&iter.next().ok_or("--mode requires a value")?)?),
            "--mongo-uri" => mongo_uri = Some(iter.next().ok_or("--mongo-uri requires a value")?),
            "--output-dir" => output_dir = Some(PathBuf::from(iter.next().ok_or("--output-dir requires a value")?)),
            "--fail-on-gate-failure" => fail_on_gate_failure = true,
            "--warmup" => warmup = parse_usize(&iter.next().ok_or("--warmup requires a value")?, "--warmup")?,
            "--measured" => measured = parse_usize(&iter.next().ok_or("--measured requires a value")?, "--measured")?,
            "--repetitions" => repetitions = parse_usize(&iter.next().ok_or("--repetitions requires a value")?, "--repetitions")?,
            "--report-file" => report_file = Some(PathBuf::from(iter.next().ok_or("--report-file requires a value")?)),
            "--spring-matrix-file" => {
                spring_matrix_file = Some(PathBuf::from(iter.next().ok_or("--spring-matrix-file requires a value")?))
            }
            "--canary-file" => canary_file = Some(PathBuf::from(iter.next().ok_or("--canary-file requires a value")?)),
            "--suites-file" => suites_file = Some(PathBuf::from(iter.next().ok_or("--suites-file requires a value")?)),
            "--seed" => seed = iter.next().ok_or("--seed requires a value")?,
            "--import-profile" => import_profile = parse_profile(&iter.next().ok_or("--import-profile requires a value")?)?,
            "--tcp-file" => tcp_file = Some(PathBuf::from(iter.next().ok_or("--tcp-file requires a value")?)),
            "--in-process-file" => {
                in_process_file = Some(PathBuf::from(iter.next().ok_or("--in-process-file requires a value")?))
            }
            "--trace-file" => trace_file = Some(PathBuf::from(iter.next().ok_or("--trace-file requires a value")?)),
            "--p95-improvement-threshold" => {
                let value = iter.next().ok_or("--p95-improvement-threshold requires a value")?;
                p95_improvement_threshold = parse_f64(&value, "--p95-improvement-threshold")?;
            }
            "--throughput-improvement-threshold" => {
                let value = iter.next().ok_or("--throughput-improvement-threshold requires a value")?;
                throughput_improvement_threshold = parse_f64(&value, "--throughput-improvement-threshold")?;
            }
            _ if arg.starts_with("--mode=") => mode = Some(parse_mode(&arg["--mode=".len()..])?),
            _ if arg.starts_with("--mongo-uri=") => mongo_uri = Some(arg["--mongo-uri=".len()..].to_string()),
            _ if arg.starts_with("--output-dir=") => output_dir = Some(PathBuf::from(&arg["--output-dir=".len()..])),
            _ if arg.starts_with("--warmup=") => warmup = parse_usize(&arg["--warmup=".len()..], "--warmup")?,
            _ if arg.starts_with("--measured=") => measured = parse_usize(&arg["--measured=".len()..], "--measured")?,
            _ if arg.starts_with("--repetitions=") => repetitions = parse_usize(&arg["--repetitions=".len()..], "--repetitions")?,
            _ if arg.starts_with("--report-file=") => report_file = Some(PathBuf::from(&arg["--report-file=".len()..])),
            _ if arg.starts_with("--spring-matrix-file=") => {
                spring_matrix_file = Some(PathBuf::from(&arg["--spring-matrix-file=".len()..]))
            }
            _ if arg.starts_with("--canary-file=") => canary_file = Some(PathBuf::from(&arg["--canary-file=".len()..])),
            _ if arg.starts_with("--suites-file=") => suites_file = Some(PathBuf::from(&arg["--suites-file=".len()..])),
            _ if arg.starts_with("--seed=") => seed = arg["--seed=".len()..].to_string(),
            _ if arg.starts_with("--import-profile=") => import_profile = parse_profile(&arg["--import-profile=".len()..])?,
            _ if arg.starts_with("--tcp-file=") => tcp_file = Some(PathBuf::from(&arg["--tcp-file=".len()..])),
            _ if arg.starts_with("--in-process-file=") => {
                in_process_file = Some(PathBuf::from(&arg["--in-process-file=".len()..]))
            }
            _ if arg.starts_with("--trace-file=") => trace_file = Some(PathBuf::from(&arg["--trace-file=".len()..])),
            _ if arg.starts_with("--p95-improvement-threshold=") => {
                p95_improvement_threshold = parse_f64(&arg["--p95-improvement-threshold=".len()..], "--p95-improvement-threshold")?
            }
            _ if arg.starts_with("--throughput-improvement-threshold=") => {
                throughput_improvement_threshold = parse_f64(
                    &arg["--throughput-improvement-threshold=".len()..],
                    "--throughput-improvement-threshold",
                )?
            }
            _ => return Err(format!("unknown option '{arg}'")),
        }
    }

    Ok(Config {
        mode: mode.ok_or("--mode is required")?,
        mongo_uri,
        output_dir,
        fail_on_gate_failure,
        warmup,
        measured,
        repetitions,
        report_file,
        spring_matrix_file,
        canary_file,
        suites_file,
        seed,
        import_profile,
        tcp_file,
        in_process_file,
        trace_file,
        p95_improvement_threshold,
        throughput_improvement_threshold,
    })
}

fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf, flag: &str) -> Result<T, String> {
    let bytes = fs::read(path).map_err(|e| format!("failed to read {flag}: {e}"))?;
    serde_json::from_slice(&bytes).map_err(|e| format!("failed to parse {flag}: {e}"))
}

fn gate_line(gate: &mongo_diff_harness::quality_gate::GateResult) -> String {
    let status = if gate.passed() { "PASS" } else { "FAIL" };
    format!("| {} | {:.4} | {:.4} | {status} |", gate.name, gate.measured, gate.threshold)
}

fn render_markdown(report: &QualityGateReport) -> String {
    let mut out = format!("# {}\n\n{}\n\n| Gate | Measured | Threshold | Status |\n|---|---|---|---|\n", report.name, report.notes);
    for gate in &report.gates {
        out.push_str(&gate_line(gate));
        out.push('\n');
    }
    out.push_str(&format!(
        "\nOverall: **{}**\n",
        if report.all_passed() { "PASS" } else { "FAIL" }
    ));
    out
}

fn emit(report: &QualityGateReport, config: &Config) -> Result<(), String> {
    let json = serde_json::to_string_pretty(report).map_err(|e| format!("failed to serialize report: {e}"))?;
    match &config.output_dir {
        None => println!("{json}"),
        Some(dir) => {
            fs::create_dir_all(dir).map_err(|e| format!("failed to create output directory: {e}"))?;
            fs::write(dir.join("report.json"), &json).map_err(|e| format!("failed to write report.json: {e}"))?;
            fs::write(dir.join("report.md"), render_markdown(report)).map_err(|e| format!("failed to write report.md: {e}"))?;
            println!("report written to {}", dir.display());
        }
    }
    Ok(())
}

fn crud_scenario() -> Scenario {
    Scenario::build(
        "quality-gate-crud",
        "representative CRUD probe",
        vec![ScenarioCommand::new("ping", OrderedMap2::new())],
    )
    .expect("ping scenario is always well-formed")
}

async fn run_r1(config: &Config) -> Result<QualityGateReport, String> {
    let backend = InProcessBackend::new();
    let summary = r1::benchmark(&backend, &crud_scenario(), config.warmup, config.measured).await;

    let generated_at = chrono::Utc::now().to_rfc3339();
    let scenarios = vec![crud_scenario()];
    let flake_rate = match &config.mongo_uri {
        Some(uri) => {
            let harness = DifferentialHarness::new(InProcessBackend::new(), ReferenceBackend::new(uri));
            r1::evaluate_flake_rate(&harness, &scenarios, config.repetitions, &generated_at).await
        }
        None => {
            let harness = DifferentialHarness::new(InProcessBackend::new(), InProcessBackend::new());
            r1::evaluate_flake_rate(&harness, &scenarios, config.repetitions, &generated_at).await
        }
    };

    Ok(r1::build_report(&summary, flake_rate))
}

fn run_r2_scorecard(config: &Config) -> Result<QualityGateReport, String> {
    let report_file = config.report_file.as_ref().ok_or("--report-file is required in r2-scorecard mode")?;
    let spring_file = config
        .spring_matrix_file
        .as_ref()
        .ok_or("--spring-matrix-file is required in r2-scorecard mode")?;
    let report = read_json(report_file, "--report-file")?;
    let spring: SpringMatrixReport = read_json(spring_file, "--spring-matrix-file")?;
    Ok(r2::scorecard(&report, &spring))
}

fn run_r2_canary(config: &Config) -> Result<QualityGateReport, String> {
    let canary_file = config.canary_file.as_ref().ok_or("--canary-file is required in r2-canary mode")?;
    let projects: CanaryProjects = read_json(canary_file, "--canary-file")?;
    Ok(r2::canary_certification(&projects))
}

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
    let server_version = ServerVersion::parse(version_str).map_err(|e| format!("unparseable server version: {e}"))?;

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

async fn run_r3(config: &Config) -> Result<QualityGateReport, String> {
    let suites_file = config.suites_file.as_ref().ok_or("--suites-file is required in r3 mode")?;
    let mongo_uri = config
        .mongo_uri
        .as_ref()
        .ok_or_else(|| format!("--mongo-uri is required in r3 mode (or set {ENV_MONGO_URI})"))?;

    #[derive(serde::Deserialize)]
    struct SuiteSpec {
        suite_id: String,
        spec_root: PathBuf,
    }
    let raw: Vec<SuiteSpec> = read_json(suites_file, "--suites-file")?;
    let suites: Vec<SuiteConfig> = raw
        .into_iter()
        .map(|s| SuiteConfig {
            suite_id: s.suite_id,
            spec_root: s.spec_root,
        })
        .collect();

    let client = ClientOptions::parse(mongo_uri)
        .await
        .map_err(|e| format!("{e}"))
        .and_then(|opts| Client::with_options(opts).map_err(|e| format!("{e}")))?;
    let ctx = gather_run_on_context(&client).await?;

    let harness = DifferentialHarness::new(InProcessBackend::new(), ReferenceBackend::new(mongo_uri));
    let replay_backend = InProcessBackend::new();
    let generated_at = chrono::Utc::now().to_rfc3339();

    let entries = r3::build_ledger(
        &harness,
        &suites,
        &ctx,
        config.import_profile,
        &replay_backend,
        &config.seed,
        &generated_at,
    )
    .await
    .map_err(|missing| missing.join("; "))?;

    for entry in &entries {
        tracing::warn!(suite = %entry.suite_id, scenario = %entry.scenario_id, track = ?entry.track, "non-MATCH result in failure ledger");
    }

    Ok(r3::gate_ledger(&entries))
}

fn run_poc(config: &Config) -> Result<QualityGateReport, String> {
    let tcp_file = config.tcp_file.as_ref().ok_or("--tcp-file is required in poc mode")?;
    let in_process_file = config.in_process_file.as_ref().ok_or("--in-process-file is required in poc mode")?;
    let trace_file = config.trace_file.as_ref().ok_or("--trace-file is required in poc mode")?;

    let tcp: BenchmarkPoint = read_json(tcp_file, "--tcp-file")?;
    let in_process: BenchmarkPoint = read_json(in_process_file, "--in-process-file")?;
    let trace: TraceAnalysisSummary = read_json(trace_file, "--trace-file")?;

    let report = poc::evaluate(
        &tcp,
        &in_process,
        &trace,
        config.p95_improvement_threshold,
        config.throughput_improvement_threshold,
    );

    let decision = match report.decision {
        mongo_diff_harness::quality_gate::poc::PocDecision::Go => "GO",
        mongo_diff_harness::quality_gate::poc::PocDecision::NoGo => "NO_GO",
    };
    let gates = vec![
        mongo_diff_harness::quality_gate::Gate::ge(
            "p95-improvement-ratio",
            config.p95_improvement_threshold,
        )
        .evaluate(report.p95_improvement_ratio),
        mongo_diff_harness::quality_gate::Gate::ge(
            "throughput-improvement-ratio",
            config.throughput_improvement_threshold,
        )
        .evaluate(report.throughput_improvement_ratio),
    ];
    Ok(QualityGateReport::new(
        "poc-gate",
        gates,
        format!("decision={decision}; {}", report.notes),
    ))
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

    let result = match config.mode {
        Mode::R1 => run_r1(&config).await,
        Mode::R2Scorecard => run_r2_scorecard(&config),
        Mode::R2Canary => run_r2_canary(&config),
        Mode::R3 => run_r3(&config).await,
        Mode::Poc => run_poc(&config),
    };

    let report = match result {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    let all_passed = report.all_passed();
    if let Err(e) = emit(&report, &config) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }

    if !all_passed && config.fail_on_gate_failure {
        std::process::exit(1);
    }
}
