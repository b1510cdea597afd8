//! End-to-end smoke test: import a spec root from disk, run it through
//! the differential harness in corpus order, then save and replay a
//! manually constructed failure bundle against the in-process backend.

use std::fs;

use mongo_diff_harness::backend::in_process::InProcessBackend;
use mongo_diff_harness::corpus::{run_corpus, CorpusConfig};
use mongo_diff_harness::diff::DiffStatus;
use mongo_diff_harness::harness::DifferentialHarness;
use mongo_diff_harness::importer::{import_spec_root, ImportProfile, RunOnContext, ServerVersion, Topology};
use mongo_diff_harness::replay::probe::ReplayProbe;
use mongo_diff_harness::replay::{BundleStore, ReplayBundle};
use mongo_diff_harness::scenario::ScenarioCommand;
use mongo_diff_harness::value::{OrderedMap2, Value};

fn ctx() -> RunOnContext {
    RunOnContext {
        server_version: ServerVersion(6, 0, 0),
        topology: Topology::Single,
        is_serverless: false,
    }
}

#[tokio::test]
async fn import_and_corpus_run_round_trips_through_identical_backends() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(
        tmp.path().join("crud.json"),
        r#"{
            "tests": [
                {
                    "description": "insert then find",
                    "commands": [
                        {"commandName": "insert", "payload": {"insert": "widgets", "documents": [{"_id": "1", "name": "gear"}]}},
                        {"commandName": "find", "payload": {"find": "widgets", "filter": {"name": "gear"}}}
                    ]
                },
                {
                    "description": "ping",
                    "commands": [{"commandName": "ping", "payload": {}}]
                }
            ]
        }"#,
    )
    .unwrap();

    let report = import_spec_root(tmp.path(), &ctx(), ImportProfile::Strict).unwrap();
    assert_eq!(report.imported.len(), 2);
    assert!(report.skipped.is_empty());

    let harness = DifferentialHarness::new(InProcessBackend::new(), InProcessBackend::new());
    let config = CorpusConfig {
        seed: "integration-smoke".to_string(),
        replay_limit: 10,
    };

    let result = run_corpus(
        &harness,
        "crud-suite",
        report.imported,
        &config,
        &InProcessBackend::new(),
        "2026-07-29T00:00:00Z",
    )
    .await;

    // Two fresh, identically-behaved in-process engines always agree.
    assert_eq!(result.report.counters.total, 2);
    assert_eq!(result.report.counters.matched, 2);
    assert!(result.bundles.is_empty());
    assert!(result.replays.is_empty());
}

#[tokio::test]
async fn saved_failure_bundle_replays_and_matches_its_probe() {
    let tmp = tempfile::tempdir().unwrap();
    let store = BundleStore::new(tmp.path());

    let mut payload = OrderedMap2::new();
    payload.insert("insert", Value::String("widgets".to_string()));
    payload.insert(
        "documents",
        Value::Array(vec![Value::object([
            ("_id".to_string(), Value::String("1".to_string())),
            ("name".to_string(), Value::String("gear".to_string())),
        ])]),
    );
    let commands = vec![ScenarioCommand::new("insert", payload)];

    let probe = ReplayProbe::new("$.success", Value::Bool(true)).unwrap();
    let bundle = ReplayBundle::build(
        "crud-suite",
        "insert-widget",
        DiffStatus::Mismatch,
        "1 field-level divergence(s)".to_string(),
        commands,
        &probe,
    )
    .unwrap();

    store.save(&bundle).unwrap();
    assert_eq!(store.list_failure_ids().unwrap(), vec![bundle.failure_id.clone()]);

    let loaded = store.load(&bundle.failure_id).unwrap();
    let outcome = mongo_diff_harness::replay::replay_bundle(&loaded, &InProcessBackend::new())
        .await
        .unwrap();
    assert!(outcome.probe_matched);
}
