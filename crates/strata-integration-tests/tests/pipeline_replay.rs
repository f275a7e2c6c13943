//! Replay semantics, failure handling, and the observable stuck state.

use strata_core::storage::StorageBackend;
use strata_core::{Layer, StorePaths};
use strata_ledger::{ExecutionStatus, StatusUpdate};
use strata_manifest::ManifestError;
use strata_runtime::{CurationInterpreter, RuntimeError, RuntimeResolver};

use strata_integration_tests::{TestPlatform, employment_manifest, population_manifest};

async fn artifact_count(platform: &TestPlatform, prefix: &str) -> usize {
    platform
        .storage
        .list(prefix)
        .await
        .expect("list")
        .into_iter()
        .filter(|m| !m.path.contains("/.seq"))
        .count()
}

#[tokio::test]
async fn replay_substitutes_the_historical_raw_artifact() {
    let platform = TestPlatform::new();
    platform.seed_employment_fixture().await;
    platform
        .orchestrator
        .deploy(
            &employment_manifest("1.0.0", "local"),
            Layer::Curation,
            "bls",
            false,
            None,
        )
        .await
        .expect("deploy");

    let original = platform
        .orchestrator
        .run_curation("bls_employment_stats", None)
        .await
        .expect("run");
    assert_eq!(original.status, ExecutionStatus::Success);
    let original_record = platform
        .ledger
        .read(original.utid)
        .await
        .unwrap()
        .expect("original record");

    // The wild file changes after the original run; a replay must NOT see
    // this.
    platform
        .seed_wild(
            "bls/employment_stats.csv",
            "state,observation_year,rate\nOhio,2030,9.9\n",
        )
        .await;

    let replay = platform
        .orchestrator
        .replay_by_utid(original.utid)
        .await
        .expect("replay");
    assert_eq!(replay.status, ExecutionStatus::Success);

    // A replay mints a distinct UTID with its own evidence record.
    assert_ne!(replay.utid, original.utid);
    let replay_record = platform
        .ledger
        .read(replay.utid)
        .await
        .unwrap()
        .expect("replay record");
    assert!(replay_record.replay_mode);
    assert_eq!(replay_record.source_utid, Some(original.utid));

    // The historical raw artifact was reused: the doc id is inherited, no
    // second raw envelope exists, ingestion was skipped in the BOM.
    assert_eq!(replay_record.doc_id, original_record.doc_id);
    assert_eq!(artifact_count(&platform, &format!("{}/", StorePaths::RAW)).await, 1);
    let replay_bom = replay.bom.as_ref().expect("bom");
    assert_eq!(replay_bom.components_used[0].path, "REPLAY_MODE");
    assert_eq!(replay_bom.execution_log[0].status, "SKIPPED_REPLAY");
    let replayed_rows: Vec<&str> = replay_bom
        .execution_log
        .iter()
        .map(|e| e.result.as_str())
        .collect();
    assert!(
        replayed_rows.iter().any(|r| r.contains("[REPLAY]")),
        "downstream parse read the historical raw artifact"
    );

    // A new fact artifact was produced; the original's evidence is
    // untouched and independently traceable.
    assert_eq!(
        artifact_count(&platform, &format!("{}/", StorePaths::FACT_STORE)).await,
        2
    );
    let original_after = platform
        .ledger
        .read(original.utid)
        .await
        .unwrap()
        .expect("original record");
    assert_eq!(original_after.status, ExecutionStatus::Success);
    assert_eq!(original_after.created_at, original_record.created_at);
    assert!(!original_after.replay_mode);

    let trace = platform.ledger.trace(original.utid).await.expect("trace");
    assert!(trace.verified);
}

#[tokio::test]
async fn replay_by_version_targets_the_first_non_replay_success() {
    let platform = TestPlatform::new();
    platform.seed_employment_fixture().await;
    platform
        .orchestrator
        .deploy(
            &employment_manifest("1.0.0", "local"),
            Layer::Curation,
            "bls",
            false,
            None,
        )
        .await
        .expect("deploy");

    let original = platform
        .orchestrator
        .run_curation("bls_employment_stats", None)
        .await
        .expect("run");

    // One replay already exists; replay-by-version must still pick the
    // original, not the replay.
    let first_replay = platform
        .orchestrator
        .replay_by_utid(original.utid)
        .await
        .expect("replay");

    let second_replay = platform
        .orchestrator
        .replay_by_version("bls_employment_stats", "1.0.0")
        .await
        .expect("replay by version");

    let record = platform
        .ledger
        .read(second_replay.utid)
        .await
        .unwrap()
        .expect("record");
    assert_eq!(record.source_utid, Some(original.utid));
    assert_ne!(second_replay.utid, first_replay.utid);
}

#[tokio::test]
async fn step_failure_is_a_recorded_result_not_an_error() {
    let platform = TestPlatform::new();
    // census wild file deliberately NOT seeded: ingestion will fail.
    platform
        .orchestrator
        .deploy(&population_manifest("1.0.0"), Layer::Curation, "census", false, None)
        .await
        .expect("deploy");

    let result = platform
        .orchestrator
        .run_curation("census_population", None)
        .await
        .expect("run returns a result, not an error");
    assert_eq!(result.status, ExecutionStatus::Failure);
    let error = result.error.as_deref().expect("error recorded");
    assert!(error.contains("source file unavailable"));

    // The minted UTID reached a terminal, inspectable state.
    let record = platform
        .ledger
        .read(result.utid)
        .await
        .unwrap()
        .expect("record");
    assert_eq!(record.status, ExecutionStatus::Failure);
    assert!(record.failure_at.is_some());
    assert_eq!(record.error.as_deref(), Some(error));
    let bom = record.bom.expect("partial BOM recorded");
    assert_eq!(bom.status, Some(ExecutionStatus::Failure));
    assert!(bom.components_used.is_empty(), "nothing completed before the failure");
}

#[tokio::test]
async fn component_version_mismatch_fails_the_run() {
    let platform = TestPlatform::new();
    platform.seed_employment_fixture().await;

    let mut manifest = employment_manifest("1.0.0", "local");
    // The manifest demands a parser version the registry does not declare.
    manifest.intent.processing[0].component.version = "2.0.0".to_string();

    platform
        .orchestrator
        .deploy(&manifest, Layer::Curation, "bls", false, None)
        .await
        .expect("deploy");

    let result = platform
        .orchestrator
        .run_curation("bls_employment_stats", None)
        .await
        .expect("run");
    assert_eq!(result.status, ExecutionStatus::Failure);
    let error = result.error.expect("error");
    assert!(error.contains("version mismatch"), "got: {error}");
    assert!(error.contains("2.0.0") && error.contains("1.0.0"), "names both versions");
}

#[tokio::test]
async fn hydration_failures_abort_before_started() {
    let platform = TestPlatform::new();

    // Absent manifest: NotDeployed with the available versions listed.
    let err = platform
        .orchestrator
        .run_curation("ghost_manifest", None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Manifest(ManifestError::NotDeployed { .. })
    ));

    // Unregistered engine aborts dispatch; the minted UTID stays QUEUED.
    platform.seed_employment_fixture().await;
    platform
        .orchestrator
        .deploy(
            &employment_manifest("1.0.0", "distributed_dataframe"),
            Layer::Curation,
            "bls",
            false,
            None,
        )
        .await
        .expect("deploy");
    let err = platform
        .orchestrator
        .run_curation("bls_employment_stats", None)
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::ResolutionFailure { .. }));
}

#[tokio::test]
async fn interpreter_refuses_a_manifest_for_another_engine() {
    let platform = TestPlatform::with_engine_alias("python");
    platform.seed_employment_fixture().await;
    platform
        .orchestrator
        .deploy(
            &employment_manifest("1.0.0", "python"),
            Layer::Curation,
            "bls",
            false,
            None,
        )
        .await
        .expect("deploy");

    let utid = platform
        .orchestrator
        .trigger_curation("bls_employment_stats", None)
        .await
        .expect("trigger");

    // Hydrating with the wrong interpreter identity must hard-fail.
    let registry = std::sync::Arc::new(strata_runtime::engines::builtin_registry(
        &platform.storage,
    ));
    let err = CurationInterpreter::hydrate(
        &platform.store,
        std::sync::Arc::clone(&platform.ledger),
        RuntimeResolver::new(registry),
        "local",
        utid,
        "bls_employment_stats",
        None,
        None,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, RuntimeError::EngineMismatch { .. }));
}

#[tokio::test]
async fn an_aborted_run_is_observable_as_stuck_started() {
    let platform = TestPlatform::new();
    platform.seed_employment_fixture().await;
    platform
        .orchestrator
        .deploy(
            &employment_manifest("1.0.0", "local"),
            Layer::Curation,
            "bls",
            false,
            None,
        )
        .await
        .expect("deploy");

    let utid = platform
        .orchestrator
        .trigger_curation("bls_employment_stats", None)
        .await
        .expect("trigger");
    platform
        .ledger
        .update_status(utid, StatusUpdate::to(ExecutionStatus::Started))
        .await
        .expect("start");

    // The process dies here. The record is left STARTED with no terminal
    // update: a diagnosable crash signal, not a modeled failure.
    let record = platform.ledger.read(utid).await.unwrap().expect("record");
    assert_eq!(record.status, ExecutionStatus::Started);
    assert!(record.started_at.is_some());
    assert!(record.success_at.is_none());
    assert!(record.failure_at.is_none());
    assert!(record.bom.is_none());
}
