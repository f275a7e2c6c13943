//! The full flow over the local-filesystem backend: the POC deployment
//! target. Everything the memory-backed tests prove must also hold when
//! the store is a directory tree.

use std::sync::Arc;

use strata_core::storage::{LocalFsBackend, StorageBackend};
use strata_ledger::ExecutionStatus;

use strata_integration_tests::{TestPlatform, employment_manifest};

#[tokio::test]
async fn end_to_end_over_a_directory_tree() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage: Arc<dyn StorageBackend> = Arc::new(LocalFsBackend::new(dir.path()));
    let platform = TestPlatform::over_storage(storage);

    platform.seed_employment_fixture().await;
    platform
        .orchestrator
        .deploy(
            &employment_manifest("1.0.0", "local"),
            strata_core::Layer::Curation,
            "bls",
            false,
            None,
        )
        .await
        .expect("deploy");

    let result = platform
        .orchestrator
        .run_curation("bls_employment_stats", None)
        .await
        .expect("run");
    assert_eq!(result.status, ExecutionStatus::Success);

    // The on-disk layout is the documented one.
    let root = dir.path();
    assert!(
        root.join("manifest_store/curation/manifests/bls/bls_employment_stats/v1.0.0/manifest.json")
            .is_file()
    );
    assert!(
        root.join("manifest_store/curation/manifests/bls/bls_employment_stats/_latest.json")
            .is_file()
    );
    assert!(root.join("evidence_store").is_dir());
    assert!(root.join("raw/bls").is_dir());
    assert!(root.join("fact_store/bls").is_dir());

    // Evidence files are sequence-named and browsable in creation order.
    let mut evidence: Vec<String> = std::fs::read_dir(root.join("evidence_store"))
        .expect("read evidence dir")
        .filter_map(|e| e.ok().map(|e| e.file_name().to_string_lossy().into_owned()))
        .filter(|name| !name.starts_with(".seq"))
        .collect();
    evidence.sort();
    assert!(evidence.iter().any(|n| n.starts_with("deploy_0001_")));
    assert!(
        evidence
            .iter()
            .any(|n| n.starts_with("curation_0001_bls_employment_stats_v1.0.0"))
    );

    // A fresh ledger instance over the same directory reads the record
    // back (the filename memo is instance state, not required state).
    let reopened = TestPlatform::over_storage(Arc::new(LocalFsBackend::new(dir.path())));
    let record = reopened
        .ledger
        .read(result.utid)
        .await
        .expect("read")
        .expect("record survives reopen");
    assert_eq!(record.status, ExecutionStatus::Success);

    let trace = reopened.ledger.trace(result.utid).await.expect("trace");
    assert!(trace.verified);
}
