//! Three-layer lineage: curation → semantic → retrieval fan-in, and the
//! trace reconstruction that walks it back to the source documents.

use std::collections::BTreeSet;

use strata_core::Layer;
use strata_core::storage::StorageBackend;
use strata_ledger::{ExecutionStatus, TraceNode};

use strata_integration_tests::{
    TestPlatform, employment_manifest, ontology_manifest, outlook_manifest, population_manifest,
};

async fn seed_and_run_curation(platform: &TestPlatform) -> (strata_core::Utid, strata_core::Utid) {
    platform.seed_employment_fixture().await;
    platform
        .seed_wild(
            "census/population.csv",
            "state,observation_year,population\n\
             California,2023,39500000\n\
             Texas,2023,30000000\n",
        )
        .await;

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
        .expect("deploy employment");
    platform
        .orchestrator
        .deploy(&population_manifest("1.0.0"), Layer::Curation, "census", false, None)
        .await
        .expect("deploy population");

    let employment = platform
        .orchestrator
        .run_curation("bls_employment_stats", None)
        .await
        .expect("run employment");
    assert_eq!(employment.status, ExecutionStatus::Success);

    let population = platform
        .orchestrator
        .run_curation("census_population", None)
        .await
        .expect("run population");
    assert_eq!(population.status, ExecutionStatus::Success);

    (employment.utid, population.utid)
}

#[tokio::test]
async fn retrieval_fan_in_is_fully_traceable() {
    let platform = TestPlatform::new();
    let (c1, c2) = seed_and_run_curation(&platform).await;

    // Semantic layer: one projection per curation source.
    platform
        .orchestrator
        .deploy(
            &ontology_manifest(
                "bls_employment_ontology",
                "macroeconomics",
                "bls_employment_stats",
                &[
                    ("observation_year", "observation_year"),
                    ("unemployment_rate", "unemployment_level"),
                    ("state_code", "region_code"),
                ],
            ),
            Layer::Semantics,
            "bls",
            false,
            None,
        )
        .await
        .expect("deploy employment ontology");
    platform
        .orchestrator
        .deploy(
            &ontology_manifest(
                "census_population_ontology",
                "demographics",
                "census_population",
                &[
                    ("observation_year", "observation_year"),
                    ("population", "population_total"),
                ],
            ),
            Layer::Semantics,
            "census",
            false,
            None,
        )
        .await
        .expect("deploy population ontology");

    let s1 = platform
        .orchestrator
        .run_semantic("bls_employment_ontology", None)
        .await
        .expect("run s1");
    assert_eq!(s1.status, ExecutionStatus::Success);
    let s2 = platform
        .orchestrator
        .run_semantic("census_population_ontology", None)
        .await
        .expect("run s2");
    assert_eq!(s2.status, ExecutionStatus::Success);

    // Each semantic record chains back to its curation parent and inherits
    // the document id.
    let s1_record = platform.ledger.read(s1.utid).await.unwrap().expect("s1");
    let s2_record = platform.ledger.read(s2.utid).await.unwrap().expect("s2");
    assert_eq!(s1_record.curation_utid, Some(c1));
    assert_eq!(s2_record.curation_utid, Some(c2));
    let c1_record = platform.ledger.read(c1).await.unwrap().expect("c1");
    let c2_record = platform.ledger.read(c2).await.unwrap().expect("c2");
    assert_eq!(s1_record.doc_id, c1_record.doc_id);
    assert_eq!(s2_record.doc_id, c2_record.doc_id);

    // Retrieval layer: fan-in join over both projections.
    platform
        .orchestrator
        .deploy(
            &outlook_manifest("bls_employment_ontology", Some("census_population_ontology")),
            Layer::Retrieval,
            "platform",
            false,
            None,
        )
        .await
        .expect("deploy outlook");

    let retrieval = platform
        .orchestrator
        .run_retrieval("economic_outlook", None)
        .await
        .expect("run retrieval");
    assert_eq!(retrieval.status, ExecutionStatus::Success);

    let retrieval_record = platform
        .ledger
        .read(retrieval.utid)
        .await
        .unwrap()
        .expect("retrieval record");
    assert_eq!(
        retrieval_record.semantic_utids,
        vec![s1.utid, s2.utid],
        "fan-in links both semantic parents"
    );

    // The record's doc_ids span the whole ancestry.
    let expected_docs: BTreeSet<String> = [&c1_record, &c2_record]
        .iter()
        .filter_map(|r| r.doc_id.clone())
        .collect();
    let recorded_docs: BTreeSet<String> = retrieval_record.doc_ids.iter().cloned().collect();
    assert_eq!(recorded_docs, expected_docs);

    // Trace reconstruction from the retrieval UTID visits S1, S2, C1, C2
    // and collects the same doc-id union.
    let trace = platform
        .ledger
        .trace(retrieval.utid)
        .await
        .expect("trace");
    assert!(trace.verified);
    assert!(trace.warnings.is_empty());
    assert_eq!(trace.doc_ids, expected_docs);

    let TraceNode::Retrieval { upstreams, .. } = &trace.root else {
        panic!("expected a retrieval root");
    };
    let mut visited = BTreeSet::new();
    for upstream in upstreams {
        let TraceNode::Semantic { utid, upstream, .. } = upstream else {
            panic!("expected a semantic node");
        };
        visited.insert(*utid);
        let Some(parent) = upstream.as_deref() else {
            panic!("semantic node lost its curation parent");
        };
        let TraceNode::Curation { utid, .. } = parent else {
            panic!("expected a curation leaf");
        };
        visited.insert(*utid);
    }
    let expected: BTreeSet<_> = [s1.utid, s2.utid, c1, c2].into_iter().collect();
    assert_eq!(visited, expected);

    // The joined output exists and merges fields from both domains.
    let output_path = retrieval.output_path.expect("output path");
    let bytes = platform.storage.get(&output_path).await.expect("output");
    let output: strata_runtime::ArtifactEnvelope =
        serde_json::from_slice(&bytes).expect("envelope");
    assert!(output.metadata.record_count > 0);
    let first = &output.data[0];
    assert!(first.get("primary_unemployment_level").is_some());
    assert!(first.get("secondary_population_total").is_some());
}

#[tokio::test]
async fn retrieval_without_secondary_degrades_to_passthrough() {
    let platform = TestPlatform::new();
    let (c1, _) = seed_and_run_curation(&platform).await;

    platform
        .orchestrator
        .deploy(
            &ontology_manifest(
                "bls_employment_ontology",
                "macroeconomics",
                "bls_employment_stats",
                &[("observation_year", "observation_year")],
            ),
            Layer::Semantics,
            "bls",
            false,
            None,
        )
        .await
        .expect("deploy ontology");
    let s1 = platform
        .orchestrator
        .run_semantic("bls_employment_ontology", None)
        .await
        .expect("run semantic");

    // Secondary references a projection that never ran.
    platform
        .orchestrator
        .deploy(
            &outlook_manifest("bls_employment_ontology", Some("never_projected")),
            Layer::Retrieval,
            "platform",
            false,
            None,
        )
        .await
        .expect("deploy outlook");

    let retrieval = platform
        .orchestrator
        .run_retrieval("economic_outlook", None)
        .await
        .expect("run retrieval");
    assert_eq!(retrieval.status, ExecutionStatus::Success);

    let record = platform
        .ledger
        .read(retrieval.utid)
        .await
        .unwrap()
        .expect("record");
    assert_eq!(record.semantic_utids, vec![s1.utid]);

    // Lineage still reaches the single curation source.
    let trace = platform.ledger.trace(retrieval.utid).await.expect("trace");
    assert!(trace.verified);
    let c1_record = platform.ledger.read(c1).await.unwrap().expect("c1");
    assert_eq!(
        trace.doc_ids.iter().next(),
        c1_record.doc_id.as_ref(),
    );
}

#[tokio::test]
async fn semantic_failure_is_recorded_with_lineage_intact() {
    let platform = TestPlatform::new();

    // No curation fact exists for the referenced source.
    platform
        .orchestrator
        .deploy(
            &ontology_manifest(
                "orphan_ontology",
                "macroeconomics",
                "manifest_that_never_ran",
                &[("observation_year", "observation_year")],
            ),
            Layer::Semantics,
            "bls",
            false,
            None,
        )
        .await
        .expect("deploy");

    let result = platform
        .orchestrator
        .run_semantic("orphan_ontology", None)
        .await
        .expect("run returns a result");
    assert_eq!(result.status, ExecutionStatus::Failure);

    let record = platform
        .ledger
        .read(result.utid)
        .await
        .unwrap()
        .expect("record");
    assert_eq!(record.status, ExecutionStatus::Failure);
    assert!(record.error.as_deref().unwrap_or_default().contains("no fact found"));
    assert_eq!(record.layer, Layer::Semantics);
}
