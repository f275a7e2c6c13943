//! Cross-layer trace reconstruction ("Trace Everything").
//!
//! Given any UTID, walk the lineage graph backward: a retrieval record fans
//! out to its semantic parents, a semantic record points at its curation
//! parent, and a curation record is a leaf carrying the source-file
//! breadcrumbs from its BOM. Missing upstream records are reported as
//! broken-lineage warnings, never fatal errors: a partially reconstructable
//! trace is still evidence.
//!
//! A trace is **verified** iff the union of all `doc_id`/`doc_ids` collected
//! across the walk is non-empty: the output provably descends from at least
//! one source document.

use serde::Serialize;
use std::collections::BTreeSet;

use strata_core::{Layer, Utid};

use crate::error::{LedgerError, Result};
use crate::record::{EvidenceRecord, ExecutionStatus};
use crate::store::EvidenceLedger;

/// One node of a reconstructed lineage tree.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TraceNode {
    /// Leaf node: a curation execution.
    Curation {
        /// The execution.
        utid: Utid,
        /// Document id of the ingested source artifact.
        doc_id: Option<String>,
        /// Manifest executed.
        manifest_id: String,
        /// Manifest version executed.
        manifest_version: String,
        /// Terminal (or current) status.
        status: ExecutionStatus,
        /// Source file the run ingested.
        wild_source: Option<String>,
        /// Raw artifact the ingestion produced.
        raw_doc: Option<String>,
    },
    /// A semantic execution and its curation parent.
    Semantic {
        /// The execution.
        utid: Utid,
        /// Document id inherited from curation.
        doc_id: Option<String>,
        /// Manifest executed.
        manifest_id: String,
        /// Manifest version executed.
        manifest_version: String,
        /// Terminal (or current) status.
        status: ExecutionStatus,
        /// The upstream curation execution.
        curation_utid: Option<Utid>,
        /// The reconstructed parent, when its record was found.
        upstream: Option<Box<TraceNode>>,
    },
    /// A retrieval execution fanning in over semantic parents.
    Retrieval {
        /// The execution.
        utid: Utid,
        /// Union of ancestor document ids recorded at execution time.
        doc_ids: Vec<String>,
        /// Manifest executed.
        manifest_id: String,
        /// Manifest version executed.
        manifest_version: String,
        /// Terminal (or current) status.
        status: ExecutionStatus,
        /// The upstream semantic executions.
        semantic_utids: Vec<Utid>,
        /// The reconstructed parents that were found.
        upstreams: Vec<TraceNode>,
    },
}

/// A reconstructed lineage trace.
#[derive(Debug, Clone, Serialize)]
pub struct TraceReport {
    /// The node the walk started from.
    pub root: TraceNode,
    /// Union of every document id collected across the walk.
    pub doc_ids: BTreeSet<String>,
    /// Broken-lineage warnings (missing upstream records).
    pub warnings: Vec<String>,
    /// True iff at least one document id was collected.
    pub verified: bool,
}

impl EvidenceLedger {
    /// Reconstructs the full lineage chain from any UTID.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::RecordNotFound`] when no record exists for the
    /// starting UTID; missing *upstream* records are warnings, not errors.
    pub async fn trace(&self, utid: Utid) -> Result<TraceReport> {
        let record = self
            .read(utid)
            .await?
            .ok_or(LedgerError::RecordNotFound { utid })?;

        let mut doc_ids = BTreeSet::new();
        let mut warnings = Vec::new();
        let root = self.walk(&record, &mut doc_ids, &mut warnings).await?;

        let verified = !doc_ids.is_empty();
        if verified {
            tracing::info!(utid = %utid, doc_ids = doc_ids.len(), "trace verified");
        } else {
            tracing::warn!(utid = %utid, "no doc_id found in lineage chain");
        }

        Ok(TraceReport {
            root,
            doc_ids,
            warnings,
            verified,
        })
    }

    /// Walks one record, recursing into its upstream links.
    ///
    /// The recursion depth equals the layer count, so the boxed futures are
    /// shallow; the indirection only exists because async fns cannot recurse
    /// unboxed.
    fn walk<'a>(
        &'a self,
        record: &'a EvidenceRecord,
        doc_ids: &'a mut BTreeSet<String>,
        warnings: &'a mut Vec<String>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<TraceNode>> + Send + 'a>> {
        Box::pin(async move {
            if let Some(doc_id) = &record.doc_id {
                doc_ids.insert(doc_id.clone());
            }
            for doc_id in &record.doc_ids {
                doc_ids.insert(doc_id.clone());
            }

            match record.layer {
                Layer::Curation => {
                    let (wild_source, raw_doc) = record
                        .bom
                        .as_ref()
                        .map_or((None, None), |bom| {
                            (bom.wild_source.clone(), bom.raw_doc.clone())
                        });
                    Ok(TraceNode::Curation {
                        utid: record.utid,
                        doc_id: record.doc_id.clone(),
                        manifest_id: record.manifest_id.clone(),
                        manifest_version: record.manifest_version.clone(),
                        status: record.status,
                        wild_source,
                        raw_doc,
                    })
                }
                Layer::Semantics => {
                    let mut upstream = None;
                    if let Some(curation_utid) = record.curation_utid {
                        match self.read(curation_utid).await? {
                            Some(parent) => {
                                upstream = Some(Box::new(
                                    self.walk(&parent, doc_ids, warnings).await?,
                                ));
                            }
                            None => warnings.push(format!(
                                "broken lineage: curation evidence {curation_utid} not found \
                                 (referenced by {})",
                                record.utid
                            )),
                        }
                    } else {
                        warnings.push(format!(
                            "broken lineage: semantic record {} has no curation_utid",
                            record.utid
                        ));
                    }
                    Ok(TraceNode::Semantic {
                        utid: record.utid,
                        doc_id: record.doc_id.clone(),
                        manifest_id: record.manifest_id.clone(),
                        manifest_version: record.manifest_version.clone(),
                        status: record.status,
                        curation_utid: record.curation_utid,
                        upstream,
                    })
                }
                Layer::Retrieval => {
                    let mut upstreams = Vec::new();
                    for semantic_utid in &record.semantic_utids {
                        match self.read(*semantic_utid).await? {
                            Some(parent) => {
                                upstreams.push(self.walk(&parent, doc_ids, warnings).await?);
                            }
                            None => warnings.push(format!(
                                "broken lineage: semantic evidence {semantic_utid} not found \
                                 (referenced by {})",
                                record.utid
                            )),
                        }
                    }
                    Ok(TraceNode::Retrieval {
                        utid: record.utid,
                        doc_ids: record.doc_ids.clone(),
                        manifest_id: record.manifest_id.clone(),
                        manifest_version: record.manifest_version.clone(),
                        status: record.status,
                        semantic_utids: record.semantic_utids.clone(),
                        upstreams,
                    })
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Bom, ExecutionStatus};
    use crate::store::{SemanticEvidence, StatusUpdate};
    use std::sync::Arc;
    use strata_core::storage::MemoryBackend;

    fn ledger() -> EvidenceLedger {
        EvidenceLedger::new(Arc::new(MemoryBackend::new()))
    }

    async fn seed_curation(ledger: &EvidenceLedger, doc_id: &str) -> Utid {
        let utid = Utid::generate();
        ledger
            .write_intent(utid, Layer::Curation, "facts", "1.0.0", "h")
            .await
            .unwrap();
        ledger
            .write_bom(
                utid,
                Bom {
                    utid,
                    manifest_id: "facts".into(),
                    manifest_version: "1.0.0".into(),
                    engine: "local".into(),
                    engine_version: "1.0.0".into(),
                    components_used: Vec::new(),
                    execution_log: Vec::new(),
                    wild_source: Some("employment_stats.csv".into()),
                    raw_doc: Some("raw-0001.json".into()),
                    doc_id: Some(doc_id.into()),
                    started_at: chrono::Utc::now(),
                    completed_at: Some(chrono::Utc::now()),
                    status: Some(ExecutionStatus::Success),
                    error: None,
                    replay_mode: false,
                    source_utid: None,
                },
            )
            .await
            .unwrap();
        ledger
            .update_status(
                utid,
                StatusUpdate::to(ExecutionStatus::Success).with_doc_id(doc_id),
            )
            .await
            .unwrap();
        utid
    }

    async fn seed_semantic(ledger: &EvidenceLedger, curation: Utid, doc_id: &str) -> Utid {
        let utid = Utid::generate();
        ledger
            .write_semantic(SemanticEvidence {
                utid,
                doc_id: Some(doc_id.into()),
                manifest_id: "ontology".into(),
                manifest_version: "1.0.0".into(),
                curation_utid: Some(curation),
                source_manifest_ref: Some("facts".into()),
                domain: "macroeconomics".into(),
                engine: "local".into(),
                engine_version: "1.0.0".into(),
                output_path: None,
                record_count: 1,
                components: Vec::new(),
                status: ExecutionStatus::Success,
                error: None,
            })
            .await
            .unwrap();
        utid
    }

    #[tokio::test]
    async fn curation_trace_is_a_verified_leaf() {
        let ledger = ledger();
        let utid = seed_curation(&ledger, "doc-a").await;

        let report = ledger.trace(utid).await.unwrap();
        assert!(report.verified);
        assert!(report.warnings.is_empty());
        assert!(report.doc_ids.contains("doc-a"));
        match report.root {
            TraceNode::Curation {
                wild_source,
                raw_doc,
                ..
            } => {
                assert_eq!(wild_source.as_deref(), Some("employment_stats.csv"));
                assert_eq!(raw_doc.as_deref(), Some("raw-0001.json"));
            }
            other => panic!("expected curation leaf, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn retrieval_trace_visits_full_fan_in() {
        let ledger = ledger();
        let c1 = seed_curation(&ledger, "doc-1").await;
        let c2 = seed_curation(&ledger, "doc-2").await;
        let s1 = seed_semantic(&ledger, c1, "doc-1").await;
        let s2 = seed_semantic(&ledger, c2, "doc-2").await;

        let retrieval = Utid::generate();
        ledger
            .write_retrieval(crate::store::RetrievalEvidence {
                utid: retrieval,
                doc_ids: vec!["doc-1".into(), "doc-2".into()],
                manifest_id: "outlook".into(),
                manifest_version: "1.0.0".into(),
                semantic_utids: vec![s1, s2],
                source_manifests: vec!["ontology".into()],
                domain: "reports".into(),
                engine: "local".into(),
                engine_version: "1.0.0".into(),
                output_path: None,
                output_format: Some("json".into()),
                record_count: 2,
                components: Vec::new(),
                status: ExecutionStatus::Success,
                error: None,
            })
            .await
            .unwrap();

        let report = ledger.trace(retrieval).await.unwrap();
        assert!(report.verified);
        assert!(report.warnings.is_empty());
        let expected: BTreeSet<String> =
            ["doc-1", "doc-2"].iter().map(ToString::to_string).collect();
        assert_eq!(report.doc_ids, expected);

        // The walk visits S1, S2, C1, C2.
        let TraceNode::Retrieval { upstreams, .. } = report.root else {
            panic!("expected retrieval root");
        };
        assert_eq!(upstreams.len(), 2);
        let mut visited = Vec::new();
        for upstream in &upstreams {
            let TraceNode::Semantic { utid, upstream, .. } = upstream else {
                panic!("expected semantic node");
            };
            visited.push(*utid);
            let TraceNode::Curation { utid, .. } = upstream.as_deref().expect("curation parent")
            else {
                panic!("expected curation leaf");
            };
            visited.push(*utid);
        }
        for expected in [s1, c1, s2, c2] {
            assert!(visited.contains(&expected));
        }
    }

    #[tokio::test]
    async fn missing_upstream_is_a_warning_not_an_error() {
        let ledger = ledger();
        let ghost = Utid::generate();
        let semantic = seed_semantic(&ledger, ghost, "doc-x").await;

        let report = ledger.trace(semantic).await.unwrap();
        // Still verified via the semantic record's own doc_id.
        assert!(report.verified);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("not found"));
    }

    #[tokio::test]
    async fn unknown_root_is_an_error() {
        let ledger = ledger();
        let err = ledger.trace(Utid::generate()).await.unwrap_err();
        assert!(matches!(err, LedgerError::RecordNotFound { .. }));
    }

    #[tokio::test]
    async fn trace_without_doc_ids_is_unverified() {
        let ledger = ledger();
        let utid = Utid::generate();
        ledger
            .write_intent(utid, Layer::Curation, "facts", "1.0.0", "h")
            .await
            .unwrap();

        let report = ledger.trace(utid).await.unwrap();
        assert!(!report.verified);
        assert!(report.doc_ids.is_empty());
    }
}
