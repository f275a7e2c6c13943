//! The retrieval pipeline interpreter.
//!
//! Workflow: hydrate → fetch dependencies (fan-in) → synthesis → write
//! output → evidence.
//!
//! A retrieval execution joins one or more upstream semantic projections.
//! Its evidence record carries every upstream semantic UTID plus the union
//! of all ancestor document ids, which is what makes a retrieval answer
//! traceable back to every source file that fed it.

use chrono::Utc;
use serde_json::Map;
use std::sync::Arc;

use strata_core::storage::StorageBackend;
use strata_core::{Layer, SequenceCounter, StorePaths, Utid, version};
use strata_ledger::{
    ComponentRun, EvidenceLedger, ExecutionStatus, RetrievalEvidence, StatusUpdate,
};
use strata_manifest::{ManifestStore, parser_for_major};

use crate::context::ExecutionContext;
use crate::engines::{find_latest_envelope_for_manifest, write_envelope};
use crate::envelope::{ArtifactEnvelope, EnvelopeMetadata, artifact_filename};
use crate::error::{Result, RuntimeError};
use crate::interpreter::{PipelineResult, build_context};
use crate::resolver::RuntimeResolver;

/// Lineage gathered while binding the fan-in sources.
#[derive(Default)]
struct FanInLineage {
    semantic_utids: Vec<Utid>,
    doc_ids: Vec<String>,
    source_manifests: Vec<String>,
}

/// Interprets and executes retrieval manifests.
pub struct RetrievalInterpreter {
    storage: Arc<dyn StorageBackend>,
    ledger: Arc<EvidenceLedger>,
    resolver: RuntimeResolver,
    engine: String,
    ctx: ExecutionContext,
}

impl RetrievalInterpreter {
    /// Hydrates the retrieval manifest and writes STARTED evidence.
    ///
    /// # Errors
    ///
    /// Same hydration failure modes as the other interpreters.
    pub async fn hydrate(
        store: &ManifestStore,
        ledger: Arc<EvidenceLedger>,
        resolver: RuntimeResolver,
        storage: Arc<dyn StorageBackend>,
        engine: &str,
        utid: Utid,
        manifest_id: &str,
        pinned_version: Option<&str>,
    ) -> Result<Self> {
        let record = store
            .get_manifest_for_execution(manifest_id, pinned_version)
            .await?;

        let major =
            version::major(&record.manifest.evolution.manifest_schema_version).unwrap_or(1);
        parser_for_major(major)?;

        let declared_engine = record.manifest.evolution.engine.clone();
        if declared_engine != engine {
            return Err(RuntimeError::EngineMismatch {
                declared: declared_engine,
                interpreter: engine.to_string(),
            });
        }

        let ctx = build_context(utid, Layer::Retrieval, &record, None);

        ledger
            .update_status(
                utid,
                StatusUpdate::to(ExecutionStatus::Started)
                    .with_engine(&ctx.engine, &ctx.engine_version)
                    .with_manifest_version(&ctx.manifest_version),
            )
            .await?;

        tracing::info!(
            utid = %utid,
            manifest_id = %manifest_id,
            version = %ctx.manifest_version,
            "retrieval pipeline started"
        );

        Ok(Self {
            storage,
            ledger,
            resolver,
            engine: engine.to_string(),
            ctx,
        })
    }

    /// Executes fan-in, synthesis, and output.
    ///
    /// # Errors
    ///
    /// Returns `Err` only for infrastructure failures; execution failures
    /// become FAILURE evidence plus a failure result.
    pub async fn run(mut self) -> Result<PipelineResult> {
        let mut components: Vec<ComponentRun> = Vec::new();
        let mut lineage = FanInLineage::default();

        match self.execute(&mut components, &mut lineage).await {
            Ok(output_path) => {
                let record_count = self
                    .ctx
                    .get_array("joined_data")
                    .map_or(0, |d| d.len() as u64);

                self.write_evidence(&lineage, RecordedOutcome {
                    components,
                    output_path: Some(output_path.clone()),
                    record_count,
                    status: ExecutionStatus::Success,
                    error: None,
                })
                .await?;

                tracing::info!(utid = %self.ctx.utid, records = record_count, "retrieval pipeline complete");

                Ok(PipelineResult {
                    status: ExecutionStatus::Success,
                    utid: self.ctx.utid,
                    manifest_id: self.ctx.manifest_id.clone(),
                    bom: None,
                    error: None,
                    output_path: Some(output_path),
                })
            }
            Err(e) => {
                let error = e.to_string();
                self.write_evidence(&lineage, RecordedOutcome {
                    components,
                    output_path: None,
                    record_count: 0,
                    status: ExecutionStatus::Failure,
                    error: Some(error.clone()),
                })
                .await?;

                tracing::warn!(utid = %self.ctx.utid, error = %error, "retrieval pipeline failed");

                Ok(PipelineResult {
                    status: ExecutionStatus::Failure,
                    utid: self.ctx.utid,
                    manifest_id: self.ctx.manifest_id.clone(),
                    bom: None,
                    error: Some(error),
                    output_path: None,
                })
            }
        }
    }

    async fn execute(
        &mut self,
        components: &mut Vec<ComponentRun>,
        lineage: &mut FanInLineage,
    ) -> Result<String> {
        // FETCH DEPENDENCIES: bind the primary (required) and secondary
        // (optional) semantic projections.
        let sources = self
            .ctx
            .manifest
            .intent
            .sources
            .clone()
            .ok_or_else(|| RuntimeError::MissingInput("intent.sources.primary".into()))?;

        let primary = self
            .bind_source(&sources.primary.manifest_ref, lineage)
            .await?
            .ok_or_else(|| {
                RuntimeError::component(format!(
                    "no semantic projection found for: {}",
                    sources.primary.manifest_ref
                ))
            })?;
        self.ctx.set("primary_data", primary);

        if let Some(secondary) = &sources.secondary {
            match self.bind_source(&secondary.manifest_ref, lineage).await? {
                Some(envelope) => self.ctx.set("secondary_data", envelope),
                // The secondary source is optional; a missing projection
                // degrades to a passthrough join.
                None => tracing::warn!(
                    manifest_ref = %secondary.manifest_ref,
                    "secondary semantic source not found, continuing without it"
                ),
            }
        }

        // SYNTHESIS: resolve and invoke the join component.
        let synthesis = self
            .ctx
            .manifest
            .intent
            .synthesis
            .clone()
            .ok_or_else(|| RuntimeError::MissingInput("intent.synthesis".into()))?;

        let resolved = self
            .resolver
            .resolve_and_validate(&synthesis.component, &self.engine)?;
        let outcome = resolved
            .component
            .invoke(&mut self.ctx, &synthesis.params)
            .await?;
        components.push(ComponentRun {
            step: "synthesis".to_string(),
            path: resolved.path,
            version: resolved.version,
            status: Some("SUCCESS".to_string()),
        });
        tracing::debug!(result = %outcome.summary, "synthesis complete");

        // OUTPUT: write the joined records to the retrieval store.
        let joined = self
            .ctx
            .get_array("joined_data")
            .cloned()
            .unwrap_or_default();

        let seq = SequenceCounter::new(Arc::clone(&self.storage), StorePaths::retrieval_seq())
            .next()
            .await?;
        let filename = artifact_filename("retrieval", seq, self.ctx.utid, "");
        let output_path = format!("{}/{filename}", StorePaths::retrieval_dir());

        let envelope = ArtifactEnvelope {
            metadata: EnvelopeMetadata {
                utid: self.ctx.utid,
                doc_id: None,
                doc_ids: lineage.doc_ids.clone(),
                curation_utid: None,
                manifest_id: self.ctx.manifest_id.clone(),
                manifest_version: self.ctx.manifest_version.clone(),
                manifest_schema_version: None,
                data_schema_version: None,
                engine: Some(self.engine.clone()),
                engine_version: Some(self.ctx.engine_version.clone()),
                content_hash: None,
                source: None,
                source_manifest_ref: None,
                domain: Some(self.domain()),
                record_count: joined.len() as u64,
                created_at: Utc::now(),
                data_model: None,
            },
            context: Map::new(),
            data: joined,
        };
        write_envelope(&self.storage, &output_path, &envelope).await?;

        Ok(output_path)
    }

    /// Binds one semantic source, collecting its lineage links.
    async fn bind_source(
        &self,
        manifest_ref: &str,
        lineage: &mut FanInLineage,
    ) -> Result<Option<serde_json::Value>> {
        let Some((path, envelope)) = find_latest_envelope_for_manifest(
            &self.storage,
            &format!("{}/", StorePaths::SEMANTIC_STORE),
            manifest_ref,
        )
        .await?
        else {
            return Ok(None);
        };

        lineage.semantic_utids.push(envelope.metadata.utid);
        lineage.source_manifests.push(manifest_ref.to_string());
        if let Some(doc_id) = &envelope.metadata.doc_id {
            if !lineage.doc_ids.contains(doc_id) {
                lineage.doc_ids.push(doc_id.clone());
            }
        }
        for doc_id in &envelope.metadata.doc_ids {
            if !lineage.doc_ids.contains(doc_id) {
                lineage.doc_ids.push(doc_id.clone());
            }
        }

        tracing::debug!(
            projection = %path,
            semantic_utid = %envelope.metadata.utid,
            "bound retrieval source"
        );

        let value = serde_json::to_value(&envelope)
            .map_err(|e| RuntimeError::component(format!("semantic envelope re-encode: {e}")))?;
        Ok(Some(value))
    }

    async fn write_evidence(
        &self,
        lineage: &FanInLineage,
        outcome: RecordedOutcome,
    ) -> Result<()> {
        self.ledger
            .write_retrieval(RetrievalEvidence {
                utid: self.ctx.utid,
                doc_ids: lineage.doc_ids.clone(),
                manifest_id: self.ctx.manifest_id.clone(),
                manifest_version: self.ctx.manifest_version.clone(),
                semantic_utids: lineage.semantic_utids.clone(),
                source_manifests: lineage.source_manifests.clone(),
                domain: self.domain(),
                engine: self.engine.clone(),
                engine_version: self.ctx.engine_version.clone(),
                output_path: outcome.output_path,
                output_format: Some("json".to_string()),
                record_count: outcome.record_count,
                components: outcome.components,
                status: outcome.status,
                error: outcome.error,
            })
            .await?;
        Ok(())
    }

    fn domain(&self) -> String {
        let domain = &self.ctx.manifest.identity.domain;
        if domain.is_empty() {
            "unknown".to_string()
        } else {
            domain.clone()
        }
    }
}

/// What one retrieval run recorded, success or failure.
struct RecordedOutcome {
    components: Vec<ComponentRun>,
    output_path: Option<String>,
    record_count: u64,
    status: ExecutionStatus,
    error: Option<String>,
}
