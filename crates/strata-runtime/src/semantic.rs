//! The semantic pipeline interpreter.
//!
//! Workflow: hydrate → source bind → project → write output → evidence.
//!
//! The semantic layer takes curated facts and projects them into a semantic
//! domain using the manifest's declarative mapping rules. Its UTID chains
//! back to the curation UTID of the fact it consumed, and the document id
//! is inherited from that fact, never minted here.

use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;

use strata_core::storage::StorageBackend;
use strata_core::{Layer, SequenceCounter, StorePaths, Utid, version};
use strata_ledger::{
    ComponentRun, EvidenceLedger, ExecutionStatus, SemanticEvidence, StatusUpdate,
};
use strata_manifest::{ManifestStore, parser_for_major};

use crate::context::ExecutionContext;
use crate::engines::{find_latest_envelope_for_manifest, write_envelope};
use crate::envelope::{ArtifactEnvelope, EnvelopeMetadata, artifact_filename};
use crate::error::{Result, RuntimeError};
use crate::interpreter::{PipelineResult, build_context};
use crate::resolver::RuntimeResolver;

/// Interprets and executes semantic manifests.
pub struct SemanticInterpreter {
    storage: Arc<dyn StorageBackend>,
    ledger: Arc<EvidenceLedger>,
    resolver: RuntimeResolver,
    engine: String,
    ctx: ExecutionContext,
}

impl SemanticInterpreter {
    /// Hydrates the semantic manifest and writes STARTED evidence.
    ///
    /// # Errors
    ///
    /// Same hydration failure modes as the curation interpreter: absent
    /// manifest, unknown schema major, engine mismatch.
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

        let ctx = build_context(utid, Layer::Semantics, &record, None);

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
            "semantic pipeline started"
        );

        Ok(Self {
            storage,
            ledger,
            resolver,
            engine: engine.to_string(),
            ctx,
        })
    }

    /// Executes source bind, projection, and output.
    ///
    /// # Errors
    ///
    /// Returns `Err` only for infrastructure failures; execution failures
    /// are recorded as FAILURE evidence and returned as a failure result.
    pub async fn run(mut self) -> Result<PipelineResult> {
        let mut components: Vec<ComponentRun> = Vec::new();
        let mut curation_utid: Option<Utid> = None;
        let source_manifest_ref = self
            .ctx
            .manifest
            .intent
            .source
            .as_ref()
            .map(|s| s.manifest_ref.clone());

        match self.execute(&mut components, &mut curation_utid).await {
            Ok(output_path) => {
                let record_count = self
                    .ctx
                    .get_array("projected_data")
                    .map_or(0, |d| d.len() as u64);

                self.write_evidence(SemanticEvidence {
                    utid: self.ctx.utid,
                    doc_id: self.ctx.doc_id.clone(),
                    manifest_id: self.ctx.manifest_id.clone(),
                    manifest_version: self.ctx.manifest_version.clone(),
                    curation_utid,
                    source_manifest_ref,
                    domain: self.domain(),
                    engine: self.engine.clone(),
                    engine_version: self.ctx.engine_version.clone(),
                    output_path: Some(output_path.clone()),
                    record_count,
                    components,
                    status: ExecutionStatus::Success,
                    error: None,
                })
                .await?;

                tracing::info!(utid = %self.ctx.utid, records = record_count, "semantic pipeline complete");

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
                self.write_evidence(SemanticEvidence {
                    utid: self.ctx.utid,
                    doc_id: self.ctx.doc_id.clone(),
                    manifest_id: self.ctx.manifest_id.clone(),
                    manifest_version: self.ctx.manifest_version.clone(),
                    curation_utid,
                    source_manifest_ref,
                    domain: self.domain(),
                    engine: self.engine.clone(),
                    engine_version: self.ctx.engine_version.clone(),
                    output_path: None,
                    record_count: 0,
                    components,
                    status: ExecutionStatus::Failure,
                    error: Some(error.clone()),
                })
                .await?;

                tracing::warn!(utid = %self.ctx.utid, error = %error, "semantic pipeline failed");

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

    /// The fallible middle of the run; the caller records the outcome.
    async fn execute(
        &mut self,
        components: &mut Vec<ComponentRun>,
        curation_utid: &mut Option<Utid>,
    ) -> Result<String> {
        // SOURCE BIND: locate the upstream curation fact.
        let source = self
            .ctx
            .manifest
            .intent
            .source
            .clone()
            .ok_or_else(|| RuntimeError::MissingInput("intent.source.manifest_ref".into()))?;

        let (fact_path, fact) = find_latest_envelope_for_manifest(
            &self.storage,
            &format!("{}/", StorePaths::FACT_STORE),
            &source.manifest_ref,
        )
        .await?
        .ok_or_else(|| {
            RuntimeError::component(format!(
                "no fact found for source manifest: {}",
                source.manifest_ref
            ))
        })?;

        *curation_utid = Some(fact.metadata.utid);
        // Inherit the doc id from curation: provenance flows, it is not
        // re-minted.
        self.ctx.doc_id.clone_from(&fact.metadata.doc_id);
        let fact_value = serde_json::to_value(&fact)
            .map_err(|e| RuntimeError::component(format!("fact envelope re-encode: {e}")))?;
        self.ctx.set("source_fact", fact_value);

        tracing::debug!(
            fact = %fact_path,
            curation_utid = %fact.metadata.utid,
            "bound semantic source"
        );

        // PROJECTION: resolve and invoke the mapping component.
        let projection = self
            .ctx
            .manifest
            .intent
            .projection
            .clone()
            .ok_or_else(|| RuntimeError::MissingInput("intent.projection".into()))?;

        let mut params = Map::new();
        params.insert(
            "mapping".to_string(),
            serde_json::to_value(&projection.mapping)
                .map_err(|e| RuntimeError::component(format!("projection mapping: {e}")))?,
        );
        params.insert("context".to_string(), Value::Object(projection.context.clone()));

        let resolved = self
            .resolver
            .resolve_and_validate(&projection.component, &self.engine)?;
        let outcome = resolved.component.invoke(&mut self.ctx, &params).await?;
        components.push(ComponentRun {
            step: "projection".to_string(),
            path: resolved.path,
            version: resolved.version,
            status: Some("SUCCESS".to_string()),
        });
        tracing::debug!(result = %outcome.summary, "projection complete");

        // OUTPUT: write the projection to the semantic store.
        let projected = self
            .ctx
            .get_array("projected_data")
            .cloned()
            .unwrap_or_default();
        let domain = self.domain();

        let seq = SequenceCounter::new(Arc::clone(&self.storage), StorePaths::semantic_seq())
            .next()
            .await?;
        let filename = artifact_filename("semantic", seq, self.ctx.utid, "");
        let output_path = format!("{}/{filename}", StorePaths::semantic_dir(&domain));

        let envelope = ArtifactEnvelope {
            metadata: EnvelopeMetadata {
                utid: self.ctx.utid,
                doc_id: self.ctx.doc_id.clone(),
                doc_ids: Vec::new(),
                curation_utid: *curation_utid,
                manifest_id: self.ctx.manifest_id.clone(),
                manifest_version: self.ctx.manifest_version.clone(),
                manifest_schema_version: None,
                data_schema_version: None,
                engine: Some(self.engine.clone()),
                engine_version: Some(self.ctx.engine_version.clone()),
                content_hash: None,
                source: None,
                source_manifest_ref: Some(source.manifest_ref.clone()),
                domain: Some(domain),
                record_count: projected.len() as u64,
                created_at: Utc::now(),
                data_model: None,
            },
            context: projection.context,
            data: projected,
        };
        write_envelope(&self.storage, &output_path, &envelope).await?;

        Ok(output_path)
    }

    async fn write_evidence(&self, evidence: SemanticEvidence) -> Result<()> {
        self.ledger.write_semantic(evidence).await?;
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
