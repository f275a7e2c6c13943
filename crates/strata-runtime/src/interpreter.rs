//! The curation pipeline interpreter.
//!
//! State machine: `QUEUED → STARTED → {SUCCESS, FAILURE}`.
//!
//! Hydration (manifest load, parser selection, engine check) happens in
//! [`CurationInterpreter::hydrate`]; errors there abort the call, since they are
//! misconfigurations the caller must fix. Once STARTED evidence is written,
//! [`CurationInterpreter::run`] never propagates a component error: every
//! failure is converted into terminal FAILURE evidence plus a returned
//! failure result, so every minted UTID reaches a terminal, inspectable
//! state.
//!
//! Replay semantics: in replay mode the ingestion phase is skipped and the
//! replay's source UTID is threaded into the execution context so
//! downstream components locate the historical raw artifact instead of
//! re-ingesting from the wild. This is the one piece of explicit replay branching
//! in the interpreter.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use strata_core::{Layer, Utid, version};
use strata_ledger::{
    Bom, BomComponent, BomLogEntry, EvidenceLedger, ExecutionStatus, StatusUpdate,
};
use strata_manifest::{ManifestStore, ManifestVersionRecord, parser_for_major};

use crate::component::StepOutcome;
use crate::context::ExecutionContext;
use crate::error::{Result, RuntimeError};
use crate::resolver::RuntimeResolver;

/// Result of a pipeline execution.
///
/// Failure is a **result** at this boundary, not an error: the `status`
/// field says what happened, and the evidence ledger holds the same story.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    /// Terminal status of the run.
    pub status: ExecutionStatus,
    /// The run's trace identifier.
    pub utid: Utid,
    /// Manifest executed.
    pub manifest_id: String,
    /// The terminal BOM (success always; failure carries the partial BOM).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bom: Option<Bom>,
    /// Error message when the run failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Path of the produced output artifact, when one was written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
}

/// Interprets and executes curation manifests.
///
/// The interpreter is stateless between runs: all durable state lives in
/// the manifest store (what to run) and the evidence ledger (what
/// happened).
pub struct CurationInterpreter {
    ledger: Arc<EvidenceLedger>,
    resolver: RuntimeResolver,
    engine: String,
    ctx: ExecutionContext,
}

impl std::fmt::Debug for CurationInterpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurationInterpreter")
            .field("engine", &self.engine)
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}

impl CurationInterpreter {
    /// Hydrates the manifest and prepares an execution.
    ///
    /// Writes STARTED evidence on success; hydration is the transition out
    /// of QUEUED.
    ///
    /// # Errors
    ///
    /// - [`ManifestError::NotDeployed`] when the manifest/version is absent
    /// - [`ManifestError::UnknownSchemaMajor`] when no parser handles the
    ///   manifest's declared schema version
    /// - [`RuntimeError::EngineMismatch`] when the manifest declares a
    ///   different engine than this interpreter instance
    pub async fn hydrate(
        store: &ManifestStore,
        ledger: Arc<EvidenceLedger>,
        resolver: RuntimeResolver,
        engine: &str,
        utid: Utid,
        manifest_id: &str,
        pinned_version: Option<&str>,
        source_utid: Option<Utid>,
    ) -> Result<Self> {
        let record = store
            .get_manifest_for_execution(manifest_id, pinned_version)
            .await?;

        // The schema-appropriate parser must exist for this manifest's
        // declared shape; a record deployed under a future schema version
        // is not interpretable here.
        let schema_version = &record.manifest.evolution.manifest_schema_version;
        let major = version::major(schema_version).unwrap_or(1);
        parser_for_major(major)?;

        let declared_engine = record.manifest.evolution.engine.clone();
        if declared_engine != engine {
            return Err(RuntimeError::EngineMismatch {
                declared: declared_engine,
                interpreter: engine.to_string(),
            });
        }

        let ctx = build_context(utid, Layer::Curation, &record, source_utid);

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
            engine = %engine,
            replay = ctx.replay_mode,
            "curation pipeline started"
        );

        Ok(Self {
            ledger,
            resolver,
            engine: engine.to_string(),
            ctx,
        })
    }

    /// Executes the manifest pipeline: ingestion, then every processing
    /// step strictly in declared order.
    ///
    /// # Errors
    ///
    /// Returns `Err` only for infrastructure failures (ledger/storage).
    /// Component and resolution failures inside the run become a FAILURE
    /// result.
    pub async fn run(mut self) -> Result<PipelineResult> {
        let mut bom = Bom {
            utid: self.ctx.utid,
            manifest_id: self.ctx.manifest_id.clone(),
            manifest_version: self.ctx.manifest_version.clone(),
            engine: self.ctx.engine.clone(),
            engine_version: self.ctx.engine_version.clone(),
            components_used: Vec::new(),
            execution_log: Vec::new(),
            wild_source: None,
            raw_doc: None,
            doc_id: None,
            started_at: self.ctx.started_at,
            completed_at: None,
            status: None,
            error: None,
            replay_mode: self.ctx.replay_mode,
            source_utid: self.ctx.source_utid,
        };

        // INGESTION PHASE
        if self.ctx.replay_mode {
            // Replay substitutes the historical raw artifact for live
            // ingestion; downstream steps read it via the source UTID.
            let source_utid = self.ctx.source_utid;
            bom.components_used.push(BomComponent {
                step: "ingestion".to_string(),
                path: "REPLAY_MODE".to_string(),
                version: "N/A".to_string(),
                source_utid,
            });
            bom.execution_log.push(BomLogEntry {
                step: "ingestion".to_string(),
                status: "SKIPPED_REPLAY".to_string(),
                result: format!(
                    "REPLAY: Using raw artifact from {}",
                    source_utid.map(|u| u.to_string()).unwrap_or_default()
                ),
            });
        } else {
            let Some(ingestion) = self.ctx.manifest.intent.ingestion.clone() else {
                return self
                    .fail(bom, "manifest declares no ingestion component".to_string())
                    .await;
            };

            let outcome = self
                .execute_step("ingestion", &ingestion.component, &ingestion.params, &mut bom)
                .await;
            match outcome {
                Ok(outcome) => {
                    bom.wild_source.clone_from(&outcome.source_file);
                    bom.raw_doc.clone_from(&outcome.produced_artifact);
                }
                Err(e) => return self.fail(bom, e.to_string()).await,
            }
        }

        // PROCESSING PHASE: strictly sequential; later steps read context
        // fields written by earlier ones.
        let steps = self.ctx.manifest.intent.processing.clone();
        for step in &steps {
            if let Err(e) = self
                .execute_step(&step.step, &step.component, &step.params, &mut bom)
                .await
            {
                return self.fail(bom, e.to_string()).await;
            }
        }

        // SUCCESS
        bom.doc_id.clone_from(&self.ctx.doc_id);
        bom.completed_at = Some(Utc::now());
        bom.status = Some(ExecutionStatus::Success);

        self.ledger.write_bom(self.ctx.utid, bom.clone()).await?;
        let mut update = StatusUpdate::to(ExecutionStatus::Success);
        if let Some(doc_id) = &self.ctx.doc_id {
            update = update.with_doc_id(doc_id);
        }
        self.ledger.update_status(self.ctx.utid, update).await?;

        tracing::info!(
            utid = %self.ctx.utid,
            components = bom.components_used.len(),
            "curation pipeline complete"
        );

        let output_path = self.ctx.get_str("fact_store_path").map(ToString::to_string);
        Ok(PipelineResult {
            status: ExecutionStatus::Success,
            utid: self.ctx.utid,
            manifest_id: self.ctx.manifest_id.clone(),
            bom: Some(bom),
            error: None,
            output_path,
        })
    }

    /// Resolves and invokes one component, appending to the BOM.
    async fn execute_step(
        &mut self,
        step_name: &str,
        component_ref: &strata_manifest::ComponentRef,
        params: &serde_json::Map<String, serde_json::Value>,
        bom: &mut Bom,
    ) -> Result<StepOutcome> {
        let resolved = self
            .resolver
            .resolve_and_validate(component_ref, &self.engine)?;

        let outcome = resolved.component.invoke(&mut self.ctx, params).await?;

        bom.components_used.push(BomComponent {
            step: step_name.to_string(),
            path: resolved.path,
            version: resolved.version,
            source_utid: None,
        });
        bom.execution_log.push(BomLogEntry {
            step: step_name.to_string(),
            status: "SUCCESS".to_string(),
            result: outcome.summary.clone(),
        });

        Ok(outcome)
    }

    /// Terminal failure: record the partial BOM plus the error, then return
    /// a failure result. Never propagates the component error.
    async fn fail(self, mut bom: Bom, error: String) -> Result<PipelineResult> {
        bom.doc_id.clone_from(&self.ctx.doc_id);
        bom.completed_at = Some(Utc::now());
        bom.status = Some(ExecutionStatus::Failure);
        bom.error = Some(error.clone());

        self.ledger.write_bom(self.ctx.utid, bom.clone()).await?;
        let mut update = StatusUpdate::to(ExecutionStatus::Failure).with_error(&error);
        if let Some(doc_id) = &self.ctx.doc_id {
            update = update.with_doc_id(doc_id);
        }
        self.ledger.update_status(self.ctx.utid, update).await?;

        tracing::warn!(utid = %self.ctx.utid, error = %error, "curation pipeline failed");

        Ok(PipelineResult {
            status: ExecutionStatus::Failure,
            utid: self.ctx.utid,
            manifest_id: self.ctx.manifest_id.clone(),
            bom: Some(bom),
            error: Some(error),
            output_path: None,
        })
    }
}

/// Builds the run's execution context from a hydrated version record.
pub(crate) fn build_context(
    utid: Utid,
    layer: Layer,
    record: &ManifestVersionRecord,
    source_utid: Option<Utid>,
) -> ExecutionContext {
    let agency = if record.agency.is_empty() {
        record.manifest.identity.agency.clone()
    } else {
        record.agency.clone()
    };
    ExecutionContext::new(utid, layer, &agency, record.manifest.clone(), source_utid)
}
