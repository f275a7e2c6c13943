//! The orchestrator (publisher): where UTIDs are born.
//!
//! Every execution starts here:
//!
//! 1. **Validate**: the manifest (and version, if pinned) must be deployed
//! 2. **Mint**: a fresh UTID, exactly one per attempt, replays included
//! 3. **Log intent**: QUEUED evidence is written before dispatch, so even
//!    an engine that never starts leaves a record of the attempt
//! 4. **Dispatch**: to the layer-appropriate interpreter, selected by the
//!    manifest's declared engine
//!
//! The orchestrator also fronts deployment so that every deploy leaves a
//! deployment evidence record in the same ledger, forced overrides
//! included.

use std::sync::Arc;
use tracing::Instrument;

use strata_core::observability::{pipeline_span, store_span};
use strata_core::storage::StorageBackend;
use strata_core::{Layer, StorePaths, Utid};
use strata_ledger::{DeploymentEvidence, EvidenceLedger};
use strata_manifest::{DeployOutcome, DeployStatus, Manifest, ManifestStore};

use crate::error::{Result, RuntimeError};
use crate::interpreter::{CurationInterpreter, PipelineResult};
use crate::resolver::{EngineRegistry, RuntimeResolver};
use crate::retrieval::RetrievalInterpreter;
use crate::semantic::SemanticInterpreter;

/// Mints a new Unified Trace Identifier.
///
/// The one place in the system where UTIDs are created; interpreters
/// receive theirs from here and never regenerate them.
#[must_use]
pub fn mint_utid() -> Utid {
    Utid::generate()
}

/// The orchestrator: deployment front door, UTID mint, and dispatcher.
pub struct Orchestrator {
    store: Arc<ManifestStore>,
    ledger: Arc<EvidenceLedger>,
    registry: Arc<EngineRegistry>,
    storage: Arc<dyn StorageBackend>,
}

impl Orchestrator {
    /// Creates an orchestrator over shared stores and a populated engine
    /// registry.
    #[must_use]
    pub fn new(
        store: Arc<ManifestStore>,
        ledger: Arc<EvidenceLedger>,
        registry: Arc<EngineRegistry>,
        storage: Arc<dyn StorageBackend>,
    ) -> Self {
        Self {
            store,
            ledger,
            registry,
            storage,
        }
    }

    /// The manifest store this orchestrator fronts.
    #[must_use]
    pub fn store(&self) -> &ManifestStore {
        &self.store
    }

    /// The evidence ledger this orchestrator writes.
    #[must_use]
    pub fn ledger(&self) -> &Arc<EvidenceLedger> {
        &self.ledger
    }

    // =========================================================================
    // Deployment
    // =========================================================================

    /// Deploys a manifest and records deployment evidence.
    ///
    /// A forced override is loud: the evidence record carries
    /// `forced: true` in addition to the store's WARN log.
    ///
    /// # Errors
    ///
    /// Propagates governance violations and storage failures from the
    /// store.
    pub async fn deploy(
        &self,
        manifest: &Manifest,
        layer: Layer,
        agency: &str,
        force: bool,
        source_path: Option<&str>,
    ) -> Result<DeployOutcome> {
        let span = store_span("deploy", manifest.manifest_id());
        let outcome = self
            .store
            .deploy(manifest, layer, agency, force)
            .instrument(span)
            .await?;

        if outcome.status == DeployStatus::Deployed {
            self.ledger
                .write_deployment(DeploymentEvidence {
                    manifest_id: outcome.manifest_id.clone(),
                    manifest_version: outcome.version.clone(),
                    content_hash: outcome.content_hash.clone(),
                    layer,
                    agency: agency.to_string(),
                    source_path: source_path.map(ToString::to_string),
                    target_path: StorePaths::manifest_version_record(
                        layer,
                        agency,
                        &outcome.manifest_id,
                        &outcome.version,
                    ),
                    engine: Some(outcome.engine.clone()),
                    engine_version: Some(outcome.engine_version.clone()),
                    status: "SUCCESS".to_string(),
                    forced: outcome.forced,
                })
                .await?;
        }

        Ok(outcome)
    }

    // =========================================================================
    // Triggers: intent is recorded before anything executes
    // =========================================================================

    /// Mints a UTID for a curation execution and records QUEUED intent.
    ///
    /// # Errors
    ///
    /// Returns `NotDeployed` (with available versions) when the manifest is
    /// absent.
    pub async fn trigger_curation(
        &self,
        manifest_id: &str,
        version: Option<&str>,
    ) -> Result<Utid> {
        self.trigger(Layer::Curation, manifest_id, version).await
    }

    /// Mints a UTID for a semantic execution and records QUEUED intent.
    ///
    /// # Errors
    ///
    /// Returns `NotDeployed` when the manifest is absent.
    pub async fn trigger_semantic(
        &self,
        manifest_id: &str,
        version: Option<&str>,
    ) -> Result<Utid> {
        self.trigger(Layer::Semantics, manifest_id, version).await
    }

    /// Mints a UTID for a retrieval execution and records QUEUED intent.
    ///
    /// # Errors
    ///
    /// Returns `NotDeployed` when the manifest is absent.
    pub async fn trigger_retrieval(
        &self,
        manifest_id: &str,
        version: Option<&str>,
    ) -> Result<Utid> {
        self.trigger(Layer::Retrieval, manifest_id, version).await
    }

    async fn trigger(
        &self,
        layer: Layer,
        manifest_id: &str,
        version: Option<&str>,
    ) -> Result<Utid> {
        let record = self
            .store
            .get_manifest_for_execution(manifest_id, version)
            .await?;

        let utid = mint_utid();
        self.ledger
            .write_intent(
                utid,
                layer,
                manifest_id,
                &record.version,
                &record.content_hash,
            )
            .await?;

        tracing::info!(
            utid = %utid,
            manifest_id = %manifest_id,
            version = %record.version,
            layer = %layer,
            "UTID minted, intent recorded"
        );
        Ok(utid)
    }

    /// Mints a UTID for a replay of a historical execution and records the
    /// replay intent (marked with the source UTID).
    ///
    /// # Errors
    ///
    /// Returns `NotDeployed` when the manifest version is absent.
    pub async fn trigger_replay(
        &self,
        manifest_id: &str,
        version: &str,
        source_utid: Utid,
    ) -> Result<Utid> {
        let record = self
            .store
            .get_manifest_for_execution(manifest_id, Some(version))
            .await?;

        let utid = mint_utid();
        self.ledger
            .write_replay_intent(
                utid,
                Layer::Curation,
                manifest_id,
                &record.version,
                &record.content_hash,
                source_utid,
            )
            .await?;

        tracing::info!(
            utid = %utid,
            manifest_id = %manifest_id,
            version = %version,
            source_utid = %source_utid,
            "replay UTID minted"
        );
        Ok(utid)
    }

    // =========================================================================
    // Full execution flows: trigger + dispatch
    // =========================================================================

    /// Triggers and executes a curation manifest end to end.
    ///
    /// # Errors
    ///
    /// Hydration errors (absent manifest, engine mismatch, unknown engine)
    /// abort the call; execution failures come back as a failure result.
    pub async fn run_curation(
        &self,
        manifest_id: &str,
        version: Option<&str>,
    ) -> Result<PipelineResult> {
        let utid = self.trigger_curation(manifest_id, version).await?;
        self.dispatch_curation(utid, manifest_id, version, None).await
    }

    /// Triggers and executes a semantic manifest end to end.
    ///
    /// # Errors
    ///
    /// Same contract as [`Self::run_curation`].
    pub async fn run_semantic(
        &self,
        manifest_id: &str,
        version: Option<&str>,
    ) -> Result<PipelineResult> {
        let utid = self.trigger_semantic(manifest_id, version).await?;
        let engine = self.declared_engine(manifest_id, version).await?;

        let span = pipeline_span("run_semantic", &utid.to_string(), manifest_id);
        async {
            let interpreter = SemanticInterpreter::hydrate(
                &self.store,
                Arc::clone(&self.ledger),
                RuntimeResolver::new(Arc::clone(&self.registry)),
                Arc::clone(&self.storage),
                &engine,
                utid,
                manifest_id,
                version,
            )
            .await?;
            interpreter.run().await
        }
        .instrument(span)
        .await
    }

    /// Triggers and executes a retrieval manifest end to end.
    ///
    /// # Errors
    ///
    /// Same contract as [`Self::run_curation`].
    pub async fn run_retrieval(
        &self,
        manifest_id: &str,
        version: Option<&str>,
    ) -> Result<PipelineResult> {
        let utid = self.trigger_retrieval(manifest_id, version).await?;
        let engine = self.declared_engine(manifest_id, version).await?;

        let span = pipeline_span("run_retrieval", &utid.to_string(), manifest_id);
        async {
            let interpreter = RetrievalInterpreter::hydrate(
                &self.store,
                Arc::clone(&self.ledger),
                RuntimeResolver::new(Arc::clone(&self.registry)),
                Arc::clone(&self.storage),
                &engine,
                utid,
                manifest_id,
                version,
            )
            .await?;
            interpreter.run().await
        }
        .instrument(span)
        .await
    }

    /// Replays a historical execution by its UTID: a new UTID, a new
    /// evidence record, and the historical raw artifact instead of live
    /// ingestion. The original execution's evidence stays untouched.
    ///
    /// # Errors
    ///
    /// Fails when the source UTID has no evidence record or its manifest
    /// version is gone.
    pub async fn replay_by_utid(&self, source_utid: Utid) -> Result<PipelineResult> {
        let original = self
            .ledger
            .read(source_utid)
            .await?
            .ok_or(strata_ledger::LedgerError::RecordNotFound { utid: source_utid })?;

        let manifest_id = original.manifest_id.clone();
        let version = original.manifest_version.clone();

        let utid = self.trigger_replay(&manifest_id, &version, source_utid).await?;
        self.dispatch_curation(utid, &manifest_id, Some(&version), Some(source_utid))
            .await
    }

    /// Replays the canonical original execution of a manifest version: the
    /// earliest non-replay SUCCESS recorded for it.
    ///
    /// # Errors
    ///
    /// Fails when no successful original execution exists.
    pub async fn replay_by_version(
        &self,
        manifest_id: &str,
        version: &str,
    ) -> Result<PipelineResult> {
        let original = self
            .ledger
            .find_first_success(manifest_id, version)
            .await?
            .ok_or_else(|| {
                RuntimeError::MissingInput(format!(
                    "no successful original execution of '{manifest_id}' v{version} to replay"
                ))
            })?;

        self.replay_by_utid(original.utid).await
    }

    async fn dispatch_curation(
        &self,
        utid: Utid,
        manifest_id: &str,
        version: Option<&str>,
        source_utid: Option<Utid>,
    ) -> Result<PipelineResult> {
        let engine = self.declared_engine(manifest_id, version).await?;

        let span = pipeline_span("run_curation", &utid.to_string(), manifest_id);
        async {
            let interpreter = CurationInterpreter::hydrate(
                &self.store,
                Arc::clone(&self.ledger),
                RuntimeResolver::new(Arc::clone(&self.registry)),
                &engine,
                utid,
                manifest_id,
                version,
                source_utid,
            )
            .await?;
            interpreter.run().await
        }
        .instrument(span)
        .await
    }

    /// Reads the manifest's declared engine and checks it is registered.
    async fn declared_engine(&self, manifest_id: &str, version: Option<&str>) -> Result<String> {
        let record = self
            .store
            .get_manifest_for_execution(manifest_id, version)
            .await?;
        let engine = record.manifest.evolution.engine.clone();

        if self.registry.engine_base(&engine).is_none() {
            return Err(RuntimeError::ResolutionFailure {
                path: String::new(),
                resolved: String::new(),
                engine: engine.clone(),
                reason: format!(
                    "engine not registered (registered: {:?})",
                    self.registry.engine_names()
                ),
            });
        }
        Ok(engine)
    }
}
