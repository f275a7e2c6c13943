//! The shared execution context threaded through one pipeline run.
//!
//! One context per run, exclusively owned by that run. Components mutate it
//! in place to publish outputs for downstream steps; this is the one
//! shared-mutable-state discipline in the system. Steps are not isolated;
//! their declared order is a correctness dependency.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use strata_core::{Layer, Utid};
use strata_manifest::Manifest;

/// Execution context for one pipeline run.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// The run's trace identifier, minted by the orchestrator.
    pub utid: Utid,
    /// Manifest being executed.
    pub manifest_id: String,
    /// Manifest version being executed.
    pub manifest_version: String,
    /// Engine executing the run.
    pub engine: String,
    /// Engine version.
    pub engine_version: String,
    /// Execution layer.
    pub layer: Layer,
    /// Agency the manifest is deployed under.
    pub agency: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// The full manifest, for components that resolve reference data or
    /// data-model files through it.
    pub manifest: Manifest,
    /// True when this run replays a historical raw artifact.
    pub replay_mode: bool,
    /// The execution whose raw artifact a replay consumes.
    pub source_utid: Option<Utid>,
    /// Document id of the consumed source artifact, set once ingestion or
    /// source binding completes.
    pub doc_id: Option<String>,
    /// Path of the raw artifact this run ingested.
    pub ingested_file: Option<String>,
    values: Map<String, Value>,
}

impl ExecutionContext {
    /// Creates a fresh context for one run.
    #[must_use]
    pub fn new(
        utid: Utid,
        layer: Layer,
        agency: &str,
        manifest: Manifest,
        source_utid: Option<Utid>,
    ) -> Self {
        let evolution = manifest.evolution.clone();
        Self {
            utid,
            manifest_id: manifest.manifest_id().to_string(),
            manifest_version: evolution.manifest_version,
            engine: evolution.engine,
            engine_version: evolution.engine_version,
            layer,
            agency: agency.to_string(),
            started_at: Utc::now(),
            manifest,
            replay_mode: source_utid.is_some(),
            source_utid,
            doc_id: None,
            ingested_file: None,
            values: Map::new(),
        }
    }

    /// Publishes a value for downstream steps.
    pub fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    /// Reads a value published by an earlier step.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Reads an array value published by an earlier step.
    #[must_use]
    pub fn get_array(&self, key: &str) -> Option<&Vec<Value>> {
        self.values.get(key).and_then(Value::as_array)
    }

    /// Reads a string value published by an earlier step.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// The working dataset: `enriched_data` when an enrichment step ran,
    /// otherwise `parsed_data`.
    #[must_use]
    pub fn working_data(&self) -> Option<&Vec<Value>> {
        self.get_array("enriched_data")
            .or_else(|| self.get_array("parsed_data"))
    }

    /// The UTID whose raw artifact this run should read: the replay source
    /// for replays, the run's own UTID otherwise.
    #[must_use]
    pub fn raw_lookup_utid(&self) -> Utid {
        self.source_utid.unwrap_or(self.utid)
    }
}
