//! Evidence record shapes.
//!
//! Field ordering contract: every serialized record leads with `utid`, and
//! `doc_id` (when present) comes second. This is not a functional
//! requirement (downstream tooling greps record heads), and the struct
//! field order below is what guarantees it; do not reorder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use strata_core::{Layer, Utid};

/// Execution status lifecycle: `QUEUED → STARTED → {SUCCESS, FAILURE}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    /// Intent recorded; nothing has run yet.
    Queued,
    /// The interpreter hydrated the manifest and began executing.
    Started,
    /// Terminal: the pipeline completed and the BOM is recorded.
    Success,
    /// Terminal: the pipeline aborted; the error and partial BOM are recorded.
    Failure,
}

impl ExecutionStatus {
    /// Whether this status ends the lifecycle.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }

    /// Stable uppercase name, as written to records.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Started => "STARTED",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
        }
    }

    /// The `<status>_at` timestamp field name for this status.
    #[must_use]
    pub const fn timestamp_field(&self) -> &'static str {
        match self {
            Self::Queued => "queued_at",
            Self::Started => "started_at",
            Self::Success => "success_at",
            Self::Failure => "failure_at",
        }
    }
}

/// Record types in the evidence store, each with its own file sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    /// Curation execution record.
    Curation,
    /// Semantic execution record.
    Semantic,
    /// Retrieval execution record.
    Retrieval,
    /// Deployment evidence record.
    Deployment,
}

impl RecordType {
    /// File name prefix for this record type.
    #[must_use]
    pub const fn file_prefix(&self) -> &'static str {
        match self {
            Self::Curation => "curation",
            Self::Semantic => "semantic",
            Self::Retrieval => "retrieval",
            Self::Deployment => "deploy",
        }
    }

    /// Maps an execution layer to its record type.
    #[must_use]
    pub const fn from_layer(layer: Layer) -> Self {
        match layer {
            Layer::Curation => Self::Curation,
            Layer::Semantics => Self::Semantic,
            Layer::Retrieval => Self::Retrieval,
        }
    }
}

/// One evidence record per execution attempt, keyed by UTID.
///
/// Records are created at `QUEUED`, merged in place on every status
/// transition, and receive their terminal BOM exactly once. Fields not
/// modeled here survive merges through the flattened `extra` map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceRecord {
    /// Primary key; first field by contract.
    pub utid: Utid,
    /// Primary source document consumed; second field by contract.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
    /// Current lifecycle status.
    pub status: ExecutionStatus,
    /// Execution layer this record belongs to.
    pub layer: Layer,
    /// Manifest executed.
    pub manifest_id: String,
    /// Manifest version executed.
    pub manifest_version: String,
    /// Content hash of the deployed manifest, captured at intent time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// Engine that executed (or will execute) the manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    /// Engine version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_version: Option<String>,
    /// True when this execution replays a historical raw artifact.
    #[serde(default, skip_serializing_if = "is_false")]
    pub replay_mode: bool,
    /// The original execution a replay draws its raw artifact from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_utid: Option<Utid>,
    /// Semantic records: the upstream curation execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curation_utid: Option<Utid>,
    /// Semantic records: the curation manifest referenced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_manifest_ref: Option<String>,
    /// Retrieval records: the upstream semantic executions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub semantic_utids: Vec<Utid>,
    /// Retrieval records: union of all ancestor document ids.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub doc_ids: Vec<String>,
    /// Retrieval records: the semantic manifests joined.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_manifests: Vec<String>,
    /// Output domain (semantic/retrieval records).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Path of the produced output artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    /// Output format (retrieval records).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,
    /// Number of records in the produced output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_count: Option<u64>,
    /// Per-component execution summary (semantic/retrieval records).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<ComponentRun>,
    /// Terminal Bill of Materials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bom: Option<Bom>,
    /// Terminal error message on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// First-write timestamp; never overwritten by merges.
    pub created_at: DateTime<Utc>,
    /// Last-merge timestamp.
    pub updated_at: DateTime<Utc>,
    /// When the record entered QUEUED.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queued_at: Option<DateTime<Utc>>,
    /// When the record entered STARTED.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the record entered SUCCESS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_at: Option<DateTime<Utc>>,
    /// When the record entered FAILURE.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_at: Option<DateTime<Utc>>,
    /// Fields this shape does not model; preserved across merges.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EvidenceRecord {
    /// Creates a fresh QUEUED record.
    #[must_use]
    pub fn new(utid: Utid, layer: Layer, manifest_id: &str, manifest_version: &str) -> Self {
        let now = Utc::now();
        Self {
            utid,
            doc_id: None,
            status: ExecutionStatus::Queued,
            layer,
            manifest_id: manifest_id.to_string(),
            manifest_version: manifest_version.to_string(),
            content_hash: None,
            engine: None,
            engine_version: None,
            replay_mode: false,
            source_utid: None,
            curation_utid: None,
            source_manifest_ref: None,
            semantic_utids: Vec::new(),
            doc_ids: Vec::new(),
            source_manifests: Vec::new(),
            domain: None,
            output_path: None,
            output_format: None,
            record_count: None,
            components: Vec::new(),
            bom: None,
            error: None,
            created_at: now,
            updated_at: now,
            queued_at: Some(now),
            started_at: None,
            success_at: None,
            failure_at: None,
            extra: Map::new(),
        }
    }

    /// Applies a status transition, stamping the per-status timestamp.
    pub fn transition(&mut self, status: ExecutionStatus) {
        let now = Utc::now();
        self.status = status;
        match status {
            ExecutionStatus::Queued => self.queued_at = Some(now),
            ExecutionStatus::Started => self.started_at = Some(now),
            ExecutionStatus::Success => self.success_at = Some(now),
            ExecutionStatus::Failure => self.failure_at = Some(now),
        }
    }

    /// The record type this record files under.
    #[must_use]
    pub const fn record_type(&self) -> RecordType {
        RecordType::from_layer(self.layer)
    }
}

/// Per-component execution summary inside semantic/retrieval records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentRun {
    /// Step or phase name.
    pub step: String,
    /// Resolved component path.
    pub path: String,
    /// Resolved component version.
    pub version: String,
    /// Outcome of the step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// The terminal Bill of Materials of a run.
///
/// Records exactly which components (path + version) executed, what each
/// reported, and the structured lineage breadcrumbs that tie the output
/// back to its source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bom {
    /// The execution this BOM belongs to.
    pub utid: Utid,
    /// Manifest executed.
    pub manifest_id: String,
    /// Manifest version executed.
    pub manifest_version: String,
    /// Engine used.
    pub engine: String,
    /// Engine version used.
    pub engine_version: String,
    /// Ordered list of resolved components, in execution order.
    pub components_used: Vec<BomComponent>,
    /// Per-step result log.
    pub execution_log: Vec<BomLogEntry>,
    /// Source file the run ingested (structured breadcrumb, not parsed
    /// from prose).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wild_source: Option<String>,
    /// Raw artifact the ingestion produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_doc: Option<String>,
    /// Document id of the consumed source artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
    /// When execution started.
    pub started_at: DateTime<Utc>,
    /// When execution reached its terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Terminal status of the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ExecutionStatus>,
    /// Error message when the run failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// True for replay executions.
    #[serde(default, skip_serializing_if = "is_false")]
    pub replay_mode: bool,
    /// The original execution a replay drew from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_utid: Option<Utid>,
}

/// One entry of the BOM's component list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BomComponent {
    /// Step name (`ingestion` or a processing step name).
    pub step: String,
    /// Resolved component path, or `REPLAY_MODE` for a skipped ingestion.
    pub path: String,
    /// Resolved component version, or `N/A` for a skipped ingestion.
    pub version: String,
    /// Replay provenance for skipped ingestion entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_utid: Option<Utid>,
}

/// One entry of the BOM's execution log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BomLogEntry {
    /// Step name.
    pub step: String,
    /// Step status (`SUCCESS`, `SKIPPED_REPLAY`).
    pub status: String,
    /// The component's result summary.
    pub result: String,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
pub(crate) fn is_false(v: &bool) -> bool {
    !*v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utid_is_first_and_doc_id_second_in_serialized_form() {
        let mut record = EvidenceRecord::new(
            Utid::generate(),
            Layer::Curation,
            "bls_employment_stats",
            "1.0.0",
        );
        record.doc_id = Some("doc-01ARZ3NDEKTSV4RRFFQ69G5FAV".to_string());

        let json = serde_json::to_string_pretty(&record).expect("serialize");
        let utid_pos = json.find("\"utid\"").expect("utid present");
        let doc_pos = json.find("\"doc_id\"").expect("doc_id present");
        let status_pos = json.find("\"status\"").expect("status present");

        assert!(utid_pos < doc_pos, "utid must serialize first");
        assert!(doc_pos < status_pos, "doc_id must serialize second");
    }

    #[test]
    fn transition_stamps_per_status_timestamps() {
        let mut record =
            EvidenceRecord::new(Utid::generate(), Layer::Curation, "x", "1.0.0");
        assert!(record.queued_at.is_some());
        assert!(record.started_at.is_none());

        record.transition(ExecutionStatus::Started);
        assert_eq!(record.status, ExecutionStatus::Started);
        assert!(record.started_at.is_some());

        record.transition(ExecutionStatus::Success);
        assert!(record.status.is_terminal());
        assert!(record.success_at.is_some());
    }

    #[test]
    fn unknown_fields_survive_a_roundtrip() {
        let record = EvidenceRecord::new(Utid::generate(), Layer::Curation, "x", "1.0.0");
        let mut value = serde_json::to_value(&record).unwrap();
        value["operator_note"] = Value::from("manually inspected");

        let reparsed: EvidenceRecord = serde_json::from_value(value).unwrap();
        assert_eq!(
            reparsed.extra.get("operator_note").and_then(Value::as_str),
            Some("manually inspected")
        );

        let out = serde_json::to_value(&reparsed).unwrap();
        assert_eq!(out["operator_note"], Value::from("manually inspected"));
    }

    #[test]
    fn record_type_follows_layer() {
        assert_eq!(RecordType::from_layer(Layer::Semantics), RecordType::Semantic);
        assert_eq!(RecordType::Deployment.file_prefix(), "deploy");
    }

    #[test]
    fn status_names_are_stable() {
        assert_eq!(
            serde_json::to_string(&ExecutionStatus::Queued).unwrap(),
            "\"QUEUED\""
        );
        assert_eq!(ExecutionStatus::Failure.timestamp_field(), "failure_at");
    }
}
