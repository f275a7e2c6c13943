//! Storage-plane artifact envelopes.
//!
//! Every artifact the platform produces (raw ingestion output, curated
//! facts, semantic projections, retrieval outputs) is a JSON envelope with
//! a metadata header carrying full provenance (UTID, doc id, manifest
//! id/version, content hash) and a `data` payload. The header is what makes
//! an artifact traceable without consulting anything else.
//!
//! Artifact file names are sequence-numbered and embed the UTID:
//! `raw-0001-utid-<ulid>_<agency>_<stem>_v<version>.json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use strata_core::Utid;

/// Metadata header of a storage-plane artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeMetadata {
    /// Execution that produced this artifact.
    pub utid: Utid,
    /// Document id proving source provenance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
    /// Ancestor document ids (retrieval outputs).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub doc_ids: Vec<String>,
    /// Upstream curation execution (semantic outputs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curation_utid: Option<Utid>,
    /// Manifest that produced this artifact.
    pub manifest_id: String,
    /// Its version.
    pub manifest_version: String,
    /// Manifest schema version, carried for replay diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_schema_version: Option<String>,
    /// Data contract version of the payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_schema_version: Option<String>,
    /// Engine that produced the artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    /// Engine version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_version: Option<String>,
    /// Full content hash of the source or payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// Original source file name (raw envelopes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Upstream manifest reference (semantic outputs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_manifest_ref: Option<String>,
    /// Domain of the output (semantic/retrieval).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Number of records in the payload.
    pub record_count: u64,
    /// When the artifact was produced.
    pub created_at: DateTime<Utc>,
    /// Validated data model with quality-check results, when a validation
    /// step ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_model: Option<Value>,
}

/// A storage-plane artifact: metadata header + data payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactEnvelope {
    /// Provenance header.
    pub metadata: EnvelopeMetadata,
    /// Semantic context attached by projection (semantic outputs only).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub context: Map<String, Value>,
    /// The records themselves.
    pub data: Vec<Value>,
}

/// Builds a sequence-numbered artifact file name embedding the UTID.
///
/// # Example
///
/// ```
/// use strata_core::Utid;
/// use strata_runtime::envelope::artifact_filename;
///
/// let utid: Utid = "utid-01ARZ3NDEKTSV4RRFFQ69G5FAV".parse().unwrap();
/// assert_eq!(
///     artifact_filename("raw", 1, utid, "_bls_employment_stats_v1.0.0"),
///     "raw-0001-utid-01ARZ3NDEKTSV4RRFFQ69G5FAV_bls_employment_stats_v1.0.0.json"
/// );
/// ```
#[must_use]
pub fn artifact_filename(store: &str, seq: u64, utid: Utid, suffix: &str) -> String {
    format!("{store}-{seq:04}-utid-{}{suffix}.json", utid.as_ulid())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_roundtrip_keeps_provenance() {
        let utid = Utid::generate();
        let envelope = ArtifactEnvelope {
            metadata: EnvelopeMetadata {
                utid,
                doc_id: Some("doc-1".into()),
                doc_ids: Vec::new(),
                curation_utid: None,
                manifest_id: "bls_employment_stats".into(),
                manifest_version: "1.0.0".into(),
                manifest_schema_version: Some("1.0.0".into()),
                data_schema_version: Some("1.0.0".into()),
                engine: None,
                engine_version: None,
                content_hash: Some("sha256:abc".into()),
                source: Some("employment_stats.csv".into()),
                source_manifest_ref: None,
                domain: None,
                record_count: 2,
                created_at: Utc::now(),
                data_model: None,
            },
            context: Map::new(),
            data: vec![serde_json::json!({"a": 1}), serde_json::json!({"a": 2})],
        };

        let json = serde_json::to_string_pretty(&envelope).unwrap();
        let back: ArtifactEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.metadata.utid, utid);
        assert_eq!(back.metadata.record_count, 2);
        assert_eq!(back.data.len(), 2);
        // Optional blocks stay out of the serialized form.
        assert!(!json.contains("doc_ids"));
        assert!(!json.contains("context"));
    }

    #[test]
    fn filename_embeds_sequence_and_utid() {
        let utid = Utid::generate();
        let name = artifact_filename("fact", 12, utid, "_x_v1.0.0");
        assert!(name.starts_with("fact-0012-utid-"));
        assert!(name.contains(&utid.as_ulid().to_string()));
        assert!(name.ends_with("_x_v1.0.0.json"));
    }
}
