//! Canonical storage paths for the Strata stores.
//!
//! This module is the **single source of truth** for every on-disk path the
//! platform writes. All writers must use these functions to construct paths;
//! no hardcoded path strings should exist outside this module.
//!
//! # Path Layout
//!
//! ```text
//! {root}/
//! ├── manifest_store/
//! │   └── {layer}/                       # curation, semantics, retrieval
//! │       └── manifests/
//! │           └── {agency}/
//! │               └── {manifest_id}/
//! │                   ├── v{version}/
//! │                   │   └── manifest.json
//! │                   └── _latest.json   # the one mutable pointer
//! ├── evidence_store/
//! │   ├── {type}_{seq}_{manifest_id}_v{version}.json
//! │   └── .seq_{type}.json               # per-type sequence counters
//! ├── wild/                              # external drop zone (read-only)
//! ├── raw/{agency}/                      # immutable ingestion envelopes
//! ├── fact_store/{agency}/               # curated facts
//! ├── semantic_store/{domain}/           # semantic projections
//! └── retrieval_store/                   # retrieval outputs
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Execution layers of the platform.
///
/// Each layer has its own manifest namespace and its own interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    /// Curation: wild source → raw envelope → curated facts.
    Curation,
    /// Semantics: facts → ontology-mapped projections.
    Semantics,
    /// Retrieval: fan-in join over semantic projections.
    Retrieval,
}

impl Layer {
    /// Returns the string name for this layer.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Curation => "curation",
            Self::Semantics => "semantics",
            Self::Retrieval => "retrieval",
        }
    }

    /// Returns all layers.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Curation, Self::Semantics, Self::Retrieval]
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Layer {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "curation" => Ok(Self::Curation),
            // Historical records use both spellings.
            "semantics" | "semantic" => Ok(Self::Semantics),
            "retrieval" => Ok(Self::Retrieval),
            other => Err(Error::InvalidInput(format!("unknown layer: {other}"))),
        }
    }
}

/// Canonical path generator for all Strata stores.
///
/// # Example
///
/// ```
/// use strata_core::paths::{Layer, StorePaths};
///
/// assert_eq!(
///     StorePaths::manifest_version_record(Layer::Curation, "bls", "bls_employment_stats", "1.0.0"),
///     "manifest_store/curation/manifests/bls/bls_employment_stats/v1.0.0/manifest.json"
/// );
/// ```
pub struct StorePaths;

impl StorePaths {
    /// Root directory of the manifest store.
    pub const MANIFEST_STORE: &'static str = "manifest_store";

    /// Root directory of the evidence store.
    pub const EVIDENCE_STORE: &'static str = "evidence_store";

    /// External drop zone for not-yet-ingested source files.
    pub const WILD: &'static str = "wild";

    /// Immutable raw envelope zone.
    pub const RAW: &'static str = "raw";

    /// Curated fact store.
    pub const FACT_STORE: &'static str = "fact_store";

    /// Semantic projection store.
    pub const SEMANTIC_STORE: &'static str = "semantic_store";

    /// Retrieval output store.
    pub const RETRIEVAL_STORE: &'static str = "retrieval_store";

    // =========================================================================
    // Manifest store paths
    // =========================================================================

    /// Directory holding every version of one manifest.
    #[must_use]
    pub fn manifest_dir(layer: Layer, agency: &str, manifest_id: &str) -> String {
        format!(
            "{}/{}/manifests/{agency}/{manifest_id}",
            Self::MANIFEST_STORE,
            layer.as_str()
        )
    }

    /// Immutable version record for a specific deployed version.
    #[must_use]
    pub fn manifest_version_record(
        layer: Layer,
        agency: &str,
        manifest_id: &str,
        version: &str,
    ) -> String {
        format!(
            "{}/v{version}/manifest.json",
            Self::manifest_dir(layer, agency, manifest_id)
        )
    }

    /// The one mutable artifact per manifest identity: the latest pointer.
    #[must_use]
    pub fn latest_pointer(layer: Layer, agency: &str, manifest_id: &str) -> String {
        format!("{}/_latest.json", Self::manifest_dir(layer, agency, manifest_id))
    }

    /// Listing prefix for all manifests deployed under a layer.
    #[must_use]
    pub fn layer_manifests_prefix(layer: Layer) -> String {
        format!("{}/{}/manifests/", Self::MANIFEST_STORE, layer.as_str())
    }

    /// A reference-data file deployed next to an agency's manifests.
    #[must_use]
    pub fn reference_data(layer: Layer, agency: &str, name: &str, version: &str) -> String {
        format!(
            "{}/{}/manifests/{agency}/reference_data/{name}_v{version}.json",
            Self::MANIFEST_STORE,
            layer.as_str()
        )
    }

    /// A data-model file deployed next to an agency's manifests.
    #[must_use]
    pub fn data_model(layer: Layer, agency: &str, name: &str) -> String {
        format!(
            "{}/{}/manifests/{agency}/data_model/{name}.json",
            Self::MANIFEST_STORE,
            layer.as_str()
        )
    }

    // =========================================================================
    // Evidence store paths
    // =========================================================================

    /// A named record file inside the evidence store.
    #[must_use]
    pub fn evidence_record(filename: &str) -> String {
        format!("{}/{filename}", Self::EVIDENCE_STORE)
    }

    /// Listing prefix for all evidence records.
    #[must_use]
    pub fn evidence_prefix() -> String {
        format!("{}/", Self::EVIDENCE_STORE)
    }

    /// Sequence counter file for one evidence record type.
    #[must_use]
    pub fn evidence_seq(record_type: &str) -> String {
        format!("{}/.seq_{record_type}.json", Self::EVIDENCE_STORE)
    }

    // =========================================================================
    // Storage plane paths
    // =========================================================================

    /// A file in the wild drop zone.
    #[must_use]
    pub fn wild_file(relative: &str) -> String {
        format!("{}/{relative}", Self::WILD)
    }

    /// Raw envelope directory for an agency.
    #[must_use]
    pub fn raw_dir(agency: &str) -> String {
        format!("{}/{agency}", Self::RAW)
    }

    /// Sequence counter for raw envelope naming.
    #[must_use]
    pub fn raw_seq() -> String {
        format!("{}/.seq.json", Self::RAW)
    }

    /// Fact store directory for an agency.
    #[must_use]
    pub fn fact_dir(agency: &str) -> String {
        format!("{}/{agency}", Self::FACT_STORE)
    }

    /// Sequence counter for fact naming.
    #[must_use]
    pub fn fact_seq() -> String {
        format!("{}/.seq.json", Self::FACT_STORE)
    }

    /// Semantic store directory for a domain.
    #[must_use]
    pub fn semantic_dir(domain: &str) -> String {
        format!("{}/{domain}", Self::SEMANTIC_STORE)
    }

    /// Sequence counter for semantic projection naming.
    #[must_use]
    pub fn semantic_seq() -> String {
        format!("{}/.seq.json", Self::SEMANTIC_STORE)
    }

    /// Retrieval output directory.
    #[must_use]
    pub fn retrieval_dir() -> String {
        Self::RETRIEVAL_STORE.to_string()
    }

    /// Sequence counter for retrieval output naming.
    #[must_use]
    pub fn retrieval_seq() -> String {
        format!("{}/.seq.json", Self::RETRIEVAL_STORE)
    }
}
