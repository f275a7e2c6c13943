//! Typed manifest shape shared by every schema version.
//!
//! All schema parsers unwrap their wire format into this one logical shape,
//! so the store, the resolver, and the interpreters never see raw documents.
//! Layer-specific intent blocks (curation ingestion/processing, semantic
//! source/projection, retrieval fan-in/synthesis) are all optional fields of
//! [`Intent`]; each interpreter demands the blocks its layer requires.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A deployed or deployable pipeline manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Stable naming and ownership.
    pub identity: Identity,
    /// Versioning of the document, its schema, its data, and its engine.
    pub evolution: Evolution,
    /// What the pipeline does, declaratively.
    #[serde(default)]
    pub intent: Intent,
    /// External lookup tables, resolved relative to the deployed location.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub reference_data: BTreeMap<String, ResourceRef>,
    /// Column-level quality rules, resolved relative to the deployed location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_model: Option<ResourceRef>,
    /// Retention and classification policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub governance: Option<Governance>,
}

impl Manifest {
    /// The manifest identifier (its identity name).
    #[must_use]
    pub fn manifest_id(&self) -> &str {
        &self.identity.name
    }

    /// The manifest content version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.evolution.manifest_version
    }
}

/// Stable identity block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// Manifest identifier, unique within a (layer, agency) scope.
    pub name: String,
    /// Business domain the output belongs to.
    #[serde(default)]
    pub domain: String,
    /// Source agency (bls, census, ...).
    #[serde(default)]
    pub agency: String,
    /// Owning team.
    #[serde(default)]
    pub owner: String,
}

/// Evolution block: every version axis of the document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evolution {
    /// Semantic version of this document's content.
    pub manifest_version: String,
    /// Version of the document's own shape; the major selects the parser.
    #[serde(default = "default_version")]
    pub manifest_schema_version: String,
    /// Version of the data contract the pipeline produces.
    #[serde(default = "default_version")]
    pub data_schema_version: String,
    /// Execution engine the pipeline is declared for.
    #[serde(default = "default_engine")]
    pub engine: String,
    /// Version of that engine.
    #[serde(default = "default_version")]
    pub engine_version: String,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_engine() -> String {
    "local".to_string()
}

/// Declarative description of the pipeline's work.
///
/// Which blocks are present depends on the layer; the interpreters enforce
/// their layer's requirements at hydration time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Intent {
    /// Curation: the ingestion component that moves wild data into raw.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingestion: Option<IngestionSpec>,
    /// Curation: ordered processing steps; order is a correctness dependency.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub processing: Vec<ProcessingStep>,
    /// Semantics: the upstream curation manifest to bind to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceBinding>,
    /// Semantics: the projection component and its mapping rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<ProjectionSpec>,
    /// Retrieval: the semantic projections to fan in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<FanInSources>,
    /// Retrieval: the join component producing the final output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesis: Option<SynthesisSpec>,
}

/// Declarative pointer to an executable component.
///
/// Carried inside manifest intent blocks and resolved at execution time;
/// never persisted resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRef {
    /// Dotted path, either engine-relative (`v1.csv_parser.run`) or fully
    /// qualified.
    pub path: String,
    /// The component version the manifest expects to execute.
    pub version: String,
}

/// Ingestion block of a curation manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionSpec {
    /// The ingestion component.
    pub component: ComponentRef,
    /// Component parameters (source location, target zone, ...).
    #[serde(default)]
    pub params: Map<String, Value>,
}

/// One named processing step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingStep {
    /// Step name, used in the BOM and execution log.
    pub step: String,
    /// The component executing this step.
    pub component: ComponentRef,
    /// Step parameters.
    #[serde(default)]
    pub params: Map<String, Value>,
}

/// Reference to an upstream manifest's output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceBinding {
    /// The upstream manifest identifier.
    pub manifest_ref: String,
}

/// Projection block of a semantic manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionSpec {
    /// The mapping component.
    pub component: ComponentRef,
    /// Declarative field-to-concept mapping rules.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mapping: Vec<MappingRule>,
    /// Semantic context attached to every projected record.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub context: Map<String, Value>,
}

/// One field-to-concept mapping rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingRule {
    /// Physical field name in the source fact.
    pub source_key: String,
    /// Semantic concept it projects to.
    pub target_concept: String,
}

/// Fan-in block of a retrieval manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanInSources {
    /// The primary semantic source.
    pub primary: SourceBinding,
    /// Optional secondary semantic source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<SourceBinding>,
}

/// Synthesis block of a retrieval manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisSpec {
    /// The join component.
    pub component: ComponentRef,
    /// Join parameters (join key, join type, ...).
    #[serde(default)]
    pub params: Map<String, Value>,
}

/// External resource reference (reference data, data model).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRef {
    /// Resource path, relative to the manifest's deployed location.
    pub path: String,
    /// Resource version.
    pub version: String,
}

/// Governance policy block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Governance {
    /// Retention window in days.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Data classification (public, internal, confidential).
    #[serde(default = "default_classification")]
    pub classification: String,
}

fn default_retention_days() -> u32 {
    365
}

fn default_classification() -> String {
    "internal".to_string()
}
