//! Versioned manifest parsers.
//!
//! The manifest schema's own major version (`manifest_schema_version`)
//! selects which parser interprets the document. This indirection lets new
//! schema shapes ship without breaking manifests already deployed under an
//! older shape:
//!
//! - **V1**: bare JSON documents, blocks at the top level.
//! - **V2**: YAML-native with a `manifest:` wrapper key (JSON also accepted).
//!
//! Every parser validates the document's declared schema major against its
//! own and fails with [`ManifestError::SchemaIncompatible`] otherwise.

use serde_json::Value;

use strata_core::version;

use crate::error::{ManifestError, Result};
use crate::model::Manifest;

/// Wire format of a raw manifest document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    /// Plain JSON.
    Json,
    /// YAML (V2 documents).
    Yaml,
}

impl ManifestFormat {
    /// Guesses the format from a file extension.
    #[must_use]
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "yaml" | "yml" => Self::Yaml,
            _ => Self::Json,
        }
    }
}

/// Contract every schema-version parser satisfies.
///
/// A parser receives the decoded document and produces the shared logical
/// [`Manifest`] shape, validating schema compatibility and required fields
/// along the way.
pub trait ManifestParser: Send + Sync {
    /// The schema major version this parser implements.
    fn schema_major(&self) -> u64;

    /// Parses a decoded document into the logical manifest shape.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::SchemaIncompatible`] if the document declares
    /// a different schema major, or [`ManifestError::MissingField`] /
    /// [`ManifestError::Malformed`] if required content is absent.
    fn parse_value(&self, doc: &Value) -> Result<Manifest>;
}

/// V1 parser: bare JSON, no wrapper key.
pub struct ManifestParserV1;

impl ManifestParser for ManifestParserV1 {
    fn schema_major(&self) -> u64 {
        1
    }

    fn parse_value(&self, doc: &Value) -> Result<Manifest> {
        check_schema_major(doc, self.schema_major())?;
        decode(doc)
    }
}

/// V2 parser: documents carry a `manifest:` root wrapper (YAML-native).
///
/// Unwrapped documents are accepted for backward compatibility with tooling
/// that strips the wrapper before handing the document over.
pub struct ManifestParserV2;

impl ManifestParser for ManifestParserV2 {
    fn schema_major(&self) -> u64 {
        2
    }

    fn parse_value(&self, doc: &Value) -> Result<Manifest> {
        let inner = unwrap_v2(doc);
        check_schema_major(inner, self.schema_major())?;
        decode(inner)
    }
}

static PARSER_V1: ManifestParserV1 = ManifestParserV1;
static PARSER_V2: ManifestParserV2 = ManifestParserV2;

/// Returns the parser registered for a schema major version.
///
/// # Errors
///
/// Returns [`ManifestError::UnknownSchemaMajor`] when no parser handles the
/// requested major.
pub fn parser_for_major(major: u64) -> Result<&'static dyn ManifestParser> {
    match major {
        1 => Ok(&PARSER_V1),
        2 => Ok(&PARSER_V2),
        other => Err(ManifestError::UnknownSchemaMajor { major: other }),
    }
}

/// Decodes a raw manifest document, selecting the parser from the declared
/// schema version.
///
/// # Errors
///
/// Returns [`ManifestError::Malformed`] for undecodable text, and whatever
/// the selected parser returns for schema/content problems.
pub fn parse_document(text: &str, format: ManifestFormat) -> Result<Manifest> {
    let doc: Value = match format {
        ManifestFormat::Json => serde_json::from_str(text).map_err(|e| ManifestError::Malformed {
            message: format!("invalid JSON: {e}"),
        })?,
        ManifestFormat::Yaml => serde_yaml::from_str(text).map_err(|e| ManifestError::Malformed {
            message: format!("invalid YAML: {e}"),
        })?,
    };

    let major = declared_schema_major(&doc);
    parser_for_major(major)?.parse_value(&doc)
}

/// Reads the schema major a document declares, looking through the V2
/// wrapper if present. Documents that declare nothing default to major 1.
#[must_use]
pub fn declared_schema_major(doc: &Value) -> u64 {
    let inner = unwrap_v2(doc);
    inner
        .get("evolution")
        .and_then(|e| e.get("manifest_schema_version"))
        .and_then(Value::as_str)
        .and_then(version::major)
        .unwrap_or(1)
}

fn unwrap_v2(doc: &Value) -> &Value {
    doc.get("manifest").unwrap_or(doc)
}

fn check_schema_major(doc: &Value, expected: u64) -> Result<()> {
    let declared = doc
        .get("evolution")
        .and_then(|e| e.get("manifest_schema_version"))
        .and_then(Value::as_str)
        .unwrap_or("1.0.0");

    if version::major(declared) != Some(expected) {
        return Err(ManifestError::SchemaIncompatible {
            declared: declared.to_string(),
            parser_major: expected,
        });
    }
    Ok(())
}

fn decode(doc: &Value) -> Result<Manifest> {
    let manifest: Manifest =
        serde_json::from_value(doc.clone()).map_err(|e| ManifestError::Malformed {
            message: format!("manifest does not match the logical shape: {e}"),
        })?;

    if manifest.identity.name.trim().is_empty() {
        return Err(ManifestError::MissingField {
            field: "identity.name".to_string(),
        });
    }
    if manifest.evolution.manifest_version.trim().is_empty() {
        return Err(ManifestError::MissingField {
            field: "evolution.manifest_version".to_string(),
        });
    }
    Ok(manifest)
}
