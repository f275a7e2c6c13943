//! Error types for manifest parsing and store operations.

use thiserror::Error;

/// Result type alias for manifest operations.
pub type Result<T> = std::result::Result<T, ManifestError>;

/// Errors that can occur during manifest parsing and deployment.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Same version number, different content. The caller must bump the
    /// manifest version; this is never auto-resolved.
    #[error(
        "governance violation: manifest '{manifest_id}' v{version} already deployed with \
         different content (hash mismatch: {existing_hash} != {new_hash}); \
         increment manifest_version to deploy changes"
    )]
    GovernanceViolation {
        /// The manifest identity.
        manifest_id: String,
        /// The version under which the conflict occurred.
        version: String,
        /// Hash of the already-deployed content.
        existing_hash: String,
        /// Hash of the content that was rejected.
        new_hash: String,
    },

    /// The referenced manifest (or version) has not been deployed.
    #[error(
        "manifest '{manifest_id}' {requested} not deployed; available versions: {available:?}"
    )]
    NotDeployed {
        /// The manifest identity that was looked up.
        manifest_id: String,
        /// The requested version, or `"latest"` when none was pinned.
        requested: String,
        /// Versions that are actually deployed, for operator diagnosis.
        available: Vec<String>,
    },

    /// The document declares a schema version this parser cannot interpret.
    #[error(
        "schema incompatible: manifest declares manifest_schema_version {declared}, \
         parser handles major version {parser_major}"
    )]
    SchemaIncompatible {
        /// The schema version declared by the document.
        declared: String,
        /// The major version the selected parser implements.
        parser_major: u64,
    },

    /// No parser is registered for the declared schema major version.
    #[error("no manifest parser registered for schema major version {major}")]
    UnknownSchemaMajor {
        /// The unsupported major version.
        major: u64,
    },

    /// A required manifest field is missing or empty.
    #[error("manifest is missing required field: {field}")]
    MissingField {
        /// Dotted path of the missing field.
        field: String,
    },

    /// The raw document could not be decoded.
    #[error("malformed manifest document: {message}")]
    Malformed {
        /// Description of the decode failure.
        message: String,
    },

    /// Underlying infrastructure failure.
    #[error(transparent)]
    Core(#[from] strata_core::Error),
}
