//! Error types for resolution, orchestration, and pipeline execution.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors that can occur in the runtime subsystem.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The component address cannot be resolved: unknown engine, unknown
    /// path, or no component registered at the resolved address.
    #[error(
        "resolution failure: could not resolve '{path}' \
         (resolved: {resolved}, engine: {engine}): {reason}"
    )]
    ResolutionFailure {
        /// The path as written in the manifest.
        path: String,
        /// The fully qualified address it resolved to (or the path itself
        /// when expansion failed).
        resolved: String,
        /// The engine the resolution ran under.
        engine: String,
        /// Why the lookup failed.
        reason: String,
    },

    /// A registered unit is missing its identity metadata.
    #[error("governance failure: component '{path}' is missing identity metadata")]
    GovernanceFailure {
        /// The resolved component path.
        path: String,
    },

    /// The resolved component's declared version disagrees with what the
    /// manifest requested. Never silently substituted.
    #[error(
        "version mismatch: manifest requested {requested}, \
         but component at '{path}' declares version {declared}"
    )]
    VersionMismatch {
        /// The resolved component path.
        path: String,
        /// The version the manifest asked for.
        requested: String,
        /// The version the component declares.
        declared: String,
    },

    /// The manifest declares a different engine than the running
    /// interpreter. An interpreter must never silently execute a manifest
    /// declared for a different engine.
    #[error(
        "engine mismatch: manifest declares engine '{declared}', \
         but this is the '{interpreter}' interpreter"
    )]
    EngineMismatch {
        /// Engine the manifest declares.
        declared: String,
        /// Engine identity of the running interpreter.
        interpreter: String,
    },

    /// A component reported a failure during execution.
    #[error("component failed: {message}")]
    Component {
        /// The component's failure description.
        message: String,
    },

    /// A required execution input (context field, intent block) is absent.
    #[error("missing execution input: {0}")]
    MissingInput(String),

    /// Manifest subsystem failure (hydration, governance, schema).
    #[error(transparent)]
    Manifest(#[from] strata_manifest::ManifestError),

    /// Evidence ledger failure.
    #[error(transparent)]
    Ledger(#[from] strata_ledger::LedgerError),

    /// Infrastructure failure.
    #[error(transparent)]
    Core(#[from] strata_core::Error),
}

impl RuntimeError {
    /// Creates a component failure error.
    #[must_use]
    pub fn component(message: impl Into<String>) -> Self {
        Self::Component {
            message: message.into(),
        }
    }
}
