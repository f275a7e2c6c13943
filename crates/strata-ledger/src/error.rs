//! Error types for ledger operations.

use thiserror::Error;

use strata_core::Utid;

/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors that can occur during evidence ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// No evidence record exists for the given UTID.
    #[error("no evidence record for {utid}")]
    RecordNotFound {
        /// The UTID that was looked up.
        utid: Utid,
    },

    /// A stored record could not be decoded.
    #[error("corrupt evidence record {path}: {message}")]
    CorruptRecord {
        /// Path of the offending file.
        path: String,
        /// Description of the decode failure.
        message: String,
    },

    /// Serialization of an outgoing record failed.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the failure.
        message: String,
    },

    /// Underlying infrastructure failure.
    #[error(transparent)]
    Core(#[from] strata_core::Error),
}
