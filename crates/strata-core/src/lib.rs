//! # strata-core
//!
//! Core abstractions for the Strata manifest-driven pipeline control plane.
//!
//! This crate provides the foundational types and traits used across all
//! Strata components:
//!
//! - **Identifiers**: Strongly-typed trace and document IDs (UTID, doc id)
//! - **Canonical JSON**: Deterministic serialization for content hashing
//! - **Version Ordering**: Loose semantic-version comparison for manifests
//! - **Storage Backend**: Conditional-write storage contract (memory + local fs)
//! - **Store Paths**: Single source of truth for the on-disk layout
//! - **Sequence Counter**: Persistent monotonic counters for artifact naming
//! - **Error Types**: Shared error definitions and result types
//!
//! ## Crate Boundary
//!
//! `strata-core` is the **only** crate allowed to define shared primitives.
//! The manifest store, evidence ledger, and runtime all build on the
//! contracts defined here; nothing in this crate knows about manifests,
//! evidence records, or components.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod canonical;
pub mod error;
pub mod id;
pub mod observability;
pub mod paths;
pub mod sequence;
pub mod storage;
pub mod version;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use strata_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::id::{DocId, Utid};
    pub use crate::paths::{Layer, StorePaths};
    pub use crate::sequence::SequenceCounter;
    pub use crate::storage::{
        LocalFsBackend, MemoryBackend, ObjectMeta, StorageBackend, WritePrecondition, WriteResult,
    };
}

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use id::{DocId, Utid};
pub use observability::{LogFormat, init_logging};
pub use paths::{Layer, StorePaths};
pub use sequence::SequenceCounter;
pub use storage::{
    LocalFsBackend, MemoryBackend, ObjectMeta, StorageBackend, WritePrecondition, WriteResult,
};
