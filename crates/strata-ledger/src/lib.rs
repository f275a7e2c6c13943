//! # strata-ledger
//!
//! The append-only evidence and lineage ledger.
//!
//! Every execution attempt, and every deployment, leaves a record here,
//! keyed by UTID, from the moment intent is declared (`QUEUED`) to its
//! terminal state (`SUCCESS` or `FAILURE`). Records are mutated in place by
//! UTID across their lifetime but never deleted, and the file name is
//! assigned exactly once via a per-type sequence counter, which keeps the
//! ledger human-browsable in creation order:
//!
//! ```text
//! evidence_store/
//! ├── curation_0001_bls_employment_stats_v1.0.0.json
//! ├── semantic_0001_bls_employment_ontology_v1.0.0.json
//! ├── retrieval_0001_economic_outlook_v1.0.0.json
//! └── deploy_0001_bls_employment_stats_v1.0.0.json
//! ```
//!
//! The read side reconstructs full lineage from any UTID: retrieval records
//! fan out to their semantic parents, semantic records to their curation
//! parent, and curation records are the leaves holding the source-file
//! breadcrumbs. A trace is verified iff the union of document ids collected
//! across the walk is non-empty ("Trace Everything").

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod record;
pub mod store;
pub mod trace;

pub use error::{LedgerError, Result};
pub use record::{
    Bom, BomComponent, BomLogEntry, ComponentRun, EvidenceRecord, ExecutionStatus, RecordType,
};
pub use store::{
    DeploymentEvidence, DeploymentRecord, EvidenceLedger, RetrievalEvidence, SemanticEvidence,
    StatusUpdate,
};
pub use trace::{TraceNode, TraceReport};
