//! # strata-runtime
//!
//! The execution side of the control plane: the component contract, the
//! engine-aware runtime resolver, the orchestrator that mints UTIDs, and the
//! pipeline interpreters for the three execution layers.
//!
//! ## Control flow
//!
//! ```text
//! Orchestrator ──mint UTID──► Evidence Ledger (QUEUED)
//!      │
//!      └─dispatch─► Interpreter ──hydrate──► Manifest Store
//!                       │
//!                       ├── Runtime Resolver (per step)
//!                       └── Evidence Ledger (STARTED → SUCCESS | FAILURE + BOM)
//! ```
//!
//! The UTID is born in the orchestrator and never regenerated downstream;
//! the interpreter owns it end-to-end. Failures inside a STARTED pipeline
//! are results, not errors: the interpreter converts them into terminal
//! FAILURE evidence and returns a failure result instead of propagating.
//!
//! Components are resolved through an explicit registry populated at
//! startup, with no dynamic loading. Every registered component exposes
//! self-describing identity metadata (version + interface tag), and the
//! resolver enforces the manifest-requested version against it.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod component;
pub mod context;
pub mod engines;
pub mod envelope;
pub mod error;
pub mod interpreter;
pub mod orchestrator;
pub mod resolver;
pub mod retrieval;
pub mod semantic;

pub use component::{Component, ComponentDescriptor, StepOutcome};
pub use context::ExecutionContext;
pub use envelope::{ArtifactEnvelope, EnvelopeMetadata};
pub use error::{Result, RuntimeError};
pub use interpreter::{CurationInterpreter, PipelineResult};
pub use orchestrator::Orchestrator;
pub use resolver::{EngineRegistry, ResolvedComponent, RuntimeResolver};
pub use retrieval::RetrievalInterpreter;
pub use semantic::SemanticInterpreter;
