//! # strata-manifest
//!
//! The versioned, governance-enforcing manifest subsystem.
//!
//! A manifest is a declarative document describing a pipeline: who owns it
//! (`identity`), how it evolves (`evolution`), and what it does (`intent`).
//! This crate provides:
//!
//! - **Model**: the typed manifest shape shared by every schema version
//! - **Parsers**: one parser per manifest schema major version, selected at
//!   hydration time so new schema shapes never break old manifests
//! - **Store**: the single source of truth for deployed manifest content,
//!   holding every version ever deployed, immutably
//!
//! ## Governance invariants
//!
//! - A (manifest id, version) pair maps to exactly one content hash, forever.
//!   Deploying different content under a deployed version is a
//!   [`ManifestError::GovernanceViolation`], never a silent overwrite.
//! - Version records are never mutated or deleted; the store is a museum of
//!   every version ever deployed.
//! - The latest pointer is the only mutable artifact and only ever moves to
//!   a higher version under loose semantic-version ordering.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod model;
pub mod parser;
pub mod store;

pub use error::{ManifestError, Result};
pub use model::{
    ComponentRef, Evolution, FanInSources, Governance, Identity, IngestionSpec, Intent, Manifest,
    MappingRule, ProcessingStep, ProjectionSpec, ResourceRef, SourceBinding, SynthesisSpec,
};
pub use parser::{ManifestFormat, ManifestParser, parse_document, parser_for_major};
pub use store::{
    DeployOutcome, DeployStatus, DeployedSummary, LatestPointer, ManifestStore,
    ManifestVersionRecord, VersionSummary,
};
