//! The component contract.
//!
//! A component is an executable unit behind a declarative [`ComponentRef`]:
//! it is invoked with the run's shared context and its manifest-declared
//! parameters, mutates the context in place to publish outputs, and returns
//! a structured outcome. Every component exposes self-describing identity
//! metadata (version and interface tag) which the resolver checks against
//! the manifest at execution time. Registration is the compile-time
//! governance gate; the version comparison stays dynamic because the
//! requested version comes from data, not code.
//!
//! [`ComponentRef`]: strata_manifest::ComponentRef

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::context::ExecutionContext;
use crate::error::Result;

/// Self-describing identity metadata of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentDescriptor {
    /// The version this component implementation declares.
    pub version: &'static str,
    /// Interface tag naming the protocol the component implements
    /// (`strata.interfaces.ingest.v1`, ...). Documentation and governance
    /// only; never used for dynamic dispatch.
    pub interface: &'static str,
}

/// Structured result of one component invocation.
///
/// Lineage breadcrumbs are explicit fields, never recovered by parsing the
/// summary string.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// Human-readable result line, recorded in the BOM execution log.
    pub summary: String,
    /// Source file consumed, for ingestion components.
    pub source_file: Option<String>,
    /// Artifact produced, for components that write a store file.
    pub produced_artifact: Option<String>,
}

impl StepOutcome {
    /// Creates an outcome with a summary only.
    #[must_use]
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            source_file: None,
            produced_artifact: None,
        }
    }

    /// Attaches structured lineage breadcrumbs.
    #[must_use]
    pub fn with_lineage(
        mut self,
        source_file: impl Into<String>,
        produced_artifact: impl Into<String>,
    ) -> Self {
        self.source_file = Some(source_file.into());
        self.produced_artifact = Some(produced_artifact.into());
        self
    }

    /// Attaches a produced artifact without a source file.
    #[must_use]
    pub fn with_artifact(mut self, produced_artifact: impl Into<String>) -> Self {
        self.produced_artifact = Some(produced_artifact.into());
        self
    }
}

/// Contract every executable unit satisfies.
#[async_trait]
pub trait Component: Send + Sync {
    /// Identity metadata checked by the resolver.
    fn descriptor(&self) -> ComponentDescriptor;

    /// Executes the component.
    ///
    /// Outputs for downstream steps are published by mutating `ctx`; the
    /// returned outcome feeds the BOM.
    ///
    /// # Errors
    ///
    /// Returns an error when the component cannot complete; the interpreter
    /// converts it into a terminal FAILURE evidence record.
    async fn invoke(
        &self,
        ctx: &mut ExecutionContext,
        params: &Map<String, Value>,
    ) -> Result<StepOutcome>;
}
