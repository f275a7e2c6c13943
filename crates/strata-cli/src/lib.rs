//! # strata-cli
//!
//! Thin command-line front end over the Strata control plane: deploy
//! manifests, trigger and replay executions, trace lineage, and inspect
//! evidence. All real behavior lives in the library crates; the CLI only
//! parses arguments, wires up the stores, and prints results.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use strata_core::storage::{LocalFsBackend, StorageBackend};
use strata_ledger::EvidenceLedger;
use strata_manifest::ManifestStore;
use strata_runtime::engines::builtin_registry;
use strata_runtime::{EngineRegistry, Orchestrator};

/// The Strata control plane CLI.
#[derive(Debug, Parser)]
#[command(name = "strata", version, about = "Manifest-driven data pipeline control plane")]
pub struct Cli {
    /// Root directory of the local store (manifest store, evidence store,
    /// storage plane).
    #[arg(long, global = true, env = "STRATA_STORE_ROOT", default_value = "./store")]
    pub store_root: PathBuf,

    /// The command to run.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Builds the runtime configuration from the parsed arguments.
    #[must_use]
    pub fn config(&self) -> Config {
        Config {
            store_root: self.store_root.clone(),
        }
    }
}

/// Top-level commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Deploy a manifest file to the manifest store.
    Deploy(commands::deploy::DeployArgs),
    /// Trigger execution of a deployed manifest.
    Trigger(commands::trigger::TriggerArgs),
    /// Replay a historical execution from its immutable raw artifact.
    Replay(commands::replay::ReplayArgs),
    /// Reconstruct the full lineage chain from a UTID.
    Trace(commands::trace::TraceArgs),
    /// Show the evidence record for a UTID.
    Status(commands::status::StatusArgs),
    /// List deployed manifests or the versions of one manifest.
    List(commands::list::ListArgs),
}

/// Runtime configuration shared by all commands.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory of the local store.
    pub store_root: PathBuf,
}

impl Config {
    /// Wires up the full control plane over the local store root.
    #[must_use]
    pub fn orchestrator(&self) -> Orchestrator {
        let storage: Arc<dyn StorageBackend> =
            Arc::new(LocalFsBackend::new(self.store_root.clone()));
        let registry: Arc<EngineRegistry> = Arc::new(builtin_registry(&storage));
        let store = Arc::new(ManifestStore::new(Arc::clone(&storage)));
        let ledger = Arc::new(EvidenceLedger::new(Arc::clone(&storage)));
        Orchestrator::new(store, ledger, registry, storage)
    }
}
