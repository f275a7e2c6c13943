//! `strata deploy` - deploy a manifest file to the manifest store.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use strata_core::Layer;
use strata_manifest::{DeployStatus, ManifestFormat, parse_document};

use crate::Config;

/// Arguments for `strata deploy`.
#[derive(Debug, Args)]
pub struct DeployArgs {
    /// Path to the manifest file (.json, .yaml, .yml).
    pub file: PathBuf,

    /// Layer to deploy under.
    #[arg(long, default_value = "curation")]
    pub layer: Layer,

    /// Agency to deploy under (defaults to the manifest's identity.agency).
    #[arg(long)]
    pub agency: Option<String>,

    /// Override a governance violation (same version, different content).
    /// Loud by design: logged and flagged in the deployment evidence.
    #[arg(long)]
    pub force: bool,
}

/// Executes the deploy command.
///
/// # Errors
///
/// Fails on unreadable files, malformed manifests, and governance
/// violations.
pub async fn execute(args: DeployArgs, config: &Config) -> Result<()> {
    let text = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let format = args
        .file
        .extension()
        .and_then(|e| e.to_str())
        .map_or(ManifestFormat::Json, ManifestFormat::from_extension);

    let manifest = parse_document(&text, format)?;
    let agency = args
        .agency
        .clone()
        .unwrap_or_else(|| manifest.identity.agency.clone());
    anyhow::ensure!(!agency.is_empty(), "no agency given and none in the manifest");

    let orchestrator = config.orchestrator();
    let outcome = orchestrator
        .deploy(
            &manifest,
            args.layer,
            &agency,
            args.force,
            args.file.to_str(),
        )
        .await?;

    match outcome.status {
        DeployStatus::Deployed => {
            println!(
                "DEPLOYED {} v{} (hash {}, latest: {}{})",
                outcome.manifest_id,
                outcome.version,
                outcome.content_hash,
                outcome.is_latest,
                if outcome.forced { ", FORCED" } else { "" },
            );
        }
        DeployStatus::Skipped => {
            println!(
                "SKIPPED {} v{} (already deployed with identical content)",
                outcome.manifest_id, outcome.version
            );
        }
    }
    Ok(())
}
