//! `strata list` - list deployed manifests, or the full version history of
//! one manifest.

use anyhow::Result;
use clap::Args;

use crate::Config;

/// Arguments for `strata list`.
#[derive(Debug, Args)]
pub struct ListArgs {
    /// Show the version history of this manifest instead of the overview.
    #[arg(long)]
    pub manifest: Option<String>,

    /// Include deployment evidence records.
    #[arg(long)]
    pub deployments: bool,
}

/// Executes the list command.
///
/// # Errors
///
/// Fails only on storage errors.
pub async fn execute(args: ListArgs, config: &Config) -> Result<()> {
    let orchestrator = config.orchestrator();
    let store = orchestrator.store();

    if let Some(manifest_id) = &args.manifest {
        let versions = store.list_versions(manifest_id).await?;
        if versions.is_empty() {
            println!("no deployed versions for '{manifest_id}'");
        }
        for version in versions {
            println!(
                "{manifest_id} v{} deployed {} hash {} previous {}",
                version.version,
                version.deployed_at.to_rfc3339(),
                version.content_hash,
                version.previous_version.as_deref().unwrap_or("-"),
            );
        }
    } else {
        let summaries = store.list_deployed().await?;
        if summaries.is_empty() {
            println!("no manifests deployed");
        }
        for summary in summaries {
            println!(
                "{} latest v{} ({} versions: {:?})",
                summary.manifest_id,
                summary.version,
                summary.all_versions.len(),
                summary.all_versions,
            );
        }
    }

    if args.deployments {
        let ledger = orchestrator.ledger();
        for record in ledger.list_deployments(args.manifest.as_deref()).await? {
            println!(
                "{} {} v{} {} at {}{}",
                record.deployment_id,
                record.manifest_id,
                record.manifest_version,
                record.status,
                record.deployed_at.to_rfc3339(),
                if record.forced { " [FORCED]" } else { "" },
            );
        }
    }
    Ok(())
}
