//! `strata replay` - re-execute a manifest from its historical raw
//! artifact instead of re-ingesting from the wild.

use anyhow::Result;
use clap::Args;

use strata_core::Utid;
use strata_ledger::ExecutionStatus;

use crate::Config;
use crate::commands::trigger::print_result;

/// Arguments for `strata replay`.
#[derive(Debug, Args)]
pub struct ReplayArgs {
    /// UTID of the original execution to replay.
    pub utid: Option<Utid>,

    /// Replay by manifest version instead: the earliest successful
    /// non-replay execution of this manifest is used as the source.
    #[arg(long, requires = "version")]
    pub manifest: Option<String>,

    /// Manifest version (with --manifest).
    #[arg(long)]
    pub version: Option<String>,
}

/// Executes the replay command.
///
/// # Errors
///
/// Fails when neither a UTID nor a manifest/version pair is given, or when
/// the original execution cannot be found.
pub async fn execute(args: ReplayArgs, config: &Config) -> Result<()> {
    let orchestrator = config.orchestrator();

    let result = match (args.utid, args.manifest.as_deref()) {
        (Some(utid), _) => orchestrator.replay_by_utid(utid).await?,
        (None, Some(manifest_id)) => {
            let version = args
                .version
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("--version is required with --manifest"))?;
            orchestrator.replay_by_version(manifest_id, version).await?
        }
        (None, None) => {
            anyhow::bail!("pass a UTID, or --manifest with --version");
        }
    };

    print_result(&result);
    if result.status == ExecutionStatus::Failure {
        anyhow::bail!("replay failed: {}", result.error.unwrap_or_default());
    }
    Ok(())
}
