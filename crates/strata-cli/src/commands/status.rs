//! `strata status` - show the evidence record for a UTID.

use anyhow::Result;
use clap::Args;

use strata_core::Utid;

use crate::Config;

/// Arguments for `strata status`.
#[derive(Debug, Args)]
pub struct StatusArgs {
    /// UTID to inspect.
    pub utid: Utid,
}

/// Executes the status command.
///
/// # Errors
///
/// Fails when no evidence record exists for the UTID.
pub async fn execute(args: StatusArgs, config: &Config) -> Result<()> {
    let orchestrator = config.orchestrator();
    let record = orchestrator
        .ledger()
        .read(args.utid)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no evidence record for {}", args.utid))?;

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
