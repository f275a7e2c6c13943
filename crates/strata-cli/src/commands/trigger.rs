//! `strata trigger` - trigger execution of a deployed manifest.

use anyhow::Result;
use clap::Args;

use strata_core::Layer;
use strata_ledger::ExecutionStatus;
use strata_runtime::PipelineResult;

use crate::Config;

/// Arguments for `strata trigger`.
#[derive(Debug, Args)]
pub struct TriggerArgs {
    /// The manifest to execute.
    pub manifest_id: String,

    /// Pin a specific deployed version (defaults to latest).
    #[arg(long)]
    pub version: Option<String>,

    /// Layer to execute under.
    #[arg(long, default_value = "curation")]
    pub layer: Layer,
}

/// Executes the trigger command.
///
/// # Errors
///
/// Fails when the manifest is not deployed or the engine is unknown;
/// pipeline failures are reported via the exit message, not an error.
pub async fn execute(args: TriggerArgs, config: &Config) -> Result<()> {
    let orchestrator = config.orchestrator();

    let result = match args.layer {
        Layer::Curation => {
            orchestrator
                .run_curation(&args.manifest_id, args.version.as_deref())
                .await?
        }
        Layer::Semantics => {
            orchestrator
                .run_semantic(&args.manifest_id, args.version.as_deref())
                .await?
        }
        Layer::Retrieval => {
            orchestrator
                .run_retrieval(&args.manifest_id, args.version.as_deref())
                .await?
        }
    };

    print_result(&result);
    if result.status == ExecutionStatus::Failure {
        anyhow::bail!("execution failed: {}", result.error.unwrap_or_default());
    }
    Ok(())
}

pub(crate) fn print_result(result: &PipelineResult) {
    println!("UTID:     {}", result.utid);
    println!("Manifest: {}", result.manifest_id);
    println!("Status:   {}", result.status.as_str());
    if let Some(bom) = &result.bom {
        println!("Components:");
        for component in &bom.components_used {
            println!("  [{}] {} v{}", component.step, component.path, component.version);
        }
    }
    if let Some(output) = &result.output_path {
        println!("Output:   {output}");
    }
    if let Some(error) = &result.error {
        println!("Error:    {error}");
    }
}
