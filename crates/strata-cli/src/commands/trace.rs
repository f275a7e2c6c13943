//! `strata trace` - reconstruct the full lineage chain from any UTID back
//! to its source document(s).

use anyhow::Result;
use clap::Args;

use strata_core::Utid;
use strata_ledger::{RecordType, TraceNode};

use crate::Config;

/// Arguments for `strata trace`.
#[derive(Debug, Args)]
pub struct TraceArgs {
    /// UTID to trace.
    pub utid: Option<Utid>,

    /// Trace the most recent execution instead, optionally filtered by
    /// record type (curation, semantic, retrieval).
    #[arg(long, value_name = "TYPE", num_args = 0..=1, default_missing_value = "any")]
    pub latest: Option<String>,
}

/// Executes the trace command.
///
/// # Errors
///
/// Fails when no UTID is given and no matching record exists.
pub async fn execute(args: TraceArgs, config: &Config) -> Result<()> {
    let orchestrator = config.orchestrator();
    let ledger = orchestrator.ledger();

    let utid = match (args.utid, args.latest.as_deref()) {
        (Some(utid), _) => utid,
        (None, Some(filter)) => {
            let record_type = match filter {
                "any" => None,
                "curation" => Some(RecordType::Curation),
                "semantic" | "semantics" => Some(RecordType::Semantic),
                "retrieval" => Some(RecordType::Retrieval),
                other => anyhow::bail!("unknown record type: {other}"),
            };
            ledger
                .find_latest(record_type)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no matching evidence record found"))?
                .utid
        }
        (None, None) => anyhow::bail!("pass a UTID or --latest"),
    };

    let report = ledger.trace(utid).await?;

    println!("LINEAGE CHAIN for {utid}");
    print_node(&report.root, 0);

    for warning in &report.warnings {
        println!("! {warning}");
    }
    if report.verified {
        let doc_ids: Vec<&String> = report.doc_ids.iter().collect();
        println!("TRACE VERIFIED - source document(s): {doc_ids:?}");
    } else {
        println!("TRACE UNVERIFIED - no doc_id found in lineage chain");
    }
    Ok(())
}

fn print_node(node: &TraceNode, indent: usize) {
    let pad = "  ".repeat(indent);
    match node {
        TraceNode::Curation {
            utid,
            doc_id,
            manifest_id,
            manifest_version,
            status,
            wild_source,
            raw_doc,
        } => {
            println!("{pad}CURATION {manifest_id} v{manifest_version} [{}]", status.as_str());
            println!("{pad}  utid:   {utid}");
            println!("{pad}  doc_id: {}", doc_id.as_deref().unwrap_or("unknown"));
            println!("{pad}  wild:   {}", wild_source.as_deref().unwrap_or("unknown"));
            println!("{pad}  raw:    {}", raw_doc.as_deref().unwrap_or("unknown"));
        }
        TraceNode::Semantic {
            utid,
            doc_id,
            manifest_id,
            manifest_version,
            status,
            upstream,
            ..
        } => {
            println!("{pad}SEMANTIC {manifest_id} v{manifest_version} [{}]", status.as_str());
            println!("{pad}  utid:   {utid}");
            println!("{pad}  doc_id: {}", doc_id.as_deref().unwrap_or("unknown"));
            if let Some(upstream) = upstream {
                print_node(upstream, indent + 1);
            }
        }
        TraceNode::Retrieval {
            utid,
            doc_ids,
            manifest_id,
            manifest_version,
            status,
            upstreams,
            ..
        } => {
            println!("{pad}RETRIEVAL {manifest_id} v{manifest_version} [{}]", status.as_str());
            println!("{pad}  utid:    {utid}");
            println!("{pad}  doc_ids: {doc_ids:?}");
            for upstream in upstreams {
                print_node(upstream, indent + 1);
            }
        }
    }
}
