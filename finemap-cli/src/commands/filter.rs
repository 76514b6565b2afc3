//! Result filtering.
//!
//! finemap filter --input ... --strategy naive --output ...

use std::path::Path;

use anyhow::Result;
use clap::Args;
use tracing::info;

use finemap_core::postprocess::{filter_results, FilterStrategy};

#[derive(Args)]
pub struct FilterArgs {
    /// Primary result tables (concatenated; headers must match)
    #[arg(long, num_args = 1.., required = true)]
    input: Vec<String>,

    /// no-filter or naive (pip > 0.9)
    #[arg(long, default_value = "naive")]
    strategy: String,

    /// Output table
    #[arg(long)]
    output: String,
}

pub fn run(args: FilterArgs) -> Result<()> {
    info!("=== Result filtering ===");

    let strategy = match args.strategy.as_str() {
        "no-filter" => FilterStrategy::NoFilter,
        "naive" => FilterStrategy::Naive,
        other => anyhow::bail!("Unknown filter strategy: {} (expected no-filter or naive)", other),
    };
    let summary = filter_results(&args.input, strategy, Path::new(&args.output))?;
    println!(
        "{} of {} rows kept from {} files",
        summary.rows_out, summary.rows_in, summary.files
    );
    Ok(())
}
