//! Concatenation of result chunks.
//!
//! finemap coalesce --input-dir ... --output ...

use std::path::Path;

use anyhow::Result;
use clap::Args;

use finemap_core::postprocess::coalesce;

#[derive(Args)]
pub struct CoalesceArgs {
    /// Directory holding the chunks
    #[arg(long)]
    input_dir: String,

    /// File name suffix selecting the chunks
    #[arg(long, default_value = ".finemapped.tsv")]
    pattern: String,

    /// Output table
    #[arg(long)]
    output: String,
}

pub fn run(args: CoalesceArgs) -> Result<()> {
    let summary = coalesce(
        Path::new(&args.input_dir),
        &args.pattern,
        Path::new(&args.output),
    )?;
    println!(
        "Coalesced {} files ({} rows) into {}",
        summary.files, summary.rows_out, args.output
    );
    Ok(())
}
