//! finemap-rs: locus fine-mapping with SuSiE on summary statistics.
//!
//! CLI entry point using clap for argument parsing.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "finemap",
    version,
    about = "Locus fine-mapping of per-gene summary statistics",
    long_about = "Clusters loci, builds one LD matrix per cluster, and fits SuSiE-RSS\n\
                  per gene with a fallback over candidate credible-set counts."
)]
struct Cli {
    /// Number of threads to use
    #[arg(long, default_value = "1", global = true)]
    threads: usize,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fine-map every gene of every locus
    Run(commands::run::RunArgs),

    /// Precompute one LD matrix per locus cluster from a PLINK panel
    LdMatrix(commands::ld_matrix::LdMatrixArgs),

    /// Filter result tables by posterior inclusion probability
    Filter(commands::filter::FilterArgs),

    /// Concatenate result chunks sharing one header
    Coalesce(commands::coalesce::CoalesceArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    rayon::ThreadPoolBuilder::new()
        .num_threads(cli.threads)
        .build_global()
        .ok();

    tracing::info!("finemap v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Using {} threads", cli.threads);

    match cli.command {
        Commands::Run(args) => commands::run::run(args),
        Commands::LdMatrix(args) => commands::ld_matrix::run(args),
        Commands::Filter(args) => commands::filter::run(args),
        Commands::Coalesce(args) => commands::coalesce::run(args),
    }
}
