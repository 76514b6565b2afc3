//! Fine-mapping run.
//!
//! finemap run --loci ... --reference ... --sumstats-dir ... --ld-source ...
//!     --ld-path ... --output-prefix ...

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Args;
use tracing::info;

use finemap_core::ld::{
    LdMatrixBuilder, LdSource, MatrixStore, MatrixStoreSource, PanelLdSource, RhoTableSource,
};
use finemap_core::output::{write_diagnostics, write_failed, write_records, OutputPaths};
use finemap_core::susie::SusieRss;
use finemap_core::{Engine, EngineConfig};
use finemap_io::plink::PlinkPanel;
use finemap_io::{read_loci, StatsDirectory, VariantReference};

#[derive(Args)]
pub struct RunArgs {
    /// Locus definition files (concatenated)
    #[arg(long, num_args = 1.., required = true)]
    loci: Vec<String>,

    /// Variant reference table
    #[arg(long)]
    reference: String,

    /// Directory of per-phenotype summary statistic tables
    #[arg(long)]
    sumstats_dir: String,

    /// LD provider: plink, rho-table or matrix-store
    #[arg(long)]
    ld_source: String,

    /// PLINK prefix, rho table file or matrix store directory
    #[arg(long)]
    ld_path: String,

    /// Output file prefix
    #[arg(long)]
    output_prefix: String,

    /// JSON engine configuration; flags below override it
    #[arg(long)]
    config: Option<String>,

    /// Maximum heterogeneity (iSquared) for a variant to be fitted
    #[arg(long)]
    max_i_squared: Option<f64>,

    /// Minimum sample size as a proportion of the largest in the window
    #[arg(long)]
    min_sample_size_proportion: Option<f64>,

    /// Fit the raw effect sizes instead of sample-size-normalized ones
    #[arg(long)]
    no_normalize: bool,

    /// Candidate credible-set counts, tried in order (e.g. 10,5,1)
    #[arg(long, value_delimiter = ',')]
    l_candidates: Option<Vec<usize>>,

    /// Per-fit time limit in seconds
    #[arg(long)]
    fit_timeout_secs: Option<f64>,

    /// Align and report without fitting
    #[arg(long)]
    dry_run: bool,
}

fn engine_config(args: &RunArgs) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_json_file(Path::new(path))?,
        None => EngineConfig::default(),
    };
    if let Some(v) = args.max_i_squared {
        config.max_i_squared = v;
    }
    if let Some(v) = args.min_sample_size_proportion {
        config.min_sample_size_proportion = v;
    }
    if args.no_normalize {
        config.normalize = false;
    }
    if let Some(ref l) = args.l_candidates {
        config.l_candidates = l.clone();
    }
    if args.fit_timeout_secs.is_some() {
        config.fit_timeout_secs = args.fit_timeout_secs;
    }
    if args.dry_run {
        config.dry_run = true;
    }
    config.validate()?;
    Ok(config)
}

fn ld_source<'a>(
    kind: &str,
    path: &str,
    reference: &'a VariantReference,
) -> Result<Box<dyn LdSource + 'a>> {
    let source: Box<dyn LdSource + 'a> = match kind {
        "plink" => Box::new(PanelLdSource::new(PlinkPanel::new(path)?, reference)),
        "rho-table" => Box::new(RhoTableSource::new(Path::new(path))?),
        "matrix-store" => Box::new(MatrixStoreSource::new(MatrixStore::open(Path::new(path))?)),
        _ => bail!(
            "Unknown LD source: {} (expected plink, rho-table or matrix-store)",
            kind
        ),
    };
    Ok(source)
}

pub fn run(args: RunArgs) -> Result<()> {
    info!("=== Locus fine-mapping ===");

    let config = engine_config(&args)?;
    info!(
        "L candidates {:?}, maxISquared {}, minSampleSizeProportion {}, normalize {}",
        config.l_candidates,
        config.max_i_squared,
        config.min_sample_size_proportion,
        config.normalize
    );

    let loci = read_loci(&args.loci)?;
    let reference = VariantReference::from_file(&args.reference)
        .with_context(|| format!("Failed to load variant reference {}", args.reference))?;
    let stats = StatsDirectory::new(&args.sumstats_dir)?;
    info!(
        "{} loci, {} reference variants",
        loci.len(),
        reference.len()
    );

    let source = ld_source(&args.ld_source, &args.ld_path, &reference)?;
    let builder = LdMatrixBuilder::new(source).with_eigenvalue_check(config.check_ld_eigenvalues);
    let fitter = SusieRss::new(config.susie.clone());
    let engine = Engine::new(&config, &reference, &stats, &builder, &fitter);
    let output = engine.run(&loci)?;

    let paths = OutputPaths::from_prefix(&args.output_prefix);
    write_records(&paths.records, &output.records, config.max_l())?;
    write_diagnostics(&paths.diagnostics, &output.diagnostics)?;
    write_failed(&paths.failed, &output.diagnostics)?;

    info!("Results written to {}", paths.records.display());
    info!(
        "{} of {} units in {}",
        output.failed().count(),
        output.diagnostics.len(),
        paths.failed.display()
    );
    Ok(())
}
