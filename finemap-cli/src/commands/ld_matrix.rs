//! LD matrix precomputation.
//!
//! finemap ld-matrix --loci ... --reference ... --plink ... --output-dir ...

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};

use finemap_core::cluster::cluster_loci;
use finemap_core::ld::{LdMatrixBuilder, MatrixStore, PanelLdSource};
use finemap_io::plink::PlinkPanel;
use finemap_io::{read_loci, GenotypeReader, VariantReference};

#[derive(Args)]
pub struct LdMatrixArgs {
    /// Locus definition files (concatenated)
    #[arg(long, num_args = 1.., required = true)]
    loci: Vec<String>,

    /// Variant reference table
    #[arg(long)]
    reference: String,

    /// PLINK file prefix
    #[arg(long)]
    plink: String,

    /// Matrix store directory (created if missing)
    #[arg(long)]
    output_dir: String,
}

pub fn run(args: LdMatrixArgs) -> Result<()> {
    info!("=== LD matrix precomputation ===");

    let loci = read_loci(&args.loci)?;
    let reference = VariantReference::from_file(&args.reference)
        .with_context(|| format!("Failed to load variant reference {}", args.reference))?;
    let panel = PlinkPanel::new(&args.plink)?;
    info!(
        "Panel: {} markers, {} samples",
        panel.n_markers(),
        panel.n_samples()
    );

    let store = MatrixStore::create(Path::new(&args.output_dir))?;
    let builder = LdMatrixBuilder::new(Box::new(PanelLdSource::new(panel, &reference)));

    let clusters = cluster_loci(&loci);
    let mut written = 0;
    for cluster in &clusters {
        let span = match reference.window(&cluster.chrom, cluster.start, cluster.end) {
            Ok(span) => span,
            Err(e) => {
                warn!(
                    "Cluster {} {}:{}-{}: {}",
                    cluster.id, cluster.chrom, cluster.start, cluster.end, e
                );
                continue;
            }
        };
        match builder.build_into_store(span, &store) {
            Ok(matrix) => {
                written += 1;
                info!(
                    "Cluster {} {}:{}-{}: {} variants",
                    cluster.id,
                    cluster.chrom,
                    cluster.start,
                    cluster.end,
                    matrix.len()
                );
            }
            Err(e) if e.is_unit_scoped() => {
                warn!(
                    "Cluster {} {}:{}-{}: {}",
                    cluster.id, cluster.chrom, cluster.start, cluster.end, e
                );
            }
            Err(e) => {
                return Err(anyhow::Error::new(e))
                    .with_context(|| format!("LD for cluster {}", cluster.id));
            }
        }
    }

    info!(
        "{} of {} cluster matrices written to {}",
        written,
        clusters.len(),
        args.output_dir
    );
    Ok(())
}
