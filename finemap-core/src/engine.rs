//! Driver over all clusters of one invocation.
//!
//! Clusters are processed one at a time. Each cluster resolves one LD
//! matrix over its span, and every gene in it is fitted against that
//! matrix. Unit-level problems are recorded and logged; only malformed
//! input or I/O failures abort the run.

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use finemap_io::{Locus, SummaryStatsStore, VariantReference};

use crate::assemble::{DiagnosticRow, FinemappingRecord, ResultAssembler};
use crate::cluster::{cluster_loci, LocusCluster};
use crate::config::EngineConfig;
use crate::ld::{LdError, LdMatrix, LdMatrixBuilder};
use crate::runner::{FineMappingRunner, UnitState};
use crate::stats::SummaryStatisticsExtractor;
use crate::susie::Fitter;

/// All rows produced by one invocation.
#[derive(Debug, Clone, Default)]
pub struct EngineOutput {
    pub records: Vec<FinemappingRecord>,
    pub diagnostics: Vec<DiagnosticRow>,
}

impl EngineOutput {
    pub fn failed(&self) -> impl Iterator<Item = &DiagnosticRow> {
        self.diagnostics.iter().filter(|d| d.is_failed())
    }
}

fn coordinates(locus: &Locus) -> String {
    format!(
        "{}:{}-{} gene={} cluster={}",
        locus.chrom, locus.start, locus.end, locus.gene, locus.cluster
    )
}

pub struct Engine<'a> {
    config: &'a EngineConfig,
    reference: &'a VariantReference,
    extractor: SummaryStatisticsExtractor<'a>,
    ld: &'a LdMatrixBuilder<'a>,
    runner: FineMappingRunner<'a>,
    assembler: ResultAssembler<'a>,
}

impl<'a> Engine<'a> {
    pub fn new(
        config: &'a EngineConfig,
        reference: &'a VariantReference,
        stats: &'a dyn SummaryStatsStore,
        ld: &'a LdMatrixBuilder<'a>,
        fitter: &'a dyn Fitter,
    ) -> Self {
        Self {
            config,
            reference,
            extractor: SummaryStatisticsExtractor::new(stats),
            ld,
            runner: FineMappingRunner::new(config, fitter),
            assembler: ResultAssembler::new(reference, config.max_l()),
        }
    }

    pub fn run(&self, loci: &[Locus]) -> Result<EngineOutput> {
        let clusters = cluster_loci(loci);
        info!(
            "{} loci in {} clusters, LD from {}",
            loci.len(),
            clusters.len(),
            self.ld.source_name()
        );

        let mut output = EngineOutput::default();
        for cluster in &clusters {
            self.run_cluster(cluster, &mut output)?;
        }

        let converged = output
            .diagnostics
            .iter()
            .filter(|d| d.status == UnitState::Converged)
            .count();
        info!(
            "Finished {} units: {} converged, {} in failed extract, {} rows",
            output.diagnostics.len(),
            converged,
            output.failed().count(),
            output.records.len()
        );
        Ok(output)
    }

    fn run_cluster(&self, cluster: &LocusCluster, output: &mut EngineOutput) -> Result<()> {
        let span = match self.reference.window(&cluster.chrom, cluster.start, cluster.end) {
            Ok(span) => span,
            Err(e) => {
                for locus in &cluster.members {
                    warn!("{}: {}", coordinates(locus), e);
                    output.diagnostics.push(self.assembler.empty_window(locus));
                }
                return Ok(());
            }
        };
        debug!(
            "Cluster {} {}:{}-{}: {} genes, variants [{}, {}]",
            cluster.id,
            cluster.chrom,
            cluster.start,
            cluster.end,
            cluster.members.len(),
            span.start,
            span.end
        );

        let ld: Result<LdMatrix, LdError> = match self.ld.build_ld_matrix(span) {
            Err(e) if !e.is_unit_scoped() => {
                return Err(anyhow::Error::new(e)).with_context(|| {
                    format!(
                        "LD for cluster {} {}:{}-{}",
                        cluster.id, cluster.chrom, cluster.start, cluster.end
                    )
                });
            }
            built => built,
        };

        for locus in &cluster.members {
            let window = match self.reference.window(&locus.chrom, locus.start, locus.end) {
                Ok(window) => window,
                Err(e) => {
                    warn!("{}: {}", coordinates(locus), e);
                    output.diagnostics.push(self.assembler.empty_window(locus));
                    continue;
                }
            };
            if window != span {
                debug!(
                    "{}: statistics over [{}, {}], LD over cluster span [{}, {}]",
                    locus.gene, window.start, window.end, span.start, span.end
                );
            }

            let stats = self.extractor.extract(&locus.gene, window)?;
            if stats.is_empty() {
                warn!("{}: no summary statistics in window", coordinates(locus));
                output.diagnostics.push(self.assembler.empty_window(locus));
                continue;
            }

            let outcome = match &ld {
                Ok(ld) => self.runner.run(stats, ld),
                Err(e) => {
                    warn!("{}: LD unavailable: {}", coordinates(locus), e);
                    self.runner.reject(stats)
                }
            };
            match outcome.state {
                UnitState::Converged => {
                    debug!("{}: converged", coordinates(locus));
                }
                UnitState::Aligned if self.config.dry_run => {
                    info!("{}: aligned (dry run)", coordinates(locus));
                }
                state => {
                    warn!("{}: {}", coordinates(locus), state.label());
                }
            }

            let (records, diagnostic) = self.assembler.assemble(locus, &outcome);
            output.records.extend(records);
            output.diagnostics.push(diagnostic);
        }
        Ok(())
    }
}
