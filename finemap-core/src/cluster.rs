//! Grouping of overlapping loci.
//!
//! Loci on the same chromosome whose intervals overlap (or touch) share a
//! cluster, and every member of a cluster is fitted against one LD matrix
//! over the cluster span.

use finemap_io::Locus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocusCluster {
    /// Dense, in sorted order, starting at 0.
    pub id: usize,
    pub chrom: String,
    pub start: u64,
    pub end: u64,
    pub members: Vec<Locus>,
}

fn sort_key(locus: &Locus) -> (&str, u64, u64, &str, &str, &str) {
    (
        locus.chrom.as_str(),
        locus.start,
        locus.end,
        locus.gene.as_str(),
        locus.gene_cluster.as_str(),
        locus.cluster.as_str(),
    )
}

/// Cluster loci by interval overlap. The result does not depend on the
/// input order.
pub fn cluster_loci(loci: &[Locus]) -> Vec<LocusCluster> {
    let mut sorted: Vec<&Locus> = loci.iter().collect();
    sorted.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));

    let mut clusters: Vec<LocusCluster> = Vec::new();
    for locus in sorted {
        match clusters.last_mut() {
            Some(current) if current.chrom == locus.chrom && locus.start <= current.end => {
                current.end = current.end.max(locus.end);
                current.members.push(locus.clone());
            }
            _ => {
                clusters.push(LocusCluster {
                    id: clusters.len(),
                    chrom: locus.chrom.clone(),
                    start: locus.start,
                    end: locus.end,
                    members: vec![locus.clone()],
                });
            }
        }
    }
    clusters
}
