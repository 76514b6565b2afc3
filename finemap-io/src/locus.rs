//! Locus definition files.
//!
//! Tab-delimited, with header:
//! ```text
//! chromosome  start   end     gene    geneCluster cluster
//! 1           1000    5000    GENE1   GC1         0
//! ```
//! Several files are concatenated in the order given.

use std::path::Path;

use anyhow::{Context, Result};

use crate::error::InputError;
use crate::tabular::{parse_field, split_fields, TableHeader};

/// A genomic interval tested for one gene.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locus {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
    pub gene: String,
    pub gene_cluster: String,
    pub cluster: String,
}

/// Read and concatenate one or more locus files.
pub fn read_loci<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<Locus>> {
    let mut loci = Vec::new();
    for path in paths {
        loci.extend(read_locus_file(path.as_ref())?);
    }
    Ok(loci)
}

fn read_locus_file(path: &Path) -> Result<Vec<Locus>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read locus file: {}", path.display()))?;

    let mut lines = contents.lines().enumerate();
    let (_, header_line) = lines.next().ok_or_else(|| InputError::EmptyFile {
        path: path.to_path_buf(),
    })?;
    let header = TableHeader::parse(path, header_line);

    let chrom_idx = header.require("chromosome")?;
    let start_idx = header.require("start")?;
    let end_idx = header.require("end")?;
    let gene_idx = header.require("gene")?;
    let gene_cluster_idx = header.require("geneCluster")?;
    let cluster_idx = header.require("cluster")?;

    let mut loci = Vec::new();
    for (line_num, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_fields(line);
        let line_no = line_num + 1;
        let text = |idx: usize, column: &str| -> Result<String, InputError> {
            parse_field::<String>(&fields, idx, column, path, line_no)
        };

        loci.push(Locus {
            chrom: text(chrom_idx, "chromosome")?,
            start: parse_field(&fields, start_idx, "start", path, line_no)?,
            end: parse_field(&fields, end_idx, "end", path, line_no)?,
            gene: text(gene_idx, "gene")?,
            gene_cluster: text(gene_cluster_idx, "geneCluster")?,
            cluster: text(cluster_idx, "cluster")?,
        });
    }
    Ok(loci)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_and_concatenate() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.tsv");
        let b = dir.path().join("b.tsv");
        let mut f = std::fs::File::create(&a).unwrap();
        writeln!(f, "chromosome\tstart\tend\tgene\tgeneCluster\tcluster").unwrap();
        writeln!(f, "1\t100\t500\tG1\tGC1\t0").unwrap();
        let mut f = std::fs::File::create(&b).unwrap();
        // column order differs, extra column ignored
        writeln!(f, "gene\tchromosome\tstart\tend\tcluster\tgeneCluster\tnote").unwrap();
        writeln!(f, "G2\t2\t10\t20\t3\tGC2\tx").unwrap();

        let loci = read_loci(&[&a, &b]).unwrap();
        assert_eq!(loci.len(), 2);
        assert_eq!(loci[0].gene, "G1");
        assert_eq!(loci[1].chrom, "2");
        assert_eq!(loci[1].start, 10);
        assert_eq!(loci[1].gene_cluster, "GC2");
        assert_eq!(loci[1].cluster, "3");
    }

    #[test]
    fn test_missing_column_fails() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.tsv");
        let mut f = std::fs::File::create(&a).unwrap();
        writeln!(f, "chromosome\tstart\tend\tgene").unwrap();
        writeln!(f, "1\t100\t500\tG1").unwrap();

        let err = read_loci(&[&a]).unwrap_err();
        assert!(err.to_string().contains("geneCluster"));
    }

    #[test]
    fn test_bad_coordinate_fails() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.tsv");
        let mut f = std::fs::File::create(&a).unwrap();
        writeln!(f, "chromosome\tstart\tend\tgene\tgeneCluster\tcluster").unwrap();
        writeln!(f, "1\tabc\t500\tG1\tGC1\t0").unwrap();

        let err = read_loci(&[&a]).unwrap_err();
        assert!(err.to_string().contains("start"));
    }
}
