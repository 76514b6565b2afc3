//! Result tables.
//!
//! Each table is written in full to `<path>.partial` and renamed into place,
//! so an interrupted run never leaves a complete-looking truncated file.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::assemble::{DiagnosticRow, FinemappingRecord};

const LOCUS_COLUMNS: &str = "chromosome\tstart\tend\tgene\tgeneCluster\tcluster";

/// Output file names for a prefix.
#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub records: PathBuf,
    pub diagnostics: PathBuf,
    pub failed: PathBuf,
}

impl OutputPaths {
    pub fn from_prefix(prefix: &str) -> Self {
        Self {
            records: PathBuf::from(format!("{prefix}.finemapped.tsv")),
            diagnostics: PathBuf::from(format!("{prefix}.diagnostics.bed")),
            failed: PathBuf::from(format!("{prefix}.failed.bed")),
        }
    }
}

fn na<T: std::fmt::Display>(value: Option<T>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "NA".to_string(),
    }
}

fn num(value: f64) -> String {
    if value.is_nan() {
        "NA".to_string()
    } else {
        value.to_string()
    }
}

fn flag(value: bool) -> &'static str {
    if value {
        "TRUE"
    } else {
        "FALSE"
    }
}

/// Write through `<path>.partial`, renaming once `body` succeeds.
pub fn write_atomic<F>(path: &Path, body: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let mut partial = path.as_os_str().to_owned();
    partial.push(".partial");
    let partial = PathBuf::from(partial);

    let file = File::create(&partial)
        .with_context(|| format!("Failed to create {}", partial.display()))?;
    let mut writer = BufWriter::new(file);
    if let Err(e) = body(&mut writer) {
        drop(writer);
        let _ = std::fs::remove_file(&partial);
        return Err(e);
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", partial.display()))?;
    drop(writer);
    std::fs::rename(&partial, path)
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(())
}

pub fn write_records_header(writer: &mut impl Write, max_l: usize) -> Result<()> {
    let lbf: Vec<String> = (1..=max_l).map(|l| format!("lbf_{l}")).collect();
    writeln!(
        writer,
        "{LOCUS_COLUMNS}\tvariantIndex\tbasePairPosition\tphenotype\tbeta\tstandardError\tsampleSize\tiSquared\tz\tincluded\tpip\tcredibleSet\t{}\ttrace\tlambda\tL\tresidualVarianceEstimated",
        lbf.join("\t")
    )?;
    Ok(())
}

pub fn write_record_line(writer: &mut impl Write, record: &FinemappingRecord) -> Result<()> {
    let l = &record.locus;
    let lbf: Vec<String> = record.lbf.iter().map(|v| na(*v)).collect();
    writeln!(
        writer,
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
        l.chrom,
        l.start,
        l.end,
        l.gene,
        l.gene_cluster,
        l.cluster,
        record.variant_index,
        na(record.position),
        record.phenotype,
        num(record.beta),
        num(record.standard_error),
        num(record.sample_size),
        num(record.i_squared),
        na(record.z),
        flag(record.included),
        na(record.pip),
        na(record.credible_set.map(|slot| format!("L{}", slot + 1))),
        lbf.join("\t"),
        record.trace,
        na(record.lambda),
        na(record.l),
        na(record.residual_variance_estimated.map(flag)),
    )?;
    Ok(())
}

pub fn write_records(path: &Path, records: &[FinemappingRecord], max_l: usize) -> Result<()> {
    write_atomic(path, |w| {
        write_records_header(w, max_l)?;
        for record in records {
            write_record_line(w, record)?;
        }
        Ok(())
    })
}

fn write_locus(writer: &mut impl Write, row: &DiagnosticRow) -> Result<()> {
    let l = &row.locus;
    write!(
        writer,
        "{}\t{}\t{}\t{}\t{}\t{}",
        l.chrom, l.start, l.end, l.gene, l.gene_cluster, l.cluster
    )?;
    Ok(())
}

pub fn write_diagnostics(path: &Path, rows: &[DiagnosticRow]) -> Result<()> {
    write_atomic(path, |w| {
        writeln!(
            w,
            "{LOCUS_COLUMNS}\tlambda\tconverged\tdistinctCredibleSetCount\tstatus"
        )?;
        for row in rows {
            write_locus(w, row)?;
            writeln!(
                w,
                "\t{}\t{}\t{}\t{}",
                na(row.lambda),
                flag(row.converged),
                row.distinct_credible_sets,
                row.status.label()
            )?;
        }
        Ok(())
    })
}

/// Failed units as a locus file that `run --loci` accepts again.
pub fn write_failed(path: &Path, rows: &[DiagnosticRow]) -> Result<()> {
    write_atomic(path, |w| {
        writeln!(w, "{LOCUS_COLUMNS}")?;
        for row in rows.iter().filter(|r| r.is_failed()) {
            write_locus(w, row)?;
            writeln!(w)?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{FailureReason, UnitState};
    use finemap_io::{read_loci, Locus};

    fn locus(gene: &str) -> Locus {
        Locus {
            chrom: "3".into(),
            start: 10,
            end: 20,
            gene: gene.into(),
            gene_cluster: gene.into(),
            cluster: "7".into(),
        }
    }

    fn record() -> FinemappingRecord {
        FinemappingRecord {
            locus: locus("G"),
            variant_index: 42,
            position: Some(15),
            phenotype: "G".into(),
            beta: 0.5,
            standard_error: 0.1,
            sample_size: 1000.0,
            i_squared: f64::NAN,
            z: Some(5.0),
            included: true,
            pip: Some(0.99),
            credible_set: Some(0),
            lbf: vec![Some(12.5), None],
            trace: "L=1,erv=T,conv=T,cs=T".into(),
            lambda: Some(0.98),
            l: Some(1),
            residual_variance_estimated: Some(true),
        }
    }

    #[test]
    fn test_record_columns_match_header() {
        let mut header = Vec::new();
        write_records_header(&mut header, 2).unwrap();
        let mut line = Vec::new();
        write_record_line(&mut line, &record()).unwrap();

        let header = String::from_utf8(header).unwrap();
        let line = String::from_utf8(line).unwrap();
        let names: Vec<&str> = header.trim_end().split('\t').collect();
        let values: Vec<&str> = line.trim_end().split('\t').collect();
        assert_eq!(names.len(), values.len());

        let field = |name: &str| values[names.iter().position(|n| *n == name).unwrap()];
        assert_eq!(field("iSquared"), "NA");
        assert_eq!(field("credibleSet"), "L1");
        assert_eq!(field("lbf_1"), "12.5");
        assert_eq!(field("lbf_2"), "NA");
        assert_eq!(field("included"), "TRUE");
        assert_eq!(field("residualVarianceEstimated"), "TRUE");
    }

    #[test]
    fn test_failed_extract_is_a_locus_file() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![
            DiagnosticRow {
                locus: locus("OK"),
                lambda: Some(1.0),
                converged: true,
                distinct_credible_sets: 1,
                status: UnitState::Converged,
            },
            DiagnosticRow {
                locus: locus("BAD"),
                lambda: None,
                converged: false,
                distinct_credible_sets: 0,
                status: UnitState::Failed(FailureReason::NoConvergence),
            },
        ];
        let diagnostics = dir.path().join("out.diagnostics.bed");
        let failed = dir.path().join("out.failed.bed");
        write_diagnostics(&diagnostics, &rows).unwrap();
        write_failed(&failed, &rows).unwrap();

        let text = std::fs::read_to_string(&diagnostics).unwrap();
        assert!(text.contains("3\t10\t20\tBAD\tBAD\t7\tNA\tFALSE\t0\tNoConvergence"));
        let loci = read_loci(&[&failed]).unwrap();
        assert_eq!(loci, vec![locus("BAD")]);
        assert!(!dir.path().join("out.failed.bed.partial").exists());
    }

    #[test]
    fn test_output_paths() {
        let paths = OutputPaths::from_prefix("run/chunk1");
        assert_eq!(paths.records, PathBuf::from("run/chunk1.finemapped.tsv"));
        assert_eq!(paths.failed, PathBuf::from("run/chunk1.failed.bed"));
    }
}
