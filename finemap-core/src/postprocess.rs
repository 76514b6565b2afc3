//! Post-processing of primary result tables.
//!
//! Both operations concatenate tables that share one schema: the first
//! file's header is enforced on every later file.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use finemap_io::tabular::{parse_value, split_fields, TableHeader};
use finemap_io::InputError;

use crate::output::write_atomic;

/// PIP above which the naive strategy keeps a row.
pub const NAIVE_PIP_THRESHOLD: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStrategy {
    /// Keep every row.
    NoFilter,
    /// Keep rows with `pip > 0.9`.
    Naive,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableSummary {
    pub files: usize,
    pub rows_in: usize,
    pub rows_out: usize,
}

/// Concatenate `inputs` into `output`, keeping data lines for which `keep`
/// returns true.
fn concat_tables<F>(inputs: &[PathBuf], output: &Path, mut keep: F) -> Result<TableSummary>
where
    F: FnMut(&TableHeader, &[&str]) -> Result<bool>,
{
    let mut summary = TableSummary::default();
    let mut expected: Option<String> = None;

    write_atomic(output, |w| {
        for path in inputs {
            let file = File::open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            let mut lines = BufReader::new(file).lines();
            let header_line = match lines.next() {
                Some(line) => line.with_context(|| format!("Failed to read {}", path.display()))?,
                None => {
                    return Err(InputError::EmptyFile {
                        path: path.to_path_buf(),
                    }
                    .into())
                }
            };
            match &expected {
                None => {
                    writeln!(w, "{header_line}")?;
                    expected = Some(header_line.clone());
                }
                Some(first) if *first != header_line => {
                    return Err(InputError::SchemaMismatch {
                        path: path.to_path_buf(),
                        expected: first.clone(),
                    }
                    .into());
                }
                Some(_) => {}
            }
            let header = TableHeader::parse(path, &header_line);

            summary.files += 1;
            for line in lines {
                let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
                if line.trim().is_empty() {
                    continue;
                }
                summary.rows_in += 1;
                if keep(&header, &split_fields(&line))? {
                    writeln!(w, "{line}")?;
                    summary.rows_out += 1;
                }
            }
            debug!("Read {}", path.display());
        }
        Ok(())
    })?;
    Ok(summary)
}

/// Filter one or more result tables into a single table.
pub fn filter_results<P: AsRef<Path>>(
    inputs: &[P],
    strategy: FilterStrategy,
    output: &Path,
) -> Result<TableSummary> {
    if inputs.is_empty() {
        bail!("No result tables to filter");
    }
    let inputs: Vec<PathBuf> = inputs.iter().map(|p| p.as_ref().to_path_buf()).collect();
    let summary = concat_tables(&inputs, output, |header, fields| match strategy {
        FilterStrategy::NoFilter => Ok(true),
        FilterStrategy::Naive => {
            let idx = header.require("pip")?;
            let pip = fields.get(idx).and_then(|raw| parse_value(raw));
            Ok(pip.is_some_and(|p| p > NAIVE_PIP_THRESHOLD))
        }
    })?;
    info!(
        "Kept {} of {} rows from {} files",
        summary.rows_out, summary.rows_in, summary.files
    );
    Ok(summary)
}

/// Result chunks in `dir` whose names end with `suffix`, sorted by name.
pub fn matching_files(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(suffix));
        if matches && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Concatenate every result chunk in `dir` into `output`.
pub fn coalesce(dir: &Path, suffix: &str, output: &Path) -> Result<TableSummary> {
    let output_name = output.file_name();
    let files: Vec<PathBuf> = matching_files(dir, suffix)?
        .into_iter()
        .filter(|p| p.file_name() != output_name || p.parent() != output.parent())
        .collect();
    if files.is_empty() {
        bail!("No files ending in '{}' in {}", suffix, dir.display());
    }
    let summary = concat_tables(&files, output, |_, _| Ok(true))?;
    info!(
        "Coalesced {} files ({} rows) into {}",
        summary.files,
        summary.rows_out,
        output.display()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "variantIndex\tpip\tcredibleSet";

    fn write(path: &Path, lines: &[&str]) {
        std::fs::write(path, lines.join("\n") + "\n").unwrap();
    }

    #[test]
    fn test_naive_filter_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.tsv");
        let b = dir.path().join("b.tsv");
        write(&a, &[HEADER, "1\t0.95\tL1", "2\t0.90\tNA"]);
        write(&b, &[HEADER, "3\tNA\tNA", "4\t0.999\tL2"]);
        let out = dir.path().join("out.tsv");

        let summary = filter_results(&[&a, &b], FilterStrategy::Naive, &out).unwrap();
        assert_eq!(summary.rows_in, 4);
        assert_eq!(summary.rows_out, 2);
        let text = std::fs::read_to_string(&out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec![HEADER, "1\t0.95\tL1", "4\t0.999\tL2"]);
    }

    #[test]
    fn test_no_filter_keeps_all() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.tsv");
        write(&a, &[HEADER, "1\t0.1\tNA", "2\tNA\tNA"]);
        let out = dir.path().join("out.tsv");
        let summary = filter_results(&[&a], FilterStrategy::NoFilter, &out).unwrap();
        assert_eq!(summary.rows_out, 2);
    }

    #[test]
    fn test_coalesce_enforces_header() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("c1.finemapped.tsv"), &[HEADER, "1\t0.5\tNA"]);
        write(&dir.path().join("c2.finemapped.tsv"), &[HEADER]);
        write(&dir.path().join("c3.finemapped.tsv"), &[HEADER, "7\t0.2\tNA"]);
        write(&dir.path().join("notes.txt"), &["ignored"]);
        let out = dir.path().join("all.tsv");

        let summary = coalesce(dir.path(), ".finemapped.tsv", &out).unwrap();
        assert_eq!(summary.files, 3);
        assert_eq!(summary.rows_out, 2);
        let text = std::fs::read_to_string(&out).unwrap();
        assert_eq!(text.lines().count(), 3);

        write(&dir.path().join("c4.finemapped.tsv"), &["variantIndex\tpip", "9\t0.1"]);
        let err = coalesce(dir.path(), ".finemapped.tsv", &out).unwrap_err();
        assert!(err.to_string().contains("header does not match"));
        // the previous output is untouched
        assert_eq!(std::fs::read_to_string(&out).unwrap(), text);
    }
}
