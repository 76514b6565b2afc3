//! Shared helpers for the tab-delimited inputs.
//!
//! Every input table has a header line; columns are located by name so
//! extra columns and column order never matter.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::InputError;

/// Column names of a parsed header line.
#[derive(Debug, Clone)]
pub struct TableHeader {
    path: PathBuf,
    columns: Vec<String>,
}

impl TableHeader {
    pub fn parse(path: &Path, line: &str) -> Self {
        let columns = split_fields(line).iter().map(|s| s.to_string()).collect();
        Self {
            path: path.to_path_buf(),
            columns,
        }
    }

    /// Index of a required column.
    pub fn require(&self, name: &str) -> Result<usize, InputError> {
        self.position(name).ok_or_else(|| InputError::MissingColumn {
            path: self.path.clone(),
            column: name.to_string(),
        })
    }

    /// Index of an optional column.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Split a data line on tabs, falling back to whitespace for
/// space-delimited files.
pub fn split_fields(line: &str) -> Vec<&str> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.contains('\t') {
        line.split('\t').map(|s| s.trim()).collect()
    } else {
        line.split_whitespace().collect()
    }
}

/// Whether a field spells a missing value.
pub fn is_missing(s: &str) -> bool {
    matches!(s, "NA" | "na" | "Na" | "." | "" | "NaN" | "nan")
}

/// Parse a floating-point field, treating NA spellings as NaN.
pub fn parse_value(s: &str) -> Option<f64> {
    if is_missing(s) {
        Some(f64::NAN)
    } else {
        s.parse().ok()
    }
}

/// Parse a required field at `idx`, reporting the line on failure.
pub fn parse_field<T: FromStr>(
    fields: &[&str],
    idx: usize,
    column: &str,
    path: &Path,
    line: usize,
) -> Result<T, InputError> {
    let raw = fields.get(idx).copied().ok_or(InputError::TooFewFields {
        path: path.to_path_buf(),
        line,
        expected: idx + 1,
        found: fields.len(),
    })?;
    raw.parse().map_err(|_| InputError::Parse {
        path: path.to_path_buf(),
        line,
        column: column.to_string(),
        value: raw.to_string(),
    })
}

/// Parse a numeric field that may be NA.
pub fn parse_numeric(
    fields: &[&str],
    idx: usize,
    column: &str,
    path: &Path,
    line: usize,
) -> Result<f64, InputError> {
    let raw = fields.get(idx).copied().ok_or(InputError::TooFewFields {
        path: path.to_path_buf(),
        line,
        expected: idx + 1,
        found: fields.len(),
    })?;
    parse_value(raw).ok_or_else(|| InputError::Parse {
        path: path.to_path_buf(),
        line,
        column: column.to_string(),
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("1.5"), Some(1.5));
        assert!(parse_value("NA").unwrap().is_nan());
        assert!(parse_value(".").unwrap().is_nan());
        assert!(parse_value("").unwrap().is_nan());
        assert_eq!(parse_value("abc"), None);
    }

    #[test]
    fn test_header_lookup() {
        let h = TableHeader::parse(Path::new("x.tsv"), "a\tb\tc\n");
        assert_eq!(h.require("b").unwrap(), 1);
        assert!(h.position("d").is_none());
        assert!(matches!(
            h.require("d"),
            Err(InputError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_split_space_delimited() {
        assert_eq!(split_fields("a  b c"), vec!["a", "b", "c"]);
        assert_eq!(split_fields("a\t\tc"), vec!["a", "", "c"]);
    }
}
