//! Input validation errors.
//!
//! Anything raised here means an input table cannot be trusted as a whole,
//! so callers abort the run instead of skipping a locus.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum InputError {
    #[error("{}: required column '{column}' not found in header", path.display())]
    MissingColumn { path: PathBuf, column: String },

    #[error("{}: empty file (no header line)", path.display())]
    EmptyFile { path: PathBuf },

    #[error("{}:{line}: cannot parse {column} value '{value}'", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        column: String,
        value: String,
    },

    #[error("{}:{line}: expected at least {expected} fields, found {found}", path.display())]
    TooFewFields {
        path: PathBuf,
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("duplicate variant index {index} in variant reference")]
    DuplicateVariant { index: u64 },

    #[error("{}: header does not match the first input ({})", path.display(), expected)]
    SchemaMismatch { path: PathBuf, expected: String },
}
