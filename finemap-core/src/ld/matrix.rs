//! Labelled LD correlation matrices.
//!
//! An `LdMatrix` pairs a dense correlation matrix with its `variant_order`:
//! the variant index of every row (and column). Every consumer goes through
//! the labels, never through bare positions.

use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use finemap_linalg::DenseMatrix;

#[derive(Error, Debug)]
pub enum LdError {
    #[error("LD matrix has {labels} labels but is {nrows}x{ncols}")]
    Shape {
        labels: usize,
        nrows: usize,
        ncols: usize,
    },

    #[error("LD labels do not cover [{start}, {end}]: {detail}")]
    Labels { start: u64, end: u64, detail: String },

    #[error("variant {0} has no row in the LD matrix")]
    UnknownVariant(u64),

    #[error("LD matrix is not symmetric (max |r_ij - r_ji| = {0:.3e})")]
    NotSymmetric(f64),

    #[error("LD diagonal for variant {variant} is {value}, expected 1")]
    Diagonal { variant: u64, value: f64 },

    #[error("LD matrix contains a non-finite value at variant pair ({0}, {1})")]
    NonFinite(u64, u64),

    #[error("no stored LD matrix covers [{start}, {end}]")]
    NotStored { start: u64, end: u64 },

    #[error("variant {variant} is not in the genotype panel")]
    NotInPanel { variant: u64 },

    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

impl LdError {
    /// Whether the error only concerns the requested range.
    ///
    /// Everything except I/O failures is recorded against the affected units
    /// and the run continues.
    pub fn is_unit_scoped(&self) -> bool {
        !matches!(self, LdError::Io(_))
    }
}

/// Correlation matrix with row/column labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "StoredMatrix", into = "StoredMatrix")]
pub struct LdMatrix {
    variant_order: Vec<u64>,
    values: DenseMatrix,
}

/// Serialized form: labels plus row-major values.
#[derive(Serialize, Deserialize)]
struct StoredMatrix {
    variant_order: Vec<u64>,
    values: Vec<f64>,
}

impl TryFrom<StoredMatrix> for LdMatrix {
    type Error = String;

    fn try_from(stored: StoredMatrix) -> Result<Self, Self::Error> {
        let k = stored.variant_order.len();
        if stored.values.len() != k * k {
            return Err(format!(
                "{} values stored for {} labels",
                stored.values.len(),
                k
            ));
        }
        let values = DenseMatrix::from_row_major(k, k, &stored.values);
        Ok(Self {
            variant_order: stored.variant_order,
            values,
        })
    }
}

impl From<LdMatrix> for StoredMatrix {
    fn from(matrix: LdMatrix) -> Self {
        Self {
            values: matrix.values.to_row_major(),
            variant_order: matrix.variant_order,
        }
    }
}

impl LdMatrix {
    pub fn new(variant_order: Vec<u64>, values: DenseMatrix) -> Result<Self, LdError> {
        if values.nrows() != variant_order.len() || values.ncols() != variant_order.len() {
            return Err(LdError::Shape {
                labels: variant_order.len(),
                nrows: values.nrows(),
                ncols: values.ncols(),
            });
        }
        Ok(Self {
            variant_order,
            values,
        })
    }

    pub fn variant_order(&self) -> &[u64] {
        &self.variant_order
    }

    pub fn values(&self) -> &DenseMatrix {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.variant_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variant_order.is_empty()
    }

    /// Row of each label.
    pub fn positions(&self) -> HashMap<u64, usize> {
        self.variant_order
            .iter()
            .enumerate()
            .map(|(pos, &v)| (v, pos))
            .collect()
    }

    /// Correlation between two labelled variants.
    pub fn get(&self, a: u64, b: u64) -> Option<f64> {
        let i = self.variant_order.iter().position(|&v| v == a)?;
        let j = self.variant_order.iter().position(|&v| v == b)?;
        Some(self.values.get(i, j))
    }

    /// Principal submatrix over `order`, in that order.
    pub fn subset(&self, order: &[u64]) -> Result<LdMatrix, LdError> {
        let positions = self.positions();
        let rows = order
            .iter()
            .map(|v| positions.get(v).copied().ok_or(LdError::UnknownVariant(*v)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(LdMatrix {
            variant_order: order.to_vec(),
            values: self.values.select(&rows),
        })
    }
}

/// Mean-center and scale a dosage vector to unit Euclidean norm.
///
/// Missing calls (NaN) take the mean, so they contribute zero. A
/// monomorphic or all-missing vector becomes all zeros.
pub fn standardize_unit_norm(dosages: &mut [f64]) {
    let (sum, n) = dosages.iter().fold((0.0, 0usize), |(s, n), &d| {
        if d.is_nan() {
            (s, n)
        } else {
            (s + d, n + 1)
        }
    });
    if n == 0 {
        dosages.iter_mut().for_each(|d| *d = 0.0);
        return;
    }
    let mean = sum / n as f64;
    for d in dosages.iter_mut() {
        *d = if d.is_nan() { 0.0 } else { *d - mean };
    }
    let norm = dosages.iter().map(|d| d * d).sum::<f64>().sqrt();
    if norm > 1e-10 {
        dosages.iter_mut().for_each(|d| *d /= norm);
    } else {
        dosages.iter_mut().for_each(|d| *d = 0.0);
    }
}

/// Pearson correlation of dosage vectors as the cross product of their
/// standardized columns.
///
/// Returns an m x m matrix for m vectors. Monomorphic variants get a zero
/// row/column and a unit diagonal.
pub fn compute_ld_matrix(dosage_vectors: Vec<Vec<f64>>) -> DenseMatrix {
    let m = dosage_vectors.len();
    if m == 0 {
        return DenseMatrix::zeros(0, 0);
    }

    let columns: Vec<Vec<f64>> = dosage_vectors
        .into_par_iter()
        .map(|mut g| {
            standardize_unit_norm(&mut g);
            g
        })
        .collect();

    let mut ld = DenseMatrix::from_columns(&columns).cross_product();
    for i in 0..m {
        ld.set(i, i, 1.0);
        for j in (i + 1)..m {
            let r = ld.get(i, j).clamp(-1.0, 1.0);
            ld.set(i, j, r);
            ld.set(j, i, r);
        }
    }
    ld
}
