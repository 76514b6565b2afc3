//! Validated LD matrix construction.

use tracing::{debug, warn};

use finemap_io::VariantWindow;
use finemap_linalg::SymmetricEigen;

use super::matrix::{LdError, LdMatrix};
use super::source::LdSource;
use super::store::MatrixStore;

/// Tolerance for symmetry and the unit diagonal.
const TOLERANCE: f64 = 1e-6;

/// Resolves LD for a variant-index window through one configured source and
/// checks the result before anyone fits against it.
pub struct LdMatrixBuilder<'a> {
    source: Box<dyn LdSource + 'a>,
    check_eigenvalues: bool,
}

impl<'a> LdMatrixBuilder<'a> {
    pub fn new(source: Box<dyn LdSource + 'a>) -> Self {
        Self {
            source,
            check_eigenvalues: false,
        }
    }

    /// Log the smallest eigenvalue of every built matrix.
    pub fn with_eigenvalue_check(mut self, enabled: bool) -> Self {
        self.check_eigenvalues = enabled;
        self
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    pub fn build_ld_matrix(&self, window: VariantWindow) -> Result<LdMatrix, LdError> {
        let matrix = self.source.range_to_matrix(window)?;
        validate(&matrix, window)?;
        if self.check_eigenvalues {
            match SymmetricEigen::new(matrix.values()) {
                Ok(eigen) if eigen.min_value() < -TOLERANCE => warn!(
                    "LD over [{}, {}] is not positive semi-definite (min eigenvalue {:.4e})",
                    window.start,
                    window.end,
                    eigen.min_value()
                ),
                Ok(eigen) => debug!(
                    "LD over [{}, {}]: min eigenvalue {:.4e}",
                    window.start,
                    window.end,
                    eigen.min_value()
                ),
                Err(e) => warn!(
                    "Eigen decomposition failed for LD over [{}, {}]: {}",
                    window.start, window.end, e
                ),
            }
        }
        Ok(matrix)
    }

    /// Build the matrix for `window` and write it to a keyed store.
    pub fn build_into_store(
        &self,
        window: VariantWindow,
        store: &MatrixStore,
    ) -> Result<LdMatrix, LdError> {
        let matrix = self.build_ld_matrix(window)?;
        let path = store.save(window, &matrix)?;
        debug!("Stored LD matrix {}", path.display());
        Ok(matrix)
    }
}

/// Labels must be exactly `start..=end` ascending; values symmetric and
/// finite with a unit diagonal.
pub fn validate(matrix: &LdMatrix, window: VariantWindow) -> Result<(), LdError> {
    let order = matrix.variant_order();
    let labels_err = |detail: String| LdError::Labels {
        start: window.start,
        end: window.end,
        detail,
    };
    if order.len() != window.span() {
        return Err(labels_err(format!(
            "{} labels for {} variants",
            order.len(),
            window.span()
        )));
    }
    if let Some((pos, &label)) = order
        .iter()
        .enumerate()
        .find(|&(pos, &label)| label != window.start + pos as u64)
    {
        return Err(labels_err(format!(
            "label {} at row {}, expected {}",
            label,
            pos,
            window.start + pos as u64
        )));
    }

    let values = matrix.values();
    for i in 0..order.len() {
        for j in 0..order.len() {
            if !values.get(i, j).is_finite() {
                return Err(LdError::NonFinite(order[i], order[j]));
            }
        }
    }
    let asymmetry = values.max_asymmetry();
    if asymmetry > TOLERANCE {
        return Err(LdError::NotSymmetric(asymmetry));
    }
    for (i, &variant) in order.iter().enumerate() {
        let value = values.get(i, i);
        if (value - 1.0).abs() > TOLERANCE {
            return Err(LdError::Diagonal { variant, value });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use finemap_linalg::DenseMatrix;

    struct Fixed(LdMatrix);

    impl LdSource for Fixed {
        fn range_to_matrix(&self, _window: VariantWindow) -> Result<LdMatrix, LdError> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    fn window(start: u64, end: u64) -> VariantWindow {
        VariantWindow { start, end }
    }

    #[test]
    fn test_valid_matrix_passes() {
        let ld = LdMatrix::new(vec![4, 5, 6], DenseMatrix::identity(3)).unwrap();
        let builder = LdMatrixBuilder::new(Box::new(Fixed(ld))).with_eigenvalue_check(true);
        let built = builder.build_ld_matrix(window(4, 6)).unwrap();
        assert_eq!(built.variant_order(), &[4, 5, 6]);
        assert_eq!(builder.source_name(), "fixed");
    }

    #[test]
    fn test_unsorted_labels_rejected() {
        let ld = LdMatrix::new(vec![5, 4, 6], DenseMatrix::identity(3)).unwrap();
        let err = validate(&ld, window(4, 6)).unwrap_err();
        assert!(matches!(err, LdError::Labels { .. }));
    }

    #[test]
    fn test_missing_label_rejected() {
        let ld = LdMatrix::new(vec![4, 6], DenseMatrix::identity(2)).unwrap();
        assert!(matches!(
            validate(&ld, window(4, 6)),
            Err(LdError::Labels { .. })
        ));
    }

    #[test]
    fn test_asymmetric_rejected() {
        let values = DenseMatrix::from_row_major(2, 2, &[1.0, 0.5, 0.4, 1.0]);
        let ld = LdMatrix::new(vec![0, 1], values).unwrap();
        assert!(matches!(
            validate(&ld, window(0, 1)),
            Err(LdError::NotSymmetric(_))
        ));
    }

    #[test]
    fn test_diagonal_rejected() {
        let values = DenseMatrix::from_row_major(2, 2, &[1.0, 0.5, 0.5, 0.9]);
        let ld = LdMatrix::new(vec![0, 1], values).unwrap();
        assert!(matches!(
            validate(&ld, window(0, 1)),
            Err(LdError::Diagonal { variant: 1, .. })
        ));
    }

    #[test]
    fn test_build_into_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = MatrixStore::create(dir.path()).unwrap();
        let ld = LdMatrix::new(vec![1, 2], DenseMatrix::identity(2)).unwrap();
        let builder = LdMatrixBuilder::new(Box::new(Fixed(ld)));
        builder.build_into_store(window(1, 2), &store).unwrap();
        assert_eq!(store.load(window(1, 2)).unwrap().variant_order(), &[1, 2]);
    }
}
