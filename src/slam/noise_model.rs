//! Per-edge noise models for graph factors

use nalgebra::{DMatrix, DVector};

use crate::common::{SlamError, SlamResult};

/// Default standard deviation for every prior/odometry degree of freedom
pub const DEFAULT_SIGMA: f64 = 0.1;

/// Gaussian noise model attached to a single factor
#[derive(Debug, Clone, PartialEq)]
pub enum NoiseModel {
    /// Independent standard deviations per residual dimension
    Diagonal(DVector<f64>),
    /// Full covariance matrix
    Gaussian(DMatrix<f64>),
}

impl NoiseModel {
    /// Diagonal model from standard deviations; every sigma must be positive and finite
    pub fn diagonal_sigmas(sigmas: &[f64]) -> SlamResult<Self> {
        if sigmas.is_empty() || sigmas.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(SlamError::InvalidInput(format!(
                "noise sigmas must be positive and finite, got {:?}",
                sigmas
            )));
        }
        Ok(NoiseModel::Diagonal(DVector::from_column_slice(sigmas)))
    }

    /// Full covariance model; the matrix must be square and positive definite
    pub fn gaussian(covariance: DMatrix<f64>) -> SlamResult<Self> {
        if !covariance.is_square() || covariance.nrows() == 0 {
            return Err(SlamError::InvalidInput(format!(
                "noise covariance must be square, got {}x{}",
                covariance.nrows(),
                covariance.ncols()
            )));
        }
        if covariance.clone().cholesky().is_none() {
            return Err(SlamError::InvalidInput(
                "noise covariance must be positive definite".to_string(),
            ));
        }
        Ok(NoiseModel::Gaussian(covariance))
    }

    /// Default 6-DOF model (3 rotational + 3 translational sigmas)
    pub fn default_pose() -> Self {
        NoiseModel::Diagonal(DVector::from_element(6, DEFAULT_SIGMA))
    }

    pub fn dim(&self) -> usize {
        match self {
            NoiseModel::Diagonal(sigmas) => sigmas.len(),
            NoiseModel::Gaussian(cov) => cov.nrows(),
        }
    }

    pub fn covariance(&self) -> DMatrix<f64> {
        match self {
            NoiseModel::Diagonal(sigmas) => DMatrix::from_diagonal(&sigmas.map(|s| s * s)),
            NoiseModel::Gaussian(cov) => cov.clone(),
        }
    }

    /// Information matrix (inverse covariance)
    pub fn information(&self) -> DMatrix<f64> {
        match self {
            NoiseModel::Diagonal(sigmas) => DMatrix::from_diagonal(&sigmas.map(|s| 1.0 / (s * s))),
            NoiseModel::Gaussian(cov) => cov
                .clone()
                .cholesky()
                .map(|c| c.inverse())
                .unwrap_or_else(|| DMatrix::identity(cov.nrows(), cov.ncols())),
        }
    }
}

impl Default for NoiseModel {
    fn default() -> Self {
        Self::default_pose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_diagonal_information() {
        let model = NoiseModel::diagonal_sigmas(&[0.1, 0.5]).unwrap();
        let info = model.information();
        assert_eq!(model.dim(), 2);
        assert_relative_eq!(info[(0, 0)], 100.0, epsilon = 1e-9);
        assert_relative_eq!(info[(1, 1)], 4.0, epsilon = 1e-9);
        assert_relative_eq!(info[(0, 1)], 0.0);
    }

    #[test]
    fn test_default_pose_model() {
        let model = NoiseModel::default();
        assert_eq!(model.dim(), 6);
        assert_relative_eq!(model.covariance()[(5, 5)], 0.01, epsilon = 1e-12);
    }

    #[test]
    fn test_gaussian_information_is_inverse() {
        let cov = DMatrix::from_row_slice(2, 2, &[2.0, 0.5, 0.5, 1.0]);
        let model = NoiseModel::gaussian(cov.clone()).unwrap();
        assert_relative_eq!(model.information() * cov, DMatrix::identity(2, 2), epsilon = 1e-9);
    }

    #[test]
    fn test_invalid_models() {
        assert!(NoiseModel::diagonal_sigmas(&[0.1, 0.0]).is_err());
        assert!(NoiseModel::diagonal_sigmas(&[]).is_err());
        assert!(NoiseModel::gaussian(DMatrix::zeros(2, 3)).is_err());
        assert!(NoiseModel::gaussian(DMatrix::from_diagonal_element(2, 2, -1.0)).is_err());
    }
}
