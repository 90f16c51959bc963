//! Accuracy metrics.
//!
//! - **ATE**: root mean square of the Euclidean position errors (metres)
//! - **ARE**: mean angle between corresponding rows of the rotation matrices (degrees)
//! - **UD**: difference of the covariance determinants, estimated minus reference

use nalgebra::{Dim, Matrix, Matrix3, Rotation3, Storage, Vector3};
use serde::{Deserialize, Serialize};

use crate::common::{Position3, SlamError, SlamResult};

/// Metrics of a single step
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StepMetrics {
    pub ate: f64,
    pub are: f64,
    pub ud: f64,
}

impl StepMetrics {
    pub fn as_array(&self) -> [f64; 3] {
        [self.ate, self.are, self.ud]
    }
}

/// Absolute trajectory error between two equally long position sequences
pub fn compute_ate(estimated: &[Position3], ground_truth: &[Position3]) -> SlamResult<f64> {
    if estimated.len() != ground_truth.len() {
        return Err(SlamError::shape_mismatch(
            format!("{} positions", ground_truth.len()),
            format!("{} positions", estimated.len()),
        ));
    }
    if estimated.is_empty() {
        return Ok(0.0);
    }
    let squared: f64 = estimated
        .iter()
        .zip(ground_truth)
        .map(|(e, g)| (e - g).norm_squared())
        .sum();
    Ok((squared / estimated.len() as f64).sqrt())
}

/// Average rotation error in degrees.
///
/// Every row of an estimated rotation matrix is compared with the same row of
/// the ground-truth matrix; the result is the mean angle over all rows.
pub fn compute_are(estimated: &[Rotation3<f64>], ground_truth: &[Rotation3<f64>]) -> SlamResult<f64> {
    if estimated.len() != ground_truth.len() {
        return Err(SlamError::shape_mismatch(
            format!("{} rotations", ground_truth.len()),
            format!("{} rotations", estimated.len()),
        ));
    }
    if estimated.is_empty() {
        return Ok(0.0);
    }
    let angles: Vec<f64> = estimated
        .iter()
        .zip(ground_truth)
        .flat_map(|(e, g)| {
            let (e, g) = (e.matrix(), g.matrix());
            (0..3).map(move |i| row_angle(&e.row(i).transpose(), &g.row(i).transpose()).to_degrees())
        })
        .collect();
    Ok(angles.iter().sum::<f64>() / angles.len() as f64)
}

/// Angle between two unit vectors; exactly zero for equal inputs
fn row_angle(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    a.cross(b).norm().atan2(a.dot(b))
}

/// Uncertainty difference `det(estimated) − det(ground_truth)`; both must be 3x3
pub fn compute_ud<R1, C1, S1, R2, C2, S2>(
    estimated: &Matrix<f64, R1, C1, S1>,
    ground_truth: &Matrix<f64, R2, C2, S2>,
) -> SlamResult<f64>
where
    R1: Dim,
    C1: Dim,
    S1: Storage<f64, R1, C1>,
    R2: Dim,
    C2: Dim,
    S2: Storage<f64, R2, C2>,
{
    for shape in [estimated.shape(), ground_truth.shape()] {
        if shape != (3, 3) {
            return Err(SlamError::shape_mismatch("3x3", format!("{}x{}", shape.0, shape.1)));
        }
    }
    let est = Matrix3::from_fn(|i, j| estimated[(i, j)]);
    let gt = Matrix3::from_fn(|i, j| ground_truth[(i, j)]);
    Ok(est.determinant() - gt.determinant())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{DMatrix, Vector3};

    #[test]
    fn test_ate_identical_is_zero() {
        let path: Vec<Position3> = (0..5).map(|i| Vector3::new(i as f64, 1.0, -2.0)).collect();
        assert_eq!(compute_ate(&path, &path).unwrap(), 0.0);
        assert_eq!(compute_ate(&[], &[]).unwrap(), 0.0);
    }

    #[test]
    fn test_ate_rms() {
        let est = vec![Vector3::new(1.0, 0.0, 0.0), Vector3::new(0.0, 0.0, 0.0)];
        let gt = vec![Vector3::new(0.0, 0.0, 0.0), Vector3::new(0.0, 3.0, 4.0)];
        // errors 1 and 5
        assert_relative_eq!(compute_ate(&est, &gt).unwrap(), 13.0_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_ate_length_mismatch() {
        let est = vec![Vector3::zeros(); 2];
        let gt = vec![Vector3::zeros(); 3];
        assert!(matches!(compute_ate(&est, &gt), Err(SlamError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_are_identical_is_zero() {
        let rotations = vec![
            Rotation3::identity(),
            Rotation3::from_euler_angles(0.1, -0.3, 1.2),
        ];
        assert_eq!(compute_are(&rotations, &rotations).unwrap(), 0.0);
    }

    #[test]
    fn test_are_yaw_offset() {
        let est = vec![Rotation3::from_euler_angles(0.0, 0.0, 30.0_f64.to_radians())];
        let gt = vec![Rotation3::identity()];
        // rows x and y turn by 30 degrees, row z is unchanged
        assert_relative_eq!(compute_are(&est, &gt).unwrap(), 20.0, epsilon = 1e-9);
    }

    #[test]
    fn test_are_length_mismatch() {
        assert!(compute_are(&[Rotation3::identity()], &[]).is_err());
    }

    #[test]
    fn test_ud() {
        let est = Matrix3::identity() * 2.0;
        assert_relative_eq!(compute_ud(&est, &Matrix3::identity()).unwrap(), 7.0, epsilon = 1e-12);
        assert_eq!(compute_ud(&Matrix3::<f64>::identity(), &Matrix3::identity()).unwrap(), 0.0);
    }

    #[test]
    fn test_ud_requires_3x3() {
        let dynamic = DMatrix::<f64>::identity(3, 3);
        assert!(compute_ud(&dynamic, &Matrix3::identity()).is_ok());
        let wrong = DMatrix::<f64>::identity(2, 2);
        assert!(matches!(
            compute_ud(&wrong, &Matrix3::identity()),
            Err(SlamError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_step_metrics_array() {
        let metrics = StepMetrics { ate: 1.0, are: 2.0, ud: -0.5 };
        assert_eq!(metrics.as_array(), [1.0, 2.0, -0.5]);
    }
}
