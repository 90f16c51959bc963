//! Common types used throughout landmark_slam

use nalgebra::{DMatrix, DVector, Isometry3, Matrix3, Point3, SymmetricEigen, Translation3, UnitQuaternion, Vector3};

use crate::common::error::{SlamError, SlamResult};

/// Stable landmark identifier, unique within a map
pub type LandmarkId = u64;

/// Rigid 3D transform (rotation + translation)
pub type Pose3 = Isometry3<f64>;

/// Position in world or body frame
pub type Position3 = Vector3<f64>;

/// 3x3 position covariance
pub type Covariance3 = Matrix3<f64>;

/// Absolute tolerance used when checking symmetry and semi-definiteness
pub const COVARIANCE_TOLERANCE: f64 = 1e-9;

/// Pose with identity rotation at the given translation
pub fn pose_from_translation(t: &Position3) -> Pose3 {
    Isometry3::from_parts(Translation3::from(*t), UnitQuaternion::identity())
}

/// Skew-symmetric cross-product matrix, `skew(a) * b == a.cross(&b)`
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        0.0, -v[2], v[1],
        v[2], 0.0, -v[0],
        -v[1], v[0], 0.0,
    )
}

/// Check that a 3x3 matrix is finite, symmetric and positive semi-definite.
pub fn validate_covariance(cov: &Covariance3, what: &str) -> SlamResult<()> {
    if cov.iter().any(|v| !v.is_finite()) {
        return Err(SlamError::InvalidInput(format!("{} has non-finite entries", what)));
    }
    let scale = cov.amax().max(1.0);
    if (cov - cov.transpose()).amax() > COVARIANCE_TOLERANCE * scale {
        return Err(SlamError::InvalidInput(format!("{} is not symmetric", what)));
    }
    let eig = SymmetricEigen::new(*cov);
    if eig.eigenvalues.min() < -COVARIANCE_TOLERANCE * scale {
        return Err(SlamError::InvalidInput(format!(
            "{} is not positive semi-definite (min eigenvalue {:.3e})",
            what,
            eig.eigenvalues.min()
        )));
    }
    Ok(())
}

/// Landmark measurement as received from a collaborator.
///
/// Shapes are dynamic on purpose: they are checked by [`Measurement::validate`]
/// before the estimator touches any state.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub id: LandmarkId,
    pub mean: DVector<f64>,
    pub covariance: DMatrix<f64>,
}

impl Measurement {
    pub fn new(id: LandmarkId, mean: Position3, covariance: Covariance3) -> Self {
        Self {
            id,
            mean: DVector::from_column_slice(mean.as_slice()),
            covariance: DMatrix::from_column_slice(3, 3, covariance.as_slice()),
        }
    }

    /// Validate shapes and values, returning the fixed-size mean and covariance.
    pub fn validate(&self) -> SlamResult<(Position3, Covariance3)> {
        if self.mean.len() != 3 {
            return Err(SlamError::InvalidInput(format!(
                "measurement {} mean must have 3 components, got {}",
                self.id,
                self.mean.len()
            )));
        }
        if self.covariance.shape() != (3, 3) {
            return Err(SlamError::InvalidInput(format!(
                "measurement {} covariance must be 3x3, got {}x{}",
                self.id,
                self.covariance.nrows(),
                self.covariance.ncols()
            )));
        }
        if self.mean.iter().any(|v| !v.is_finite()) {
            return Err(SlamError::InvalidInput(format!(
                "measurement {} mean has non-finite entries",
                self.id
            )));
        }
        let mean = Position3::new(self.mean[0], self.mean[1], self.mean[2]);
        let covariance: Covariance3 = self.covariance.fixed_view::<3, 3>(0, 0).into_owned();
        validate_covariance(&covariance, &format!("measurement {} covariance", self.id))?;
        Ok((mean, covariance))
    }
}

/// Raw observation of a landmark from one pose.
///
/// `relative` is the landmark position expressed in the observing pose's frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub pose_index: usize,
    pub relative: Position3,
    pub covariance: Covariance3,
}

impl Observation {
    pub fn new(pose_index: usize, relative: Position3, covariance: Covariance3) -> Self {
        Self { pose_index, relative, covariance }
    }

    /// Landmark position predicted by re-projecting this observation through `pose`
    pub fn reproject(&self, pose: &Pose3) -> Position3 {
        pose.transform_point(&Point3::from(self.relative)).coords
    }
}

/// Validate a control input and turn it into a translation delta
pub fn control_to_delta(control: &[f64]) -> SlamResult<Pose3> {
    if control.len() != 3 {
        return Err(SlamError::InvalidInput(format!(
            "control_input must have 3 components, got {}",
            control.len()
        )));
    }
    if control.iter().any(|v| !v.is_finite()) {
        return Err(SlamError::InvalidInput(
            "control_input has non-finite components".to_string(),
        ));
    }
    Ok(pose_from_translation(&Position3::new(control[0], control[1], control[2])))
}
