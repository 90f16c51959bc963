//! Agent: the current pose estimate, its position covariance and the
//! append-only history of published estimates.

use nalgebra::Matrix3;

use crate::common::{pose_from_translation, validate_covariance, Covariance3, Pose3, Position3, SlamResult};

#[derive(Debug, Clone)]
pub struct Agent {
    pose: Pose3,
    covariance: Covariance3,
    history: Vec<(Pose3, Covariance3)>,
}

impl Agent {
    /// Create an agent at `pose` with identity position covariance
    pub fn new(pose: Pose3) -> Self {
        let covariance = Matrix3::identity();
        Agent {
            pose,
            covariance,
            history: vec![(pose, covariance)],
        }
    }

    pub fn pose(&self) -> &Pose3 {
        &self.pose
    }

    pub fn position(&self) -> Position3 {
        self.pose.translation.vector
    }

    pub fn covariance(&self) -> &Covariance3 {
        &self.covariance
    }

    /// Scalar uncertainty: trace of the position covariance
    pub fn uncertainty(&self) -> f64 {
        self.covariance.trace()
    }

    pub fn history(&self) -> &[(Pose3, Covariance3)] {
        &self.history
    }

    /// Number of committed updates (history minus the initial entry)
    pub fn num_updates(&self) -> usize {
        self.history.len() - 1
    }

    /// Overwrite the current pose without touching the history
    pub fn set_pose(&mut self, pose: Pose3) {
        self.pose = pose;
    }

    /// Overwrite the current pose with a pure translation
    pub fn set_position(&mut self, position: &Position3) {
        self.pose = pose_from_translation(position);
    }

    /// Overwrite the current covariance; it must be symmetric positive semi-definite
    pub fn set_covariance(&mut self, covariance: Covariance3) -> SlamResult<()> {
        validate_covariance(&covariance, "agent covariance")?;
        self.covariance = covariance;
        Ok(())
    }

    /// Publish a new estimate and append it to the history.
    ///
    /// The covariance is validated before anything changes.
    pub fn commit(&mut self, pose: Pose3, covariance: Covariance3) -> SlamResult<()> {
        self.set_covariance(covariance)?;
        self.pose = pose;
        self.history.push((pose, covariance));
        Ok(())
    }

    /// Publish a new pose, keeping the current covariance
    pub fn commit_pose(&mut self, pose: Pose3) {
        self.pose = pose;
        self.history.push((pose, self.covariance));
    }
}

impl Default for Agent {
    fn default() -> Self {
        Self::new(Pose3::identity())
    }
}
