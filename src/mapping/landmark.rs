//! Landmark: position estimate, covariance and the raw observations that
//! referenced it.

use std::collections::BTreeSet;
use std::fmt;

use crate::common::{validate_covariance, Covariance3, LandmarkId, Observation, Position3, SlamResult};

#[derive(Debug, Clone)]
pub struct Landmark {
    id: LandmarkId,
    mean: Position3,
    covariance: Covariance3,
    observations: Vec<Observation>,
    position_history: Vec<(Position3, Covariance3)>,
}

impl Landmark {
    /// Create a landmark; the covariance must be symmetric positive semi-definite.
    pub fn new(id: LandmarkId, mean: Position3, covariance: Covariance3) -> SlamResult<Self> {
        validate_covariance(&covariance, &format!("landmark {} covariance", id))?;
        Ok(Landmark {
            id,
            mean,
            covariance,
            observations: Vec::new(),
            position_history: vec![(mean, covariance)],
        })
    }

    pub fn id(&self) -> LandmarkId {
        self.id
    }

    pub fn mean(&self) -> &Position3 {
        &self.mean
    }

    pub fn covariance(&self) -> &Covariance3 {
        &self.covariance
    }

    /// Scalar uncertainty: trace of the covariance
    pub fn uncertainty(&self) -> f64 {
        self.covariance.trace()
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn position_history(&self) -> &[(Position3, Covariance3)] {
        &self.position_history
    }

    /// Overwrite the estimate. No fusion with the previous value takes place.
    pub fn update_position(&mut self, mean: Position3, covariance: Covariance3) -> SlamResult<()> {
        validate_covariance(&covariance, &format!("landmark {} covariance", self.id))?;
        self.mean = mean;
        self.covariance = covariance;
        self.position_history.push((mean, covariance));
        Ok(())
    }

    pub fn add_observation(&mut self, observation: Observation) {
        self.observations.push(observation);
    }

    /// Distinct pose indices this landmark was observed from
    pub fn observing_poses(&self) -> BTreeSet<usize> {
        self.observations.iter().map(|o| o.pose_index).collect()
    }
}

impl fmt::Display for Landmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Landmark(id={}, mean=({:.3}, {:.3}, {:.3}), trace={:.4}, observations={})",
            self.id,
            self.mean.x,
            self.mean.y,
            self.mean.z,
            self.uncertainty(),
            self.observations.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix3, Vector3};

    #[test]
    fn test_update_overwrites() {
        let mut lm = Landmark::new(7, Vector3::new(1.0, 1.0, 1.0), Matrix3::identity()).unwrap();
        let cov = Matrix3::identity() * 0.25;
        lm.update_position(Vector3::new(2.0, 3.0, 4.0), cov).unwrap();

        assert_relative_eq!(*lm.mean(), Vector3::new(2.0, 3.0, 4.0));
        assert_relative_eq!(lm.uncertainty(), 0.75);
        assert_eq!(lm.position_history().len(), 2);
    }

    #[test]
    fn test_rejects_bad_covariance() {
        let bad = Matrix3::from_diagonal(&Vector3::new(-1.0, 1.0, 1.0));
        assert!(Landmark::new(0, Vector3::zeros(), bad).is_err());

        let mut lm = Landmark::new(0, Vector3::zeros(), Matrix3::identity()).unwrap();
        assert!(lm.update_position(Vector3::new(1.0, 0.0, 0.0), bad).is_err());
        assert_relative_eq!(*lm.mean(), Vector3::zeros());
    }

    #[test]
    fn test_observing_poses_are_distinct() {
        let mut lm = Landmark::new(1, Vector3::zeros(), Matrix3::identity()).unwrap();
        for &pose_index in &[0, 2, 2, 5] {
            lm.add_observation(Observation::new(pose_index, Vector3::zeros(), Matrix3::identity()));
        }
        assert_eq!(lm.observations().len(), 4);
        assert_eq!(lm.observing_poses().into_iter().collect::<Vec<_>>(), vec![0, 2, 5]);
    }
}
