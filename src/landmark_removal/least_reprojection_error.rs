//! Least-reprojection-error removal.
//!
//! Each raw observation is mapped back into the world through the current
//! estimate of the pose that made it; the score is the mean distance between
//! those points and the landmark's position estimate. Landmarks whose
//! observations agree best with the map go first.

use crate::common::{LandmarkId, LandmarkRanker};
use crate::landmark_removal::{ascending_order, LandmarkSnapshot};
use crate::mapping::Landmark;

pub const LEAST_REPROJECTION_ERROR: &str = "least_reprojection_error_removal";

#[derive(Debug, Clone, Copy, Default)]
pub struct LeastReprojectionError;

impl LeastReprojectionError {
    /// Mean reprojection error, 0 for a landmark without usable observations
    pub fn reprojection_error(snapshot: &LandmarkSnapshot, landmark: &Landmark) -> f64 {
        let poses = snapshot.poses();
        let errors: Vec<f64> = landmark
            .observations()
            .iter()
            .filter_map(|obs| poses.get(obs.pose_index).map(|pose| obs.reproject(pose)))
            .map(|world| (world - landmark.mean()).norm())
            .collect();
        if errors.is_empty() {
            0.0
        } else {
            errors.iter().sum::<f64>() / errors.len() as f64
        }
    }
}

impl LandmarkRanker for LeastReprojectionError {
    fn name(&self) -> &'static str {
        LEAST_REPROJECTION_ERROR
    }

    fn rank(&self, snapshot: &LandmarkSnapshot) -> Vec<LandmarkId> {
        let scores = snapshot
            .landmarks()
            .iter()
            .map(|lm| (lm.id(), Self::reprojection_error(snapshot, lm)))
            .collect();
        ascending_order(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{pose_from_translation, Observation, Pose3};
    use approx::assert_relative_eq;
    use nalgebra::{Matrix3, Vector3};

    fn landmark_with_offsets(id: LandmarkId, offsets: &[f64]) -> Landmark {
        let mut lm = Landmark::new(id, Vector3::new(5.0, 0.0, 0.0), Matrix3::identity()).unwrap();
        for (index, offset) in offsets.iter().enumerate() {
            // pose `index` sits at (index, 0, 0)
            let relative = Vector3::new(5.0 - index as f64 + offset, 0.0, 0.0);
            lm.add_observation(Observation::new(index, relative, Matrix3::identity()));
        }
        lm
    }

    fn poses() -> Vec<Pose3> {
        (0..3)
            .map(|i| pose_from_translation(&Vector3::new(i as f64, 0.0, 0.0)))
            .collect()
    }

    #[test]
    fn test_mean_distance() {
        let lm = landmark_with_offsets(1, &[0.0, 0.2, -0.4]);
        let snap = LandmarkSnapshot::new(vec![lm.clone()], poses(), vec![Matrix3::identity(); 3]);
        assert_relative_eq!(
            LeastReprojectionError::reprojection_error(&snap, &lm),
            0.2,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_rank_by_error() {
        let landmarks = vec![
            landmark_with_offsets(1, &[0.5, 0.5]),
            landmark_with_offsets(2, &[0.1]),
            landmark_with_offsets(3, &[]),
            landmark_with_offsets(4, &[0.0, 0.0, 0.0]),
        ];
        let snap = LandmarkSnapshot::new(landmarks, poses(), vec![Matrix3::identity(); 3]);
        // 3 (unobserved) and 4 (exact) both score 0
        assert_eq!(LeastReprojectionError.rank(&snap), vec![3, 4, 2, 1]);
    }

    #[test]
    fn test_rotated_pose() {
        use nalgebra::{Isometry3, Translation3, UnitQuaternion};

        let pose = Isometry3::from_parts(
            Translation3::new(1.0, 0.0, 0.0),
            UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2),
        );
        let mut lm = Landmark::new(0, Vector3::new(1.0, 2.0, 0.0), Matrix3::identity()).unwrap();
        // two metres ahead along the rotated x axis is +y in the world
        lm.add_observation(Observation::new(0, Vector3::new(2.0, 0.0, 0.0), Matrix3::identity()));
        let snap = LandmarkSnapshot::new(vec![lm.clone()], vec![pose], vec![Matrix3::identity()]);
        assert_relative_eq!(LeastReprojectionError::reprojection_error(&snap, &lm), 0.0, epsilon = 1e-12);
    }
}
