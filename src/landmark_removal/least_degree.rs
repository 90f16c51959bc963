//! Least-degree removal: landmarks seen from the fewest poses go first

use crate::common::{LandmarkId, LandmarkRanker};
use crate::landmark_removal::{ascending_order, LandmarkSnapshot};

pub const LEAST_DEGREE: &str = "least_degree_removal";

#[derive(Debug, Clone, Copy, Default)]
pub struct LeastDegree;

impl LeastDegree {
    /// Number of distinct poses that observed each landmark
    pub fn degrees(snapshot: &LandmarkSnapshot) -> Vec<(LandmarkId, usize)> {
        snapshot
            .landmarks()
            .iter()
            .map(|lm| (lm.id(), snapshot.observing_poses(lm).len()))
            .collect()
    }
}

impl LandmarkRanker for LeastDegree {
    fn name(&self) -> &'static str {
        LEAST_DEGREE
    }

    fn rank(&self, snapshot: &LandmarkSnapshot) -> Vec<LandmarkId> {
        let scores = Self::degrees(snapshot)
            .into_iter()
            .map(|(id, degree)| (id, degree as f64))
            .collect();
        ascending_order(scores)
    }
}
