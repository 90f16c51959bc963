//! Max-uncertainty removal: landmarks with the largest covariance trace go first

use crate::common::{LandmarkId, LandmarkRanker};
use crate::landmark_removal::{descending_order, LandmarkSnapshot};

pub const MAX_UNCERTAINTY: &str = "max_uncertainty_removal";

#[derive(Debug, Clone, Copy, Default)]
pub struct MaxUncertainty;

impl LandmarkRanker for MaxUncertainty {
    fn name(&self) -> &'static str {
        MAX_UNCERTAINTY
    }

    fn rank(&self, snapshot: &LandmarkSnapshot) -> Vec<LandmarkId> {
        let scores = snapshot
            .landmarks()
            .iter()
            .map(|lm| (lm.id(), lm.uncertainty()))
            .collect();
        descending_order(scores)
    }
}
