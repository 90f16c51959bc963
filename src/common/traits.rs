//! Common traits defining interfaces between the estimator, the removal engine
//! and their collaborators

use crate::common::error::SlamResult;
use crate::common::types::{Covariance3, LandmarkId};
use crate::landmark_removal::LandmarkSnapshot;

/// Trait for step-driven state estimators
pub trait StateEstimator {
    /// State type used by this estimator
    type State;
    /// Measurement type used by this estimator
    type Measurement;
    /// Control input type
    type Control: ?Sized;

    /// Advance by one control input and a batch of measurements
    fn step(&mut self, control: &Self::Control, measurements: &[Self::Measurement]) -> SlamResult<()>;

    /// Get current state estimate, `None` before initialization
    fn get_state(&self) -> Option<&Self::State>;

    /// Get current position covariance estimate (if applicable)
    fn get_covariance(&self) -> Option<&Covariance3> {
        None
    }
}

/// Trait for landmark-value ranking strategies.
///
/// Implementations never mutate anything: the returned order is a permutation
/// of the snapshot's landmark ids, most removable first. Removal itself is
/// applied afterwards through the map.
pub trait LandmarkRanker {
    /// Catalog name of the strategy
    fn name(&self) -> &'static str;

    /// Rank the snapshot's landmarks for removal
    fn rank(&self, snapshot: &LandmarkSnapshot) -> Vec<LandmarkId>;
}
