//! Landmark-value ranking and removal.
//!
//! Every strategy ranks an immutable [`LandmarkSnapshot`] and returns a
//! removal order (a permutation of the snapshot's ids, most removable first).
//! Removal is applied separately through [`Map::apply_removal`] so that the
//! rankers never touch the map.

pub mod k_cover;
pub mod least_degree;
pub mod least_informative;
pub mod least_reprojection_error;
pub mod max_uncertainty;

pub use k_cover::*;
pub use least_degree::*;
pub use least_informative::*;
pub use least_reprojection_error::*;
pub use max_uncertainty::*;

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use itertools::Itertools;
use log::info;
use ordered_float::OrderedFloat;

use crate::common::{Covariance3, LandmarkId, LandmarkRanker, Pose3, SlamError};
use crate::mapping::{Landmark, Map};

/// Read-only view of the map handed to the rankers
#[derive(Debug, Clone, Default)]
pub struct LandmarkSnapshot {
    landmarks: Vec<Landmark>,
    poses: Vec<Pose3>,
    pose_covariances: Vec<Covariance3>,
}

impl LandmarkSnapshot {
    /// Landmarks are sorted by id; `poses` and `pose_covariances` are indexed by pose index
    pub fn new(mut landmarks: Vec<Landmark>, poses: Vec<Pose3>, pose_covariances: Vec<Covariance3>) -> Self {
        landmarks.sort_by_key(|lm| lm.id());
        LandmarkSnapshot {
            landmarks,
            poses,
            pose_covariances,
        }
    }

    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    pub fn poses(&self) -> &[Pose3] {
        &self.poses
    }

    pub fn pose_covariances(&self) -> &[Covariance3] {
        &self.pose_covariances
    }

    pub fn ids(&self) -> Vec<LandmarkId> {
        self.landmarks.iter().map(|lm| lm.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    /// Poses of this snapshot that observed the landmark
    pub fn observing_poses(&self, landmark: &Landmark) -> BTreeSet<usize> {
        landmark
            .observing_poses()
            .into_iter()
            .filter(|&index| index < self.poses.len())
            .collect()
    }

    /// Visibility relation: landmark id -> observing pose indices
    pub fn visibility(&self) -> BTreeMap<LandmarkId, BTreeSet<usize>> {
        self.landmarks
            .iter()
            .map(|lm| (lm.id(), self.observing_poses(lm)))
            .collect()
    }
}

/// Sort `(id, score)` pairs ascending by score, ties by lowest id
pub(crate) fn ascending_order(scores: Vec<(LandmarkId, f64)>) -> Vec<LandmarkId> {
    scores
        .into_iter()
        .sorted_by_key(|&(id, score)| (OrderedFloat(score), id))
        .map(|(id, _)| id)
        .collect()
}

/// Sort `(id, score)` pairs descending by score, ties by lowest id
pub(crate) fn descending_order(scores: Vec<(LandmarkId, f64)>) -> Vec<LandmarkId> {
    scores
        .into_iter()
        .sorted_by_key(|&(id, score)| (Reverse(OrderedFloat(score)), id))
        .map(|(id, _)| id)
        .collect()
}

/// The five interchangeable removal strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalStrategy {
    LeastDegree,
    MaxUncertainty,
    KCover { k: usize },
    LeastInformative,
    LeastReprojectionError,
}

impl RemovalStrategy {
    /// Names of all strategies, in catalog order
    pub fn catalog() -> &'static [&'static str] {
        &[
            LEAST_DEGREE,
            MAX_UNCERTAINTY,
            K_COVER,
            LEAST_INFORMATIVE,
            LEAST_REPROJECTION_ERROR,
        ]
    }

    /// Parse a catalog name, using `k` for the k-cover strategy
    pub fn from_name(name: &str, k: usize) -> Result<Self, SlamError> {
        match name.trim() {
            LEAST_DEGREE => Ok(RemovalStrategy::LeastDegree),
            MAX_UNCERTAINTY => Ok(RemovalStrategy::MaxUncertainty),
            K_COVER => Ok(RemovalStrategy::KCover { k }),
            LEAST_INFORMATIVE => Ok(RemovalStrategy::LeastInformative),
            LEAST_REPROJECTION_ERROR => Ok(RemovalStrategy::LeastReprojectionError),
            other => Err(SlamError::InvalidInput(format!(
                "unknown removal strategy '{}', expected one of: {}",
                other,
                Self::catalog().join(", ")
            ))),
        }
    }

    /// All strategies, in catalog order
    pub fn all(k: usize) -> Vec<RemovalStrategy> {
        Self::catalog()
            .iter()
            .filter_map(|name| Self::from_name(name, k).ok())
            .collect()
    }
}

impl FromStr for RemovalStrategy {
    type Err = SlamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s, DEFAULT_K)
    }
}

impl fmt::Display for RemovalStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl LandmarkRanker for RemovalStrategy {
    fn name(&self) -> &'static str {
        match self {
            RemovalStrategy::LeastDegree => LEAST_DEGREE,
            RemovalStrategy::MaxUncertainty => MAX_UNCERTAINTY,
            RemovalStrategy::KCover { .. } => K_COVER,
            RemovalStrategy::LeastInformative => LEAST_INFORMATIVE,
            RemovalStrategy::LeastReprojectionError => LEAST_REPROJECTION_ERROR,
        }
    }

    fn rank(&self, snapshot: &LandmarkSnapshot) -> Vec<LandmarkId> {
        match *self {
            RemovalStrategy::LeastDegree => LeastDegree.rank(snapshot),
            RemovalStrategy::MaxUncertainty => MaxUncertainty.rank(snapshot),
            RemovalStrategy::KCover { k } => KCover::new(k).rank(snapshot),
            RemovalStrategy::LeastInformative => LeastInformative.rank(snapshot),
            RemovalStrategy::LeastReprojectionError => LeastReprojectionError.rank(snapshot),
        }
    }
}

/// Remove the first `count` ids of `order` from the map
pub fn apply_removal(map: &mut Map, order: &[LandmarkId], count: usize) -> Vec<LandmarkId> {
    let removed = map.apply_removal(order, count);
    if !removed.is_empty() {
        info!("removed {} landmarks, {} remaining", removed.len(), map.len());
    }
    removed
}

/// Rank the map with `ranker` and keep only `keep_ratio` of its landmarks.
///
/// The number kept is rounded up, so a non-empty map never loses its last
/// landmark while `keep_ratio > 0`.
pub fn minimize(map: &mut Map, ranker: &dyn LandmarkRanker, keep_ratio: f64) -> Vec<LandmarkId> {
    let total = map.len();
    let keep = ((total as f64) * keep_ratio.clamp(0.0, 1.0)).ceil() as usize;
    let count = total.saturating_sub(keep);
    if count == 0 {
        return Vec::new();
    }
    let order = ranker.rank(&map.snapshot());
    info!("{}: removing {} of {} landmarks", ranker.name(), count, total);
    apply_removal(map, &order, count)
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::mapping::Agent;

    #[test]
    fn test_snapshot_sorts_landmarks() {
        let snap = snapshot();
        let reversed = LandmarkSnapshot::new(
            snap.landmarks().iter().rev().cloned().collect(),
            snap.poses().to_vec(),
            snap.pose_covariances().to_vec(),
        );
        assert_eq!(reversed.ids(), vec![0, 1, 2, 3, 4]);
        assert!(reversed.visibility()[&0].is_empty());
        assert_eq!(reversed.visibility()[&3].len(), 3);
    }

    #[test]
    fn test_catalog_round_trip() {
        assert_eq!(RemovalStrategy::catalog().len(), 5);
        for name in RemovalStrategy::catalog() {
            let strategy: RemovalStrategy = name.parse().unwrap();
            assert_eq!(strategy.name(), *name);
        }
        assert!("random_removal".parse::<RemovalStrategy>().is_err());
        assert_eq!(
            RemovalStrategy::from_name("k_cover_removal", 3).unwrap(),
            RemovalStrategy::KCover { k: 3 }
        );
    }

    #[test]
    fn test_every_strategy_returns_permutation() {
        let snap = snapshot();
        for strategy in RemovalStrategy::all(2) {
            let order = strategy.rank(&snap);
            assert!(is_permutation(&order, &snap), "{} returned {:?}", strategy, order);
        }
    }

    #[test]
    fn test_strategies_handle_empty_snapshot() {
        let empty = LandmarkSnapshot::default();
        for strategy in RemovalStrategy::all(1) {
            assert!(strategy.rank(&empty).is_empty());
        }
    }

    #[test]
    fn test_minimize_keeps_ratio() {
        let snap = snapshot();
        let mut map = Map::new(Agent::default());
        for lm in snap.landmarks() {
            map.add_landmark(lm.clone()).unwrap();
        }
        let removed = minimize(&mut map, &RemovalStrategy::LeastDegree, 0.5);
        // ceil(5 * 0.5) = 3 kept
        assert_eq!(removed.len(), 2);
        assert_eq!(map.len(), 3);
        assert_eq!(removed[0], 0);
        assert!(minimize(&mut map, &RemovalStrategy::LeastDegree, 1.0).is_empty());
    }

    #[test]
    fn test_order_helpers_break_ties_by_id() {
        let scores = vec![(5, 1.0), (2, 1.0), (9, 0.5)];
        assert_eq!(ascending_order(scores.clone()), vec![9, 2, 5]);
        assert_eq!(descending_order(scores), vec![2, 5, 9]);
    }
}
