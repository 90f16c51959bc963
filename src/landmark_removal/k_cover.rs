//! Greedy k-cover removal.
//!
//! Up to `k` landmarks are selected so that together they are visible from as
//! many poses as possible. Landmarks outside the cover are removed first, then
//! the cover itself in reverse selection order.

use std::collections::BTreeSet;

use crate::common::{LandmarkId, LandmarkRanker};
use crate::landmark_removal::LandmarkSnapshot;

pub const K_COVER: &str = "k_cover_removal";

/// Cover size used when none is configured
pub const DEFAULT_K: usize = 1;

#[derive(Debug, Clone, Copy)]
pub struct KCover {
    pub k: usize,
}

impl KCover {
    pub fn new(k: usize) -> Self {
        KCover { k }
    }

    /// Greedily selected landmarks, in selection order.
    ///
    /// Stops after `k` picks, once every pose is covered, or when no remaining
    /// landmark covers an uncovered pose.
    pub fn select(&self, snapshot: &LandmarkSnapshot) -> Vec<LandmarkId> {
        let visibility = snapshot.visibility();
        let mut uncovered: BTreeSet<usize> = (0..snapshot.poses().len()).collect();
        let mut selected: Vec<LandmarkId> = Vec::new();

        while selected.len() < self.k && !uncovered.is_empty() {
            let mut best: Option<(LandmarkId, usize)> = None;
            for (&id, seen_from) in &visibility {
                if selected.contains(&id) {
                    continue;
                }
                let gain = seen_from.intersection(&uncovered).count();
                if gain > best.map_or(0, |(_, g)| g) {
                    best = Some((id, gain));
                }
            }
            let Some((id, _)) = best else { break };
            for index in &visibility[&id] {
                uncovered.remove(index);
            }
            selected.push(id);
        }
        selected
    }
}

impl Default for KCover {
    fn default() -> Self {
        KCover::new(DEFAULT_K)
    }
}

impl LandmarkRanker for KCover {
    fn name(&self) -> &'static str {
        K_COVER
    }

    fn rank(&self, snapshot: &LandmarkSnapshot) -> Vec<LandmarkId> {
        let selected = self.select(snapshot);
        snapshot
            .ids()
            .into_iter()
            .filter(|id| !selected.contains(id))
            .chain(selected.iter().rev().copied())
            .collect()
    }
}
