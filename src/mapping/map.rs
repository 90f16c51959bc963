//! Map: the single authoritative landmark collection plus the agent.
//!
//! Removal is permanent: ids of removed landmarks are remembered and can
//! never be registered again.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::common::{Covariance3, LandmarkId, Position3, SlamError, SlamResult};
use crate::landmark_removal::LandmarkSnapshot;
use crate::mapping::{Agent, Landmark};

#[derive(Debug, Clone, Default)]
pub struct Map {
    agent: Agent,
    landmarks: BTreeMap<LandmarkId, Landmark>,
    removed: BTreeSet<LandmarkId>,
}

impl Map {
    pub fn new(agent: Agent) -> Self {
        Map {
            agent,
            landmarks: BTreeMap::new(),
            removed: BTreeSet::new(),
        }
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn agent_mut(&mut self) -> &mut Agent {
        &mut self.agent
    }

    pub(crate) fn replace_agent(&mut self, agent: Agent) {
        self.agent = agent;
    }

    /// Register a landmark. Duplicate and previously removed ids are rejected.
    pub fn add_landmark(&mut self, landmark: Landmark) -> SlamResult<()> {
        let id = landmark.id();
        if self.removed.contains(&id) {
            return Err(SlamError::InvalidInput(format!(
                "landmark {} was removed and cannot be re-added",
                id
            )));
        }
        if self.landmarks.contains_key(&id) {
            return Err(SlamError::InvalidInput(format!("landmark {} already exists", id)));
        }
        self.landmarks.insert(id, landmark);
        Ok(())
    }

    /// Remove a landmark permanently
    pub fn remove_landmark(&mut self, id: LandmarkId) -> Option<Landmark> {
        let removed = self.landmarks.remove(&id);
        if removed.is_some() {
            self.removed.insert(id);
            debug!("removed landmark {}", id);
        }
        removed
    }

    /// Overwrite a landmark's estimate, creating it if it has never existed.
    ///
    /// Returns `Ok(false)` when the id belongs to a removed landmark.
    pub fn update_landmark(
        &mut self,
        id: LandmarkId,
        mean: Position3,
        covariance: Covariance3,
    ) -> SlamResult<bool> {
        if self.removed.contains(&id) {
            return Ok(false);
        }
        match self.landmarks.get_mut(&id) {
            Some(landmark) => landmark.update_position(mean, covariance)?,
            None => {
                self.landmarks.insert(id, Landmark::new(id, mean, covariance)?);
            }
        }
        Ok(true)
    }

    pub fn get_landmark(&self, id: LandmarkId) -> Option<&Landmark> {
        self.landmarks.get(&id)
    }

    pub fn get_landmark_mut(&mut self, id: LandmarkId) -> Option<&mut Landmark> {
        self.landmarks.get_mut(&id)
    }

    pub fn contains(&self, id: LandmarkId) -> bool {
        self.landmarks.contains_key(&id)
    }

    pub fn is_removed(&self, id: LandmarkId) -> bool {
        self.removed.contains(&id)
    }

    /// Landmarks in ascending id order
    pub fn landmarks(&self) -> impl Iterator<Item = &Landmark> {
        self.landmarks.values()
    }

    pub fn ids(&self) -> Vec<LandmarkId> {
        self.landmarks.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    pub fn num_removed(&self) -> usize {
        self.removed.len()
    }

    /// Remove the first `count` landmarks of a removal order.
    ///
    /// Ids that are no longer present are skipped. Returns the ids actually removed.
    pub fn apply_removal(&mut self, order: &[LandmarkId], count: usize) -> Vec<LandmarkId> {
        order
            .iter()
            .take(count)
            .filter(|&&id| self.remove_landmark(id).is_some())
            .copied()
            .collect()
    }

    /// Consistent read-only view for the removal engine: the live landmarks and
    /// the agent's pose history with its position covariances.
    pub fn snapshot(&self) -> LandmarkSnapshot {
        let (poses, covariances) = self.agent.history().iter().cloned().unzip();
        LandmarkSnapshot::new(self.landmarks.values().cloned().collect(), poses, covariances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Matrix3, Vector3};

    fn landmark(id: LandmarkId) -> Landmark {
        Landmark::new(id, Vector3::new(id as f64, 0.0, 0.0), Matrix3::identity()).unwrap()
    }

    #[test]
    fn test_add_and_remove() {
        let mut map = Map::default();
        map.add_landmark(landmark(1)).unwrap();
        map.add_landmark(landmark(2)).unwrap();
        assert!(map.add_landmark(landmark(2)).is_err());
        assert_eq!(map.len(), 2);

        assert!(map.remove_landmark(1).is_some());
        assert!(map.remove_landmark(1).is_none());
        assert_eq!(map.ids(), vec![2]);
        assert!(map.is_removed(1));
    }

    #[test]
    fn test_removed_landmark_is_not_resurrected() {
        let mut map = Map::default();
        map.add_landmark(landmark(4)).unwrap();
        map.remove_landmark(4);

        assert!(map.add_landmark(landmark(4)).is_err());
        let updated = map
            .update_landmark(4, Vector3::new(1.0, 1.0, 1.0), Matrix3::identity())
            .unwrap();
        assert!(!updated);
        assert!(!map.contains(4));
    }

    #[test]
    fn test_update_creates_lazily() {
        let mut map = Map::default();
        assert!(map
            .update_landmark(9, Vector3::new(1.0, 2.0, 3.0), Matrix3::identity())
            .unwrap());
        assert_eq!(map.get_landmark(9).unwrap().mean(), &Vector3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_apply_removal() {
        let mut map = Map::default();
        for id in 0..5 {
            map.add_landmark(landmark(id)).unwrap();
        }
        let removed = map.apply_removal(&[3, 42, 1, 0], 3);
        assert_eq!(removed, vec![3, 1]);
        assert_eq!(map.ids(), vec![0, 2, 4]);
        assert_eq!(map.num_removed(), 2);
    }

    #[test]
    fn test_snapshot_uses_agent_history() {
        let mut map = Map::default();
        map.add_landmark(landmark(0)).unwrap();
        map.agent_mut().commit_pose(crate::common::Pose3::identity());

        let snapshot = map.snapshot();
        assert_eq!(snapshot.poses().len(), 2);
        assert_eq!(snapshot.ids(), vec![0]);
    }
}
