//! Least-informative removal.
//!
//! The joint information matrix `J` is built over pose positions and landmark
//! positions (3 DOF each): every pose carries the inverse of its recorded
//! position covariance, every landmark the inverse of its covariance, and
//! every observation the constraint information `Λ` (its covariance inverted
//! and rotated into the world frame) on the (pose, landmark) pair.
//!
//! The score of a landmark is the mutual information it shares with the rest
//! of the map, `½ (log det S_with − log det J_without)`, where `S_with` is the
//! information of the rest after marginalizing the landmark out of `J` and
//! `J_without` is `J` built without the landmark. Landmarks never constrain
//! each other directly, so eliminating every landmark onto the poses reduces
//! the score to `½ (log det M − log det (M − C_l))`, with `M` the pose-only
//! information and `C_l` the landmark's contribution to it.
//!
//! Removal is iterative: after every removal the scores are recomputed.

use std::collections::BTreeMap;

use log::debug;
use nalgebra::{DMatrix, Matrix3};

use crate::common::{Covariance3, LandmarkId, LandmarkRanker};
use crate::landmark_removal::{ascending_order, LandmarkSnapshot};
use crate::mapping::Map;

pub const LEAST_INFORMATIVE: &str = "least_informative_removal";

/// Base diagonal jitter, scaled by the mean diagonal of the matrix
const JITTER: f64 = 1.0e-9;
const MAX_JITTER_ATTEMPTS: usize = 10;

/// Log-determinant via Cholesky, regularizing with a growing diagonal jitter
/// when the matrix is not positive definite.
pub fn log_det(m: &DMatrix<f64>) -> f64 {
    let n = m.nrows();
    if n == 0 {
        return 0.0;
    }
    let scale = (m.trace().abs() / n as f64).max(1.0);
    let mut jitter = 0.0;
    for _ in 0..MAX_JITTER_ATTEMPTS {
        let mut regularized = m.clone();
        for i in 0..n {
            regularized[(i, i)] += jitter;
        }
        if let Some(chol) = regularized.cholesky() {
            return 2.0 * chol.l().diagonal().iter().map(|d| d.ln()).sum::<f64>();
        }
        jitter = if jitter == 0.0 { JITTER * scale } else { jitter * 10.0 };
    }
    f64::NEG_INFINITY
}

/// Inverse of a 3x3 covariance, jittered when singular
fn information(covariance: &Covariance3) -> Matrix3<f64> {
    let scale = (covariance.trace().abs() / 3.0).max(1.0);
    let mut jitter = 0.0;
    for _ in 0..MAX_JITTER_ATTEMPTS {
        let regularized = covariance + Matrix3::identity() * jitter;
        if let Some(chol) = regularized.cholesky() {
            return chol.inverse();
        }
        jitter = if jitter == 0.0 { JITTER * scale } else { jitter * 10.0 };
    }
    Matrix3::zeros()
}

/// Contribution of one landmark to the pose-only information matrix
#[derive(Debug, Clone)]
struct LandmarkTerm {
    /// Summed observation information per observing pose
    blocks: BTreeMap<usize, Matrix3<f64>>,
    /// Inverse of the landmark's own information block
    a_inv: Matrix3<f64>,
}

impl LandmarkTerm {
    fn build(snapshot: &LandmarkSnapshot, index: usize) -> Self {
        let landmark = &snapshot.landmarks()[index];
        let poses = snapshot.poses();
        let mut blocks: BTreeMap<usize, Matrix3<f64>> = BTreeMap::new();
        for obs in landmark.observations() {
            let Some(pose) = poses.get(obs.pose_index) else {
                continue;
            };
            let r = pose.rotation.to_rotation_matrix().into_inner();
            let lambda = r * information(&obs.covariance) * r.transpose();
            *blocks.entry(obs.pose_index).or_insert_with(Matrix3::zeros) += lambda;
        }
        let a = information(landmark.covariance()) + blocks.values().sum::<Matrix3<f64>>();
        let a_inv = a
            .try_inverse()
            .unwrap_or_else(Matrix3::zeros);
        LandmarkTerm { blocks, a_inv }
    }

    /// `m += sign * C`, with `C(i, j) = δij Λi − Λi A⁻¹ Λj`
    fn accumulate(&self, m: &mut DMatrix<f64>, sign: f64) {
        for (&i, lambda_i) in &self.blocks {
            let mut diag = m.fixed_view_mut::<3, 3>(3 * i, 3 * i);
            diag += lambda_i * sign;
            for (&j, lambda_j) in &self.blocks {
                let coupling = lambda_i * self.a_inv * lambda_j;
                let mut block = m.fixed_view_mut::<3, 3>(3 * i, 3 * j);
                block -= coupling * sign;
            }
        }
    }
}

/// Pose-only information model of a snapshot
struct InformationModel {
    pose_prior: DMatrix<f64>,
    terms: BTreeMap<LandmarkId, LandmarkTerm>,
}

impl InformationModel {
    fn build(snapshot: &LandmarkSnapshot) -> Self {
        let n = snapshot.poses().len();
        let mut pose_prior = DMatrix::zeros(3 * n, 3 * n);
        for i in 0..n {
            let cov = snapshot
                .pose_covariances()
                .get(i)
                .copied()
                .unwrap_or_else(Matrix3::identity);
            pose_prior
                .fixed_view_mut::<3, 3>(3 * i, 3 * i)
                .copy_from(&information(&cov));
        }
        let terms = snapshot
            .landmarks()
            .iter()
            .enumerate()
            .map(|(index, lm)| (lm.id(), LandmarkTerm::build(snapshot, index)))
            .collect();
        InformationModel { pose_prior, terms }
    }

    fn pose_information(&self, ids: &[LandmarkId]) -> DMatrix<f64> {
        let mut m = self.pose_prior.clone();
        for id in ids {
            if let Some(term) = self.terms.get(id) {
                term.accumulate(&mut m, 1.0);
            }
        }
        m
    }

    fn scores(&self, ids: &[LandmarkId]) -> Vec<(LandmarkId, f64)> {
        let m = self.pose_information(ids);
        let log_det_with = log_det(&m);
        ids.iter()
            .map(|&id| {
                let score = match self.terms.get(&id) {
                    Some(term) if !term.blocks.is_empty() => {
                        let mut without = m.clone();
                        term.accumulate(&mut without, -1.0);
                        0.5 * (log_det_with - log_det(&without))
                    }
                    _ => 0.0,
                };
                (id, score)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LeastInformative;

impl LeastInformative {
    /// Mutual information of every landmark with the rest of the snapshot
    pub fn scores(snapshot: &LandmarkSnapshot) -> Vec<(LandmarkId, f64)> {
        InformationModel::build(snapshot).scores(&snapshot.ids())
    }
}

impl LandmarkRanker for LeastInformative {
    fn name(&self) -> &'static str {
        LEAST_INFORMATIVE
    }

    fn rank(&self, snapshot: &LandmarkSnapshot) -> Vec<LandmarkId> {
        let model = InformationModel::build(snapshot);
        let mut remaining = snapshot.ids();
        let mut order = Vec::with_capacity(remaining.len());
        while let Some(&least) = ascending_order(model.scores(&remaining)).first() {
            remaining.retain(|&id| id != least);
            order.push(least);
        }
        order
    }
}

/// Remove the single least informative landmark from the map
pub fn remove_least_informative(map: &mut Map) -> Option<LandmarkId> {
    let snapshot = map.snapshot();
    let least = ascending_order(LeastInformative::scores(&snapshot)).into_iter().next()?;
    map.remove_landmark(least)?;
    debug!("removed least informative landmark {}, {} remaining", least, map.len());
    Some(least)
}
