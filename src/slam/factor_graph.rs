//! StateGraph: an append-only factor graph over 6-DOF poses and 3-DOF
//! landmark points.
//!
//! Poses are perturbed on the right, `X ⊕ [δ; v] = (R Exp(δ), t + R v)`, so
//! every pose tangent vector is ordered `[rotation; translation]`. The
//! information matrix `H` and gradient `b` are accumulated factor by factor
//! and solved with a dense Cholesky factorization.
//!
//! Ref:
//! [A Tutorial on Graph-Based SLAM]
//! http://www2.informatik.uni-freiburg.de/~stachnis/pdf/grisetti10titsmag.pdf

use std::collections::BTreeMap;

use log::debug;
use nalgebra::{DMatrix, DVector, Matrix3, Translation3, UnitQuaternion, Vector3, Vector6};

use crate::common::{skew, LandmarkId, Pose3, Position3, SlamError, SlamResult};
use crate::slam::NoiseModel;

pub const POSE_DIM: usize = 6;
pub const POINT_DIM: usize = 3;

/// Variable key; poses order before landmarks in the linear system
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    Pose(usize),
    Landmark(LandmarkId),
}

impl Key {
    pub fn dim(&self) -> usize {
        match self {
            Key::Pose(_) => POSE_DIM,
            Key::Landmark(_) => POINT_DIM,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Variable {
    Pose(Pose3),
    Point(Position3),
}

#[derive(Debug, Clone)]
pub enum Factor {
    /// Absolute prior on a pose
    Prior { key: usize, prior: Pose3, noise: NoiseModel },
    /// Relative motion `delta` from pose `from` to pose `to`
    Between { from: usize, to: usize, delta: Pose3, noise: NoiseModel },
    /// Landmark position measured in the frame of `pose`
    LandmarkObservation {
        pose: usize,
        landmark: LandmarkId,
        relative: Position3,
        noise: NoiseModel,
    },
}

/// One linearized factor: Jacobian blocks per key, error and information
struct LinearFactor {
    blocks: Vec<(Key, DMatrix<f64>)>,
    error: DVector<f64>,
    information: DMatrix<f64>,
}

/// Normal equations `H dx = -b` around the current values
#[derive(Debug, Clone)]
pub struct LinearSystem {
    pub h: DMatrix<f64>,
    pub b: DVector<f64>,
    pub cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizationSummary {
    pub iterations: usize,
    pub initial_cost: f64,
    pub final_cost: f64,
}

fn rotation_matrix(pose: &Pose3) -> Matrix3<f64> {
    pose.rotation.to_rotation_matrix().into_inner()
}

/// Local coordinates of `b` relative to `a`: `[Log(Ra^T Rb); Ra^T (tb - ta)]`
fn local(a: &Pose3, b: &Pose3) -> Vector6<f64> {
    let rot = (a.rotation.inverse() * b.rotation).scaled_axis();
    let trans = a.rotation.inverse_transform_vector(&(b.translation.vector - a.translation.vector));
    Vector6::new(rot[0], rot[1], rot[2], trans[0], trans[1], trans[2])
}

fn retract_pose(pose: &Pose3, delta: &[f64]) -> Pose3 {
    let omega = Vector3::new(delta[0], delta[1], delta[2]);
    let v = Vector3::new(delta[3], delta[4], delta[5]);
    let translation = pose.translation.vector + pose.rotation * v;
    let rotation = pose.rotation * UnitQuaternion::from_scaled_axis(omega);
    Pose3::from_parts(Translation3::from(translation), rotation)
}

fn pose_jacobian(rot: &Matrix3<f64>, trans_rot: &Matrix3<f64>, trans: &Matrix3<f64>) -> DMatrix<f64> {
    let mut j = DMatrix::zeros(POSE_DIM, POSE_DIM);
    j.fixed_view_mut::<3, 3>(0, 0).copy_from(rot);
    j.fixed_view_mut::<3, 3>(3, 0).copy_from(trans_rot);
    j.fixed_view_mut::<3, 3>(3, 3).copy_from(trans);
    j
}

impl Factor {
    pub fn keys(&self) -> Vec<Key> {
        match self {
            Factor::Prior { key, .. } => vec![Key::Pose(*key)],
            Factor::Between { from, to, .. } => vec![Key::Pose(*from), Key::Pose(*to)],
            Factor::LandmarkObservation { pose, landmark, .. } => {
                vec![Key::Pose(*pose), Key::Landmark(*landmark)]
            }
        }
    }

    pub fn noise(&self) -> &NoiseModel {
        match self {
            Factor::Prior { noise, .. }
            | Factor::Between { noise, .. }
            | Factor::LandmarkObservation { noise, .. } => noise,
        }
    }

    fn linearize(&self, values: &BTreeMap<Key, Variable>) -> SlamResult<LinearFactor> {
        let information = self.noise().information();
        match self {
            Factor::Prior { key, prior, .. } => {
                let x = lookup_pose(values, *key)?;
                let error = local(prior, x);
                let rz_t = rotation_matrix(prior).transpose();
                let j = pose_jacobian(&Matrix3::identity(), &Matrix3::zeros(), &(rz_t * rotation_matrix(x)));
                Ok(LinearFactor {
                    blocks: vec![(Key::Pose(*key), j)],
                    error: DVector::from_column_slice(error.as_slice()),
                    information,
                })
            }
            Factor::Between { from, to, delta, .. } => {
                let xi = lookup_pose(values, *from)?;
                let xj = lookup_pose(values, *to)?;
                let rel = xi.inverse() * xj;
                let error = local(delta, &rel);

                let rz_t = rotation_matrix(delta).transpose();
                let r_rel = rotation_matrix(&rel);
                let t_rel = rel.translation.vector;

                let ji = pose_jacobian(&(-r_rel.transpose()), &(rz_t * skew(&t_rel)), &(-rz_t));
                let jj = pose_jacobian(&Matrix3::identity(), &Matrix3::zeros(), &(rz_t * r_rel));
                Ok(LinearFactor {
                    blocks: vec![(Key::Pose(*from), ji), (Key::Pose(*to), jj)],
                    error: DVector::from_column_slice(error.as_slice()),
                    information,
                })
            }
            Factor::LandmarkObservation { pose, landmark, relative, .. } => {
                let x = lookup_pose(values, *pose)?;
                let p = lookup_point(values, *landmark)?;
                let r_t = rotation_matrix(x).transpose();
                let local_point = r_t * (p - x.translation.vector);
                let error = local_point - relative;

                let mut j_pose = DMatrix::zeros(POINT_DIM, POSE_DIM);
                j_pose.fixed_view_mut::<3, 3>(0, 0).copy_from(&skew(&local_point));
                j_pose.fixed_view_mut::<3, 3>(0, 3).copy_from(&(-Matrix3::identity()));
                let j_point = DMatrix::from_column_slice(3, 3, r_t.as_slice());
                Ok(LinearFactor {
                    blocks: vec![(Key::Pose(*pose), j_pose), (Key::Landmark(*landmark), j_point)],
                    error: DVector::from_column_slice(error.as_slice()),
                    information,
                })
            }
        }
    }
}

fn lookup_pose(values: &BTreeMap<Key, Variable>, index: usize) -> SlamResult<&Pose3> {
    match values.get(&Key::Pose(index)) {
        Some(Variable::Pose(pose)) => Ok(pose),
        _ => Err(SlamError::IllegalState(format!("pose variable {} does not exist", index))),
    }
}

fn lookup_point(values: &BTreeMap<Key, Variable>, id: LandmarkId) -> SlamResult<&Position3> {
    match values.get(&Key::Landmark(id)) {
        Some(Variable::Point(p)) => Ok(p),
        _ => Err(SlamError::IllegalState(format!("landmark variable {} does not exist", id))),
    }
}

/// Fill H matrix and b vector for one linearized factor
fn fill_h_and_b(
    h: &mut DMatrix<f64>,
    b: &mut DVector<f64>,
    offsets: &BTreeMap<Key, usize>,
    factor: &LinearFactor,
) {
    let omega_e = &factor.information * &factor.error;
    for (key_a, j_a) in &factor.blocks {
        let oa = offsets[key_a];
        let jt_omega = j_a.transpose() * &factor.information;

        let mut b_block = b.rows_mut(oa, key_a.dim());
        b_block += j_a.transpose() * &omega_e;

        for (key_b, j_b) in &factor.blocks {
            let ob = offsets[key_b];
            let mut h_block = h.view_mut((oa, ob), (key_a.dim(), key_b.dim()));
            h_block += &jt_omega * j_b;
        }
    }
}

/// Append-only network of variables and factors
#[derive(Debug, Clone, Default)]
pub struct StateGraph {
    factors: Vec<Factor>,
    values: BTreeMap<Key, Variable>,
}

impl StateGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_factors(&self) -> usize {
        self.factors.len()
    }

    pub fn num_poses(&self) -> usize {
        self.values.keys().filter(|k| matches!(k, Key::Pose(_))).count()
    }

    pub fn num_landmarks(&self) -> usize {
        self.values.keys().filter(|k| matches!(k, Key::Landmark(_))).count()
    }

    pub fn factors(&self) -> &[Factor] {
        &self.factors
    }

    pub fn contains(&self, key: Key) -> bool {
        self.values.contains_key(&key)
    }

    pub fn pose(&self, index: usize) -> Option<&Pose3> {
        lookup_pose(&self.values, index).ok()
    }

    pub fn landmark(&self, id: LandmarkId) -> Option<&Position3> {
        lookup_point(&self.values, id).ok()
    }

    /// Current pose values in index order
    pub fn poses(&self) -> Vec<Pose3> {
        self.values
            .values()
            .filter_map(|v| match v {
                Variable::Pose(p) => Some(*p),
                Variable::Point(_) => None,
            })
            .collect()
    }

    pub fn add_pose(&mut self, index: usize, initial: Pose3) -> SlamResult<()> {
        self.insert_value(Key::Pose(index), Variable::Pose(initial))
    }

    pub fn add_landmark(&mut self, id: LandmarkId, initial: Position3) -> SlamResult<()> {
        self.insert_value(Key::Landmark(id), Variable::Point(initial))
    }

    fn insert_value(&mut self, key: Key, value: Variable) -> SlamResult<()> {
        if self.values.contains_key(&key) {
            return Err(SlamError::IllegalState(format!("variable {:?} already exists", key)));
        }
        self.values.insert(key, value);
        Ok(())
    }

    /// Attach a factor; its keys must exist and its noise model must match the residual size.
    pub fn add_factor(&mut self, factor: Factor) -> SlamResult<()> {
        for key in factor.keys() {
            if !self.values.contains_key(&key) {
                return Err(SlamError::IllegalState(format!(
                    "factor references missing variable {:?}",
                    key
                )));
            }
        }
        let residual_dim = match factor {
            Factor::Prior { .. } | Factor::Between { .. } => POSE_DIM,
            Factor::LandmarkObservation { .. } => POINT_DIM,
        };
        if factor.noise().dim() != residual_dim {
            return Err(SlamError::InvalidInput(format!(
                "noise model has dimension {}, factor needs {}",
                factor.noise().dim(),
                residual_dim
            )));
        }
        self.factors.push(factor);
        Ok(())
    }

    /// Column offset of every variable in the linear system, plus the total size
    fn ordering(&self) -> (BTreeMap<Key, usize>, usize) {
        let mut offsets = BTreeMap::new();
        let mut n = 0;
        for key in self.values.keys() {
            offsets.insert(*key, n);
            n += key.dim();
        }
        (offsets, n)
    }

    /// Linearize every factor around the current values
    pub fn linearize(&self) -> SlamResult<LinearSystem> {
        let (offsets, n) = self.ordering();
        let mut h = DMatrix::<f64>::zeros(n, n);
        let mut b = DVector::<f64>::zeros(n);
        let mut cost = 0.0;

        for factor in &self.factors {
            let linear = factor.linearize(&self.values)?;
            cost += (linear.error.transpose() * &linear.information * &linear.error)[(0, 0)];
            fill_h_and_b(&mut h, &mut b, &offsets, &linear);
        }

        Ok(LinearSystem { h, b, cost })
    }

    /// Batch Gauss-Newton over all variables.
    ///
    /// Stops when `dx·dx` drops below `threshold` or after `max_iterations`.
    pub fn optimize(&mut self, max_iterations: usize, threshold: f64) -> SlamResult<OptimizationSummary> {
        let (offsets, _) = self.ordering();
        let initial_cost = self.linearize()?.cost;
        let mut final_cost = initial_cost;
        let mut iterations = 0;
        if initial_cost <= f64::EPSILON {
            // already at the minimum, the gradient is zero
            return Ok(OptimizationSummary { iterations, initial_cost, final_cost });
        }

        for itr in 0..max_iterations {
            let system = self.linearize()?;
            let chol = system.h.cholesky().ok_or_else(|| {
                SlamError::SingularSystem("information matrix is not positive definite".to_string())
            })?;
            let dx = -chol.solve(&system.b);
            self.retract(&offsets, &dx);
            iterations = itr + 1;

            let diff = dx.dot(&dx);
            debug!("iteration: {}, cost: {:.6}, diff: {:.6e}", iterations, system.cost, diff);
            if diff < threshold {
                break;
            }
        }

        if iterations > 0 {
            final_cost = self.linearize()?.cost;
        }
        Ok(OptimizationSummary { iterations, initial_cost, final_cost })
    }

    fn retract(&mut self, offsets: &BTreeMap<Key, usize>, dx: &DVector<f64>) {
        for (key, value) in self.values.iter_mut() {
            let o = offsets[key];
            let delta: Vec<f64> = dx.rows(o, key.dim()).iter().copied().collect();
            match value {
                Variable::Pose(pose) => *pose = retract_pose(pose, &delta),
                Variable::Point(p) => *p += Vector3::new(delta[0], delta[1], delta[2]),
            }
        }
    }

    /// Marginal covariance of one variable, in its tangent space.
    ///
    /// Fails with `SingularSystem` when the information matrix cannot be
    /// factorized (under-constrained graph).
    pub fn marginal_covariance(&self, key: Key) -> SlamResult<DMatrix<f64>> {
        let (offsets, n) = self.ordering();
        let offset = *offsets
            .get(&key)
            .ok_or_else(|| SlamError::IllegalState(format!("variable {:?} does not exist", key)))?;
        let dim = key.dim();

        let system = self.linearize()?;
        let chol = system.h.cholesky().ok_or_else(|| {
            SlamError::SingularSystem(format!("cannot eliminate information matrix for {:?}", key))
        })?;

        let mut selector = DMatrix::<f64>::zeros(n, dim);
        for i in 0..dim {
            selector[(offset + i, i)] = 1.0;
        }
        let columns = chol.solve(&selector);
        let marginal = columns.rows(offset, dim).into_owned();
        let symmetric = (&marginal + marginal.transpose()) * 0.5;
        if symmetric.iter().any(|v| !v.is_finite()) {
            return Err(SlamError::SingularSystem(format!(
                "marginal covariance of {:?} is not finite",
                key
            )));
        }
        Ok(symmetric)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::pose_from_translation;
    use approx::assert_relative_eq;

    fn chain(n: usize) -> StateGraph {
        let mut graph = StateGraph::new();
        graph.add_pose(0, Pose3::identity()).unwrap();
        graph
            .add_factor(Factor::Prior { key: 0, prior: Pose3::identity(), noise: NoiseModel::default() })
            .unwrap();
        let delta = pose_from_translation(&Vector3::new(1.0, 0.0, 0.0));
        for i in 1..n {
            let prev = *graph.pose(i - 1).unwrap();
            graph.add_pose(i, prev * delta).unwrap();
            graph
                .add_factor(Factor::Between { from: i - 1, to: i, delta, noise: NoiseModel::default() })
                .unwrap();
        }
        graph
    }

    #[test]
    fn test_local_and_retract_are_inverse() {
        let a = Pose3::new(Vector3::new(1.0, 2.0, 3.0), Vector3::new(0.1, -0.2, 0.3));
        let xi = [0.05, -0.02, 0.01, 0.3, -0.1, 0.2];
        let b = retract_pose(&a, &xi);
        let back = local(&a, &b);
        for i in 0..6 {
            assert_relative_eq!(back[i], xi[i], epsilon = 1e-9);
        }
    }

    #[test]
    fn test_consistent_chain_has_zero_cost() {
        let graph = chain(4);
        let system = graph.linearize().unwrap();
        assert_eq!(system.h.nrows(), 24);
        assert_relative_eq!(system.cost, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_marginal_grows_along_chain() {
        let graph = chain(4);
        let first = graph.marginal_covariance(Key::Pose(0)).unwrap();
        let last = graph.marginal_covariance(Key::Pose(3)).unwrap();

        // prior only: sigma^2 on the diagonal
        assert_relative_eq!(first[(3, 3)], 0.01, epsilon = 1e-9);
        assert!(last.trace() > first.trace());
        assert_relative_eq!(last.clone(), last.transpose(), epsilon = 1e-12);
    }

    #[test]
    fn test_pure_translation_chain_marginal() {
        // along a translation-only chain the translational variances add up,
        // plus the lever arm of the accumulated rotational uncertainty
        let graph = chain(2);
        let cov = graph.marginal_covariance(Key::Pose(1)).unwrap();
        assert_relative_eq!(cov[(3, 3)], 0.02, epsilon = 1e-9);
        assert!(cov[(4, 4)] > 0.02);
    }

    #[test]
    fn test_optimize_recovers_from_perturbation() {
        let mut graph = StateGraph::new();
        graph.add_pose(0, Pose3::identity()).unwrap();
        graph.add_pose(1, pose_from_translation(&Vector3::new(1.3, -0.2, 0.1))).unwrap();
        graph
            .add_factor(Factor::Prior { key: 0, prior: Pose3::identity(), noise: NoiseModel::default() })
            .unwrap();
        graph
            .add_factor(Factor::Between {
                from: 0,
                to: 1,
                delta: pose_from_translation(&Vector3::new(1.0, 0.0, 0.0)),
                noise: NoiseModel::default(),
            })
            .unwrap();

        let summary = graph.optimize(10, 1e-10).unwrap();
        assert!(summary.final_cost < summary.initial_cost);
        let pose = graph.pose(1).unwrap();
        assert_relative_eq!(pose.translation.vector, Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_landmark_observation_factor() {
        let mut graph = chain(2);
        graph.add_landmark(7, Vector3::new(3.5, 0.5, 0.0)).unwrap();
        let noise = NoiseModel::gaussian(DMatrix::identity(3, 3) * 0.01).unwrap();
        for pose in 0..2 {
            let relative = Vector3::new(3.0 - pose as f64, 0.0, 0.0);
            graph
                .add_factor(Factor::LandmarkObservation { pose, landmark: 7, relative, noise: noise.clone() })
                .unwrap();
        }

        graph.optimize(20, 1e-12).unwrap();
        assert_relative_eq!(*graph.landmark(7).unwrap(), Vector3::new(3.0, 0.0, 0.0), epsilon = 1e-6);
        assert_eq!(graph.num_landmarks(), 1);
        assert_eq!(graph.num_poses(), 2);
    }

    #[test]
    fn test_factor_validation() {
        let mut graph = StateGraph::new();
        let missing = graph.add_factor(Factor::Prior { key: 0, prior: Pose3::identity(), noise: NoiseModel::default() });
        assert!(matches!(missing, Err(SlamError::IllegalState(_))));

        graph.add_pose(0, Pose3::identity()).unwrap();
        let wrong_dim = graph.add_factor(Factor::Prior {
            key: 0,
            prior: Pose3::identity(),
            noise: NoiseModel::diagonal_sigmas(&[0.1, 0.1, 0.1]).unwrap(),
        });
        assert!(matches!(wrong_dim, Err(SlamError::InvalidInput(_))));
        assert!(graph.add_pose(0, Pose3::identity()).is_err());
    }

    #[test]
    fn test_unconstrained_graph_is_singular() {
        let mut graph = StateGraph::new();
        graph.add_pose(0, Pose3::identity()).unwrap();
        let result = graph.marginal_covariance(Key::Pose(0));
        assert!(matches!(result, Err(SlamError::SingularSystem(_))));
    }
}
