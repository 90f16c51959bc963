//! Incremental graph-based estimator
//!
//! Each step predicts the next pose from a translation-only control input,
//! grows the [`StateGraph`] by one pose variable and one odometry factor,
//! overwrites the referenced landmarks, re-solves the whole graph and publishes
//! the newest pose together with its translational marginal covariance.

use log::{debug, info, warn};
use nalgebra::{DMatrix, Matrix3, Point3};

use crate::common::{
    control_to_delta, Covariance3, LandmarkId, Measurement, Observation, Pose3, Position3,
    SlamError, SlamResult, StateEstimator,
};
use crate::mapping::{Agent, Landmark, Map};
use crate::slam::{Factor, Key, NoiseModel, StateGraph};

/// Configuration for the incremental estimator
#[derive(Debug, Clone)]
pub struct EstimatorConfig {
    /// Noise model of the prior factor on pose 0
    pub prior_noise: NoiseModel,
    /// Noise model of every odometry (between) factor
    pub odometry_noise: NoiseModel,
    /// Maximum Gauss-Newton iterations per step
    pub max_iterations: usize,
    /// Convergence threshold on `dx·dx`
    pub convergence_threshold: f64,
    /// Add landmark variables and pose-landmark factors to the graph
    pub landmarks_in_graph: bool,
    /// Create landmarks on first reference instead of ignoring unknown ids
    pub create_unknown_landmarks: bool,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            prior_noise: NoiseModel::default_pose(),
            odometry_noise: NoiseModel::default_pose(),
            max_iterations: 20,
            convergence_threshold: 1.0e-5,
            landmarks_in_graph: false,
            create_unknown_landmarks: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimatorState {
    Uninitialized,
    Active,
}

/// What a single successful step did
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub pose_index: usize,
    pub pose: Pose3,
    /// `false` when the marginal could not be extracted and the previous
    /// covariance was kept
    pub covariance_updated: bool,
    pub landmarks_updated: Vec<LandmarkId>,
    pub ignored: Vec<LandmarkId>,
}

pub struct IncrementalEstimator {
    config: EstimatorConfig,
    state: EstimatorState,
    graph: StateGraph,
    map: Map,
    poses: Vec<Pose3>,
}

impl IncrementalEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        IncrementalEstimator {
            config,
            state: EstimatorState::Uninitialized,
            graph: StateGraph::new(),
            map: Map::default(),
            poses: Vec::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(EstimatorConfig::default())
    }

    /// Create an estimator with a set of landmarks registered up front
    pub fn with_landmarks(config: EstimatorConfig, landmarks: Vec<Landmark>) -> SlamResult<Self> {
        let mut estimator = Self::new(config);
        for landmark in landmarks {
            estimator.register_landmark(landmark)?;
        }
        Ok(estimator)
    }

    pub fn register_landmark(&mut self, landmark: Landmark) -> SlamResult<()> {
        self.map.add_landmark(landmark)
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn state(&self) -> EstimatorState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == EstimatorState::Active
    }

    pub fn graph(&self) -> &StateGraph {
        &self.graph
    }

    pub fn map(&self) -> &Map {
        &self.map
    }

    /// Mutable map access for the removal engine, between steps only
    pub fn map_mut(&mut self) -> &mut Map {
        &mut self.map
    }

    pub fn agent(&self) -> &Agent {
        self.map.agent()
    }

    /// Committed trajectory, one pose per index
    pub fn poses(&self) -> &[Pose3] {
        &self.poses
    }

    pub fn pose_count(&self) -> usize {
        self.poses.len()
    }

    /// Create pose 0 with its prior and switch to the active state
    pub fn initialize(&mut self, initial_pose: Pose3) -> SlamResult<()> {
        if self.state == EstimatorState::Active {
            return Err(SlamError::IllegalState("estimator is already initialized".to_string()));
        }
        self.graph.add_pose(0, initial_pose)?;
        self.graph.add_factor(Factor::Prior {
            key: 0,
            prior: initial_pose,
            noise: self.config.prior_noise.clone(),
        })?;
        self.map.replace_agent(Agent::new(initial_pose));
        self.poses.push(initial_pose);
        self.state = EstimatorState::Active;
        info!(
            "estimator initialized at ({:.3}, {:.3}, {:.3}) with {} landmarks",
            initial_pose.translation.x,
            initial_pose.translation.y,
            initial_pose.translation.z,
            self.map.len()
        );
        Ok(())
    }

    /// Run one estimation step.
    ///
    /// Input validation happens before any state changes, so a failed step
    /// leaves the pose count untouched. A singular system during re-solving is
    /// absorbed: the predicted pose is published with the previous covariance.
    pub fn step(&mut self, control_input: &[f64], measurements: &[Measurement]) -> SlamResult<StepOutcome> {
        if self.state != EstimatorState::Active {
            return Err(SlamError::IllegalState(
                "step called before initialize".to_string(),
            ));
        }
        let delta = control_to_delta(control_input)?;
        let validated = measurements
            .iter()
            .map(|m| m.validate().map(|(mean, cov)| (m.id, mean, cov)))
            .collect::<SlamResult<Vec<_>>>()?;

        let index = self.poses.len();
        let previous = self.poses[index - 1];
        let predicted = previous * delta;

        self.graph.add_pose(index, predicted)?;
        self.graph.add_factor(Factor::Between {
            from: index - 1,
            to: index,
            delta,
            noise: self.config.odometry_noise.clone(),
        })?;

        let mut landmarks_updated = Vec::new();
        let mut ignored = Vec::new();
        for (id, mean, covariance) in validated {
            if self.commit_measurement(index, &predicted, id, mean, covariance)? {
                landmarks_updated.push(id);
            } else {
                debug!("step {}: ignoring measurement of unknown landmark {}", index, id);
                ignored.push(id);
            }
        }

        let (pose, covariance_updated) = match self.solve(index) {
            Ok((pose, covariance)) => match self.map.agent_mut().commit(pose, covariance) {
                Ok(()) => (pose, true),
                Err(e) => {
                    warn!("step {}: rejected marginal covariance: {}", index, e);
                    self.map.agent_mut().commit_pose(pose);
                    (pose, false)
                }
            },
            Err(e) => {
                warn!("step {}: keeping previous covariance: {}", index, e);
                self.map.agent_mut().commit_pose(predicted);
                (predicted, false)
            }
        };
        self.poses.push(pose);

        debug!(
            "step {}: pose ({:.3}, {:.3}, {:.3}), uncertainty {:.5}",
            index,
            pose.translation.x,
            pose.translation.y,
            pose.translation.z,
            self.map.agent().uncertainty()
        );

        Ok(StepOutcome {
            pose_index: index,
            pose,
            covariance_updated,
            landmarks_updated,
            ignored,
        })
    }

    /// Overwrite a landmark and record the raw observation.
    ///
    /// Returns `Ok(false)` when the id is unknown and lazy creation is off, or
    /// when the landmark was removed.
    fn commit_measurement(
        &mut self,
        index: usize,
        predicted: &Pose3,
        id: LandmarkId,
        mean: Position3,
        covariance: Covariance3,
    ) -> SlamResult<bool> {
        if self.map.is_removed(id) || (!self.map.contains(id) && !self.config.create_unknown_landmarks) {
            return Ok(false);
        }
        self.map.update_landmark(id, mean, covariance)?;

        let relative = predicted.inverse_transform_point(&Point3::from(mean)).coords;
        let r: Matrix3<f64> = predicted.rotation.to_rotation_matrix().into_inner();
        let body_covariance = r.transpose() * covariance * r;
        if let Some(landmark) = self.map.get_landmark_mut(id) {
            landmark.add_observation(Observation::new(index, relative, body_covariance));
        }

        if self.config.landmarks_in_graph {
            let noise = DMatrix::from_column_slice(3, 3, body_covariance.as_slice());
            match NoiseModel::gaussian(noise) {
                Ok(noise) => {
                    if !self.graph.contains(Key::Landmark(id)) {
                        self.graph.add_landmark(id, mean)?;
                    }
                    self.graph.add_factor(Factor::LandmarkObservation {
                        pose: index,
                        landmark: id,
                        relative,
                        noise,
                    })?;
                }
                Err(e) => warn!("landmark {} not added to the graph: {}", id, e),
            }
        }
        Ok(true)
    }

    /// Re-solve the graph and extract the newest pose with its translational marginal
    fn solve(&mut self, index: usize) -> SlamResult<(Pose3, Covariance3)> {
        self.graph
            .optimize(self.config.max_iterations, self.config.convergence_threshold)?;
        let pose = *self
            .graph
            .pose(index)
            .ok_or_else(|| SlamError::IllegalState(format!("pose {} missing from graph", index)))?;
        let marginal = self.graph.marginal_covariance(Key::Pose(index))?;
        let covariance: Covariance3 = marginal.fixed_view::<3, 3>(3, 3).into_owned();
        Ok((pose, covariance))
    }
}

impl StateEstimator for IncrementalEstimator {
    type State = Pose3;
    type Measurement = Measurement;
    type Control = [f64];

    fn step(&mut self, control: &[f64], measurements: &[Measurement]) -> SlamResult<()> {
        IncrementalEstimator::step(self, control, measurements).map(|_| ())
    }

    fn get_state(&self) -> Option<&Pose3> {
        if self.is_active() {
            Some(self.map.agent().pose())
        } else {
            None
        }
    }

    fn get_covariance(&self) -> Option<&Covariance3> {
        if self.is_active() {
            Some(self.map.agent().covariance())
        } else {
            None
        }
    }
}
