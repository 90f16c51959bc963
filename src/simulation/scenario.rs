//! Synthetic landmark world.
//!
//! The agent follows a closed loop around the origin with a slow vertical
//! oscillation. Controls are the true translation deltas corrupted with
//! Gaussian noise; every landmark within `max_range` of the true pose is
//! measured with its id and a noisy world-frame position.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use log::debug;
use nalgebra::{Matrix3, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal, Uniform};

use crate::common::{pose_from_translation, LandmarkId, Measurement, Pose3, Position3, SlamError, SlamResult};
use crate::mapping::Landmark;

/// Smallest measurement variance handed to the estimator
const MIN_VARIANCE: f64 = 1.0e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioConfig {
    /// Number of control steps
    pub steps: usize,
    pub num_landmarks: usize,
    /// Landmarks are drawn from the cube `[-world_extent, world_extent]^3`
    pub world_extent: f64,
    /// Maximum observation range [m]
    pub max_range: f64,
    /// Standard deviation of each control component [m]
    pub control_noise: f64,
    /// Standard deviation of each measured landmark coordinate [m]
    pub measurement_noise: f64,
    pub seed: u64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        ScenarioConfig {
            steps: 50,
            num_landmarks: 30,
            world_extent: 10.0,
            max_range: 8.0,
            control_noise: 0.05,
            measurement_noise: 0.1,
            seed: 42,
        }
    }
}

impl ScenarioConfig {
    pub fn validate(&self) -> SlamResult<()> {
        if !(self.world_extent.is_finite() && self.world_extent > 0.0) {
            return Err(SlamError::Config(format!(
                "world_extent must be positive, got {}",
                self.world_extent
            )));
        }
        if !(self.max_range.is_finite() && self.max_range >= 0.0) {
            return Err(SlamError::Config(format!("max_range must be non-negative, got {}", self.max_range)));
        }
        for (name, value) in [("control_noise", self.control_noise), ("measurement_noise", self.measurement_noise)] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(SlamError::Config(format!("{} must be non-negative, got {}", name, value)));
            }
        }
        Ok(())
    }
}

/// Everything a run needs: inputs for the estimator and the truth to score against
#[derive(Debug, Clone)]
pub struct Scenario {
    pub initial_pose: Pose3,
    /// Initial landmark estimates registered before the first step
    pub landmarks: Vec<Landmark>,
    /// One noisy control per step
    pub controls: Vec<[f64; 3]>,
    /// One measurement batch per step, taken at the pose reached by that step
    pub measurements: Vec<Vec<Measurement>>,
    /// True poses, `steps + 1` entries starting with the initial pose
    pub ground_truth: Vec<Pose3>,
    pub true_landmarks: BTreeMap<LandmarkId, Position3>,
}

impl Scenario {
    pub fn generate(config: &ScenarioConfig) -> SlamResult<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let control_noise = normal(config.control_noise)?;
        let measurement_noise = normal(config.measurement_noise)?;
        let placement = Uniform::new_inclusive(-config.world_extent, config.world_extent);

        let variance = (config.measurement_noise * config.measurement_noise).max(MIN_VARIANCE);
        let covariance = Matrix3::identity() * variance;

        let true_landmarks: BTreeMap<LandmarkId, Position3> = (0..config.num_landmarks as LandmarkId)
            .map(|id| {
                let p = Vector3::new(
                    placement.sample(&mut rng),
                    placement.sample(&mut rng),
                    placement.sample(&mut rng),
                );
                (id, p)
            })
            .collect();

        let landmarks = true_landmarks
            .iter()
            .map(|(&id, p)| Landmark::new(id, p + noise_vector(&measurement_noise, &mut rng), covariance))
            .collect::<SlamResult<Vec<_>>>()?;

        let positions: Vec<Position3> = (0..=config.steps)
            .map(|t| loop_position(t, config.steps, config.world_extent))
            .collect();
        let ground_truth: Vec<Pose3> = positions.iter().map(pose_from_translation).collect();

        let mut controls = Vec::with_capacity(config.steps);
        let mut measurements = Vec::with_capacity(config.steps);
        for window in positions.windows(2) {
            let delta = window[1] - window[0] + noise_vector(&control_noise, &mut rng);
            controls.push([delta.x, delta.y, delta.z]);

            let batch: Vec<Measurement> = true_landmarks
                .iter()
                .filter(|(_, p)| (*p - window[1]).norm() <= config.max_range)
                .map(|(&id, p)| Measurement::new(id, p + noise_vector(&measurement_noise, &mut rng), covariance))
                .collect();
            measurements.push(batch);
        }

        debug!(
            "generated scenario: {} steps, {} landmarks, {} measurements",
            config.steps,
            config.num_landmarks,
            measurements.iter().map(Vec::len).sum::<usize>()
        );

        Ok(Scenario {
            initial_pose: ground_truth[0],
            landmarks,
            controls,
            measurements,
            ground_truth,
            true_landmarks,
        })
    }

    pub fn steps(&self) -> usize {
        self.controls.len()
    }
}

fn normal(std_dev: f64) -> SlamResult<Normal<f64>> {
    Normal::new(0.0, std_dev).map_err(|e| SlamError::Config(format!("invalid noise level {}: {}", std_dev, e)))
}

fn noise_vector(dist: &Normal<f64>, rng: &mut StdRng) -> Vector3<f64> {
    Vector3::new(dist.sample(rng), dist.sample(rng), dist.sample(rng))
}

/// True position after `t` of `steps` steps on the loop
fn loop_position(t: usize, steps: usize, extent: f64) -> Position3 {
    let phase = 2.0 * PI * t as f64 / steps.max(1) as f64;
    let radius = extent / 2.0;
    Vector3::new(
        radius * phase.cos(),
        radius * phase.sin(),
        0.1 * extent * (2.0 * phase).sin(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_scenario_shapes() {
        let config = ScenarioConfig { steps: 12, num_landmarks: 7, ..Default::default() };
        let scenario = Scenario::generate(&config).unwrap();
        assert_eq!(scenario.steps(), 12);
        assert_eq!(scenario.measurements.len(), 12);
        assert_eq!(scenario.ground_truth.len(), 13);
        assert_eq!(scenario.landmarks.len(), 7);
        assert_eq!(scenario.true_landmarks.len(), 7);
        assert_eq!(scenario.initial_pose, scenario.ground_truth[0]);
    }

    #[test]
    fn test_same_seed_same_world() {
        let config = ScenarioConfig::default();
        let a = Scenario::generate(&config).unwrap();
        let b = Scenario::generate(&config).unwrap();
        assert_eq!(a.controls, b.controls);
        assert_eq!(a.true_landmarks, b.true_landmarks);

        let c = Scenario::generate(&ScenarioConfig { seed: 7, ..config }).unwrap();
        assert_ne!(a.true_landmarks, c.true_landmarks);
    }

    #[test]
    fn test_noise_free_controls_follow_ground_truth() {
        let config = ScenarioConfig {
            control_noise: 0.0,
            measurement_noise: 0.0,
            ..Default::default()
        };
        let scenario = Scenario::generate(&config).unwrap();
        let mut position = scenario.initial_pose.translation.vector;
        for (control, truth) in scenario.controls.iter().zip(&scenario.ground_truth[1..]) {
            position += Vector3::new(control[0], control[1], control[2]);
            assert_relative_eq!(position, truth.translation.vector, epsilon = 1e-9);
        }
        // the loop closes on itself
        assert_relative_eq!(position, scenario.initial_pose.translation.vector, epsilon = 1e-9);
    }

    #[test]
    fn test_measurements_respect_range() {
        let config = ScenarioConfig { max_range: 5.0, measurement_noise: 0.0, ..Default::default() };
        let scenario = Scenario::generate(&config).unwrap();
        for (batch, truth) in scenario.measurements.iter().zip(&scenario.ground_truth[1..]) {
            for m in batch {
                let (mean, _) = m.validate().unwrap();
                assert!((mean - truth.translation.vector).norm() <= 5.0 + 1e-9);
                assert_relative_eq!(mean, scenario.true_landmarks[&m.id], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_invalid_config() {
        let config = ScenarioConfig { world_extent: 0.0, ..Default::default() };
        assert!(matches!(Scenario::generate(&config), Err(SlamError::Config(_))));
        let config = ScenarioConfig { control_noise: -1.0, ..Default::default() };
        assert!(Scenario::generate(&config).is_err());
    }
}
