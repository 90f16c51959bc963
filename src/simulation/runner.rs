//! Step-driven run loop.
//!
//! For every step: estimator step, metrics against ground truth, periodic
//! landmark minimization and an optional snapshot. A failing step is recorded
//! with its index and cause and the run moves on to the next step.

use std::collections::BTreeMap;

use log::{info, warn};
use nalgebra::{Matrix3, Rotation3};
use serde::Serialize;

use crate::common::{LandmarkId, Pose3, Position3, SlamError, SlamResult};
use crate::evaluation::{compute_are, compute_ate, compute_ud, StepMetrics};
use crate::io::{SnapshotSink, StepSnapshot};
use crate::landmark_removal::{minimize, RemovalStrategy};
use crate::simulation::Scenario;
use crate::slam::{EstimatorConfig, IncrementalEstimator};

/// When and how the map is minimized during a run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemovalSchedule {
    pub strategy: RemovalStrategy,
    /// Minimize after every `interval` steps
    pub interval: usize,
    /// Fraction of the landmarks kept by each minimization
    pub keep_ratio: f64,
}

impl RemovalSchedule {
    pub fn new(strategy: RemovalStrategy) -> Self {
        RemovalSchedule {
            strategy,
            interval: 10,
            keep_ratio: 0.5,
        }
    }

    /// `interval >= 1` and `keep_ratio` in `[0, 1]`
    pub fn validate(&self) -> SlamResult<()> {
        if self.interval == 0 {
            return Err(SlamError::InvalidInput("removal interval must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.keep_ratio) {
            return Err(SlamError::InvalidInput(format!(
                "keep_ratio must lie in [0, 1], got {}",
                self.keep_ratio
            )));
        }
        Ok(())
    }

    fn is_due(&self, step: usize) -> bool {
        self.interval > 0 && (step + 1) % self.interval == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepFailure {
    pub step: usize,
    pub cause: String,
}

/// Per-step series of a run. Metric series hold one entry per successful step.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunResults {
    pub landmarks_remaining: Vec<usize>,
    pub ate_values: Vec<f64>,
    pub are_values: Vec<f64>,
    pub ud_values: Vec<f64>,
    pub failures: Vec<StepFailure>,
    pub removed: Vec<LandmarkId>,
}

impl RunResults {
    pub fn successful_steps(&self) -> usize {
        self.ate_values.len()
    }

    /// Metrics of the last successful step
    pub fn last_metrics(&self) -> Option<StepMetrics> {
        Some(StepMetrics {
            ate: *self.ate_values.last()?,
            are: *self.are_values.last()?,
            ud: *self.ud_values.last()?,
        })
    }

    fn push(&mut self, landmarks: usize, metrics: &StepMetrics) {
        self.landmarks_remaining.push(landmarks);
        self.ate_values.push(metrics.ate);
        self.are_values.push(metrics.are);
        self.ud_values.push(metrics.ud);
    }

    fn fail(&mut self, step: usize, cause: &SlamError) {
        warn!("step {} failed: {}", step, cause);
        self.failures.push(StepFailure {
            step,
            cause: cause.to_string(),
        });
    }
}

/// Build an estimator holding the scenario's landmarks, initialized at its start pose
pub fn prepare_estimator(config: EstimatorConfig, scenario: &Scenario) -> SlamResult<IncrementalEstimator> {
    let mut estimator = IncrementalEstimator::with_landmarks(config, scenario.landmarks.clone())?;
    estimator.initialize(scenario.initial_pose)?;
    Ok(estimator)
}

/// Metrics of the current trajectory; a metric that cannot be computed is NaN
pub fn step_metrics(estimator: &IncrementalEstimator, ground_truth: &[Pose3]) -> StepMetrics {
    let poses = estimator.poses();
    let truth = &ground_truth[..poses.len().min(ground_truth.len())];

    let estimated: Vec<Position3> = poses.iter().map(|p| p.translation.vector).collect();
    let expected: Vec<Position3> = truth.iter().map(|p| p.translation.vector).collect();
    let ate = compute_ate(&estimated, &expected);

    let estimated: Vec<Rotation3<f64>> = poses.iter().map(|p| p.rotation.to_rotation_matrix()).collect();
    let expected: Vec<Rotation3<f64>> = truth.iter().map(|p| p.rotation.to_rotation_matrix()).collect();
    let are = compute_are(&estimated, &expected);

    let ud = compute_ud(estimator.agent().covariance(), &Matrix3::identity());

    let value = |name: &str, result: SlamResult<f64>| {
        result.unwrap_or_else(|e| {
            warn!("{} unavailable at pose {}: {}", name, poses.len() - 1, e);
            f64::NAN
        })
    };
    StepMetrics {
        ate: value("ATE", ate),
        are: value("ARE", are),
        ud: value("UD", ud),
    }
}

/// Run the scenario through an initialized estimator
pub fn run_slam(
    estimator: &mut IncrementalEstimator,
    scenario: &Scenario,
    schedule: Option<&RemovalSchedule>,
    mut sink: Option<&mut dyn SnapshotSink>,
) -> SlamResult<RunResults> {
    if !estimator.is_active() {
        return Err(SlamError::IllegalState("run_slam needs an initialized estimator".to_string()));
    }
    if let Some(schedule) = schedule {
        schedule.validate()?;
    }
    let mut results = RunResults::default();

    for (step, (control, measurements)) in scenario.controls.iter().zip(&scenario.measurements).enumerate() {
        if let Err(e) = estimator.step(control, measurements) {
            results.fail(step, &e);
            continue;
        }

        let metrics = step_metrics(estimator, &scenario.ground_truth);
        results.push(estimator.map().len(), &metrics);

        if let Some(schedule) = schedule.filter(|s| s.is_due(step)) {
            let removed = minimize(estimator.map_mut(), &schedule.strategy, schedule.keep_ratio);
            results.removed.extend(removed);
        }

        if let Some(sink) = sink.as_deref_mut() {
            let snapshot = StepSnapshot::new(step, estimator.poses(), metrics.as_array());
            if let Err(e) = sink.record(&snapshot) {
                results.fail(step, &e);
            }
        }
    }

    info!(
        "run finished: {}/{} steps, {} landmarks remaining, {} removed",
        results.successful_steps(),
        scenario.steps(),
        estimator.map().len(),
        results.removed.len()
    );
    Ok(results)
}

/// Run the same scenario once per catalog strategy
pub fn compare_strategies(
    config: &EstimatorConfig,
    scenario: &Scenario,
    interval: usize,
    keep_ratio: f64,
    k: usize,
) -> SlamResult<BTreeMap<String, RunResults>> {
    RemovalStrategy::all(k)
        .into_iter()
        .map(|strategy| {
            info!("running strategy {}", strategy);
            let schedule = RemovalSchedule {
                strategy,
                interval,
                keep_ratio,
            };
            let mut estimator = prepare_estimator(config.clone(), scenario)?;
            let results = run_slam(&mut estimator, scenario, Some(&schedule), None)?;
            Ok((strategy.to_string(), results))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::ScenarioConfig;

    fn scenario(steps: usize) -> Scenario {
        Scenario::generate(&ScenarioConfig {
            steps,
            num_landmarks: 10,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_run_records_every_step() {
        let scenario = scenario(8);
        let mut estimator = prepare_estimator(EstimatorConfig::default(), &scenario).unwrap();
        let mut sink: Vec<StepSnapshot> = Vec::new();
        let results = run_slam(&mut estimator, &scenario, None, Some(&mut sink as &mut dyn SnapshotSink)).unwrap();

        assert!(results.failures.is_empty());
        assert_eq!(results.successful_steps(), 8);
        assert_eq!(results.landmarks_remaining, vec![10; 8]);
        assert_eq!(estimator.pose_count(), 9);
        assert_eq!(sink.len(), 8);
        assert_eq!(sink[7].positions.len(), 9);
        assert!(results.ate_values.iter().all(|v| v.is_finite() && *v >= 0.0));
    }

    #[test]
    fn test_failed_steps_are_reported() {
        let mut scenario = scenario(4);
        scenario.controls[1] = [f64::NAN, 0.0, 0.0];
        let mut estimator = prepare_estimator(EstimatorConfig::default(), &scenario).unwrap();
        let results = run_slam(&mut estimator, &scenario, None, None).unwrap();

        assert_eq!(results.failures.len(), 1);
        assert_eq!(results.failures[0].step, 1);
        assert_eq!(results.successful_steps(), 3);
        assert_eq!(estimator.pose_count(), 4);
    }

    #[test]
    fn test_periodic_minimization() {
        let scenario = scenario(6);
        let mut estimator = prepare_estimator(EstimatorConfig::default(), &scenario).unwrap();
        let schedule = RemovalSchedule {
            strategy: RemovalStrategy::MaxUncertainty,
            interval: 2,
            keep_ratio: 0.5,
        };
        let results = run_slam(&mut estimator, &scenario, Some(&schedule), None).unwrap();

        // 10 -> 5 -> 3 -> 2
        assert_eq!(results.landmarks_remaining, vec![10, 10, 5, 5, 3, 3]);
        assert_eq!(estimator.map().len(), 2);
        assert_eq!(results.removed.len(), 8);
    }

    #[test]
    fn test_uninitialized_estimator_rejected() {
        let scenario = scenario(2);
        let mut estimator = IncrementalEstimator::with_defaults();
        assert!(matches!(
            run_slam(&mut estimator, &scenario, None, None),
            Err(SlamError::IllegalState(_))
        ));
    }

    #[test]
    fn test_compare_strategies() {
        let scenario = scenario(4);
        let results = compare_strategies(&EstimatorConfig::default(), &scenario, 2, 0.5, 2).unwrap();
        assert_eq!(results.len(), RemovalStrategy::catalog().len());
        for (name, run) in &results {
            assert!(RemovalStrategy::catalog().contains(&name.as_str()));
            assert_eq!(run.successful_steps(), 4);
            assert_eq!(run.landmarks_remaining, vec![10, 10, 5, 5]);
        }
    }

    #[test]
    fn test_invalid_schedule_rejected() {
        let scenario = scenario(4);
        for keep_ratio in [f64::NAN, -0.1, 1.5] {
            let result = compare_strategies(&EstimatorConfig::default(), &scenario, 2, keep_ratio, 2);
            assert!(matches!(result, Err(SlamError::InvalidInput(_))), "{}", keep_ratio);
        }
        assert!(matches!(
            compare_strategies(&EstimatorConfig::default(), &scenario, 0, 0.5, 2),
            Err(SlamError::InvalidInput(_))
        ));

        let mut estimator = prepare_estimator(EstimatorConfig::default(), &scenario).unwrap();
        let schedule = RemovalSchedule {
            keep_ratio: f64::NAN,
            ..RemovalSchedule::new(RemovalStrategy::LeastDegree)
        };
        assert!(run_slam(&mut estimator, &scenario, Some(&schedule), None).is_err());
        assert_eq!(estimator.pose_count(), 1);
        assert_eq!(estimator.map().len(), 10);
    }
}
