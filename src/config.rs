//! Run configuration loaded from TOML.
//!
//! Every section is optional; missing sections and keys fall back to the
//! defaults below.
//!
//! ```toml
//! [estimator]
//! prior_sigmas = [0.1, 0.1, 0.1, 0.1, 0.1, 0.1]
//! landmarks_in_graph = true
//!
//! [removal]
//! strategy = "k_cover_removal"
//! interval = 10
//! keep_ratio = 0.5
//! k = 3
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::common::{SlamError, SlamResult};
use crate::landmark_removal::{RemovalStrategy, DEFAULT_K};
use crate::simulation::{RemovalSchedule, ScenarioConfig};
use crate::slam::{EstimatorConfig, NoiseModel, DEFAULT_SIGMA, POSE_DIM};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SlamConfig {
    pub estimator: EstimatorSection,
    pub removal: RemovalSection,
    pub simulation: SimulationSection,
    pub output: OutputSection,
}

/// Estimator tuning
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EstimatorSection {
    /// Prior standard deviations, rotation then translation
    pub prior_sigmas: Vec<f64>,
    /// Odometry standard deviations, rotation then translation
    pub odometry_sigmas: Vec<f64>,
    pub max_iterations: usize,
    pub convergence_threshold: f64,
    pub landmarks_in_graph: bool,
    pub create_unknown_landmarks: bool,
}

impl Default for EstimatorSection {
    fn default() -> Self {
        EstimatorSection {
            prior_sigmas: vec![DEFAULT_SIGMA; POSE_DIM],
            odometry_sigmas: vec![DEFAULT_SIGMA; POSE_DIM],
            max_iterations: 20,
            convergence_threshold: 1.0e-5,
            landmarks_in_graph: false,
            create_unknown_landmarks: false,
        }
    }
}

impl EstimatorSection {
    pub fn to_estimator_config(&self) -> SlamResult<EstimatorConfig> {
        Ok(EstimatorConfig {
            prior_noise: pose_noise("prior_sigmas", &self.prior_sigmas)?,
            odometry_noise: pose_noise("odometry_sigmas", &self.odometry_sigmas)?,
            max_iterations: self.max_iterations,
            convergence_threshold: self.convergence_threshold,
            landmarks_in_graph: self.landmarks_in_graph,
            create_unknown_landmarks: self.create_unknown_landmarks,
        })
    }
}

fn pose_noise(name: &str, sigmas: &[f64]) -> SlamResult<NoiseModel> {
    if sigmas.len() != POSE_DIM {
        return Err(SlamError::Config(format!(
            "{} needs {} entries, got {}",
            name,
            POSE_DIM,
            sigmas.len()
        )));
    }
    NoiseModel::diagonal_sigmas(sigmas).map_err(|e| SlamError::Config(format!("{}: {}", name, e)))
}

/// Periodic landmark minimization; disabled without a strategy
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RemovalSection {
    pub strategy: Option<String>,
    pub interval: usize,
    pub keep_ratio: f64,
    pub k: usize,
}

impl Default for RemovalSection {
    fn default() -> Self {
        RemovalSection {
            strategy: None,
            interval: 10,
            keep_ratio: 0.5,
            k: DEFAULT_K,
        }
    }
}

impl RemovalSection {
    pub fn to_schedule(&self) -> SlamResult<Option<RemovalSchedule>> {
        let Some(name) = &self.strategy else {
            return Ok(None);
        };
        if self.interval == 0 {
            return Err(SlamError::Config("removal interval must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.keep_ratio) {
            return Err(SlamError::Config(format!(
                "keep_ratio must lie in [0, 1], got {}",
                self.keep_ratio
            )));
        }
        let strategy = RemovalStrategy::from_name(name, self.k).map_err(|e| SlamError::Config(e.to_string()))?;
        Ok(Some(RemovalSchedule {
            strategy,
            interval: self.interval,
            keep_ratio: self.keep_ratio,
        }))
    }
}

/// Synthetic world parameters
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationSection {
    pub steps: usize,
    pub num_landmarks: usize,
    pub world_extent: f64,
    pub max_range: f64,
    pub control_noise: f64,
    pub measurement_noise: f64,
    pub seed: u64,
}

impl Default for SimulationSection {
    fn default() -> Self {
        let defaults = ScenarioConfig::default();
        SimulationSection {
            steps: defaults.steps,
            num_landmarks: defaults.num_landmarks,
            world_extent: defaults.world_extent,
            max_range: defaults.max_range,
            control_noise: defaults.control_noise,
            measurement_noise: defaults.measurement_noise,
            seed: defaults.seed,
        }
    }
}

impl SimulationSection {
    pub fn to_scenario_config(&self) -> ScenarioConfig {
        ScenarioConfig {
            steps: self.steps,
            num_landmarks: self.num_landmarks,
            world_extent: self.world_extent,
            max_range: self.max_range,
            control_noise: self.control_noise,
            measurement_noise: self.measurement_noise,
            seed: self.seed,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputSection {
    /// Directory for per-step JSON snapshots
    pub snapshot_dir: Option<PathBuf>,
    /// Image written after the run (`.svg` or `.png`)
    pub plot_path: Option<PathBuf>,
}

impl SlamConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> SlamResult<Self> {
        let contents = fs::read_to_string(path)?;
        contents.parse()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> SlamResult<()> {
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}

impl std::str::FromStr for SlamConfig {
    type Err = SlamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(s)?)
    }
}
