//! landmark_slam - landmark SLAM with bounded landmark maps
//!
//! An incremental graph-based estimator tracks a 6-DOF agent and a set of 3D
//! landmarks; a removal engine ranks landmarks by value and discards the least
//! useful ones; accuracy metrics score the result against ground truth.

// Core modules
pub mod common;
pub mod config;
pub mod utils;

// Estimation and evaluation
pub mod evaluation;
pub mod landmark_removal;
pub mod mapping;
pub mod slam;

// Run driver and persistence
pub mod io;
pub mod simulation;

// Re-export common types for convenience
pub use common::{LandmarkId, Measurement, Observation, Pose3, Position3};
pub use common::{LandmarkRanker, StateEstimator};
pub use common::{SlamError, SlamResult};
pub use slam::{EstimatorConfig, IncrementalEstimator};
