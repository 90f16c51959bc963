//! Utility modules for landmark_slam

pub mod visualization;

pub use visualization::{colors, trajectory_plot, Metric, PathStyle, PointStyle, Visualizer};
