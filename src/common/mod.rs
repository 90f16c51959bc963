//! Common types, traits, and error definitions for landmark_slam
//!
//! This module provides the foundational building blocks shared by the
//! estimator, the landmark removal engine and the evaluation metrics.

pub mod types;
pub mod traits;
pub mod error;

pub use types::*;
pub use traits::*;
pub use error::*;
