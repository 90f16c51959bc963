// Accuracy metrics comparing estimates with ground truth

pub mod metrics;

pub use metrics::*;
