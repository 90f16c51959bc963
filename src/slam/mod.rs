// Graph-based SLAM: noise models, the state graph and the incremental estimator

pub mod factor_graph;
pub mod incremental;
pub mod noise_model;

pub use factor_graph::*;
pub use incremental::*;
pub use noise_model::*;
