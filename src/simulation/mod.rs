// Synthetic scenarios and the step-driven run loop

pub mod runner;
pub mod scenario;

pub use runner::*;
pub use scenario::*;
