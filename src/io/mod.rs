// Persistence of per-step results

pub mod snapshot;

pub use snapshot::*;
