// Map entities: agent, landmarks and the map aggregating them

pub mod agent;
pub mod landmark;
pub mod map;

pub use agent::*;
pub use landmark::*;
pub use map::*;
