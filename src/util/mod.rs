pub mod networked;
pub mod pid;
pub mod sampler;
pub mod vec2;

pub use networked::{Networked, VerifyStructure};
pub use pid::{smallest_unused, Pid};
pub use vec2::Vec2;

/// Absolute time in seconds.
pub type Time = f64;

/// Time difference in seconds.
pub type TimeDiff = f32;
