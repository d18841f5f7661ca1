//! Code generation target configuration.

pub mod target;

pub use target::{Dialect, TargetConfig};
