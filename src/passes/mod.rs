//! Passes over lowered Block IR.
//!
//! Each pass takes a finished body and returns a rewritten copy; the input
//! is never edited in place.

pub mod flatten;

pub use flatten::{flatten_arrays, flatten_shapes, linear_offset};
