//! Shared value types for the rasterscene front-end.
//!
//! # Invariants
//! - `Vertex` is plain-old-data with a fixed 44-byte interleaved layout.
//! - `FilteringMethod` cycles with period three.

pub mod math;
mod types;

pub use types::{FilteringMethod, Vertex};
