//! Mesh processing algorithms.
//!
//! This module contains the CPU-heavy transformations the background
//! workers run:
//!
//! - **Subdivision**: crease-aware Loop subdivision, midpoint subdivision
//! - **Decimation**: quadric error metric edge collapse
//! - **LOD**: chains of simplified meshes and screen-size selection
//!
//! Every long-running algorithm has a `_with_progress` variant that reports
//! into a [`progress::ProgressState`] and stops early when it is cancelled.

pub mod decimate;
pub mod lod;
pub mod progress;
pub mod subdivide;

pub use progress::{ProgressSnapshot, ProgressState};
