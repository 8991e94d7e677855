//! Mesh subdivision algorithms.
//!
//! Both schemes split every triangle into four by inserting one vertex per
//! edge. They differ in where the vertices end up.
//!
//! # Loop Subdivision
//!
//! Loop subdivision (Loop, 1987) is an approximating scheme. Each iteration:
//!
//! 1. Welds split vertices so faces share their edges
//! 2. Classifies edges as smooth or sharp by their dihedral angle
//! 3. Inserts weighted vertices on every edge
//! 4. Moves original vertices towards a weighted average of their neighbours
//! 5. Splits each triangle into 4 smaller triangles
//!
//! Sharp edges are treated as boundary curves, so cubes keep their corners
//! and creases stay crisp while curved regions round off.
//!
//! # Midpoint Subdivision
//!
//! Midpoint subdivision only inserts edge midpoints and never moves a
//! vertex. The shape is unchanged; only the tessellation becomes finer.
//!
//! # Example
//!
//! ```
//! use meshwork::algo::subdivide::{loop_subdivide, SubdivideOptions};
//! use meshwork::mesh::primitives;
//!
//! let cube = primitives::cube();
//! let options = SubdivideOptions::new(1).with_crease_angle(30.0);
//! let refined = loop_subdivide(&cube, &options).unwrap();
//! assert_eq!(refined.num_triangles(), 48);
//! ```
//!
//! # References
//!
//! - Loop, C. (1987). "Smooth Subdivision Surfaces Based on Triangles."
//!   Master's thesis, University of Utah.
//! - Hoppe, H. et al. (1994). "Piecewise Smooth Surface Reconstruction."
//!   SIGGRAPH '94.
//! - Warren, J. & Weimer, H. (2001). "Subdivision Methods for Geometric
//!   Design." Morgan Kaufmann.

mod loop_subdivision;
mod midpoint;
mod weld;

use std::ops::Range;

use rayon::prelude::*;

use crate::algo::progress::ProgressState;
use crate::error::{MeshError, Result};
use crate::mesh::Mesh;

pub use loop_subdivision::{loop_subdivide, loop_subdivide_with_progress};
pub use midpoint::{midpoint_subdivide, midpoint_subdivide_with_progress};
pub use weld::weld_vertices;

/// Elements processed between two cancellation checks inside the
/// per-vertex and per-edge passes.
pub const CANCEL_POLL_INTERVAL: usize = 4096;

/// Default tolerance for welding split vertices.
pub const DEFAULT_WELD_EPSILON: f32 = 1e-6;

/// Which subdivision scheme to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubdivisionMethod {
    /// Crease-aware Loop subdivision.
    #[default]
    Loop,
    /// Plain 1-to-4 split at edge midpoints.
    Midpoint,
}

/// Options for subdivision algorithms.
#[derive(Debug, Clone)]
pub struct SubdivideOptions {
    /// Scheme to run.
    pub method: SubdivisionMethod,

    /// Number of subdivision iterations.
    pub iterations: usize,

    /// Dihedral angle in degrees above which an edge is kept sharp.
    /// 180 smooths everything except boundaries; 0 keeps every fold.
    pub crease_angle: f32,

    /// Positions closer than this on every axis are welded before Loop
    /// subdivision.
    pub weld_epsilon: f32,

    /// Whether to use parallel execution (default: true).
    pub parallel: bool,
}

impl Default for SubdivideOptions {
    fn default() -> Self {
        Self::new(1)
    }
}

impl SubdivideOptions {
    /// Create options with the specified number of iterations.
    pub fn new(iterations: usize) -> Self {
        Self {
            method: SubdivisionMethod::Loop,
            iterations,
            crease_angle: 180.0,
            weld_epsilon: DEFAULT_WELD_EPSILON,
            parallel: true,
        }
    }

    /// Set the subdivision scheme.
    pub fn with_method(mut self, method: SubdivisionMethod) -> Self {
        self.method = method;
        self
    }

    /// Set the crease angle in degrees.
    pub fn with_crease_angle(mut self, degrees: f32) -> Self {
        self.crease_angle = degrees;
        self
    }

    /// Set the weld tolerance.
    pub fn with_weld_epsilon(mut self, epsilon: f32) -> Self {
        self.weld_epsilon = epsilon;
        self
    }

    /// Set whether to use parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Create options for single-threaded execution.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Check that the parameters are usable.
    pub fn validate(&self) -> Result<()> {
        if !self.crease_angle.is_finite() || self.crease_angle < 0.0 {
            return Err(MeshError::invalid_param(
                "crease_angle",
                self.crease_angle,
                "must be a non-negative angle in degrees",
            ));
        }
        if self.weld_epsilon.is_nan() || self.weld_epsilon <= 0.0 {
            return Err(MeshError::invalid_param(
                "weld_epsilon",
                self.weld_epsilon,
                "must be positive",
            ));
        }
        Ok(())
    }
}

/// Subdivide a mesh with the scheme selected in `options`.
pub fn subdivide(mesh: &Mesh, options: &SubdivideOptions) -> Result<Mesh> {
    subdivide_with_progress(mesh, options, &ProgressState::default())
}

/// Subdivide with progress reporting and cancellation.
///
/// Phases restart for every iteration; the aggregate fraction keeps its
/// high-water mark. A cancelled run returns an empty mesh.
pub fn subdivide_with_progress(
    mesh: &Mesh,
    options: &SubdivideOptions,
    progress: &ProgressState,
) -> Result<Mesh> {
    match options.method {
        SubdivisionMethod::Loop => loop_subdivide_with_progress(mesh, options, progress),
        SubdivisionMethod::Midpoint => {
            options.validate()?;
            let mut current = mesh.clone();
            for _ in 0..options.iterations {
                current = midpoint_subdivide_with_progress(&current, progress)?;
                if progress.is_cancelled() {
                    return Ok(Mesh::new());
                }
            }
            Ok(current)
        }
    }
}

fn map_range<T, F>(range: Range<usize>, parallel: bool, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    if parallel {
        range.into_par_iter().map(f).collect()
    } else {
        range.map(f).collect()
    }
}

/// Map `0..count` in blocks of [`CANCEL_POLL_INTERVAL`], checking for
/// cancellation before each block. Returns `None` when cancelled.
fn map_blocks<T, F>(count: usize, parallel: bool, progress: &ProgressState, f: F) -> Option<Vec<T>>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    let mut out = Vec::with_capacity(count);
    let mut start = 0;
    while start < count {
        if progress.is_cancelled() {
            return None;
        }
        let end = (start + CANCEL_POLL_INTERVAL).min(count);
        out.extend(map_range(start..end, parallel, &f));
        progress.update_phase(end as f32 / count as f32);
        start = end;
    }
    if progress.is_cancelled() {
        return None;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::primitives;

    #[test]
    fn test_options_validation() {
        assert!(SubdivideOptions::new(1).validate().is_ok());
        assert!(SubdivideOptions::new(1).with_crease_angle(-1.0).validate().is_err());
        assert!(SubdivideOptions::new(1).with_crease_angle(f32::NAN).validate().is_err());
        assert!(SubdivideOptions::new(1).with_weld_epsilon(0.0).validate().is_err());
    }

    #[test]
    fn test_dispatch_on_method() {
        let cube = primitives::cube();
        let options = SubdivideOptions::new(1).with_crease_angle(30.0);

        let smooth = subdivide(&cube, &options).unwrap();
        // Loop welds first: 8 corners + 18 edges.
        assert_eq!(smooth.num_vertices(), 26);

        let flat = subdivide(&cube, &options.with_method(SubdivisionMethod::Midpoint)).unwrap();
        // Midpoint keeps the split faces: 24 + 6 faces * 5 edges.
        assert_eq!(flat.num_vertices(), 54);
        assert_eq!(flat.num_triangles(), 48);
    }

    #[test]
    fn test_map_blocks_covers_all_elements() {
        let progress = ProgressState::default();
        progress.set_phase(1);
        let count = CANCEL_POLL_INTERVAL * 2 + 17;
        let out = map_blocks(count, true, &progress, |i| i * 2).unwrap();
        assert_eq!(out.len(), count);
        assert!(out.iter().enumerate().all(|(i, &v)| v == i * 2));
        assert!((progress.total_fraction() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_map_blocks_stops_when_cancelled() {
        let progress = ProgressState::default();
        progress.cancel();
        assert!(map_blocks(10, false, &progress, |i| i).is_none());
    }
}
