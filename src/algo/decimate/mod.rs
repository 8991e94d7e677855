//! Mesh simplification by edge collapse.
//!
//! Simplification removes triangles until a target count is reached, picking
//! at each step the edge whose collapse moves the surface least.
//!
//! # Quadric Error Metrics (QEM)
//!
//! Every vertex accumulates an area-weighted quadric of the planes of its
//! incident triangles (Garland & Heckbert, 1997). Collapsing an edge sums the
//! two quadrics and places the surviving vertex where the summed quadric is
//! smallest, so the cost of a collapse is the squared distance of that point
//! to the planes the two vertices used to lie on.
//!
//! Collapses that would flip a neighbouring triangle are rejected, so the
//! result never folds over itself locally.
//!
//! # Example
//!
//! ```
//! use meshwork::algo::decimate::{simplify, SimplifyOptions};
//! use meshwork::mesh::primitives;
//!
//! let sphere = primitives::icosphere(1.0, 2);
//!
//! // Keep half of the triangles
//! let target = SimplifyOptions::with_target_ratio(0.5).compute_target(sphere.num_triangles());
//! let coarse = simplify(&sphere, target).unwrap();
//! assert!(coarse.num_triangles() <= target);
//! ```
//!
//! # References
//!
//! - Garland, M. & Heckbert, P. (1997). "Surface Simplification Using Quadric
//!   Error Metrics." SIGGRAPH '97.

mod qem;

pub use qem::{simplify, simplify_ratio_with_progress, simplify_with_progress};

/// Fewest triangles a ratio-based target will ask for.
pub const MIN_TARGET_TRIANGLES: usize = 4;

/// Options for mesh simplification.
#[derive(Debug, Clone)]
pub struct SimplifyOptions {
    /// Exact triangle budget. Takes precedence over `target_ratio`.
    pub target_faces: Option<usize>,

    /// Fraction of the triangles to keep, in `[0, 1]`.
    pub target_ratio: f32,
}

impl SimplifyOptions {
    /// Simplify down to `target` triangles.
    pub fn with_target_faces(target: usize) -> Self {
        Self {
            target_faces: Some(target),
            target_ratio: 0.5,
        }
    }

    /// Simplify down to `ratio` of the input triangle count.
    pub fn with_target_ratio(ratio: f32) -> Self {
        Self {
            target_faces: None,
            target_ratio: ratio.clamp(0.0, 1.0),
        }
    }

    /// Triangle budget for a mesh with `original_faces` triangles.
    ///
    /// Ratios are floored and never go below [`MIN_TARGET_TRIANGLES`].
    pub fn compute_target(&self, original_faces: usize) -> usize {
        if let Some(target) = self.target_faces {
            target.min(original_faces)
        } else {
            ratio_target(original_faces, self.target_ratio)
        }
    }
}

pub(crate) fn ratio_target(original_faces: usize, ratio: f32) -> usize {
    let target = (original_faces as f32 * ratio.clamp(0.0, 1.0)).floor() as usize;
    target.max(MIN_TARGET_TRIANGLES)
}
