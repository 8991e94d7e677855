//! # Meshwork
//!
//! Background mesh subdivision and level-of-detail generation for
//! interactive viewers.
//!
//! Meshwork keeps expensive mesh operations off the frame loop. Work is
//! submitted to per-kind task managers, each owning one worker thread; the
//! interactive thread polls lock-free progress snapshots and applies
//! finished results to the scene once per frame.
//!
//! ## Features
//!
//! - **Loop subdivision** with crease detection by dihedral angle, plus
//!   plain midpoint subdivision
//! - **QEM simplification**: quadric error metric edge collapse with
//!   flip prevention and attribute merging
//! - **LOD chains** generated from one source mesh, with screen-size
//!   selection and hysteresis
//! - **Task managers** with FIFO queues, cooperative cancellation and
//!   phase-based progress
//! - **Double-buffered uploads** that swap GPU buffers only once their
//!   fence completes
//!
//! ## Quick Start
//!
//! ```
//! use meshwork::prelude::*;
//!
//! let cube = primitives::cube();
//!
//! // Subdivide, keeping the cube's edges sharp
//! let options = SubdivideOptions::new(2).with_crease_angle(30.0);
//! let smooth = subdivide(&cube, &options).unwrap();
//! assert_eq!(smooth.num_triangles(), 12 * 16);
//!
//! // Simplify back down
//! let coarse = simplify(&smooth, 48).unwrap();
//! assert!(coarse.num_triangles() < smooth.num_triangles());
//! ```
//!
//! ## Background Processing
//!
//! ```
//! use meshwork::prelude::*;
//!
//! let mut scene: Scene<HeadlessBackend> = Scene::new();
//! let sphere = scene.insert("sphere", primitives::icosphere(1.0, 2));
//!
//! let lod = LodManager::new(LodEngine).unwrap();
//! for task in scene.take_lod_requests() {
//!     lod.submit(task);
//! }
//! while !lod.is_idle() {
//!     if let Some(p) = lod.progress_snapshot() {
//!         println!("{}: {:.0}%", p.phase_name, p.total_fraction * 100.0);
//!     }
//!     std::thread::sleep(std::time::Duration::from_millis(1));
//! }
//! lod.drain_completed(&mut scene);
//! assert_eq!(scene.get(sphere).unwrap().lod.level_count(), 6);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod error;
pub mod mesh;
pub mod scene;
pub mod task;
pub mod upload;

/// Prelude module for convenient imports.
///
/// ```
/// use meshwork::prelude::*;
/// ```
pub mod prelude {
    pub use crate::algo::decimate::{simplify, simplify_with_progress, SimplifyOptions};
    pub use crate::algo::lod::{generate_lod_chain, LodLevel, LodMesh, LodOptions};
    pub use crate::algo::progress::{ProgressSnapshot, ProgressState};
    pub use crate::algo::subdivide::{
        subdivide, subdivide_with_progress, SubdivideOptions, SubdivisionMethod,
    };
    pub use crate::error::{MeshError, Result};
    pub use crate::mesh::{primitives, Bounds, EdgeKey, Mesh, Vertex};
    pub use crate::scene::{ObjectHandle, Scene};
    pub use crate::task::{
        LodEngine, LodManager, LodTask, SubdivisionEngine, SubdivisionManager, SubdivisionTask,
        Task, TaskManager, TaskStatus,
    };
    pub use crate::upload::{HeadlessBackend, UploadBackend};
}

// Re-export nalgebra types for convenience
pub use nalgebra;
