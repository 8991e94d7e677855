//! Core mesh data structures.
//!
//! This module provides the indexed triangle mesh that every algorithm in
//! the crate consumes and produces.
//!
//! # Overview
//!
//! A [`Mesh`] is an ordered vertex buffer (position, normal, texture
//! coordinate) plus an index buffer with three corners per triangle and an
//! axis-aligned bounding box. This is the layout a renderer uploads, so the
//! results of background work can be handed to the display layer without
//! conversion.
//!
//! Edges are identified by [`EdgeKey`], an unordered vertex pair usable as a
//! hash key.
//!
//! # Construction
//!
//! ```
//! use meshwork::mesh::{Mesh, Vertex};
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Vertex::at(Point3::new(0.0, 0.0, 0.0)),
//!     Vertex::at(Point3::new(1.0, 0.0, 0.0)),
//!     Vertex::at(Point3::new(0.5, 1.0, 0.0)),
//! ];
//! let mut mesh = Mesh::from_parts(vertices, vec![0, 1, 2]).unwrap();
//! mesh.recompute_normals();
//! assert_eq!(mesh.num_triangles(), 1);
//! ```

mod data;
mod edge;
pub mod primitives;

pub(crate) use data::normalize_or_keep;
pub use data::{Bounds, Mesh, Vertex};
pub use edge::EdgeKey;
