//! Error types for meshwork.
//!
//! This module defines all error types used throughout the library.

use thiserror::Error;

/// Result type alias using [`MeshError`].
pub type Result<T> = std::result::Result<T, MeshError>;

/// Errors that can occur during mesh operations and background tasks.
#[derive(Error, Debug)]
pub enum MeshError {
    /// The mesh has no triangles.
    #[error("mesh has no triangles")]
    EmptyMesh,

    /// The index buffer does not describe whole triangles.
    #[error("index count {count} is not a multiple of 3")]
    IndexCountNotTriangles {
        /// The offending index count.
        count: usize,
    },

    /// A triangle corner references a vertex that does not exist.
    #[error("corner {corner} references vertex {vertex} but the mesh has {vertex_count} vertices")]
    InvalidVertexIndex {
        /// Position of the corner in the index buffer.
        corner: usize,
        /// The invalid vertex index.
        vertex: u32,
        /// Number of vertices in the mesh.
        vertex_count: usize,
    },

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },

    /// I/O error, raised when a worker thread cannot be spawned.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An engine panicked while running a task.
    #[error("task '{task}' panicked: {message}")]
    TaskPanicked {
        /// Display name of the task.
        task: String,
        /// Panic payload, if it was a string.
        message: String,
    },
}

impl MeshError {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: std::fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        MeshError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }
}
