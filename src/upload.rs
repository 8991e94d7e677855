//! Double-buffered delivery of meshes to the renderer.
//!
//! When a background task replaces an object's mesh, the new geometry is
//! packed and uploaded into a secondary buffer while the renderer keeps
//! drawing the active one. The upload records a [`Fence`]; once the fence
//! reports completion the secondary buffer is swapped in. Nothing here ever
//! waits on the GPU.
//!
//! ```text
//! Idle ──begin_upload──> Uploading ──fence done──> ReadyToSwap ──swap──> Active
//!                            ^                                             │
//!                            └────────────────begin_upload─────────────────┘
//! ```
//!
//! The graphics API is abstracted behind [`UploadBackend`]. The crate ships
//! [`HeadlessBackend`], which only records byte counts and whose fences
//! complete after a fixed number of polls; it drives the tests and the CLI.

use std::cell::Cell;

use bytemuck::{Pod, Zeroable};

use crate::mesh::{Mesh, Vertex};

/// GPU vertex with position, normal and UV coordinates.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuVertex {
    /// Position.
    pub position: [f32; 3],
    /// Unit normal.
    pub normal: [f32; 3],
    /// Texture coordinate.
    pub uv: [f32; 2],
}

impl GpuVertex {
    /// Size of one vertex in bytes.
    pub const STRIDE: usize = std::mem::size_of::<GpuVertex>();
}

impl From<&Vertex> for GpuVertex {
    fn from(v: &Vertex) -> Self {
        Self {
            position: v.position.coords.into(),
            normal: v.normal.into(),
            uv: v.tex_coord.into(),
        }
    }
}

/// Interleave a mesh's vertices for upload.
pub fn pack_vertices(mesh: &Mesh) -> Vec<GpuVertex> {
    mesh.vertices().iter().map(GpuVertex::from).collect()
}

/// Completion signal of a submitted upload.
pub trait Fence {
    /// Whether the upload has finished. Must not block.
    fn is_complete(&self) -> bool;
}

/// Creates GPU buffers.
pub trait UploadBackend {
    /// Handle to a vertex/index buffer pair.
    type Buffer;
    /// Fence signalled when the buffer is ready.
    type Fence: Fence;

    /// Start uploading `vertices` and `indices` into a new buffer.
    fn upload(&mut self, vertices: &[GpuVertex], indices: &[u32]) -> (Self::Buffer, Self::Fence);
}

/// Where a [`DoubleBuffer`] is in its handoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffState {
    /// Nothing uploaded yet.
    Idle,
    /// A secondary buffer is in flight.
    Uploading,
    /// The secondary buffer is complete and waiting to be swapped in.
    ReadyToSwap,
    /// The active buffer is current and nothing is pending.
    Active,
}

/// An active buffer plus at most one buffer being uploaded.
#[derive(Debug)]
pub struct DoubleBuffer<B, F> {
    active: Option<B>,
    pending: Option<(B, F)>,
    state: HandoffState,
}

impl<B, F> Default for DoubleBuffer<B, F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B, F> DoubleBuffer<B, F> {
    /// Empty slots.
    pub fn new() -> Self {
        Self {
            active: None,
            pending: None,
            state: HandoffState::Idle,
        }
    }

    /// Current handoff state.
    pub fn state(&self) -> HandoffState {
        self.state
    }

    /// Buffer the renderer should draw.
    pub fn active(&self) -> Option<&B> {
        self.active.as_ref()
    }

    /// Whether an upload is waiting for its fence or for the swap.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl<B, F: Fence> DoubleBuffer<B, F> {
    /// Put a freshly submitted buffer in the secondary slot.
    ///
    /// An upload still in flight is replaced; its buffer is dropped.
    pub fn begin_upload(&mut self, buffer: B, fence: F) {
        if self.pending.is_some() {
            log::trace!("replacing an in-flight upload");
        }
        self.pending = Some((buffer, fence));
        self.state = HandoffState::Uploading;
    }

    /// Advance to [`HandoffState::ReadyToSwap`] if the pending fence is done.
    pub fn check_fence(&mut self) -> HandoffState {
        if self.state == HandoffState::Uploading
            && self.pending.as_ref().is_some_and(|(_, fence)| fence.is_complete())
        {
            self.state = HandoffState::ReadyToSwap;
        }
        self.state
    }

    /// Swap a completed upload into the active slot.
    ///
    /// Returns the retired buffer, if a swap happened and one was active.
    pub fn swap_if_ready(&mut self) -> Option<Option<B>> {
        if self.state != HandoffState::ReadyToSwap {
            return None;
        }
        let (buffer, _fence) = self.pending.take()?;
        self.state = HandoffState::Active;
        Some(self.active.replace(buffer))
    }

    /// Check the fence and swap when possible. Returns whether a swap happened.
    pub fn poll(&mut self) -> bool {
        self.check_fence();
        self.swap_if_ready().is_some()
    }
}

/// Buffer created by [`HeadlessBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessBuffer {
    /// Sequence number of the upload.
    pub id: u64,
    /// Number of vertices.
    pub vertex_count: usize,
    /// Number of indices.
    pub index_count: usize,
    /// Bytes that would have been transferred.
    pub byte_len: usize,
}

/// Fence that completes after a fixed number of polls.
#[derive(Debug)]
pub struct HeadlessFence {
    remaining: Cell<usize>,
}

impl Fence for HeadlessFence {
    fn is_complete(&self) -> bool {
        let remaining = self.remaining.get();
        if remaining == 0 {
            return true;
        }
        self.remaining.set(remaining - 1);
        false
    }
}

/// Backend without a GPU.
#[derive(Debug, Clone, Default)]
pub struct HeadlessBackend {
    latency: usize,
    uploads: u64,
    bytes: usize,
}

impl HeadlessBackend {
    /// Fences complete on the first poll.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fences report incomplete `polls` times before completing.
    pub fn with_latency(polls: usize) -> Self {
        Self {
            latency: polls,
            ..Self::default()
        }
    }

    /// Number of uploads so far.
    pub fn upload_count(&self) -> u64 {
        self.uploads
    }

    /// Bytes uploaded so far.
    pub fn bytes_uploaded(&self) -> usize {
        self.bytes
    }
}

impl UploadBackend for HeadlessBackend {
    type Buffer = HeadlessBuffer;
    type Fence = HeadlessFence;

    fn upload(&mut self, vertices: &[GpuVertex], indices: &[u32]) -> (HeadlessBuffer, HeadlessFence) {
        let vertex_bytes: &[u8] = bytemuck::cast_slice(vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(indices);
        let byte_len = vertex_bytes.len() + index_bytes.len();

        self.uploads += 1;
        self.bytes += byte_len;

        let buffer = HeadlessBuffer {
            id: self.uploads,
            vertex_count: vertices.len(),
            index_count: indices.len(),
            byte_len,
        };
        let fence = HeadlessFence {
            remaining: Cell::new(self.latency),
        };
        (buffer, fence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::primitives;

    #[test]
    fn test_gpu_vertex_layout() {
        assert_eq!(GpuVertex::STRIDE, 32);
        let mesh = primitives::cube();
        let packed = pack_vertices(&mesh);
        assert_eq!(packed.len(), 24);
        assert_eq!(packed[0].normal, [1.0, 0.0, 0.0]);
        let bytes: &[u8] = bytemuck::cast_slice(&packed);
        assert_eq!(bytes.len(), 24 * 32);
    }

    #[test]
    fn test_default_slots_are_idle() {
        let slots: DoubleBuffer<HeadlessBuffer, HeadlessFence> = DoubleBuffer::default();
        assert_eq!(slots.state(), HandoffState::Idle);
        assert!(slots.active().is_none());
        assert!(!slots.has_pending());
    }

    #[test]
    fn test_handoff_waits_for_fence() {
        let mut backend = HeadlessBackend::with_latency(2);
        let mesh = primitives::tetrahedron();
        let mut slots = DoubleBuffer::new();
        assert_eq!(slots.state(), HandoffState::Idle);

        let (buffer, fence) = backend.upload(&pack_vertices(&mesh), mesh.indices());
        slots.begin_upload(buffer, fence);
        assert_eq!(slots.state(), HandoffState::Uploading);

        assert!(!slots.poll());
        assert!(!slots.poll());
        assert!(slots.active().is_none());

        assert!(slots.poll());
        assert_eq!(slots.state(), HandoffState::Active);
        assert_eq!(slots.active().map(|b| b.index_count), Some(12));
        assert_eq!(backend.bytes_uploaded(), 4 * 32 + 12 * 4);
    }

    #[test]
    fn test_new_upload_replaces_pending() {
        let mut backend = HeadlessBackend::with_latency(1);
        let mesh = primitives::cube();
        let mut slots = DoubleBuffer::new();

        let (first, fence) = backend.upload(&pack_vertices(&mesh), mesh.indices());
        slots.begin_upload(first, fence);
        let (second, fence) = backend.upload(&pack_vertices(&mesh), mesh.indices());
        slots.begin_upload(second, fence);

        assert!(!slots.poll());
        assert!(slots.poll());
        assert_eq!(slots.active().map(|b| b.id), Some(2));
        assert!(!slots.has_pending());
    }

    #[test]
    fn test_swap_returns_retired_buffer() {
        let mut backend = HeadlessBackend::new();
        let mesh = primitives::cube();
        let mut slots = DoubleBuffer::new();

        let (buffer, fence) = backend.upload(&pack_vertices(&mesh), mesh.indices());
        slots.begin_upload(buffer, fence);
        assert_eq!(slots.check_fence(), HandoffState::ReadyToSwap);
        assert_eq!(slots.swap_if_ready(), Some(None));

        let (buffer, fence) = backend.upload(&pack_vertices(&mesh), mesh.indices());
        slots.begin_upload(buffer, fence);
        slots.check_fence();
        let retired = slots.swap_if_ready().flatten();
        assert_eq!(retired.map(|b| b.id), Some(1));
        assert_eq!(slots.swap_if_ready(), None);
    }
}
