//! Midpoint (linear) subdivision.

use std::collections::HashMap;

use crate::algo::progress::ProgressState;
use crate::error::Result;
use crate::mesh::{EdgeKey, Mesh, Vertex};

/// Split every triangle into four at its edge midpoints.
///
/// Original vertices keep their attributes; each edge vertex interpolates
/// its endpoints. Normals are then recomputed from the new triangles.
/// Vertices are not welded, so split faces stay split.
pub fn midpoint_subdivide(mesh: &Mesh) -> Result<Mesh> {
    midpoint_subdivide_with_progress(mesh, &ProgressState::default())
}

/// Midpoint subdivision with progress reporting and cancellation.
///
/// Reports the edge, triangle and normal phases of the subdivision phase
/// table. A cancelled run returns an empty mesh.
pub fn midpoint_subdivide_with_progress(mesh: &Mesh, progress: &ProgressState) -> Result<Mesh> {
    mesh.validate()?;

    progress.set_phase(6);
    let mut vertices: Vec<Vertex> = mesh.vertices().to_vec();
    let mut edge_vertex: HashMap<EdgeKey, u32> = HashMap::with_capacity(mesh.num_triangles() * 3 / 2);
    for [i0, i1, i2] in mesh.triangles() {
        for key in EdgeKey::of_triangle([i0, i1, i2]) {
            edge_vertex.entry(key).or_insert_with(|| {
                let a = &vertices[key.v0 as usize];
                let b = &vertices[key.v1 as usize];
                let mid = a.lerp(b, 0.5);
                vertices.push(mid);
                (vertices.len() - 1) as u32
            });
        }
    }
    if progress.is_cancelled() {
        return Ok(Mesh::new());
    }

    progress.set_phase(7);
    let mut indices = Vec::with_capacity(mesh.num_triangles() * 12);
    for [i0, i1, i2] in mesh.triangles() {
        let m01 = edge_vertex[&EdgeKey::new(i0, i1)];
        let m12 = edge_vertex[&EdgeKey::new(i1, i2)];
        let m20 = edge_vertex[&EdgeKey::new(i2, i0)];
        indices.extend_from_slice(&[i0, m01, m20, m01, i1, m12, m20, m12, i2, m01, m12, m20]);
    }
    if progress.is_cancelled() {
        return Ok(Mesh::new());
    }

    progress.set_phase(8);
    let mut result = Mesh::from_parts_unchecked(vertices, indices);
    result.recompute_normals();
    Ok(result)
}
