//! Welding of near-duplicate vertices.

use std::collections::HashMap;

use nalgebra::Point3;

use crate::mesh::{Mesh, Vertex};

/// Merge vertices whose positions agree within `epsilon` on every axis.
///
/// Loaders split vertices along hard edges so each face can carry its own
/// normal; welding restores the shared-edge topology subdivision needs. The
/// first vertex of each group is kept with its attributes and all triangles
/// are remapped onto it. Triangle count and order are unchanged.
///
/// Positions are hashed into a grid of cells `2 * epsilon` wide. A vertex
/// within `epsilon` of a cell wall may have its twin in the neighbouring
/// cell, so besides its own cell the lookup checks the 7 cells on the near
/// side of each axis.
pub fn weld_vertices(mesh: &Mesh, epsilon: f32) -> Mesh {
    let epsilon = if epsilon > 0.0 { epsilon } else { f32::EPSILON };
    let inv_cell = 1.0 / (2.0 * epsilon as f64);

    let mut cells: HashMap<[i64; 3], Vec<u32>> = HashMap::new();
    let mut welded: Vec<Vertex> = Vec::new();
    let mut remap: Vec<u32> = Vec::with_capacity(mesh.num_vertices());

    for vertex in mesh.vertices() {
        let (cell, toward) = quantize(&vertex.position, inv_cell);

        let mut found = None;
        'search: for mask in 0..8u8 {
            let mut key = cell;
            for axis in 0..3 {
                if mask & (1 << axis) != 0 {
                    key[axis] += toward[axis];
                }
            }
            if let Some(candidates) = cells.get(&key) {
                for &idx in candidates {
                    if within(&welded[idx as usize].position, &vertex.position, epsilon) {
                        found = Some(idx);
                        break 'search;
                    }
                }
            }
        }

        let idx = match found {
            Some(idx) => idx,
            None => {
                let idx = welded.len() as u32;
                welded.push(*vertex);
                cells.entry(cell).or_default().push(idx);
                idx
            }
        };
        remap.push(idx);
    }

    let indices = mesh.indices().iter().map(|&i| remap[i as usize]).collect();
    log::debug!(
        "welded {} vertices into {} (epsilon {})",
        mesh.num_vertices(),
        welded.len(),
        epsilon
    );
    Mesh::from_parts_unchecked(welded, indices)
}

/// Grid cell of `p` and, per axis, the direction of the nearer cell wall.
fn quantize(p: &Point3<f32>, inv_cell: f64) -> ([i64; 3], [i64; 3]) {
    let mut cell = [0i64; 3];
    let mut toward = [0i64; 3];
    for axis in 0..3 {
        let scaled = p[axis] as f64 * inv_cell;
        let floor = scaled.floor();
        cell[axis] = floor as i64;
        toward[axis] = if scaled - floor < 0.5 { -1 } else { 1 };
    }
    (cell, toward)
}

#[inline]
fn within(a: &Point3<f32>, b: &Point3<f32>, epsilon: f32) -> bool {
    (a.x - b.x).abs() <= epsilon && (a.y - b.y).abs() <= epsilon && (a.z - b.z).abs() <= epsilon
}
