//! Crease-aware Loop subdivision for triangle meshes.

use std::collections::HashMap;

use nalgebra::{Point3, Vector2, Vector3};
use rayon::prelude::*;

use crate::algo::progress::ProgressState;
use crate::error::Result;
use crate::mesh::{normalize_or_keep, EdgeKey, Mesh, Vertex};

use super::{map_blocks, map_range, weld_vertices, SubdivideOptions};

/// Triangles per adjacency partition.
const ADJACENCY_PARTITION: usize = 4096;

/// Performs Loop subdivision on a triangle mesh.
///
/// Loop subdivision is an approximating scheme: every triangle becomes four
/// and the surface converges towards a smooth limit. Edges whose dihedral
/// angle exceeds `options.crease_angle` (and boundary edges) are kept sharp.
///
/// # Vertex Rules
///
/// - **Smooth edge vertex**: `3/8 * (v0 + v1) + 1/8 * (opp0 + opp1)`
/// - **Sharp or boundary edge vertex**: `1/2 * (v0 + v1)`
/// - **Smooth vertex**: `(1 - n*β) * v + β * Σ(neighbors)`,
///   `β = 3/16` for `n = 3`, `3/(8n)` otherwise
/// - **Crease vertex** (two sharp edges): `3/4 * v + 1/8 * (s0 + s1)`
/// - **Corner vertex** (any other number of sharp edges): unchanged
///
/// The rules apply to position, normal and texture coordinate alike; vertex
/// normals are finally recomputed from the refined geometry.
pub fn loop_subdivide(mesh: &Mesh, options: &SubdivideOptions) -> Result<Mesh> {
    loop_subdivide_with_progress(mesh, options, &ProgressState::default())
}

/// Loop subdivision with progress reporting and cancellation.
///
/// Each iteration runs through the 8 subdivision phases. If `progress` is
/// cancelled the function returns early with an empty mesh, which the
/// caller must discard.
pub fn loop_subdivide_with_progress(
    mesh: &Mesh,
    options: &SubdivideOptions,
    progress: &ProgressState,
) -> Result<Mesh> {
    options.validate()?;
    mesh.validate()?;

    let mut current = mesh.clone();
    for _ in 0..options.iterations {
        match loop_subdivide_once(&current, options, progress) {
            Some(next) => current = next,
            None => return Ok(Mesh::new()),
        }
    }
    Ok(current)
}

/// Per-edge adjacency gathered from the incident triangles.
#[derive(Debug, Clone)]
struct EdgeRecord {
    key: EdgeKey,
    /// Incident triangles.
    faces: Vec<u32>,
    /// Vertex opposite the edge in each incident triangle.
    opposites: Vec<u32>,
    sharp: bool,
}

/// Adjacency collected from one partition of the triangles.
#[derive(Default)]
struct PartitionAdjacency {
    neighbor_pairs: Vec<(u32, u32)>,
    /// (edge, opposite vertex, face)
    edge_faces: Vec<(EdgeKey, u32, u32)>,
}

/// One round of Loop subdivision. Returns `None` when cancelled.
fn loop_subdivide_once(
    input: &Mesh,
    options: &SubdivideOptions,
    progress: &ProgressState,
) -> Option<Mesh> {
    let parallel = options.parallel;

    // 1. Weld split vertices so faces share edges again.
    progress.set_phase(1);
    let mesh = weld_vertices(input, options.weld_epsilon);
    if progress.is_cancelled() {
        return None;
    }
    let vertices = mesh.vertices();
    let num_triangles = mesh.num_triangles();

    // 2. Unit face normals (zero for degenerate triangles).
    progress.set_phase(2);
    let face_normals: Vec<Vector3<f32>> =
        map_range(0..num_triangles, parallel, |t| normalize_or_keep(mesh.face_normal(t)));
    if progress.is_cancelled() {
        return None;
    }

    // 3. Adjacency, built per partition and merged in partition order.
    progress.set_phase(3);
    let (neighbors, mut edges, edge_index) = build_adjacency(&mesh, parallel);
    if progress.is_cancelled() {
        return None;
    }

    // 4. Classify edges: boundary, non-manifold, or folded past the crease angle.
    progress.set_phase(4);
    let cos_threshold = options.crease_angle.to_radians().cos();
    let mut sharp_neighbors: Vec<Vec<u32>> = vec![Vec::new(); vertices.len()];
    let mut sharp_count = 0usize;
    for edge in &mut edges {
        edge.sharp = match edge.faces.as_slice() {
            [f0, f1] => {
                face_normals[*f0 as usize].dot(&face_normals[*f1 as usize]) < cos_threshold
            }
            _ => true,
        };
        if edge.sharp {
            sharp_count += 1;
            sharp_neighbors[edge.key.v0 as usize].push(edge.key.v1);
            sharp_neighbors[edge.key.v1 as usize].push(edge.key.v0);
        }
    }
    log::debug!(
        "loop subdivision: {} vertices, {} edges ({} sharp), {} triangles",
        vertices.len(),
        edges.len(),
        sharp_count,
        num_triangles
    );
    if progress.is_cancelled() {
        return None;
    }

    // 5. Reposition the original vertices.
    progress.set_phase(5);
    let repositioned = map_blocks(vertices.len(), parallel, progress, |v| {
        reposition_vertex(vertices, v, &neighbors[v], &sharp_neighbors[v])
    })?;

    // 6. One new vertex per edge.
    progress.set_phase(6);
    let edge_points = map_blocks(edges.len(), parallel, progress, |e| {
        edge_point(vertices, &edges[e])
    })?;

    // 7. Split every triangle into four.
    progress.set_phase(7);
    let base = repositioned.len() as u32;
    let mut out_vertices = repositioned;
    out_vertices.extend(edge_points);
    let mid = |a: u32, b: u32| base + edge_index[&EdgeKey::new(a, b)];
    let mut out_indices = Vec::with_capacity(num_triangles * 12);
    for [i0, i1, i2] in mesh.triangles() {
        let m01 = mid(i0, i1);
        let m12 = mid(i1, i2);
        let m20 = mid(i2, i0);
        out_indices.extend_from_slice(&[
            i0, m01, m20, //
            m01, i1, m12, //
            m20, m12, i2, //
            m01, m12, m20,
        ]);
    }
    if progress.is_cancelled() {
        return None;
    }

    // 8. Shade from the refined geometry rather than interpolated normals.
    progress.set_phase(8);
    let mut result = Mesh::from_parts_unchecked(out_vertices, out_indices);
    result.recompute_normals();
    Some(result)
}

/// Build vertex neighbour lists and the ordered edge table.
///
/// Returns `(neighbors, edges, edge_index)` where `edge_index` maps an edge
/// to its position in `edges` (and so to its new vertex).
fn build_adjacency(
    mesh: &Mesh,
    parallel: bool,
) -> (Vec<Vec<u32>>, Vec<EdgeRecord>, HashMap<EdgeKey, u32>) {
    let indices = mesh.indices();
    let chunk_len = ADJACENCY_PARTITION * 3;

    let collect = |(chunk_idx, chunk): (usize, &[u32])| {
        let first_face = (chunk_idx * ADJACENCY_PARTITION) as u32;
        let mut local = PartitionAdjacency::default();
        local.neighbor_pairs.reserve(chunk.len() * 2);
        local.edge_faces.reserve(chunk.len());
        for (offset, tri) in chunk.chunks_exact(3).enumerate() {
            let face = first_face + offset as u32;
            for i in 0..3 {
                let (a, b, c) = (tri[i], tri[(i + 1) % 3], tri[(i + 2) % 3]);
                local.neighbor_pairs.push((a, b));
                local.neighbor_pairs.push((b, a));
                local.edge_faces.push((EdgeKey::new(a, b), c, face));
            }
        }
        local
    };

    let partitions: Vec<PartitionAdjacency> = if parallel {
        indices.par_chunks(chunk_len).enumerate().map(collect).collect()
    } else {
        indices.chunks(chunk_len).enumerate().map(collect).collect()
    };

    let mut neighbors: Vec<Vec<u32>> = vec![Vec::new(); mesh.num_vertices()];
    let mut edges: Vec<EdgeRecord> = Vec::with_capacity(mesh.num_triangles() * 3 / 2 + 1);
    let mut edge_index: HashMap<EdgeKey, u32> = HashMap::with_capacity(edges.capacity());

    for part in partitions {
        for (v, n) in part.neighbor_pairs {
            neighbors[v as usize].push(n);
        }
        for (key, opposite, face) in part.edge_faces {
            let idx = *edge_index.entry(key).or_insert_with(|| {
                edges.push(EdgeRecord {
                    key,
                    faces: Vec::with_capacity(2),
                    opposites: Vec::with_capacity(2),
                    sharp: false,
                });
                (edges.len() - 1) as u32
            });
            let record = &mut edges[idx as usize];
            record.faces.push(face);
            record.opposites.push(opposite);
        }
    }

    for list in &mut neighbors {
        list.sort_unstable();
        list.dedup();
    }

    (neighbors, edges, edge_index)
}

/// New attributes for an original vertex.
fn reposition_vertex(vertices: &[Vertex], v: usize, neighbors: &[u32], sharp: &[u32]) -> Vertex {
    let vertex = &vertices[v];

    if !sharp.is_empty() {
        return match sharp {
            [s0, s1] => weighted(&[
                (0.75, vertex),
                (0.125, &vertices[*s0 as usize]),
                (0.125, &vertices[*s1 as usize]),
            ]),
            _ => *vertex,
        };
    }

    let n = neighbors.len();
    if n == 0 {
        return *vertex;
    }
    let beta = loop_beta(n);
    let mut terms: Vec<(f32, &Vertex)> = Vec::with_capacity(n + 1);
    terms.push((1.0 - n as f32 * beta, vertex));
    terms.extend(neighbors.iter().map(|&j| (beta, &vertices[j as usize])));
    weighted(&terms)
}

/// New vertex inserted on an edge.
fn edge_point(vertices: &[Vertex], edge: &EdgeRecord) -> Vertex {
    let v0 = &vertices[edge.key.v0 as usize];
    let v1 = &vertices[edge.key.v1 as usize];
    match edge.opposites.as_slice() {
        [o0, o1] if !edge.sharp => weighted(&[
            (0.375, v0),
            (0.375, v1),
            (0.125, &vertices[*o0 as usize]),
            (0.125, &vertices[*o1 as usize]),
        ]),
        _ => weighted(&[(0.5, v0), (0.5, v1)]),
    }
}

/// Loop smoothing weight for a vertex of valence `n` (Warren's form).
fn loop_beta(n: usize) -> f32 {
    if n == 3 {
        3.0 / 16.0
    } else {
        3.0 / (8.0 * n as f32)
    }
}

/// Weighted combination of vertex attributes; the normal is renormalized.
pub(super) fn weighted(terms: &[(f32, &Vertex)]) -> Vertex {
    let mut position = Vector3::zeros();
    let mut normal = Vector3::zeros();
    let mut tex_coord = Vector2::zeros();
    for &(w, v) in terms {
        position += v.position.coords * w;
        normal += v.normal * w;
        tex_coord += v.tex_coord * w;
    }
    Vertex::new(Point3::from(position), normalize_or_keep(normal), tex_coord)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::progress::SUBDIVISION_PHASES;
    use crate::mesh::primitives;

    fn sharp_options(angle: f32) -> SubdivideOptions {
        SubdivideOptions::new(1).with_crease_angle(angle)
    }

    #[test]
    fn test_loop_subdivide_single_triangle() {
        let mesh = Mesh::from_parts(
            vec![
                Vertex::at(Point3::new(0.0, 0.0, 0.0)),
                Vertex::at(Point3::new(1.0, 0.0, 0.0)),
                Vertex::at(Point3::new(0.5, 1.0, 0.0)),
            ],
            vec![0, 1, 2],
        )
        .unwrap();

        let result = loop_subdivide(&mesh, &SubdivideOptions::new(1)).unwrap();

        // 1 triangle -> 4 triangles, 3 original + 3 edge vertices
        assert_eq!(result.num_triangles(), 4);
        assert_eq!(result.num_vertices(), 6);
        // All three edges are boundary edges, so every corner follows the
        // crease rule: 3/4 * v + 1/8 * (s0 + s1).
        let p0 = result.vertices()[0].position;
        assert!((p0 - Point3::new(0.1875, 0.125, 0.0)).norm() < 1e-6);
        // Boundary edge vertices sit at the midpoints.
        assert!(result
            .vertices()
            .iter()
            .any(|v| (v.position - Point3::new(0.5, 0.0, 0.0)).norm() < 1e-6));
    }

    #[test]
    fn test_loop_subdivide_quadruples_faces() {
        for mesh in [primitives::tetrahedron(), primitives::cube(), primitives::grid(3)] {
            for angle in [0.0, 30.0, 90.0, 180.0] {
                let result = loop_subdivide(&mesh, &sharp_options(angle)).unwrap();
                assert_eq!(result.num_triangles(), mesh.num_triangles() * 4);
                assert!(result.validate().is_ok());
            }
        }
    }

    #[test]
    fn test_loop_subdivide_two_iterations() {
        let mesh = primitives::tetrahedron();
        let result = loop_subdivide(&mesh, &SubdivideOptions::new(2)).unwrap();
        assert_eq!(result.num_triangles(), mesh.num_triangles() * 16);
    }

    #[test]
    fn test_interior_edge_vertex_position() {
        let vertices = vec![
            Vertex::at(Point3::new(0.0, 0.0, 0.0)),
            Vertex::at(Point3::new(2.0, 0.0, 0.0)),
            Vertex::at(Point3::new(1.0, 2.0, 0.0)),
            Vertex::at(Point3::new(1.0, -2.0, 0.0)),
        ];
        let edge = EdgeRecord {
            key: EdgeKey::new(0, 1),
            faces: vec![0, 1],
            opposites: vec![2, 3],
            sharp: false,
        };

        // 3/8 * (2,0,0) + 1/8 * (2,0,0) = (1,0,0)
        let p = edge_point(&vertices, &edge);
        assert!((p.position - Point3::new(1.0, 0.0, 0.0)).norm() < 1e-6);

        let sharp = EdgeRecord { sharp: true, ..edge };
        assert_eq!(edge_point(&vertices, &sharp).position, Point3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_loop_beta_coefficient() {
        assert!((loop_beta(3) - 3.0 / 16.0).abs() < 1e-7);
        assert!((loop_beta(6) - 1.0 / 16.0).abs() < 1e-7);
    }

    #[test]
    fn test_cube_keeps_sharp_features() {
        let cube = primitives::cube();
        let result = loop_subdivide(&cube, &sharp_options(30.0)).unwrap();

        assert_eq!(result.num_triangles(), 48);
        // 8 welded corners + 18 edges
        assert_eq!(result.num_vertices(), 26);

        let has_point = |p: Point3<f32>| result.vertices().iter().any(|v| v.position == p);

        // Corners touch three sharp edges and stay exactly in place.
        for x in [-0.5, 0.5] {
            for y in [-0.5, 0.5] {
                for z in [-0.5, 0.5] {
                    assert!(has_point(Point3::new(x, y, z)));
                }
            }
        }

        // Each of the 12 cube edges gets its exact midpoint.
        for a in [-0.5f32, 0.5] {
            for b in [-0.5f32, 0.5] {
                assert!(has_point(Point3::new(0.0, a, b)));
                assert!(has_point(Point3::new(a, 0.0, b)));
                assert!(has_point(Point3::new(a, b, 0.0)));
            }
        }

        // Nothing leaves the original box.
        let bounds = result.bounds();
        assert_eq!(bounds.min, Point3::new(-0.5, -0.5, -0.5));
        assert_eq!(bounds.max, Point3::new(0.5, 0.5, 0.5));
    }

    #[test]
    fn test_icosahedron_gets_rounder() {
        let ico = primitives::icosahedron(1.0);

        // Worst deviation of the input surface from its circumscribed
        // sphere, measured at the flat edge midpoints.
        let input_radius = 1.0f32;
        let input_deviation = ico
            .triangles()
            .map(|[a, b, _]| {
                let m = nalgebra::center(ico.position(a), ico.position(b));
                (input_radius - m.coords.norm()) / input_radius
            })
            .fold(0.0f32, f32::max);

        let result = loop_subdivide(&ico, &sharp_options(180.0)).unwrap();
        assert_eq!(result.num_triangles(), 80);

        let radii: Vec<f32> = result.vertices().iter().map(|v| v.position.coords.norm()).collect();
        let output_radius = radii.iter().cloned().fold(0.0f32, f32::max);
        for r in radii {
            let deviation = (output_radius - r) / output_radius;
            assert!(deviation < input_deviation, "{} >= {}", deviation, input_deviation);
        }
    }

    #[test]
    fn test_normals_recomputed_from_geometry() {
        let result = loop_subdivide(&primitives::icosahedron(1.0), &sharp_options(180.0)).unwrap();
        for v in result.vertices() {
            assert!((v.normal.norm() - 1.0).abs() < 1e-4);
            // Outward on a convex, origin-centered shape.
            assert!(v.normal.dot(&v.position.coords) > 0.0);
        }
    }

    #[test]
    fn test_sequential_matches_parallel() {
        let mesh = primitives::icosphere(1.0, 2);
        let par = loop_subdivide(&mesh, &sharp_options(40.0)).unwrap();
        let seq = loop_subdivide(&mesh, &sharp_options(40.0).sequential()).unwrap();
        assert_eq!(par.indices(), seq.indices());
        for (a, b) in par.vertices().iter().zip(seq.vertices()) {
            assert!((a.position - b.position).norm() < 1e-6);
        }
    }

    #[test]
    fn test_cancelled_returns_empty() {
        let progress = ProgressState::new(SUBDIVISION_PHASES);
        progress.cancel();
        let result =
            loop_subdivide_with_progress(&primitives::cube(), &sharp_options(30.0), &progress)
                .unwrap();
        assert!(result.is_empty());
        assert_eq!(progress.phase(), 1);
    }

    #[test]
    fn test_progress_reaches_last_phase() {
        let progress = ProgressState::new(SUBDIVISION_PHASES);
        loop_subdivide_with_progress(&primitives::cube(), &sharp_options(30.0), &progress).unwrap();
        assert_eq!(progress.phase(), 8);
        assert!((progress.total_fraction() - 7.0 / 8.0).abs() < 1e-6);
        assert!(!progress.is_completed());
    }
}
