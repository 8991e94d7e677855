//! Quadric Error Metrics (QEM) simplification.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use nalgebra::{Matrix3, Point3, Vector2, Vector3};

use crate::algo::progress::ProgressState;
use crate::error::Result;
use crate::mesh::{normalize_or_keep, EdgeKey, Mesh, Vertex};

use super::ratio_target;

/// Determinant magnitude below which the 3x3 system counts as singular.
const SINGULAR_EPSILON: f64 = 1e-10;

/// A quadric error matrix (4x4 symmetric matrix).
///
/// Represents the sum of squared distances to a set of planes.
/// Stored as 10 unique elements since the matrix is symmetric.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Quadric {
    /// Upper triangular elements: [a, b, c, d, e, f, g, h, i, j]
    /// Matrix form:
    /// | a b c d |
    /// | b e f g |
    /// | c f h i |
    /// | d g i j |
    data: [f64; 10],
}

impl Quadric {
    /// Create a zero quadric.
    fn zero() -> Self {
        Self { data: [0.0; 10] }
    }

    /// Create a quadric from a plane equation ax + by + cz + d = 0.
    /// The plane should be normalized (a² + b² + c² = 1).
    fn from_plane(a: f64, b: f64, c: f64, d: f64) -> Self {
        Self {
            data: [
                a * a,     // [0,0]
                a * b,     // [0,1] = [1,0]
                a * c,     // [0,2] = [2,0]
                a * d,     // [0,3] = [3,0]
                b * b,     // [1,1]
                b * c,     // [1,2] = [2,1]
                b * d,     // [1,3] = [3,1]
                c * c,     // [2,2]
                c * d,     // [2,3] = [3,2]
                d * d,     // [3,3]
            ],
        }
    }

    /// Plane quadric of a triangle weighted by its area.
    /// Returns None for degenerate triangles.
    fn from_triangle(p0: &Point3<f64>, p1: &Point3<f64>, p2: &Point3<f64>) -> Option<Self> {
        let normal = (p1 - p0).cross(&(p2 - p0));
        let len = normal.norm();
        if len <= SINGULAR_EPSILON {
            return None;
        }
        let n = normal / len;
        let d = -n.dot(&p0.coords);
        Some(Self::from_plane(n.x, n.y, n.z, d).scaled(len * 0.5))
    }

    fn scaled(mut self, s: f64) -> Self {
        for v in &mut self.data {
            *v *= s;
        }
        self
    }

    /// Evaluate the quadric error for a point.
    /// Returns v^T * Q * v where v = [x, y, z, 1].
    fn evaluate(&self, p: &Point3<f64>) -> f64 {
        let [a, b, c, d, e, f, g, h, i, j] = self.data;
        let (x, y, z) = (p.x, p.y, p.z);

        a * x * x + 2.0 * b * x * y + 2.0 * c * x * z + 2.0 * d * x
            + e * y * y + 2.0 * f * y * z + 2.0 * g * y
            + h * z * z + 2.0 * i * z
            + j
    }

    /// Find the point that minimizes the quadric error.
    ///
    /// Solves the upper-left 3x3 block against the negated last column with
    /// Cramer's rule. Returns None if the block is singular.
    fn optimal_point(&self) -> Option<Point3<f64>> {
        let [a, b, c, d, e, f, g, h, i, _] = self.data;
        let m = Matrix3::new(a, b, c, b, e, f, c, f, h);
        let det = m.determinant();
        if det.abs() < SINGULAR_EPSILON {
            return None;
        }

        let rhs = Vector3::new(-d, -g, -i);
        let solve = |col: usize| {
            let mut mc = m;
            mc.set_column(col, &rhs);
            mc.determinant() / det
        };
        Some(Point3::new(solve(0), solve(1), solve(2)))
    }
}

impl std::ops::AddAssign for Quadric {
    fn add_assign(&mut self, other: Quadric) {
        for (a, b) in self.data.iter_mut().zip(other.data) {
            *a += b;
        }
    }
}

impl std::ops::Add for Quadric {
    type Output = Quadric;

    fn add(mut self, other: Quadric) -> Quadric {
        self += other;
        self
    }
}

/// Vertex-to-survivor map with path compression.
#[derive(Debug, Clone)]
struct UnionFind {
    parent: Vec<u32>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n as u32).collect(),
        }
    }

    /// Current root of `v`, halving the path on the way.
    fn find(&mut self, mut v: u32) -> u32 {
        while self.parent[v as usize] != v {
            let grand = self.parent[self.parent[v as usize] as usize];
            self.parent[v as usize] = grand;
            v = grand;
        }
        v
    }

    /// Redirect the root `removed` to the root `survivor`.
    fn merge_into(&mut self, removed: u32, survivor: u32) {
        self.parent[removed as usize] = survivor;
    }
}

/// An edge candidate for collapse.
#[derive(Debug, Clone)]
struct EdgeCandidate {
    v0: u32,
    v1: u32,
    /// Position of the merged vertex.
    optimal_pos: Point3<f64>,
    /// Error cost of this collapse.
    error: f64,
    /// Vertex versions when the candidate was built, to detect stale entries.
    versions: (u32, u32),
}

// Implement ordering for min-heap (we want smallest error first)
impl PartialEq for EdgeCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for EdgeCandidate {}

impl PartialOrd for EdgeCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EdgeCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap
        other.error.total_cmp(&self.error)
    }
}

/// Working state of one simplification run.
struct Simplifier {
    positions: Vec<Point3<f64>>,
    normals: Vec<Vector3<f32>>,
    tex_coords: Vec<Vector2<f32>>,
    quadrics: Vec<Quadric>,
    versions: Vec<u32>,
    triangles: Vec<[u32; 3]>,
    triangle_valid: Vec<bool>,
    /// Triangles touching each root vertex.
    vertex_triangles: Vec<Vec<u32>>,
    roots: UnionFind,
    live_triangles: usize,
}

impl Simplifier {
    fn new(mesh: &Mesh) -> Self {
        let n = mesh.num_vertices();
        let positions: Vec<Point3<f64>> = mesh.vertices().iter().map(|v| v.position.cast()).collect();
        let triangles: Vec<[u32; 3]> = mesh.triangles().collect();

        let mut vertex_triangles = vec![Vec::new(); n];
        let mut quadrics = vec![Quadric::zero(); n];
        for (t, tri) in triangles.iter().enumerate() {
            let q = Quadric::from_triangle(
                &positions[tri[0] as usize],
                &positions[tri[1] as usize],
                &positions[tri[2] as usize],
            );
            for &v in tri {
                vertex_triangles[v as usize].push(t as u32);
                if let Some(q) = q {
                    quadrics[v as usize] += q;
                }
            }
        }
        for list in &mut vertex_triangles {
            list.dedup();
        }

        Self {
            positions,
            normals: mesh.vertices().iter().map(|v| v.normal).collect(),
            tex_coords: mesh.vertices().iter().map(|v| v.tex_coord).collect(),
            quadrics,
            versions: vec![0; n],
            triangle_valid: vec![true; triangles.len()],
            live_triangles: triangles.len(),
            triangles,
            vertex_triangles,
            roots: UnionFind::new(n),
        }
    }

    /// Build the collapse candidate for the edge between two roots.
    fn candidate(&self, v0: u32, v1: u32) -> EdgeCandidate {
        let p0 = self.positions[v0 as usize];
        let p1 = self.positions[v1 as usize];
        let combined = self.quadrics[v0 as usize] + self.quadrics[v1 as usize];

        let midpoint = nalgebra::center(&p0, &p1);
        let edge_len = (p1 - p0).norm();
        let optimal_pos = match combined.optimal_point() {
            // Keep the optimum near the edge
            Some(p) if (p - midpoint).norm() <= edge_len * 2.0 => p,
            _ => midpoint,
        };

        EdgeCandidate {
            v0,
            v1,
            optimal_pos,
            error: combined.evaluate(&optimal_pos),
            versions: (self.versions[v0 as usize], self.versions[v1 as usize]),
        }
    }

    fn is_stale(&self, c: &EdgeCandidate) -> bool {
        c.versions != (self.versions[c.v0 as usize], self.versions[c.v1 as usize])
    }

    fn resolve(&mut self, t: u32) -> [u32; 3] {
        let [a, b, c] = self.triangles[t as usize];
        [self.roots.find(a), self.roots.find(b), self.roots.find(c)]
    }

    /// Check whether collapsing `v0`-`v1` to `target` keeps every surviving
    /// neighbour triangle facing the same way and the live count at or above
    /// `min_triangles`.
    fn can_collapse(&mut self, v0: u32, v1: u32, target: &Point3<f64>, min_triangles: usize) -> bool {
        let mut removed = 0usize;
        let incident: Vec<u32> = self.vertex_triangles[v0 as usize]
            .iter()
            .chain(&self.vertex_triangles[v1 as usize])
            .copied()
            .collect();

        let mut seen = HashSet::with_capacity(incident.len());
        for t in incident {
            if !self.triangle_valid[t as usize] || !seen.insert(t) {
                continue;
            }
            let corners = self.resolve(t);
            let touches = |v: u32| corners.contains(&v);
            if touches(v0) && touches(v1) {
                // Collapses into a degenerate triangle
                removed += 1;
                continue;
            }

            let old = corners.map(|v| self.positions[v as usize]);
            let new = corners.map(|v| if v == v0 || v == v1 { *target } else { self.positions[v as usize] });
            let old_n = (old[1] - old[0]).cross(&(old[2] - old[0]));
            let new_n = (new[1] - new[0]).cross(&(new[2] - new[0]));
            if old_n.dot(&new_n) <= 0.0 {
                return false;
            }
        }

        self.live_triangles - removed >= min_triangles
    }

    /// Merge `v1` into `v0` at `target`. Returns the number of triangles removed.
    fn collapse(&mut self, v0: u32, v1: u32, target: Point3<f64>) -> usize {
        let (i0, i1) = (v0 as usize, v1 as usize);

        self.positions[i0] = target;
        self.normals[i0] = normalize_or_keep(self.normals[i0] + self.normals[i1]);
        self.tex_coords[i0] = (self.tex_coords[i0] + self.tex_coords[i1]) * 0.5;
        let q1 = self.quadrics[i1];
        self.quadrics[i0] += q1;
        self.roots.merge_into(v1, v0);
        self.versions[i0] = self.versions[i0].wrapping_add(1);
        self.versions[i1] = self.versions[i1].wrapping_add(1);

        let moved = std::mem::take(&mut self.vertex_triangles[i1]);
        let mut list = std::mem::take(&mut self.vertex_triangles[i0]);
        list.extend(moved);
        list.sort_unstable();
        list.dedup();

        let mut removed = 0;
        list.retain(|&t| {
            if !self.triangle_valid[t as usize] {
                return false;
            }
            let [a, b, c] = self.resolve(t);
            if a == b || b == c || c == a {
                self.triangle_valid[t as usize] = false;
                removed += 1;
                false
            } else {
                true
            }
        });
        self.vertex_triangles[i0] = list;
        self.live_triangles -= removed;
        removed
    }

    /// Distinct root neighbours of the root `v`.
    fn neighbors(&mut self, v: u32) -> Vec<u32> {
        let tris = self.vertex_triangles[v as usize].clone();
        let mut out = Vec::with_capacity(tris.len() * 2);
        for t in tris {
            out.extend(self.resolve(t).into_iter().filter(|&u| u != v));
        }
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Compact the surviving triangles into a new mesh.
    fn into_mesh(mut self) -> Mesh {
        let mut remap = vec![u32::MAX; self.positions.len()];
        let mut vertices = Vec::new();
        let mut indices = Vec::with_capacity(self.live_triangles * 3);

        for t in 0..self.triangles.len() {
            if !self.triangle_valid[t] {
                continue;
            }
            for v in self.resolve(t as u32) {
                let slot = &mut remap[v as usize];
                if *slot == u32::MAX {
                    *slot = vertices.len() as u32;
                    let i = v as usize;
                    vertices.push(Vertex::new(
                        self.positions[i].cast(),
                        self.normals[i],
                        self.tex_coords[i],
                    ));
                }
                indices.push(*slot);
            }
        }

        let mut mesh = Mesh::from_parts_unchecked(vertices, indices);
        mesh.recompute_normals();
        mesh
    }
}

/// Simplify a mesh to at most `target` triangles using quadric error metrics.
///
/// Equivalent to [`simplify_with_progress`] with a private tracker.
pub fn simplify(mesh: &Mesh, target: usize) -> Result<Mesh> {
    simplify_with_progress(mesh, target, &ProgressState::default())
}

/// Simplify to `ratio` of the current triangle count (floored, at least 4).
pub fn simplify_ratio_with_progress(mesh: &Mesh, ratio: f32, progress: &ProgressState) -> Result<Mesh> {
    simplify_with_progress(mesh, ratio_target(mesh.num_triangles(), ratio), progress)
}

/// Performs QEM simplification with progress reporting and cancellation.
///
/// Edges are collapsed cheapest first until the live triangle count reaches
/// `target` or no acceptable collapse is left, so the result may stay above
/// `target` but never drops below it. A mesh already at or below `target`
/// is returned unchanged.
///
/// Cancellation is polled once per collapse. A cancelled run returns a copy
/// of the input, never a partially simplified mesh.
///
/// # Arguments
///
/// * `mesh` - The mesh to simplify
/// * `target` - Desired triangle count
/// * `progress` - Tracker for the single collapse phase
pub fn simplify_with_progress(mesh: &Mesh, target: usize, progress: &ProgressState) -> Result<Mesh> {
    mesh.validate()?;
    progress.begin();
    progress.set_phase(1);

    let original = mesh.num_triangles();
    if original <= target {
        progress.complete();
        return Ok(mesh.clone());
    }

    let mut state = Simplifier::new(mesh);

    let mut heap: BinaryHeap<EdgeCandidate> = BinaryHeap::new();
    let mut seen_edges: HashSet<EdgeKey> = HashSet::with_capacity(original * 3 / 2);
    for tri in &state.triangles {
        for edge in EdgeKey::of_triangle(*tri) {
            if edge.v0 != edge.v1 && seen_edges.insert(edge) {
                heap.push(state.candidate(edge.v0, edge.v1));
            }
        }
    }
    drop(seen_edges);

    let to_remove = (original - target) as f32;
    let mut removed = 0usize;
    let mut collapses = 0usize;

    while state.live_triangles > target {
        if progress.is_cancelled() {
            log::debug!("simplification cancelled after {} collapses", collapses);
            return Ok(mesh.clone());
        }
        progress.update_phase(removed as f32 / to_remove);

        let Some(candidate) = heap.pop() else {
            break;
        };

        let v0 = state.roots.find(candidate.v0);
        let v1 = state.roots.find(candidate.v1);
        if v0 == v1 || state.is_stale(&candidate) {
            continue;
        }

        if !state.can_collapse(v0, v1, &candidate.optimal_pos, target) {
            continue;
        }

        removed += state.collapse(v0, v1, candidate.optimal_pos);
        collapses += 1;

        for n in state.neighbors(v0) {
            heap.push(state.candidate(v0, n));
        }
    }

    log::debug!(
        "simplified {} -> {} triangles ({} collapses, target {})",
        original,
        state.live_triangles,
        collapses,
        target
    );

    let result = state.into_mesh();
    progress.complete();
    Ok(result)
}
