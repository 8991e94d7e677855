//! Indexed triangle mesh with per-vertex attributes.

use nalgebra::{Point3, Vector2, Vector3};

use crate::error::{MeshError, Result};

/// A mesh vertex: position, shading normal and texture coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    /// Object-space position.
    pub position: Point3<f32>,
    /// Unit shading normal.
    pub normal: Vector3<f32>,
    /// 2D texture coordinate.
    pub tex_coord: Vector2<f32>,
}

impl Vertex {
    /// Create a vertex from its three attributes.
    pub fn new(position: Point3<f32>, normal: Vector3<f32>, tex_coord: Vector2<f32>) -> Self {
        Self {
            position,
            normal,
            tex_coord,
        }
    }

    /// Create a vertex at `position` with a zero normal and texture coordinate.
    pub fn at(position: Point3<f32>) -> Self {
        Self::new(position, Vector3::zeros(), Vector2::zeros())
    }

    /// Linear blend `self * (1 - t) + other * t` of all attributes.
    ///
    /// The normal is renormalized when it has a usable length.
    pub fn lerp(&self, other: &Vertex, t: f32) -> Vertex {
        let s = 1.0 - t;
        Vertex {
            position: Point3::from(self.position.coords * s + other.position.coords * t),
            normal: normalize_or_keep(self.normal * s + other.normal * t),
            tex_coord: self.tex_coord * s + other.tex_coord * t,
        }
    }
}

impl Default for Vertex {
    fn default() -> Self {
        Self::at(Point3::origin())
    }
}

/// Normalize `v`, or return it unchanged when it is (nearly) zero.
pub(crate) fn normalize_or_keep(v: Vector3<f32>) -> Vector3<f32> {
    let len = v.norm();
    if len > 1e-12 {
        v / len
    } else {
        v
    }
}

/// Axis-aligned bounding box.
///
/// An empty box has `min > max` on every axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Minimum corner.
    pub min: Point3<f32>,
    /// Maximum corner.
    pub max: Point3<f32>,
}

impl Bounds {
    /// An empty (inverted) box.
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f32::MAX, f32::MAX, f32::MAX),
            max: Point3::new(f32::MIN, f32::MIN, f32::MIN),
        }
    }

    /// Grow the box to contain `p`.
    pub fn extend(&mut self, p: &Point3<f32>) {
        self.min = self.min.inf(p);
        self.max = self.max.sup(p);
    }

    /// Whether the box contains at least one point.
    pub fn is_valid(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z
    }

    /// Center of the box.
    pub fn center(&self) -> Point3<f32> {
        nalgebra::center(&self.min, &self.max)
    }

    /// Half the length of the box diagonal.
    pub fn radius(&self) -> f32 {
        if self.is_valid() {
            (self.max - self.min).norm() * 0.5
        } else {
            0.0
        }
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::empty()
    }
}

/// An indexed triangle mesh.
///
/// Every index is smaller than the vertex count and the index count is a
/// multiple of 3. Meshes built through [`Mesh::from_parts`] are validated;
/// the algorithms in this crate only ever produce meshes that satisfy the
/// same invariant.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    bounds: Bounds,
}

impl Default for Mesh {
    fn default() -> Self {
        Self::new()
    }
}

impl Mesh {
    /// Create an empty mesh.
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
            bounds: Bounds::empty(),
        }
    }

    /// Build a mesh from vertex and index buffers, validating the indices.
    pub fn from_parts(vertices: Vec<Vertex>, indices: Vec<u32>) -> Result<Self> {
        validate_indices(vertices.len(), &indices)?;
        Ok(Self::from_parts_unchecked(vertices, indices))
    }

    /// Build a mesh from buffers already known to be valid.
    pub(crate) fn from_parts_unchecked(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        debug_assert!(validate_indices(vertices.len(), &indices).is_ok());
        let mut mesh = Self {
            vertices,
            indices,
            bounds: Bounds::empty(),
        };
        mesh.recompute_bounds();
        mesh
    }

    /// Check the index invariant.
    pub fn validate(&self) -> Result<()> {
        validate_indices(self.vertices.len(), &self.indices)
    }

    /// Vertex buffer.
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// Index buffer (three corners per triangle).
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Consume the mesh and return its buffers.
    pub fn into_parts(self) -> (Vec<Vertex>, Vec<u32>) {
        (self.vertices, self.indices)
    }

    /// Number of vertices.
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Number of triangles.
    pub fn num_triangles(&self) -> usize {
        self.indices.len() / 3
    }

    /// Whether the mesh has no vertices.
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Corner indices of triangle `t`.
    #[inline]
    pub fn triangle(&self, t: usize) -> [u32; 3] {
        [
            self.indices[3 * t],
            self.indices[3 * t + 1],
            self.indices[3 * t + 2],
        ]
    }

    /// Iterate over all triangles.
    pub fn triangles(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        self.indices.chunks_exact(3).map(|c| [c[0], c[1], c[2]])
    }

    /// Position of vertex `v`.
    #[inline]
    pub fn position(&self, v: u32) -> &Point3<f32> {
        &self.vertices[v as usize].position
    }

    /// Unnormalized face normal (cross product of two edges) of triangle `t`.
    ///
    /// Its length is twice the triangle area.
    pub fn face_normal(&self, t: usize) -> Vector3<f32> {
        let [a, b, c] = self.triangle(t);
        triangle_normal(self.position(a), self.position(b), self.position(c))
    }

    /// Axis-aligned bounds as of the last recompute.
    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// Recompute the bounding box from vertex positions.
    pub fn recompute_bounds(&mut self) {
        let mut bounds = Bounds::empty();
        for v in &self.vertices {
            bounds.extend(&v.position);
        }
        self.bounds = bounds;
    }

    /// Recompute vertex normals from the triangle geometry.
    ///
    /// Each vertex normal is the normalized sum of the area-weighted normals
    /// of its incident triangles. Vertices with no usable incident area keep
    /// their previous normal.
    pub fn recompute_normals(&mut self) {
        let mut sums = vec![Vector3::<f32>::zeros(); self.vertices.len()];
        for t in 0..self.num_triangles() {
            let n = self.face_normal(t);
            for v in self.triangle(t) {
                sums[v as usize] += n;
            }
        }
        for (vertex, sum) in self.vertices.iter_mut().zip(sums) {
            let len = sum.norm();
            if len > 1e-10 {
                vertex.normal = sum / len;
            }
        }
    }
}

/// Unnormalized normal of the triangle `(a, b, c)`.
#[inline]
pub(crate) fn triangle_normal(a: &Point3<f32>, b: &Point3<f32>, c: &Point3<f32>) -> Vector3<f32> {
    (b - a).cross(&(c - a))
}

fn validate_indices(vertex_count: usize, indices: &[u32]) -> Result<()> {
    if indices.len() % 3 != 0 {
        return Err(MeshError::IndexCountNotTriangles {
            count: indices.len(),
        });
    }
    for (corner, &vertex) in indices.iter().enumerate() {
        if vertex as usize >= vertex_count {
            return Err(MeshError::InvalidVertexIndex {
                corner,
                vertex,
                vertex_count,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle_vertices() -> Vec<Vertex> {
        vec![
            Vertex::at(Point3::new(0.0, 0.0, 0.0)),
            Vertex::at(Point3::new(1.0, 0.0, 0.0)),
            Vertex::at(Point3::new(0.0, 1.0, 0.0)),
        ]
    }

    #[test]
    fn test_from_parts_rejects_bad_indices() {
        let err = Mesh::from_parts(triangle_vertices(), vec![0, 1, 3]).unwrap_err();
        assert!(matches!(
            err,
            MeshError::InvalidVertexIndex { corner: 2, vertex: 3, .. }
        ));

        let err = Mesh::from_parts(triangle_vertices(), vec![0, 1]).unwrap_err();
        assert!(matches!(err, MeshError::IndexCountNotTriangles { count: 2 }));
    }

    #[test]
    fn test_bounds() {
        let mesh = Mesh::from_parts(triangle_vertices(), vec![0, 1, 2]).unwrap();
        let b = mesh.bounds();
        assert!(b.is_valid());
        assert_eq!(b.min, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(b.max, Point3::new(1.0, 1.0, 0.0));
        assert!((b.center() - Point3::new(0.5, 0.5, 0.0)).norm() < 1e-6);

        assert!(!Mesh::new().bounds().is_valid());
        assert_eq!(Mesh::new().bounds().radius(), 0.0);
    }

    #[test]
    fn test_recompute_normals() {
        let mut mesh = Mesh::from_parts(triangle_vertices(), vec![0, 1, 2]).unwrap();
        mesh.recompute_normals();
        for v in mesh.vertices() {
            assert!((v.normal - Vector3::z()).norm() < 1e-6);
        }
    }

    #[test]
    fn test_vertex_lerp() {
        let a = Vertex::new(Point3::origin(), Vector3::x(), Vector2::new(0.0, 0.0));
        let b = Vertex::new(Point3::new(2.0, 0.0, 0.0), Vector3::y(), Vector2::new(1.0, 1.0));
        let m = a.lerp(&b, 0.5);
        assert_eq!(m.position, Point3::new(1.0, 0.0, 0.0));
        assert!((m.normal.norm() - 1.0).abs() < 1e-6);
        assert_eq!(m.tex_coord, Vector2::new(0.5, 0.5));
    }
}
