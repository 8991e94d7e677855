//! Built-in test shapes.
//!
//! These are used by the tests, the benchmarks and the CLI, which has no
//! file loading of its own.

use std::collections::HashMap;
use std::f32::consts::PI;

use nalgebra::{Point3, Vector2, Vector3};

use super::{EdgeKey, Mesh, Vertex};

/// Axis-aligned unit cube centered at the origin.
///
/// Every face has its own four vertices carrying the face normal (24
/// vertices, 12 triangles), the way a loader produces flat-shaded meshes.
/// The faces are wound counter-clockwise seen from outside.
pub fn cube() -> Mesh {
    // (normal, u, v) with u x v = normal
    let faces: [(Vector3<f32>, Vector3<f32>, Vector3<f32>); 6] = [
        (Vector3::x(), Vector3::y(), Vector3::z()),
        (-Vector3::x(), Vector3::z(), Vector3::y()),
        (Vector3::y(), Vector3::z(), Vector3::x()),
        (-Vector3::y(), Vector3::x(), Vector3::z()),
        (Vector3::z(), Vector3::x(), Vector3::y()),
        (-Vector3::z(), Vector3::y(), Vector3::x()),
    ];
    let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (n, u, v) in faces {
        let base = vertices.len() as u32;
        for (su, sv) in corners {
            let p = (n + u * su + v * sv) * 0.5;
            let uv = Vector2::new((su + 1.0) * 0.5, (sv + 1.0) * 0.5);
            vertices.push(Vertex::new(Point3::from(p), n, uv));
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    Mesh::from_parts_unchecked(vertices, indices)
}

/// A tetrahedron with shared vertices.
pub fn tetrahedron() -> Mesh {
    let positions = [
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.5, 1.0, 0.0),
        Point3::new(0.5, 0.5, 1.0),
    ];
    let indices = vec![0, 2, 1, 0, 1, 3, 1, 2, 3, 2, 0, 3];
    with_geometric_normals(positions.iter().map(|&p| Vertex::at(p)).collect(), indices)
}

/// Regular icosahedron (12 vertices, 20 triangles) inscribed in a sphere of
/// the given radius.
pub fn icosahedron(radius: f32) -> Mesh {
    let t = (1.0 + 5.0_f32.sqrt()) * 0.5;
    let raw = [
        (-1.0, t, 0.0),
        (1.0, t, 0.0),
        (-1.0, -t, 0.0),
        (1.0, -t, 0.0),
        (0.0, -1.0, t),
        (0.0, 1.0, t),
        (0.0, -1.0, -t),
        (0.0, 1.0, -t),
        (t, 0.0, -1.0),
        (t, 0.0, 1.0),
        (-t, 0.0, -1.0),
        (-t, 0.0, 1.0),
    ];
    #[rustfmt::skip]
    let indices = vec![
        0, 11, 5,   0, 5, 1,    0, 1, 7,    0, 7, 10,   0, 10, 11,
        1, 5, 9,    5, 11, 4,   11, 10, 2,  10, 7, 6,   7, 1, 8,
        3, 9, 4,    3, 4, 2,    3, 2, 6,    3, 6, 8,    3, 8, 9,
        4, 9, 5,    2, 4, 11,   6, 2, 10,   8, 6, 7,    9, 8, 1,
    ];
    let vertices = raw
        .iter()
        .map(|&(x, y, z)| sphere_vertex(Vector3::new(x, y, z), radius))
        .collect();
    Mesh::from_parts_unchecked(vertices, indices)
}

/// Icosphere: an icosahedron refined `subdivisions` times, with every new
/// vertex projected back onto the sphere.
///
/// Triangle count is `20 * 4^subdivisions`.
pub fn icosphere(radius: f32, subdivisions: usize) -> Mesh {
    let (mut vertices, mut indices) = icosahedron(radius).into_parts();

    for _ in 0..subdivisions {
        let mut midpoints: HashMap<EdgeKey, u32> = HashMap::new();
        let mut next = Vec::with_capacity(indices.len() * 4);
        for tri in indices.chunks_exact(3) {
            let mut mid = |a: u32, b: u32| -> u32 {
                *midpoints.entry(EdgeKey::new(a, b)).or_insert_with(|| {
                    let p = vertices[a as usize].position.coords
                        + vertices[b as usize].position.coords;
                    vertices.push(sphere_vertex(p, radius));
                    (vertices.len() - 1) as u32
                })
            };
            let (i0, i1, i2) = (tri[0], tri[1], tri[2]);
            let m01 = mid(i0, i1);
            let m12 = mid(i1, i2);
            let m20 = mid(i2, i0);
            next.extend_from_slice(&[i0, m01, m20, m01, i1, m12, m20, m12, i2, m01, m12, m20]);
        }
        indices = next;
    }

    Mesh::from_parts_unchecked(vertices, indices)
}

/// Flat `n x n` grid of quads (two triangles each) in the XY plane.
///
/// The grid is open, so its outer edges are boundary edges.
pub fn grid(n: usize) -> Mesh {
    let n = n.max(1);
    let mut vertices = Vec::with_capacity((n + 1) * (n + 1));
    for j in 0..=n {
        for i in 0..=n {
            let (u, v) = (i as f32 / n as f32, j as f32 / n as f32);
            vertices.push(Vertex::new(
                Point3::new(i as f32, j as f32, 0.0),
                Vector3::z(),
                Vector2::new(u, v),
            ));
        }
    }

    let mut indices = Vec::with_capacity(n * n * 6);
    for j in 0..n {
        for i in 0..n {
            let v00 = (j * (n + 1) + i) as u32;
            let v10 = v00 + 1;
            let v01 = v00 + (n + 1) as u32;
            let v11 = v01 + 1;
            indices.extend_from_slice(&[v00, v10, v11, v00, v11, v01]);
        }
    }

    Mesh::from_parts_unchecked(vertices, indices)
}

fn sphere_vertex(direction: Vector3<f32>, radius: f32) -> Vertex {
    let n = direction.normalize();
    let u = 0.5 + n.z.atan2(n.x) / (2.0 * PI);
    let v = 0.5 - n.y.asin() / PI;
    Vertex::new(Point3::from(n * radius), n, Vector2::new(u, v))
}

fn with_geometric_normals(vertices: Vec<Vertex>, indices: Vec<u32>) -> Mesh {
    let mut mesh = Mesh::from_parts_unchecked(vertices, indices);
    mesh.recompute_normals();
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_outward(mesh: &Mesh) {
        let center = mesh.bounds().center();
        for t in 0..mesh.num_triangles() {
            let [a, b, c] = mesh.triangle(t);
            let centroid = (mesh.position(a).coords
                + mesh.position(b).coords
                + mesh.position(c).coords)
                / 3.0;
            let outward = centroid - center.coords;
            assert!(mesh.face_normal(t).dot(&outward) > 0.0, "triangle {} faces inward", t);
        }
    }

    #[test]
    fn test_cube() {
        let mesh = cube();
        assert_eq!(mesh.num_vertices(), 24);
        assert_eq!(mesh.num_triangles(), 12);
        assert!(mesh.validate().is_ok());
        assert_outward(&mesh);
        assert_eq!(mesh.bounds().min, Point3::new(-0.5, -0.5, -0.5));
        assert_eq!(mesh.bounds().max, Point3::new(0.5, 0.5, 0.5));
    }

    #[test]
    fn test_icosahedron() {
        let mesh = icosahedron(2.0);
        assert_eq!(mesh.num_vertices(), 12);
        assert_eq!(mesh.num_triangles(), 20);
        assert_outward(&mesh);
        for v in mesh.vertices() {
            assert!((v.position.coords.norm() - 2.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_icosphere_counts() {
        let mesh = icosphere(1.0, 2);
        assert_eq!(mesh.num_triangles(), 320);
        // V - E + F = 2 with E = 3F/2
        assert_eq!(mesh.num_vertices(), 2 + 320 / 2);
        assert_outward(&mesh);
    }

    #[test]
    fn test_grid() {
        let mesh = grid(3);
        assert_eq!(mesh.num_vertices(), 16);
        assert_eq!(mesh.num_triangles(), 18);
        for v in mesh.vertices() {
            assert_eq!(v.normal, Vector3::z());
        }
    }

    #[test]
    fn test_tetrahedron() {
        let mesh = tetrahedron();
        assert_eq!(mesh.num_triangles(), 4);
        assert_outward(&mesh);
    }
}
