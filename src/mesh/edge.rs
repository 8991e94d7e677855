//! Canonical undirected edge keys.

/// An undirected edge between two vertices.
///
/// The endpoints are stored as `(min, max)`, so `EdgeKey::new(a, b)` and
/// `EdgeKey::new(b, a)` compare and hash equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    /// Smaller endpoint.
    pub v0: u32,
    /// Larger endpoint.
    pub v1: u32,
}

impl EdgeKey {
    /// Create a canonical edge key.
    #[inline]
    pub fn new(a: u32, b: u32) -> Self {
        if a < b {
            Self { v0: a, v1: b }
        } else {
            Self { v0: b, v1: a }
        }
    }

    /// The endpoint opposite to `v`, or `None` if `v` is not an endpoint.
    #[inline]
    pub fn other(&self, v: u32) -> Option<u32> {
        if v == self.v0 {
            Some(self.v1)
        } else if v == self.v1 {
            Some(self.v0)
        } else {
            None
        }
    }

    /// The three edges of a triangle, in corner order `(0,1) (1,2) (2,0)`.
    #[inline]
    pub fn of_triangle(tri: [u32; 3]) -> [EdgeKey; 3] {
        [
            EdgeKey::new(tri[0], tri[1]),
            EdgeKey::new(tri[1], tri[2]),
            EdgeKey::new(tri[2], tri[0]),
        ]
    }
}
