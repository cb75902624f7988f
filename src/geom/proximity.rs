//! Nearest-feature queries against a source mesh.
//!
//! Both indices are short-lived: they are built for one correspondence pass
//! and dropped with it.

use super::bvh::Bvh;
use super::{BBox, Point3};

/// Result of a nearest-feature query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestHit {
    /// Index of the vertex or triangle that was hit.
    pub index: usize,
    /// Closest location on that feature.
    pub location: Point3,
    /// Euclidean distance from the query point to `location`.
    pub distance: f64,
}

/// Nearest-vertex lookup over a point set.
#[derive(Debug, Clone)]
pub struct VertexIndex {
    points: Vec<Point3>,
    bvh: Bvh,
}

impl VertexIndex {
    /// Returns `None` when `points` is empty or contains non-finite values.
    #[must_use]
    pub fn build(points: &[Point3]) -> Option<Self> {
        let boxes: Vec<BBox> = points.iter().copied().map(BBox::from_point).collect();
        let bvh = Bvh::build(&boxes)?;
        Some(Self {
            points: points.to_vec(),
            bvh,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Closest stored vertex; ties resolve to the lowest index.
    #[must_use]
    pub fn nearest(&self, query: Point3) -> Option<NearestHit> {
        let (index, dist2) = self.bvh.nearest(query, f64::INFINITY, |i| {
            Some(self.points[i].distance_squared_to(query))
        })?;
        Some(NearestHit {
            index,
            location: self.points[index],
            distance: dist2.sqrt(),
        })
    }
}

/// Nearest-point lookup over the fan-triangulated faces of a polygon mesh.
#[derive(Debug, Clone)]
pub struct SurfaceIndex {
    triangles: Vec<[Point3; 3]>,
    bvh: Bvh,
}

impl SurfaceIndex {
    /// Triangulates `faces` (each a vertex-index loop into `points`) and
    /// indexes the triangles.
    ///
    /// Faces with fewer than three vertices or out-of-range indices are
    /// skipped, as are zero-area triangles. Returns `None` when nothing
    /// usable is left.
    #[must_use]
    pub fn build(points: &[Point3], faces: &[Vec<u32>]) -> Option<Self> {
        let mut triangles = Vec::new();
        for face in faces {
            if face.len() < 3 || face.iter().any(|&i| i as usize >= points.len()) {
                continue;
            }
            let a = points[face[0] as usize];
            for pair in face[1..].windows(2) {
                let tri = [a, points[pair[0] as usize], points[pair[1] as usize]];
                if !is_degenerate(&tri) {
                    triangles.push(tri);
                }
            }
        }

        let boxes: Vec<BBox> = triangles
            .iter()
            .map(|tri| BBox::from_point(tri[0]).expand_point(tri[1]).expand_point(tri[2]))
            .collect();
        let bvh = Bvh::build(&boxes)?;
        Some(Self { triangles, bvh })
    }

    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.bvh.primitive_count()
    }

    /// Closest point on any indexed triangle.
    #[must_use]
    pub fn nearest(&self, query: Point3) -> Option<NearestHit> {
        let (index, dist2) = self.bvh.nearest(query, f64::INFINITY, |i| {
            let [a, b, c] = self.triangles[i];
            Some(closest_point_on_triangle(query, a, b, c).distance_squared_to(query))
        })?;
        let [a, b, c] = self.triangles[index];
        Some(NearestHit {
            index,
            location: closest_point_on_triangle(query, a, b, c),
            distance: dist2.sqrt(),
        })
    }
}

fn is_degenerate(tri: &[Point3; 3]) -> bool {
    let n = tri[1].sub_point(tri[0]).cross(tri[2].sub_point(tri[0]));
    let area2 = n.length_squared();
    !area2.is_finite() || area2 <= 1e-24
}

/// Closest point to `p` on triangle `abc` by Voronoi-region classification.
#[must_use]
pub fn closest_point_on_triangle(p: Point3, a: Point3, b: Point3, c: Point3) -> Point3 {
    let ab = b.sub_point(a);
    let ac = c.sub_point(a);
    let ap = p.sub_point(a);

    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p.sub_point(b);
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a.add_vec(ab.mul_scalar(v));
    }

    let cp = p.sub_point(c);
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a.add_vec(ac.mul_scalar(w));
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b.add_vec(c.sub_point(b).mul_scalar(w));
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a.add_vec(ab.mul_scalar(v)).add_vec(ac.mul_scalar(w))
}
