//! Content fingerprints for change detection on a live mesh.

use crate::geom::Point3;
use crate::snapshot::MeshData;

/// Decimal places kept per coordinate before hashing.
pub const FINGERPRINT_DECIMALS: i32 = 4;

/// Hashes rounded vertex coordinates (in order) together with the edge count.
///
/// Rounding to [`FINGERPRINT_DECIMALS`] suppresses float jitter from the host.
/// Vertex order is significant: the same positions in another order hash
/// differently. The digest is stable across builds and platforms so it can be
/// persisted alongside snapshots.
#[must_use]
pub fn fingerprint(vertices: &[Point3], edge_count: usize) -> u64 {
    let scale = 10f64.powi(FINGERPRINT_DECIMALS);
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(vertices.len() as u64).to_le_bytes());
    for v in vertices {
        for c in [v.x, v.y, v.z] {
            hasher.update(&quantize(c, scale).to_le_bytes());
        }
    }
    hasher.update(&(edge_count as u64).to_le_bytes());

    let digest = hasher.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(head)
}

/// Fingerprint of a full mesh.
#[must_use]
pub fn mesh_fingerprint(mesh: &MeshData) -> u64 {
    fingerprint(&mesh.vertices, mesh.edges.len())
}

fn quantize(value: f64, scale: f64) -> i64 {
    if value.is_nan() {
        return i64::MIN;
    }
    // `as` saturates on overflow and maps -0.0 to 0.
    (value * scale).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tri() -> Vec<Point3> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn jitter_below_precision_is_ignored() {
        let mut jittered = tri();
        jittered[1].x += 2e-5;
        jittered[2].y -= 3e-5;
        assert_eq!(fingerprint(&tri(), 3), fingerprint(&jittered, 3));
    }

    #[test]
    fn visible_moves_change_the_hash() {
        let mut moved = tri();
        moved[1].x += 1e-3;
        assert_ne!(fingerprint(&tri(), 3), fingerprint(&moved, 3));
    }

    #[test]
    fn edge_count_and_order_matter() {
        assert_ne!(fingerprint(&tri(), 3), fingerprint(&tri(), 2));

        let mut reordered = tri();
        reordered.swap(1, 2);
        assert_ne!(fingerprint(&tri(), 3), fingerprint(&reordered, 3));
    }

    #[test]
    fn negative_zero_matches_zero() {
        let a = vec![Point3::new(0.0, 0.0, 0.0)];
        let b = vec![Point3::new(-0.0, -0.00001, 0.0)];
        assert_eq!(fingerprint(&a, 0), fingerprint(&b, 0));
    }

    #[test]
    fn empty_mesh_is_deterministic() {
        assert_eq!(fingerprint(&[], 0), fingerprint(&[], 0));
        assert_ne!(fingerprint(&[], 0), fingerprint(&[Point3::ORIGIN], 0));
    }
}
