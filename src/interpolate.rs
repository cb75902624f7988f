//! Per-frame vertex positions between two snapshots.

use crate::correspondence::CorrespondenceCache;
use crate::geom::Point3;
use crate::snapshot::MeshData;

/// Which snapshot's edges and faces go with the interpolated positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyOwner {
    Source,
    Target,
}

/// One interpolated frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Interpolated {
    pub positions: Vec<Point3>,
    pub topology: TopologyOwner,
}

impl Interpolated {
    /// Full mesh for this frame, borrowing edges and faces from the owner.
    #[must_use]
    pub fn to_mesh(&self, source: &MeshData, target: &MeshData) -> MeshData {
        let owner = match self.topology {
            TopologyOwner::Source => source,
            TopologyOwner::Target => target,
        };
        owner.with_vertices(self.positions.clone())
    }
}

/// Positions at parameter `t` (clamped to `[0, 1]`, NaN treated as 0).
///
/// At `t == 1` the result is the target's vertex array, bit for bit. At
/// `t == 0` it is the source array (Direct), the source array followed by
/// the split pivots (EdgeSplit), or the cached origins (Hybrid).
///
/// A cache that does not fit the two meshes holds the source until `t`
/// reaches 1 and then snaps to the target.
#[must_use]
pub fn interpolate(
    source: &MeshData,
    target: &MeshData,
    t: f64,
    cache: &CorrespondenceCache,
) -> Interpolated {
    let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
    let src = &source.vertices;
    let dst = &target.vertices;

    if t >= 1.0 {
        return Interpolated {
            positions: dst.clone(),
            topology: TopologyOwner::Target,
        };
    }

    let positions = match cache {
        CorrespondenceCache::Direct { n } if src.len() == *n && dst.len() == *n => {
            Some(lerp_all(src, dst, t))
        }
        CorrespondenceCache::EdgeSplit { splits }
            if dst.len() >= splits.len() && src.len() == dst.len() - splits.len() =>
        {
            let n1 = src.len();
            let mut positions = lerp_all(src, &dst[..n1], t);
            positions.extend(splits.iter().zip(&dst[n1..]).map(|(split, end)| {
                split
                    .pivot(src)
                    .map_or(*end, |pivot| lerp_point(pivot, *end, t))
            }));
            Some(positions)
        }
        CorrespondenceCache::Hybrid { sources } if sources.len() == dst.len() => {
            Some(lerp_all(sources, dst, t))
        }
        _ => None,
    };

    match positions {
        Some(positions) => Interpolated {
            positions,
            topology: TopologyOwner::Target,
        },
        None => {
            log::warn!(
                "interpolate: {:?} cache does not fit {} → {} vertices, holding source",
                cache.mode(),
                src.len(),
                dst.len()
            );
            Interpolated {
                positions: src.clone(),
                topology: TopologyOwner::Source,
            }
        }
    }
}

fn lerp_all(from: &[Point3], to: &[Point3], t: f64) -> Vec<Point3> {
    from.iter().zip(to).map(|(a, b)| lerp_point(*a, *b, t)).collect()
}

fn lerp_point(a: Point3, b: Point3, t: f64) -> Point3 {
    if t <= 0.0 { a } else { a.lerp(b, t) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correspondence::{EdgeSplit, build_cache};

    fn strip(offset: f64) -> MeshData {
        MeshData::new(
            vec![
                Point3::new(0.1 + offset, 0.2, 0.3),
                Point3::new(1.7, 0.3 - offset, 0.9),
                Point3::new(0.3, 1.1, -0.7 + offset),
            ],
            vec![[0, 1], [1, 2], [2, 0]],
            vec![vec![0, 1, 2]],
        )
    }

    #[test]
    fn direct_endpoints_are_exact() {
        let source = strip(0.0);
        let target = strip(0.37);
        let cache = build_cache(&source, &target);

        let start = interpolate(&source, &target, 0.0, &cache);
        assert_eq!(start.positions, source.vertices);
        let end = interpolate(&source, &target, 1.0, &cache);
        assert_eq!(end.positions, target.vertices);
        assert_eq!(end.topology, TopologyOwner::Target);

        let mid = interpolate(&source, &target, 0.5, &cache);
        assert!((mid.positions[0].x - (0.1 + 0.37 / 2.0)).abs() < 1e-12);
    }

    #[test]
    fn same_mesh_stays_put_for_every_t() {
        let mesh = strip(0.0);
        let cache = build_cache(&mesh, &mesh);
        for step in 0..=10 {
            let t = f64::from(step) / 10.0;
            assert_eq!(interpolate(&mesh, &mesh, t, &cache).positions, mesh.vertices);
        }
    }

    #[test]
    fn split_vertex_slides_out_of_its_edge() {
        let source = MeshData::new(
            vec![Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 0.0, 0.0)],
            vec![[0, 1]],
            vec![],
        );
        let target = MeshData::new(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(2.0, 0.0, 0.0),
                Point3::new(0.5, 1.0, 0.0),
            ],
            vec![[0, 2], [2, 1]],
            vec![],
        );
        let cache = CorrespondenceCache::EdgeSplit {
            splits: vec![EdgeSplit {
                parent_a: 0,
                parent_b: 1,
                u: 0.25,
            }],
        };

        let start = interpolate(&source, &target, 0.0, &cache);
        assert_eq!(start.positions[2], Point3::new(0.5, 0.0, 0.0));
        let mid = interpolate(&source, &target, 0.5, &cache);
        assert_eq!(mid.positions[2], Point3::new(0.5, 0.5, 0.0));
        assert_eq!(interpolate(&source, &target, 1.0, &cache).positions, target.vertices);
    }

    #[test]
    fn hybrid_starts_at_cached_origins() {
        let source = strip(0.0);
        let target = MeshData::new(vec![Point3::new(4.0, 0.0, 0.0)], vec![], vec![]);
        let origin = Point3::new(1.0, 0.0, 0.0);
        let cache = CorrespondenceCache::Hybrid {
            sources: vec![origin],
        };

        assert_eq!(interpolate(&source, &target, 0.0, &cache).positions, vec![origin]);
        assert_eq!(
            interpolate(&source, &target, 0.5, &cache).positions,
            vec![Point3::new(2.5, 0.0, 0.0)]
        );
    }

    #[test]
    fn out_of_range_and_nan_parameters_clamp() {
        let source = strip(0.0);
        let target = strip(1.0);
        let cache = build_cache(&source, &target);
        assert_eq!(interpolate(&source, &target, -3.0, &cache).positions, source.vertices);
        assert_eq!(interpolate(&source, &target, f64::NAN, &cache).positions, source.vertices);
        assert_eq!(interpolate(&source, &target, 7.0, &cache).positions, target.vertices);
    }

    #[test]
    fn mismatched_cache_holds_source_then_snaps() {
        let source = strip(0.0);
        let target = strip(1.0);
        let stale = CorrespondenceCache::Direct { n: 7 };

        let mid = interpolate(&source, &target, 0.4, &stale);
        assert_eq!(mid.positions, source.vertices);
        assert_eq!(mid.topology, TopologyOwner::Source);
        assert_eq!(mid.to_mesh(&source, &target), source);

        let end = interpolate(&source, &target, 1.0, &stale);
        assert_eq!(end.positions, target.vertices);
    }
}
