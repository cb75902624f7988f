//! Correspondence between two recorded meshes.
//!
//! Snapshot indices are not stable across topology edits, so before a step
//! can be animated we decide, once, where every target vertex starts from.
//! Three strategies are tried in order:
//!
//! - **Direct**: same vertex/edge/face counts, vertex `i` maps to vertex `i`.
//! - **Edge split**: the target only appended vertices, each sitting on an
//!   edge of the source (loop cuts, subdivide). New vertices slide out of
//!   their parent edge.
//! - **Hybrid**: anything else. Each target vertex starts from the nearest
//!   source vertex when one is within the snap threshold, from the source
//!   surface when it already lies on it, and from the nearest vertex
//!   otherwise.
//!
//! The resulting [`CorrespondenceCache`] is read-only and reused for every
//! frame of the step.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::geom::{BBox, Point3, SurfaceIndex, Tolerance, VertexIndex};
use crate::snapshot::MeshData;

/// Tunable constants of the split and hybrid strategies.
///
/// The defaults were picked empirically on typical modelling edits; treat
/// them as starting points rather than derived values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridThresholds {
    /// Snap radius as a fraction of the source bounding-box diagonal.
    pub snap_fraction: f64,
    /// Lower bound of the snap radius, in scene units.
    pub snap_floor: f64,
    /// Distance under which a point counts as lying on the source surface.
    pub surface_epsilon: f64,
    /// Distance under which an old vertex counts as unmoved in a split.
    pub split_epsilon: f64,
}

impl Default for HybridThresholds {
    fn default() -> Self {
        Self {
            snap_fraction: 0.15,
            snap_floor: 0.02,
            surface_epsilon: 1e-4,
            split_epsilon: Tolerance::SPLIT.eps,
        }
    }
}

impl HybridThresholds {
    /// Snap radius for a source mesh with the given bounding-box diagonal.
    #[must_use]
    pub fn snap_threshold(&self, bbox_diagonal: f64) -> f64 {
        self.snap_floor.max(bbox_diagonal * self.snap_fraction)
    }

    /// Replaces non-finite or negative values with the defaults.
    #[must_use]
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        let pick = |v: f64, d: f64| if v.is_finite() && v >= 0.0 { v } else { d };
        Self {
            snap_fraction: pick(self.snap_fraction, defaults.snap_fraction),
            snap_floor: pick(self.snap_floor, defaults.snap_floor),
            surface_epsilon: pick(self.surface_epsilon, defaults.surface_epsilon),
            split_epsilon: pick(self.split_epsilon, defaults.split_epsilon),
        }
    }
}

/// A target vertex created on a source edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeSplit {
    /// Lower source index of the parent edge.
    pub parent_a: u32,
    /// Higher source index of the parent edge.
    pub parent_b: u32,
    /// Position along `parent_a → parent_b` in the source, in `[0, 1]`.
    pub u: f64,
}

impl EdgeSplit {
    /// Point on the source parent edge the new vertex grows from.
    #[must_use]
    pub fn pivot(&self, source: &[Point3]) -> Option<Point3> {
        let a = source.get(self.parent_a as usize)?;
        let b = source.get(self.parent_b as usize)?;
        Some(a.lerp(*b, self.u))
    }
}

/// Strategy tag of a [`CorrespondenceCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    Direct,
    EdgeSplit,
    Hybrid,
}

/// Precomputed vertex correspondence for one (source, target) pair.
#[derive(Debug, Clone, PartialEq)]
pub enum CorrespondenceCache {
    /// Same topology; `n` vertices map by index.
    Direct { n: usize },
    /// Target = source vertices followed by one new vertex per entry, in order.
    EdgeSplit { splits: Vec<EdgeSplit> },
    /// Start position of every target vertex.
    Hybrid { sources: Vec<Point3> },
}

impl CorrespondenceCache {
    #[must_use]
    pub fn mode(&self) -> CacheMode {
        match self {
            Self::Direct { .. } => CacheMode::Direct,
            Self::EdgeSplit { .. } => CacheMode::EdgeSplit,
            Self::Hybrid { .. } => CacheMode::Hybrid,
        }
    }
}

/// Where a hybrid origin came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginKind {
    /// Within the snap radius of a source vertex.
    VertexSnap,
    /// On the source surface.
    Surface,
    /// Off the surface; grows from the nearest vertex.
    NearestVertex,
    /// No source feature available; the target position itself.
    Unmapped,
}

/// Builds the cache with default thresholds.
#[must_use]
pub fn build_cache(source: &MeshData, target: &MeshData) -> CorrespondenceCache {
    build_cache_with(source, target, &HybridThresholds::default())
}

/// Builds the cache, trying Direct, then edge split, then hybrid.
#[must_use]
pub fn build_cache_with(
    source: &MeshData,
    target: &MeshData,
    thresholds: &HybridThresholds,
) -> CorrespondenceCache {
    if source.signature() == target.signature() {
        log::debug!("correspondence: direct ({} vertices)", source.vertex_count());
        return CorrespondenceCache::Direct {
            n: source.vertex_count(),
        };
    }

    if let Some(splits) = detect_edge_splits(source, target, thresholds.split_epsilon) {
        log::debug!("correspondence: edge split ({} new vertices)", splits.len());
        return CorrespondenceCache::EdgeSplit { splits };
    }

    let sources = hybrid_origins(source, target, thresholds);
    CorrespondenceCache::Hybrid { sources }
}

/// Recognises a target that appended vertices on existing source edges
/// without moving any old vertex.
fn detect_edge_splits(source: &MeshData, target: &MeshData, eps: f64) -> Option<Vec<EdgeSplit>> {
    let n1 = source.vertex_count();
    let n2 = target.vertex_count();
    if n2 <= n1 {
        return None;
    }

    let tol = Tolerance::new(eps);
    let unmoved = source
        .vertices
        .iter()
        .zip(&target.vertices)
        .all(|(a, b)| tol.approx_eq_point3(*a, *b));
    if !unmoved {
        return None;
    }

    let source_edges: HashSet<(u32, u32)> = source
        .edges
        .iter()
        .map(|&[a, b]| ordered(a, b))
        .collect();

    let mut parents: Vec<BTreeSet<u32>> = vec![BTreeSet::new(); n2 - n1];
    for &[a, b] in &target.edges {
        let (ai, bi) = (a as usize, b as usize);
        if ai >= n2 || bi >= n2 {
            continue;
        }
        match (ai < n1, bi < n1) {
            (true, false) => {
                parents[bi - n1].insert(a);
            }
            (false, true) => {
                parents[ai - n1].insert(b);
            }
            _ => {}
        }
    }

    let mut splits = Vec::with_capacity(n2 - n1);
    for (offset, olds) in parents.iter().enumerate() {
        let mut it = olds.iter().copied();
        let (Some(a), Some(b), None) = (it.next(), it.next(), it.next()) else {
            return None;
        };
        if !source_edges.contains(&(a, b)) {
            return None;
        }

        let va = source.vertices[a as usize];
        let vb = source.vertices[b as usize];
        let edge = vb.sub_point(va);
        let denom = edge.length_squared();
        let u = if denom > 0.0 && denom.is_finite() {
            (target.vertices[n1 + offset].sub_point(va).dot(edge) / denom).clamp(0.0, 1.0)
        } else {
            0.5
        };
        splits.push(EdgeSplit {
            parent_a: a,
            parent_b: b,
            u: if u.is_finite() { u } else { 0.5 },
        });
    }

    Some(splits)
}

fn ordered(a: u32, b: u32) -> (u32, u32) {
    if a <= b { (a, b) } else { (b, a) }
}

fn hybrid_origins(source: &MeshData, target: &MeshData, thresholds: &HybridThresholds) -> Vec<Point3> {
    if source.vertices.is_empty() {
        log::debug!("correspondence: empty source, target appears in place");
        return target.vertices.clone();
    }

    let diagonal = BBox::from_points(&source.vertices).map_or(0.0, BBox::diagonal);
    let snap = thresholds.snap_threshold(if diagonal.is_finite() { diagonal } else { 0.0 });

    let vertices = VertexIndex::build(&source.vertices);
    if vertices.is_none() {
        log::warn!("correspondence: source vertices could not be indexed");
    }
    let surface = SurfaceIndex::build(&source.vertices, &source.faces);
    if surface.is_none() && !source.faces.is_empty() {
        log::warn!("correspondence: source surface could not be indexed, using vertices only");
    }

    let resolve = |p: &Point3| {
        resolve_origin(*p, vertices.as_ref(), surface.as_ref(), snap, thresholds.surface_epsilon)
    };

    #[cfg(feature = "parallel")]
    let resolved: Vec<(Point3, OriginKind)> = {
        use rayon::prelude::*;
        target.vertices.par_iter().map(resolve).collect()
    };
    #[cfg(not(feature = "parallel"))]
    let resolved: Vec<(Point3, OriginKind)> = target.vertices.iter().map(resolve).collect();

    let count = |kind| resolved.iter().filter(|(_, k)| *k == kind).count();
    log::debug!(
        "correspondence: hybrid ({} → {} vertices, snap {:.4}): {} snapped, {} on surface, {} nearest, {} unmapped",
        source.vertex_count(),
        target.vertex_count(),
        snap,
        count(OriginKind::VertexSnap),
        count(OriginKind::Surface),
        count(OriginKind::NearestVertex),
        count(OriginKind::Unmapped),
    );

    resolved.into_iter().map(|(p, _)| p).collect()
}

/// Picks the start position of one target vertex.
///
/// The vertex snap is inclusive of the threshold and wins over the surface
/// test; the surface test is strict.
#[must_use]
pub fn resolve_origin(
    point: Point3,
    vertices: Option<&VertexIndex>,
    surface: Option<&SurfaceIndex>,
    snap_threshold: f64,
    surface_epsilon: f64,
) -> (Point3, OriginKind) {
    let nearest_vertex = vertices.and_then(|index| index.nearest(point));

    if let Some(hit) = nearest_vertex {
        if hit.distance <= snap_threshold {
            return (hit.location, OriginKind::VertexSnap);
        }
    }

    if let Some(hit) = surface.and_then(|index| index.nearest(point)) {
        if hit.distance < surface_epsilon {
            return (hit.location, OriginKind::Surface);
        }
    }

    match nearest_vertex {
        Some(hit) => (hit.location, OriginKind::NearestVertex),
        None => (point, OriginKind::Unmapped),
    }
}
