use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::ops::Range;

use super::{BBox, Point3};

#[derive(Debug, Clone, Copy)]
enum NodeKind {
    /// `order[first..first + len]` are the primitives of this leaf.
    Leaf { first: u32, len: u32 },
    Branch { children: [u32; 2] },
}

#[derive(Debug, Clone, Copy)]
struct Node {
    bounds: BBox,
    kind: NodeKind,
}

/// Median-split bounding volume hierarchy over primitive boxes.
///
/// Primitives are referred to by their index in the slice passed to
/// [`Bvh::build`]; the tree never stores the primitives themselves, so the
/// same structure serves point sets and triangle soups.
#[derive(Debug, Clone)]
pub(crate) struct Bvh {
    nodes: Vec<Node>,
    order: Vec<u32>,
}

impl Bvh {
    const DEFAULT_LEAF_SIZE: usize = 8;

    /// Returns `None` for an empty input or when any box is non-finite.
    #[must_use]
    pub(crate) fn build(bboxes: &[BBox]) -> Option<Self> {
        Self::build_with_leaf_size(bboxes, Self::DEFAULT_LEAF_SIZE)
    }

    #[must_use]
    pub(crate) fn build_with_leaf_size(bboxes: &[BBox], leaf_size: usize) -> Option<Self> {
        let count = u32::try_from(bboxes.len()).ok()?;
        if count == 0 || bboxes.iter().any(|b| !b.min.is_finite() || !b.max.is_finite()) {
            return None;
        }

        let mut bvh = Self {
            nodes: Vec::with_capacity(bboxes.len().saturating_mul(2)),
            order: (0..count).collect(),
        };
        bvh.split(bboxes, 0..bboxes.len(), leaf_size.clamp(1, 256));
        Some(bvh)
    }

    /// Builds the subtree over `order[range]` and returns its node index.
    fn split(&mut self, bboxes: &[BBox], range: Range<usize>, leaf_size: usize) -> u32 {
        let slot = self.nodes.len();
        let members = &self.order[range.clone()];
        let bounds = members
            .iter()
            .map(|&i| bboxes[i as usize])
            .reduce(BBox::union)
            .unwrap_or_else(|| BBox::from_point(Point3::ORIGIN));

        // Node indices and ranges fit in u32 because the primitive count does.
        #[allow(clippy::cast_possible_truncation)]
        let (first, len) = (range.start as u32, range.len() as u32);
        self.nodes.push(Node {
            bounds,
            kind: NodeKind::Leaf { first, len },
        });
        if range.len() <= leaf_size {
            return slot as u32;
        }

        let axis = widest_centroid_axis(members.iter().map(|&i| bboxes[i as usize].center()));
        let mid = range.start + range.len() / 2;
        self.order[range.clone()].select_nth_unstable_by(mid - range.start, |&a, &b| {
            let ca = bboxes[a as usize].center().to_array()[axis];
            let cb = bboxes[b as usize].center().to_array()[axis];
            ca.total_cmp(&cb)
        });

        let left = self.split(bboxes, range.start..mid, leaf_size);
        let right = self.split(bboxes, mid..range.end, leaf_size);
        self.nodes[slot].kind = NodeKind::Branch {
            children: [left, right],
        };
        slot as u32
    }

    /// Best-first search for the primitive closest to `point`.
    ///
    /// `distance_to_prim` returns the squared distance from `point` to a
    /// primitive (or `None` to skip it). Only primitives strictly closer than
    /// `best_dist2` are reported; pass `f64::INFINITY` for an unbounded search.
    /// Ties keep the lowest primitive index, so results are deterministic.
    pub(crate) fn nearest<F>(
        &self,
        point: Point3,
        best_dist2: f64,
        mut distance_to_prim: F,
    ) -> Option<(usize, f64)>
    where
        F: FnMut(usize) -> Option<f64>,
    {
        let root = self.nodes.first()?;
        let mut bound = best_dist2;
        let mut best: Option<usize> = None;

        let mut frontier = BinaryHeap::new();
        frontier.push(Queued {
            dist2: root.bounds.distance_squared_to_point(point),
            node: 0,
        });

        while let Some(Queued { dist2, node }) = frontier.pop() {
            if dist2 > bound {
                break;
            }
            match self.nodes[node as usize].kind {
                NodeKind::Leaf { first, len } => {
                    let members = &self.order[first as usize..(first + len) as usize];
                    for prim in members.iter().map(|&p| p as usize) {
                        let Some(d2) = distance_to_prim(prim).filter(|d| d.is_finite()) else {
                            continue;
                        };
                        if d2 < bound || (d2 == bound && best.is_some_and(|b| prim < b)) {
                            bound = d2;
                            best = Some(prim);
                        }
                    }
                }
                NodeKind::Branch { children } => {
                    for child in children {
                        let d2 = self.nodes[child as usize]
                            .bounds
                            .distance_squared_to_point(point);
                        if d2 <= bound {
                            frontier.push(Queued { dist2: d2, node: child });
                        }
                    }
                }
            }
        }

        best.map(|prim| (prim, bound))
    }

    #[must_use]
    pub(crate) fn primitive_count(&self) -> usize {
        self.order.len()
    }
}

/// Axis (0 = x, 1 = y, 2 = z) along which the centroids spread the most.
fn widest_centroid_axis(centroids: impl Iterator<Item = Point3>) -> usize {
    let Some(spread) = centroids.map(BBox::from_point).reduce(BBox::union) else {
        return 0;
    };
    let (lo, hi) = (spread.min.to_array(), spread.max.to_array());
    let extent = |axis: usize| hi[axis] - lo[axis];
    (1..3).fold(0, |widest, axis| {
        if extent(axis) > extent(widest) { axis } else { widest }
    })
}

/// Frontier entry; the heap pops the smallest distance first.
#[derive(Debug, Clone, Copy)]
struct Queued {
    dist2: f64,
    node: u32,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .dist2
            .total_cmp(&self.dist2)
            .then_with(|| other.node.cmp(&self.node))
    }
}
