// Copyright 2026 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The quad-branching bounding-volume tree: build and queries.

use alloc::vec::Vec;

use crate::batch::{contains_batch4, intersects_batch4};
use crate::node::{Child, Node, child_aabbs, occupancy};
use crate::types::{Aabb, joint_bounds};

/// Capability required of shapes handed to [`QuadBvh::build`].
///
/// The bounds are read exactly once per shape during a build; the tree caches
/// the box and never consults the shape again. The box must be conservative:
/// it may overestimate the shape's true extent, never underestimate it.
pub trait Bounded {
    /// Conservative axis-aligned bounding box of the shape.
    fn bounds(&self) -> Aabb;
}

impl Bounded for Aabb {
    fn bounds(&self) -> Self {
        *self
    }
}

/// Index sets at or below this size stop subdividing and become one fan-out
/// node of direct leaves.
const LEAF_GROUP_MAX: usize = 4;

/// Centroid-bounds extent under which spatial partitioning cannot separate
/// the shapes and the even positional split takes over.
const CENTER_EPSILON: f64 = 1e-5;

/// A static spatial index over the bounding boxes of a shape set.
///
/// Built once with [`QuadBvh::build`], immutable afterwards; queries only
/// read. Shapes are referred to by their index in the original slice, and a
/// hit means "the shape's *box* matches" - callers re-test precise geometry
/// themselves. To reflect moved, added, or removed shapes, build a fresh tree
/// and swap it in; nothing here updates in place.
pub struct QuadBvh {
    nodes: Vec<Node>,
    bounds: Vec<Aabb>,
}

impl QuadBvh {
    /// Build a tree over `shapes`. An empty slice yields an empty tree whose
    /// queries return nothing.
    pub fn build<S: Bounded>(shapes: &[S]) -> Self {
        Self::from_bounds(shapes.iter().map(Bounded::bounds).collect())
    }

    /// Build a tree directly from per-shape boxes; `bounds[i]` is shape `i`.
    #[allow(
        clippy::cast_possible_truncation,
        reason = "shape and node counts are well under u32::MAX"
    )]
    pub fn from_bounds(bounds: Vec<Aabb>) -> Self {
        let n = bounds.len();
        let mut nodes = Vec::new();
        if n > 0 {
            let capacity = node_capacity(n);
            nodes.reserve_exact(capacity);
            let indices: Vec<u32> = (0..n as u32).collect();
            let mut scratch = Scratch::default();
            let root = Self::build_range(&mut nodes, &bounds, &indices, &mut scratch);
            debug_assert_eq!(root, 0, "the root occupies slot 0");
            debug_assert!(
                nodes.len() <= capacity,
                "build outgrew the precomputed node bound"
            );
        }
        Self { nodes, bounds }
    }

    /// Number of nodes in the arena.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of shapes the tree was built over.
    pub fn shape_count(&self) -> usize {
        self.bounds.len()
    }

    /// Whether the tree indexes no shapes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The box cached for shape `shape` at build time.
    pub fn bounds_of(&self, shape: usize) -> Option<Aabb> {
        self.bounds.get(shape).copied()
    }

    /// Recursively emit nodes for one index set and return the arena slot of
    /// the subtree root. The caller owns this subtree's reported box; only
    /// child boxes are stored here.
    #[allow(
        clippy::cast_possible_truncation,
        reason = "node indices fit u32 by the node-count bound"
    )]
    fn build_range(
        nodes: &mut Vec<Node>,
        bounds: &[Aabb],
        indices: &[u32],
        scratch: &mut Scratch,
    ) -> u32 {
        let n = indices.len();
        debug_assert!(n > 0, "index ranges handed to the builder are non-empty");
        if n == 1 {
            let leaf = nodes.len() as u32;
            nodes.push(Node::Leaf { shape: indices[0] });
            return leaf;
        }

        // Reserve this node's slot before recursing so the root lands at 0
        // and every recursive call owns a unique slot.
        let slot = nodes.len();
        nodes.push(Node::Internal { children: [None; 4] });
        let mut children: [Option<Child>; 4] = [None; 4];

        if n <= LEAF_GROUP_MAX {
            // Small groups become one fan-out of direct leaves in input
            // order; recursing further would only add indirection.
            for (slot_i, &shape) in indices.iter().enumerate() {
                let leaf = nodes.len() as u32;
                nodes.push(Node::Leaf { shape });
                children[slot_i] = Some(Child {
                    index: leaf,
                    aabb: bounds[shape as usize],
                });
            }
        } else {
            let centroid_bounds = indices.iter().fold(Aabb::EMPTY, |acc, &i| {
                let (x, y) = bounds[i as usize].center();
                acc.grow(x, y)
            });
            let (spread_x, spread_y) = centroid_bounds.size();
            let mut split_done = false;
            if spread_x > CENTER_EPSILON || spread_y > CENTER_EPSILON {
                let (cx, cy) = centroid_bounds.center();
                let mut buckets =
                    [scratch.take(), scratch.take(), scratch.take(), scratch.take()];
                for &i in indices {
                    let (x, y) = bounds[i as usize].center();
                    let quadrant = usize::from(x >= cx) | (usize::from(y >= cy) << 1);
                    buckets[quadrant].push(i);
                }
                // A spread above epsilon normally lands indices on both sides
                // of the split point, but extreme magnitudes can round the
                // point onto the centroid-bounds edge and funnel everything
                // into one quadrant. Only recurse when the set shrank.
                if buckets.iter().all(|b| b.len() < n) {
                    for (slot_i, bucket) in buckets.into_iter().enumerate() {
                        if !bucket.is_empty() {
                            let aabb = joint_bounds(&bucket, bounds);
                            let index = Self::build_range(nodes, bounds, &bucket, scratch);
                            children[slot_i] = Some(Child { index, aabb });
                        }
                        scratch.put(bucket);
                    }
                    split_done = true;
                } else {
                    for bucket in buckets {
                        scratch.put(bucket);
                    }
                }
            }
            if !split_done {
                // Spatial partitioning cannot separate the shapes; an even
                // positional split is the only way to make progress.
                // Remainder goes to the first buckets.
                let base = n / 4;
                let rem = n % 4;
                let mut start = 0;
                for (slot_i, child) in children.iter_mut().enumerate() {
                    let len = base + usize::from(slot_i < rem);
                    if len == 0 {
                        continue;
                    }
                    let bucket = &indices[start..start + len];
                    start += len;
                    let aabb = joint_bounds(bucket, bounds);
                    let index = Self::build_range(nodes, bounds, bucket, scratch);
                    *child = Some(Child { index, aabb });
                }
            }
        }

        nodes[slot] = Node::Internal { children };
        slot as u32
    }

    /// Lazy traversal of shapes whose box contains `(x, y)`.
    ///
    /// Stop consuming (or drop) the iterator at any point for early exit;
    /// [`PointHits::reset`] re-arms it from the root.
    pub fn point_hits(&self, x: f64, y: f64) -> PointHits<'_> {
        let mut hits = PointHits {
            tree: self,
            x,
            y,
            stack: Vec::new(),
        };
        hits.reset();
        hits
    }

    /// Shape indices whose box contains `(x, y)`, as a fresh list.
    pub fn query_point(&self, x: f64, y: f64) -> Vec<usize> {
        self.point_hits(x, y).collect()
    }

    /// Append shapes whose box contains `(x, y)` to `out`.
    pub fn query_point_append(&self, x: f64, y: f64, out: &mut Vec<usize>) {
        out.extend(self.point_hits(x, y));
    }

    /// Write shapes whose box contains `(x, y)` into `out`, returning the
    /// count written. Once `out` is full, remaining matches are dropped
    /// silently; this form exists for zero-allocation callers that chose a
    /// bound.
    pub fn query_point_into(&self, x: f64, y: f64, out: &mut [usize]) -> usize {
        let mut written = 0;
        for shape in self.point_hits(x, y) {
            if written == out.len() {
                break;
            }
            out[written] = shape;
            written += 1;
        }
        written
    }

    /// Shape indices whose box intersects `region` (touching edges count),
    /// in traversal order: depth first, child slots ascending.
    pub fn query_region(&self, region: &Aabb) -> Vec<usize> {
        let mut out = Vec::new();
        if !self.nodes.is_empty() {
            self.collect_region(0, region, &mut out);
        }
        out
    }

    fn collect_region(&self, node: u32, region: &Aabb, out: &mut Vec<usize>) {
        match &self.nodes[node as usize] {
            Node::Leaf { shape } => {
                if self.bounds[*shape as usize].intersects(region) {
                    out.push(*shape as usize);
                }
            }
            Node::Internal { children } => {
                let mask = intersects_batch4(region, &child_aabbs(children)) & occupancy(children);
                for slot in 0..4 {
                    if mask.has(slot)
                        && let Some(c) = &children[slot]
                    {
                        self.collect_region(c.index, region, out);
                    }
                }
            }
        }
    }
}

impl core::fmt::Debug for QuadBvh {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("QuadBvh")
            .field("nodes", &self.nodes.len())
            .field("shapes", &self.bounds.len())
            .finish_non_exhaustive()
    }
}

/// Upper bound on the arena size for `n` shapes: a full 4-ary tree over
/// `ceil(log4 n) + 1` levels plus one extra fan-out node per small leaf
/// group. The arena is reserved up front and never reallocates mid-build.
fn node_capacity(n: usize) -> usize {
    let mut pow = 1_usize; // 4^(levels - 1)
    while pow < n {
        pow = pow.saturating_mul(4);
    }
    (pow.saturating_mul(4) - 1) / 3 + n
}

/// Free-list of index buffers for the four partition buckets, scoped to one
/// build call. Not shared across builds; concurrent builds each own one.
#[derive(Default)]
struct Scratch {
    free: Vec<Vec<u32>>,
}

impl Scratch {
    fn take(&mut self) -> Vec<u32> {
        self.free.pop().unwrap_or_default()
    }

    fn put(&mut self, mut bucket: Vec<u32>) {
        bucket.clear();
        self.free.push(bucket);
    }
}

/// Lazy depth-first iterator over shapes whose box contains a query point.
///
/// Holds an explicit stack of pending nodes, so it can be abandoned
/// mid-sequence and restarted with [`PointHits::reset`]. Sibling order is
/// deterministic: child slot 0 is visited before 1, 2, 3.
#[derive(Debug)]
pub struct PointHits<'a> {
    tree: &'a QuadBvh,
    x: f64,
    y: f64,
    stack: Vec<u32>,
}

impl PointHits<'_> {
    /// Restart the traversal from the root; already-yielded results are
    /// produced again.
    pub fn reset(&mut self) {
        self.stack.clear();
        if !self.tree.nodes.is_empty() {
            self.stack.push(0);
        }
    }
}

impl Iterator for PointHits<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while let Some(node) = self.stack.pop() {
            match &self.tree.nodes[node as usize] {
                Node::Leaf { shape } => {
                    if self.tree.bounds[*shape as usize].contains(self.x, self.y) {
                        return Some(*shape as usize);
                    }
                }
                Node::Internal { children } => {
                    let mask =
                        contains_batch4(self.x, self.y, &child_aabbs(children)) & occupancy(children);
                    // Descending slot order, so the LIFO stack pops slot 0
                    // first.
                    for slot in (0..4).rev() {
                        if mask.has(slot)
                            && let Some(c) = &children[slot]
                        {
                            self.stack.push(c.index);
                        }
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    struct Rng(u64);

    impl Rng {
        fn next_u64(&mut self) -> u64 {
            let mut x = self.0;
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            self.0 = x;
            x
        }

        fn next_f64(&mut self) -> f64 {
            let v = self.next_u64() >> 11;
            (v as f64) / ((1_u64 << 53) as f64)
        }
    }

    fn random_boxes(rng: &mut Rng, count: usize) -> Vec<Aabb> {
        (0..count)
            .map(|_| {
                let x = rng.next_f64() * 100.0;
                let y = rng.next_f64() * 100.0;
                let w = rng.next_f64() * 10.0;
                let h = rng.next_f64() * 10.0;
                Aabb::from_xywh(x, y, w, h)
            })
            .collect()
    }

    fn unit_square(cx: f64, cy: f64) -> Aabb {
        Aabb::new(cx - 0.5, cy - 0.5, cx + 0.5, cy + 0.5)
    }

    // Five unit squares from four corners plus one in the middle.
    fn corner_squares() -> Vec<Aabb> {
        vec![
            unit_square(0.0, 0.0),
            unit_square(10.0, 0.0),
            unit_square(0.0, 10.0),
            unit_square(10.0, 10.0),
            unit_square(5.0, 5.0),
        ]
    }

    fn leaf_shape_counts(tree: &QuadBvh) -> Vec<usize> {
        let mut counts = vec![0_usize; tree.shape_count()];
        for node in &tree.nodes {
            if let Node::Leaf { shape } = node {
                counts[*shape as usize] += 1;
            }
        }
        counts
    }

    #[test]
    fn empty_build_answers_empty() {
        let tree = QuadBvh::from_bounds(Vec::new());
        assert!(tree.is_empty());
        assert_eq!(tree.node_count(), 0);
        assert!(tree.query_point(0.0, 0.0).is_empty());
        assert!(
            tree.query_region(&Aabb::new(-100.0, -100.0, 100.0, 100.0))
                .is_empty()
        );
        assert_eq!(tree.point_hits(0.0, 0.0).next(), None);
    }

    #[test]
    fn single_shape_is_a_root_leaf_and_still_filters() {
        let tree = QuadBvh::build(&[unit_square(0.0, 0.0)]);
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.query_point(0.0, 0.0), vec![0]);
        assert!(tree.query_point(5.0, 5.0).is_empty());
        assert_eq!(tree.query_region(&unit_square(0.25, 0.25)), vec![0]);
        assert!(tree.query_region(&unit_square(50.0, 50.0)).is_empty());
    }

    #[test]
    fn small_group_keeps_input_order() {
        let boxes = vec![
            unit_square(0.0, 0.0),
            unit_square(3.0, 0.0),
            unit_square(6.0, 0.0),
        ];
        let tree = QuadBvh::build(&boxes);
        // One fan-out node plus one leaf per shape.
        assert_eq!(tree.node_count(), 4);
        let probe = Aabb::new(-10.0, -10.0, 10.0, 10.0);
        assert_eq!(tree.query_region(&probe), vec![0, 1, 2]);
    }

    #[test]
    fn corner_square_scenario() {
        let tree = QuadBvh::build(&corner_squares());
        assert_eq!(tree.query_point(5.0, 5.0), vec![4]);
        assert_eq!(
            tree.query_region(&Aabb::new(-1.0, -1.0, 1.0, 1.0)),
            vec![0]
        );
    }

    #[test]
    fn coverage_every_shape_in_exactly_one_leaf() {
        let mut rng = Rng(0x5eed_1234_5678_9abc);
        for count in [1, 2, 3, 4, 5, 7, 16, 33, 100, 257] {
            let tree = QuadBvh::from_bounds(random_boxes(&mut rng, count));
            let counts = leaf_shape_counts(&tree);
            assert!(
                counts.iter().all(|&c| c == 1),
                "every shape index appears in exactly one leaf (n = {count})"
            );
            assert!(
                tree.node_count() <= node_capacity(count),
                "arena stayed within the precomputed bound (n = {count})"
            );
        }
    }

    #[test]
    fn coincident_centers_fall_back_to_even_split() {
        let boxes = vec![unit_square(0.0, 0.0); 10];
        let tree = QuadBvh::build(&boxes);
        let counts = leaf_shape_counts(&tree);
        assert!(counts.iter().all(|&c| c == 1), "no shape dropped");
        let mut hits = tree.query_point(0.0, 0.0);
        hits.sort_unstable();
        assert_eq!(hits, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn sub_ulp_center_spread_still_terminates() {
        // Centers one ulp apart at 1e20: the spread is far above epsilon,
        // yet the quadrant split point can round onto the edge. Build must
        // still terminate and keep every shape.
        let big: f64 = 1e20;
        let next = f64::from_bits(big.to_bits() + 1);
        let boxes: Vec<Aabb> = (0..12)
            .map(|i| {
                let c = if i % 2 == 0 { big } else { next };
                Aabb::new(c - 0.5, c - 0.5, c + 0.5, c + 0.5)
            })
            .collect();
        let tree = QuadBvh::from_bounds(boxes);
        let counts = leaf_shape_counts(&tree);
        assert!(counts.iter().all(|&c| c == 1), "no shape dropped");
    }

    #[test]
    fn point_query_matches_brute_force() {
        let mut rng = Rng(0xfeed_face_cafe_beef);
        let boxes = random_boxes(&mut rng, 200);
        let tree = QuadBvh::from_bounds(boxes.clone());
        for _ in 0..50 {
            let x = rng.next_f64() * 110.0 - 5.0;
            let y = rng.next_f64() * 110.0 - 5.0;
            let mut got = tree.query_point(x, y);
            got.sort_unstable();
            let want: Vec<usize> = (0..boxes.len())
                .filter(|&i| boxes[i].contains(x, y))
                .collect();
            assert_eq!(got, want, "point query at ({x}, {y})");
        }
    }

    #[test]
    fn region_query_matches_brute_force() {
        let mut rng = Rng(0x0dd0_ba11_0dd0_ba11);
        let boxes = random_boxes(&mut rng, 200);
        let tree = QuadBvh::from_bounds(boxes.clone());
        for _ in 0..50 {
            let q = {
                let x = rng.next_f64() * 110.0 - 5.0;
                let y = rng.next_f64() * 110.0 - 5.0;
                Aabb::from_xywh(x, y, rng.next_f64() * 25.0, rng.next_f64() * 25.0)
            };
            let mut got = tree.query_region(&q);
            got.sort_unstable();
            let want: Vec<usize> = (0..boxes.len())
                .filter(|&i| boxes[i].intersects(&q))
                .collect();
            assert_eq!(got, want, "region query {q:?}");
        }
    }

    #[test]
    fn rebuilding_answers_identically() {
        let mut rng = Rng(0xd1ce_d1ce_d1ce_d1ce);
        let boxes = random_boxes(&mut rng, 150);
        let a = QuadBvh::from_bounds(boxes.clone());
        let b = QuadBvh::from_bounds(boxes);
        for _ in 0..40 {
            let x = rng.next_f64() * 100.0;
            let y = rng.next_f64() * 100.0;
            assert_eq!(a.query_point(x, y), b.query_point(x, y));
            let q = Aabb::from_xywh(x, y, 15.0, 15.0);
            assert_eq!(a.query_region(&q), b.query_region(&q));
        }
    }

    #[test]
    fn point_query_forms_agree() {
        let tree = QuadBvh::build(&corner_squares());
        let fresh = tree.query_point(5.0, 5.0);

        let mut appended = vec![99];
        tree.query_point_append(5.0, 5.0, &mut appended);
        assert_eq!(appended[0], 99, "append form keeps existing entries");
        assert_eq!(&appended[1..], &fresh[..]);

        let mut buf = [0_usize; 8];
        let written = tree.query_point_into(5.0, 5.0, &mut buf);
        assert_eq!(&buf[..written], &fresh[..]);

        assert_eq!(tree.point_hits(5.0, 5.0).collect::<Vec<_>>(), fresh);
    }

    #[test]
    fn fixed_buffer_truncates_to_a_genuine_match() {
        // Three boxes stacked over the origin.
        let boxes = vec![
            unit_square(0.0, 0.0),
            unit_square(0.1, 0.1),
            unit_square(-0.1, -0.1),
            unit_square(40.0, 40.0),
            unit_square(50.0, 50.0),
        ];
        let tree = QuadBvh::build(&boxes);
        let mut buf = [usize::MAX; 1];
        let written = tree.query_point_into(0.0, 0.0, &mut buf);
        assert_eq!(written, 1);
        assert!(
            boxes[buf[0]].contains(0.0, 0.0),
            "the one written index is a genuine match"
        );
    }

    #[test]
    fn point_hits_is_restartable_and_droppable() {
        let tree = QuadBvh::build(&[
            unit_square(0.0, 0.0),
            unit_square(0.2, 0.0),
            unit_square(0.0, 0.2),
            unit_square(0.2, 0.2),
            unit_square(9.0, 9.0),
        ]);
        let full = tree.query_point(0.1, 0.1);
        assert_eq!(full.len(), 4);

        let mut hits = tree.point_hits(0.1, 0.1);
        let first = hits.next();
        assert_eq!(first.as_ref(), full.first());
        hits.reset();
        assert_eq!(hits.collect::<Vec<_>>(), full, "reset replays the sequence");

        // Early exit: drop after one element.
        let mut early = tree.point_hits(0.1, 0.1);
        let _ = early.next();
        drop(early);
    }

    #[test]
    fn cached_bounds_are_exposed() {
        let boxes = corner_squares();
        let tree = QuadBvh::build(&boxes);
        assert_eq!(tree.shape_count(), 5);
        assert_eq!(tree.bounds_of(4), Some(boxes[4]));
        assert_eq!(tree.bounds_of(5), None);
    }

    #[test]
    fn capacity_formula_small_counts() {
        assert_eq!(node_capacity(1), 2);
        assert_eq!(node_capacity(4), 9);
        assert_eq!(node_capacity(5), 26);
    }
}
