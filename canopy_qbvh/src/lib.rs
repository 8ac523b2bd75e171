// Copyright 2026 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Canopy QBVH: a flat quad-branching bounding-volume tree for 2D AABBs.
//!
//! Canopy QBVH is a reusable building block for spatial queries over a fixed
//! shape set.
//!
//! - Build once over anything with a bounding box (the [`Bounded`] trait).
//! - Query by point (lazy iterator or three materialized forms) or by
//!   intersecting region.
//! - Nodes fan out four ways; both traversals test all four child boxes per
//!   node with one batched predicate.
//!
//! It is deliberately a *static* index: nothing refits or rebalances when
//! shapes move. Hosts rebuild from current shapes and swap the new tree in,
//! so in-flight readers of the old tree are never raced. A built tree is
//! immutable and can be read from many threads at once; each query owns its
//! own traversal state.
//!
//! Shapes never enter the tree - only their indices and the boxes reported by
//! [`Bounded::bounds`] at build time. Every hit is therefore conservative
//! ("the box matches"), and callers re-test precise geometry against their
//! own shape array after resolving the returned indices.
//!
//! # Example
//!
//! ```rust
//! use canopy_qbvh::{Aabb, QuadBvh};
//!
//! let boxes = vec![
//!     Aabb::new(0.0, 0.0, 10.0, 10.0),
//!     Aabb::new(5.0, 5.0, 15.0, 15.0),
//!     Aabb::new(40.0, 40.0, 50.0, 50.0),
//! ];
//! let tree = QuadBvh::build(&boxes);
//!
//! // Point query: both overlapping boxes cover (6, 6).
//! let mut hits = tree.query_point(6.0, 6.0);
//! hits.sort_unstable();
//! assert_eq!(hits, vec![0, 1]);
//!
//! // Region query: touching edges count as intersecting.
//! let region = Aabb::new(15.0, 15.0, 40.0, 40.0);
//! let mut overlapping = tree.query_region(&region);
//! overlapping.sort_unstable();
//! assert_eq!(overlapping, vec![1, 2]);
//!
//! // Lazy form for early exit.
//! let first = tree.point_hits(6.0, 6.0).next();
//! assert!(first.is_some());
//! ```
//!
//! ## Construction
//!
//! The builder recursively partitions shape indices into the four quadrants
//! around the center of the shapes' *centroid bounds* (the box over their
//! center points). Groups of four or fewer become a single fan-out of leaves.
//! When all centers coincide (within 1e-5 on both axes) the partition
//! degrades to an even positional split, so pathological inputs still build.
//! The node arena is sized up front from the shape count and filled append
//! only.
//!
//! ## Batched bounds tests
//!
//! The four child boxes of every internal node are tested in one call
//! returning a 4-bit [`ChildMask`]. The default build evaluates the four
//! scalar predicates; the `simd` cargo feature (nightly, `core::simd`) runs
//! them as one 4-lane compare. The two paths are bit-identical by contract -
//! the public `*_scalar` forms are the reference the vectorized path is
//! tested against.
//!
//! ### Float semantics
//!
//! Coordinates are `f64`. NaN and infinite bounds are not detected: they flow
//! through IEEE comparisons, which generally makes such a shape unreachable
//! by queries. Build still terminates and other shapes are unaffected.

#![no_std]
#![cfg_attr(feature = "simd", feature(portable_simd))]

extern crate alloc;

pub mod batch;
mod node;
pub mod tree;
pub mod types;

pub use batch::{
    ChildMask, contains_batch4, contains_batch4_scalar, intersects_batch4,
    intersects_batch4_scalar,
};
pub use tree::{Bounded, PointHits, QuadBvh};
pub use types::Aabb;
