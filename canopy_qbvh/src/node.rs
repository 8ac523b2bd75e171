// Copyright 2026 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tree node representation.

use crate::batch::ChildMask;
use crate::types::Aabb;

/// One occupied child slot of an internal node.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Child {
    /// Arena index of the child node.
    pub(crate) index: u32,
    /// Bounding box of everything at or below the child.
    pub(crate) aabb: Aabb,
}

/// A tree node: a single-shape leaf, or a fan-out of up to four children.
///
/// A leaf carries only its shape index; the leaf's box lives in the parent's
/// child slot (and in the tree's per-shape cache). Internal nodes keep a
/// fixed inline 4-slot array so the batched predicates can read all four
/// child boxes without chasing pointers.
#[derive(Clone, Debug)]
pub(crate) enum Node {
    Leaf { shape: u32 },
    Internal { children: [Option<Child>; 4] },
}

/// Child boxes in slot order. Vacant slots read as [`Aabb::EMPTY`], which no
/// batched predicate can match, so the four lanes run unconditionally.
pub(crate) fn child_aabbs(children: &[Option<Child>; 4]) -> [Aabb; 4] {
    core::array::from_fn(|i| children[i].map_or(Aabb::EMPTY, |c| c.aabb))
}

/// Occupancy mask: bit `i` set iff child slot `i` is filled.
pub(crate) fn occupancy(children: &[Option<Child>; 4]) -> ChildMask {
    let mut mask = ChildMask::empty();
    for (i, c) in children.iter().enumerate() {
        if c.is_some() {
            mask |= ChildMask::slot(i);
        }
    }
    mask
}
