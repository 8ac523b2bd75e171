// Copyright 2026 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! 4-wide batched bounds tests over the four child slots of a node.
//!
//! Both traversals funnel every internal node through one of two predicates:
//! point containment for hit walks, box overlap for region collection. Each
//! predicate evaluates four boxes at once and answers with a [`ChildMask`],
//! bit `i` set iff box `i` passes.
//!
//! With the `simd` cargo feature (nightly, `core::simd`) the four lanes are
//! compared in one shot; the default build uses the scalar forms below. The
//! two paths are required to agree bit for bit, including on [`Aabb::EMPTY`]
//! and NaN lanes, and the `*_scalar` forms stay public as the reference the
//! vectorized path is checked against.

use bitflags::bitflags;

use crate::types::Aabb;

bitflags! {
    /// Result mask of a batched bounds test: bit `i` covers child slot `i`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ChildMask: u8 {
        /// Slot 0 passed.
        const SLOT0 = 0b0001;
        /// Slot 1 passed.
        const SLOT1 = 0b0010;
        /// Slot 2 passed.
        const SLOT2 = 0b0100;
        /// Slot 3 passed.
        const SLOT3 = 0b1000;
    }
}

impl ChildMask {
    /// Mask with only slot `i` set (`i < 4`).
    pub fn slot(i: usize) -> Self {
        debug_assert!(i < 4, "child slots are 0..4");
        Self::from_bits_truncate(1 << i)
    }

    /// Whether slot `i` is set.
    pub fn has(self, i: usize) -> bool {
        self.bits() & (1 << i) != 0
    }
}

/// Scalar reference form of [`contains_batch4`]: bit `i` of the result is
/// `boxes[i].contains(x, y)`.
pub fn contains_batch4_scalar(x: f64, y: f64, boxes: &[Aabb; 4]) -> ChildMask {
    let mut mask = ChildMask::empty();
    for (i, b) in boxes.iter().enumerate() {
        if b.contains(x, y) {
            mask |= ChildMask::slot(i);
        }
    }
    mask
}

/// Scalar reference form of [`intersects_batch4`]: bit `i` of the result is
/// `boxes[i].intersects(query)`.
pub fn intersects_batch4_scalar(query: &Aabb, boxes: &[Aabb; 4]) -> ChildMask {
    let mut mask = ChildMask::empty();
    for (i, b) in boxes.iter().enumerate() {
        if b.intersects(query) {
            mask |= ChildMask::slot(i);
        }
    }
    mask
}

#[cfg(feature = "simd")]
mod vectorized {
    use core::simd::cmp::SimdPartialOrd;
    use core::simd::f64x4;

    use super::ChildMask;
    use crate::types::Aabb;

    #[inline]
    fn lanes(boxes: &[Aabb; 4], f: impl Fn(&Aabb) -> f64) -> f64x4 {
        f64x4::from_array([f(&boxes[0]), f(&boxes[1]), f(&boxes[2]), f(&boxes[3])])
    }

    #[allow(
        clippy::cast_possible_truncation,
        reason = "four lanes; the bitmask occupies the low 4 bits"
    )]
    #[inline]
    fn to_mask(bits: u64) -> ChildMask {
        ChildMask::from_bits_truncate(bits as u8)
    }

    #[inline]
    pub(super) fn contains_batch4(x: f64, y: f64, boxes: &[Aabb; 4]) -> ChildMask {
        let px = f64x4::splat(x);
        let py = f64x4::splat(y);
        let hit = lanes(boxes, |b| b.min_x).simd_le(px)
            & px.simd_le(lanes(boxes, |b| b.max_x))
            & lanes(boxes, |b| b.min_y).simd_le(py)
            & py.simd_le(lanes(boxes, |b| b.max_y));
        to_mask(hit.to_bitmask())
    }

    #[inline]
    pub(super) fn intersects_batch4(query: &Aabb, boxes: &[Aabb; 4]) -> ChildMask {
        let hit = lanes(boxes, |b| b.min_x).simd_le(f64x4::splat(query.max_x))
            & f64x4::splat(query.min_x).simd_le(lanes(boxes, |b| b.max_x))
            & lanes(boxes, |b| b.min_y).simd_le(f64x4::splat(query.max_y))
            & f64x4::splat(query.min_y).simd_le(lanes(boxes, |b| b.max_y));
        to_mask(hit.to_bitmask())
    }
}

/// Test four boxes against a point at once. Semantically four calls to
/// [`Aabb::contains`], one result bit per box.
#[inline]
pub fn contains_batch4(x: f64, y: f64, boxes: &[Aabb; 4]) -> ChildMask {
    #[cfg(feature = "simd")]
    {
        vectorized::contains_batch4(x, y, boxes)
    }
    #[cfg(not(feature = "simd"))]
    {
        contains_batch4_scalar(x, y, boxes)
    }
}

/// Test four boxes against a query box at once. Semantically four calls to
/// [`Aabb::intersects`], one result bit per box.
#[inline]
pub fn intersects_batch4(query: &Aabb, boxes: &[Aabb; 4]) -> ChildMask {
    #[cfg(feature = "simd")]
    {
        vectorized::intersects_batch4(query, boxes)
    }
    #[cfg(not(feature = "simd"))]
    {
        intersects_batch4_scalar(query, boxes)
    }
}
