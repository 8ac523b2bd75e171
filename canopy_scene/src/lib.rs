// Copyright 2026 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Canopy Scene: a Kurbo-native, rebuildable scene of boxes.
//!
//! Canopy Scene is the host-side counterpart to [`canopy_qbvh`]: it owns a
//! flat set of world-space boxes with z-order and flags, and keeps a
//! [`QuadBvh`] over them for fast hit testing and rectangle intersection.
//!
//! - Insert, move, and remove items with stable generational [`Key`]s.
//! - Batch mutations, then [`Scene::rebuild`] to get coarse damage
//!   (added/removed/moved boxes) and a fresh spatial index.
//! - Query by point (topmost hit or all hits) or by intersecting rectangle,
//!   restricted by a [`QueryFilter`].
//!
//! The underlying tree never updates in place. `rebuild` constructs a brand
//! new tree over the live items and swaps it in, so readers of the previous
//! tree are never mutated under; the cost is a full rebuild, which for
//! realistic scene sizes is microseconds. Queries issued between mutations
//! and the next `rebuild` answer from the last rebuilt snapshot, with flags
//! and the precise point re-test applied against current item state - the
//! same commit-then-query discipline as the index backends this design grew
//! out of.
//!
//! # Example
//!
//! ```rust
//! use canopy_scene::{Item, ItemFlags, QueryFilter, Scene};
//! use kurbo::{Point, Rect};
//!
//! let mut scene = Scene::new();
//! let below = scene.insert(Item {
//!     bounds: Rect::new(0.0, 0.0, 100.0, 100.0),
//!     z_index: 0,
//!     ..Default::default()
//! });
//! let above = scene.insert(Item {
//!     bounds: Rect::new(25.0, 25.0, 75.0, 75.0),
//!     z_index: 10,
//!     ..Default::default()
//! });
//! let damage = scene.rebuild();
//! assert_eq!(damage.added.len(), 2);
//!
//! // The higher z wins where the items overlap.
//! let filter = QueryFilter::default();
//! assert_eq!(scene.hit_test_point(Point::new(50.0, 50.0), filter), Some(above));
//! assert_eq!(scene.hit_test_point(Point::new(10.0, 10.0), filter), Some(below));
//!
//! // Move the top item away and rebuild; the damage reports the move.
//! scene.set_bounds(above, Rect::new(200.0, 200.0, 250.0, 250.0));
//! let damage = scene.rebuild();
//! assert_eq!(damage.moved.len(), 1);
//! assert_eq!(scene.hit_test_point(Point::new(50.0, 50.0), filter), Some(below));
//! ```
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

use alloc::vec::Vec;
use bitflags::bitflags;
use canopy_qbvh::{Aabb, QuadBvh};
use kurbo::{Point, Rect};

/// Identifier for an item in the scene.
///
/// A small, copyable handle of slot index plus generation counter. On
/// removal the slot is freed; reusing it bumps the generation, so stale keys
/// never alias a live item. A `Key` is *newer* than another when it has a
/// higher generation, or the same generation and a higher slot; this total
/// order breaks ties between equal z-indices in
/// [`Scene::hit_test_point`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Key(u32, u32);

impl Key {
    const fn new(idx: u32, generation: u32) -> Self {
        Self(idx, generation)
    }

    const fn idx(self) -> usize {
        self.0 as usize
    }

    /// `(generation, slot)` pair implementing the "newer" order.
    const fn age(self) -> (u32, u32) {
        (self.1, self.0)
    }
}

bitflags! {
    /// Item flags controlling visibility and picking.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ItemFlags: u8 {
        /// Item is visible (participates in intersection queries).
        const VISIBLE  = 0b0000_0001;
        /// Item is pickable (participates in hit testing).
        const PICKABLE = 0b0000_0010;
    }
}

impl Default for ItemFlags {
    fn default() -> Self {
        Self::VISIBLE | Self::PICKABLE
    }
}

/// One scene item: a world-space box with stacking order and flags.
///
/// Placement is entirely the caller's concern; whatever layout or transform
/// pipeline produced `bounds` is upstream of this crate.
#[derive(Clone, Debug)]
pub struct Item {
    /// World-space bounds. For non-axis-aligned content, a conservative AABB.
    pub bounds: Rect,
    /// Stacking order; higher wins hit tests where items overlap.
    pub z_index: i32,
    /// Visibility and picking flags.
    pub flags: ItemFlags,
}

impl Default for Item {
    fn default() -> Self {
        Self {
            bounds: Rect::ZERO,
            z_index: 0,
            flags: ItemFlags::default(),
        }
    }
}

/// Filters applied during hit testing and rectangle intersection.
#[derive(Clone, Copy, Debug, Default)]
pub struct QueryFilter {
    /// If true, only consider items marked [`ItemFlags::VISIBLE`].
    pub visible_only: bool,
    /// If true, only consider items marked [`ItemFlags::PICKABLE`] (hit-test).
    pub pickable_only: bool,
}

/// Coarse damage summary returned by [`Scene::rebuild`].
#[derive(Clone, Debug, Default)]
pub struct Damage {
    /// Bounds of items added since the last rebuild.
    pub added: Vec<Rect>,
    /// Bounds of items removed since the last rebuild.
    pub removed: Vec<Rect>,
    /// Bounds of items moved since the last rebuild: (old, new).
    pub moved: Vec<(Rect, Rect)>,
}

impl Damage {
    /// True if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.moved.is_empty()
    }

    /// Union of all affected rectangles. Returns `None` if empty.
    pub fn union_rect(&self) -> Option<Rect> {
        let mut it = self
            .added
            .iter()
            .copied()
            .chain(self.removed.iter().copied())
            .chain(self.moved.iter().flat_map(|(a, b)| [*a, *b]));
        let first = it.next()?;
        Some(it.fold(first, |acc, r| acc.union(r)))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Mark {
    Added,
    Updated,
    Removed,
}

#[derive(Clone, Debug)]
struct Entry {
    item: Item,
    mark: Option<Mark>,
    prev_bounds: Option<Rect>, // for moved damage
}

/// A flat scene of boxes with a rebuilt-on-demand spatial index.
pub struct Scene {
    entries: Vec<Option<Entry>>,
    generations: Vec<u32>, // last generation per slot (persists across frees)
    free_list: Vec<usize>,
    tree: QuadBvh,
    slot_of: Vec<usize>, // dense tree index -> entry slot, set at rebuild
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Scene {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let total = self.entries.len();
        let alive = self.entries.iter().filter(|e| e.is_some()).count();
        f.debug_struct("Scene")
            .field("items_total", &total)
            .field("items_alive", &alive)
            .field("free_list", &self.free_list.len())
            .field("indexed", &self.tree.shape_count())
            .finish_non_exhaustive()
    }
}

impl Scene {
    /// Create an empty scene.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
            tree: QuadBvh::from_bounds(Vec::new()),
            slot_of: Vec::new(),
        }
    }

    /// Number of live items.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    /// Whether the scene holds no live items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` still refers to a live item.
    pub fn is_alive(&self, key: Key) -> bool {
        self.entry(key).is_some()
    }

    /// Read an item. `None` for stale keys.
    pub fn get(&self, key: Key) -> Option<&Item> {
        self.entry(key).map(|e| &e.item)
    }

    /// Insert a new item. Returns a stable handle.
    #[allow(
        clippy::cast_possible_truncation,
        reason = "keys use 32-bit slot indices by design"
    )]
    pub fn insert(&mut self, item: Item) -> Key {
        let entry = Entry {
            item,
            mark: Some(Mark::Added),
            prev_bounds: None,
        };
        let idx = if let Some(idx) = self.free_list.pop() {
            self.generations[idx] = self.generations[idx].saturating_add(1);
            self.entries[idx] = Some(entry);
            idx
        } else {
            self.entries.push(Some(entry));
            self.generations.push(1);
            self.entries.len() - 1
        };
        Key::new(idx as u32, self.generations[idx])
    }

    /// Move an item. Takes effect in queries after the next [`Scene::rebuild`].
    pub fn set_bounds(&mut self, key: Key, bounds: Rect) {
        if let Some(e) = self.entry_mut(key) {
            if e.mark.is_none() {
                e.prev_bounds = Some(e.item.bounds);
            }
            e.item.bounds = bounds;
            e.mark = Some(match e.mark {
                Some(Mark::Added) => Mark::Added,
                _ => Mark::Updated,
            });
        }
    }

    /// Update stacking order. Affects hit ordering immediately; no geometry
    /// changes, so no damage is recorded.
    pub fn set_z_index(&mut self, key: Key, z_index: i32) {
        if let Some(e) = self.entry_mut(key) {
            e.item.z_index = z_index;
        }
    }

    /// Update flags. Affects filtering immediately; no damage is recorded.
    pub fn set_flags(&mut self, key: Key, flags: ItemFlags) {
        if let Some(e) = self.entry_mut(key) {
            e.item.flags = flags;
        }
    }

    /// Remove an item. Ignored for stale keys.
    pub fn remove(&mut self, key: Key) {
        let Some(e) = self.entry_mut(key) else {
            return;
        };
        if matches!(e.mark, Some(Mark::Added)) {
            // Never indexed; drop it without damage.
            self.entries[key.idx()] = None;
            self.free_list.push(key.idx());
        } else {
            e.mark = Some(Mark::Removed);
        }
    }

    /// Drain pending mutations into a coarse damage summary, then build a
    /// fresh spatial index over the live items and swap it in.
    ///
    /// The old tree is discarded whole, never mutated, so a concurrent reader
    /// holding it (behind the caller's own sharing scheme) stays consistent.
    pub fn rebuild(&mut self) -> Damage {
        let mut damage = Damage::default();
        for i in 0..self.entries.len() {
            let Some(entry) = self.entries[i].as_mut() else {
                continue;
            };
            match entry.mark.take() {
                Some(Mark::Added) => damage.added.push(entry.item.bounds),
                Some(Mark::Removed) => {
                    damage.removed.push(entry.item.bounds);
                    self.entries[i] = None;
                    self.free_list.push(i);
                }
                Some(Mark::Updated) => {
                    if let Some(prev) = entry.prev_bounds.take()
                        && prev != entry.item.bounds
                    {
                        damage.moved.push((prev, entry.item.bounds));
                    }
                }
                None => {}
            }
        }

        let mut slot_of = Vec::new();
        let mut boxes = Vec::new();
        for (i, e) in self.entries.iter().enumerate() {
            if let Some(e) = e {
                slot_of.push(i);
                boxes.push(rect_to_aabb(e.item.bounds));
            }
        }
        self.tree = QuadBvh::from_bounds(boxes);
        self.slot_of = slot_of;
        damage
    }

    /// All items at a world-space point, topmost first.
    ///
    /// Candidates come from the spatial index (conservative boxes); each is
    /// then re-tested precisely against its current rectangle and the
    /// filter's flags. Ordering is z-index descending, ties broken toward the
    /// newer key.
    pub fn hits_point(&self, pt: Point, filter: QueryFilter) -> Vec<Key> {
        let mut matched: Vec<(Key, i32)> = Vec::new();
        for dense in self.tree.query_point(pt.x, pt.y) {
            let slot = self.slot_of[dense];
            let Some(entry) = self.entries.get(slot).and_then(|e| e.as_ref()) else {
                continue;
            };
            if filter.visible_only && !entry.item.flags.contains(ItemFlags::VISIBLE) {
                continue;
            }
            if filter.pickable_only && !entry.item.flags.contains(ItemFlags::PICKABLE) {
                continue;
            }
            if !entry.item.bounds.contains(pt) {
                continue;
            }
            matched.push((self.key_at(slot), entry.item.z_index));
        }
        matched.sort_by(|(ka, za), (kb, zb)| zb.cmp(za).then_with(|| kb.age().cmp(&ka.age())));
        matched.into_iter().map(|(k, _)| k).collect()
    }

    /// The topmost item at a world-space point, or `None`.
    pub fn hit_test_point(&self, pt: Point, filter: QueryFilter) -> Option<Key> {
        self.hits_point(pt, filter).into_iter().next()
    }

    /// Items whose box intersects `rect` (touching edges count).
    pub fn intersect_rect(&self, rect: Rect, filter: QueryFilter) -> Vec<Key> {
        let q = rect_to_aabb(rect);
        let mut out = Vec::new();
        for dense in self.tree.query_region(&q) {
            let slot = self.slot_of[dense];
            let Some(entry) = self.entries.get(slot).and_then(|e| e.as_ref()) else {
                continue;
            };
            if filter.visible_only && !entry.item.flags.contains(ItemFlags::VISIBLE) {
                continue;
            }
            out.push(self.key_at(slot));
        }
        out
    }

    // --- internals ---

    #[allow(
        clippy::cast_possible_truncation,
        reason = "keys use 32-bit slot indices by design"
    )]
    fn key_at(&self, slot: usize) -> Key {
        Key::new(slot as u32, self.generations[slot])
    }

    fn entry(&self, key: Key) -> Option<&Entry> {
        let e = self.entries.get(key.idx())?.as_ref()?;
        (self.generations[key.idx()] == key.1).then_some(e)
    }

    fn entry_mut(&mut self, key: Key) -> Option<&mut Entry> {
        let generation = *self.generations.get(key.idx())?;
        let e = self.entries.get_mut(key.idx())?.as_mut()?;
        (generation == key.1).then_some(e)
    }
}

fn rect_to_aabb(r: Rect) -> Aabb {
    Aabb::new(r.x0, r.y0, r.x1, r.y1)
}
