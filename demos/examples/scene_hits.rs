// Copyright 2026 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scene hit testing.
//!
//! Insert overlapping items, rebuild, hit-test with z-order, then move an
//! item and watch the damage report.
//!
//! Run:
//! - `cargo run -p canopy_demos --example scene_hits`

use canopy_scene::{Item, QueryFilter, Scene};
use kurbo::{Point, Rect};

fn main() {
    let mut scene = Scene::new();
    let card = scene.insert(Item {
        bounds: Rect::new(0.0, 0.0, 200.0, 120.0),
        z_index: 0,
        ..Default::default()
    });
    let button = scene.insert(Item {
        bounds: Rect::new(140.0, 80.0, 190.0, 110.0),
        z_index: 10,
        ..Default::default()
    });

    let damage = scene.rebuild();
    println!("initial damage: {} added", damage.added.len());

    let filter = QueryFilter {
        visible_only: true,
        pickable_only: true,
    };
    let hit = scene.hit_test_point(Point::new(150.0, 90.0), filter);
    println!("hit over the button: {hit:?}");
    assert_eq!(hit, Some(button), "the higher z-index wins");

    // Drag the button elsewhere and rebuild.
    scene.set_bounds(button, Rect::new(10.0, 10.0, 60.0, 40.0));
    let damage = scene.rebuild();
    println!("moved: {:?}", damage.moved);
    println!("repaint region: {:?}", damage.union_rect());

    let hit = scene.hit_test_point(Point::new(150.0, 90.0), filter);
    println!("hit at the old spot: {hit:?}");
    assert_eq!(hit, Some(card), "only the card remains there");
}
