// Copyright 2026 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! QBVH basics.
//!
//! Build a tree over a handful of boxes and run the point and region query
//! forms.
//!
//! Run:
//! - `cargo run -p canopy_demos --example qbvh_basics`

use canopy_qbvh::{Aabb, QuadBvh};

fn main() {
    // Five unit squares: four corners and one in the middle.
    let boxes = vec![
        Aabb::new(-0.5, -0.5, 0.5, 0.5),
        Aabb::new(9.5, -0.5, 10.5, 0.5),
        Aabb::new(-0.5, 9.5, 0.5, 10.5),
        Aabb::new(9.5, 9.5, 10.5, 10.5),
        Aabb::new(4.5, 4.5, 5.5, 5.5),
    ];
    let tree = QuadBvh::build(&boxes);
    println!("{tree:?}");

    // Fresh-list point query.
    let hits = tree.query_point(5.0, 5.0);
    println!("boxes covering (5, 5): {hits:?}");
    assert_eq!(hits, vec![4], "only the middle square covers the center");

    // Fixed-capacity form: writes at most the buffer length, drops the rest.
    let mut buf = [0usize; 2];
    let written = tree.query_point_into(0.0, 0.0, &mut buf);
    println!("first {written} hit(s) at the origin: {:?}", &buf[..written]);

    // Lazy form for early exit.
    let first = tree.point_hits(10.0, 10.0).next();
    println!("first box covering (10, 10): {first:?}");

    // Region query; touching edges count as intersecting.
    let region = Aabb::new(-1.0, -1.0, 1.0, 1.0);
    let overlapping = tree.query_region(&region);
    println!("boxes intersecting {region:?}: {overlapping:?}");
    assert_eq!(overlapping, vec![0]);
}
