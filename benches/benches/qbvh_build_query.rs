// Copyright 2026 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};

use canopy_qbvh::{Aabb, QuadBvh};

#[derive(Clone)]
struct Rng(u64);

impl Rng {
    fn new(seed: u64) -> Self {
        Self(seed)
    }
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
        (v as f64) / ((1u64 << 53) as f64)
    }
}

fn gen_grid_rects(n: usize, cell: f64) -> Vec<Aabb> {
    let mut out = Vec::with_capacity(n * n);
    for y in 0..n {
        for x in 0..n {
            let x0 = x as f64 * cell;
            let y0 = y as f64 * cell;
            out.push(Aabb::from_xywh(x0, y0, cell, cell));
        }
    }
    out
}

fn gen_random_rects(count: usize, extent: f64, rect_w: f64, rect_h: f64) -> Vec<Aabb> {
    let mut out = Vec::with_capacity(count);
    let mut rng = Rng::new(0xCAFE_F00D_DEAD_BEEF);
    for _ in 0..count {
        let x0 = rng.next_f64() * (extent - rect_w).max(1.0);
        let y0 = rng.next_f64() * (extent - rect_h).max(1.0);
        out.push(Aabb::from_xywh(x0, y0, rect_w, rect_h));
    }
    out
}

fn gen_probe_points(count: usize, extent: f64) -> Vec<(f64, f64)> {
    let mut rng = Rng::new(0xBADC_F00D_1234_5678);
    (0..count)
        .map(|_| (rng.next_f64() * extent, rng.next_f64() * extent))
        .collect()
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    for &n in &[32usize, 64, 128] {
        let rects = gen_grid_rects(n, 10.0);
        group.throughput(Throughput::Elements((n * n) as u64));
        group.bench_function(format!("grid_n{}", n), |b| {
            b.iter_batched(
                || rects.clone(),
                |rects| black_box(QuadBvh::from_bounds(rects)),
                BatchSize::SmallInput,
            )
        });
    }
    for &count in &[1024usize, 16384] {
        let rects = gen_random_rects(count, 2000.0, 12.0, 12.0);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_function(format!("random_{}", count), |b| {
            b.iter_batched(
                || rects.clone(),
                |rects| black_box(QuadBvh::from_bounds(rects)),
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_query_point(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_point");
    let rects = gen_random_rects(16384, 2000.0, 12.0, 12.0);
    let probes = gen_probe_points(256, 2000.0);
    let tree = QuadBvh::from_bounds(rects.clone());
    group.throughput(Throughput::Elements(probes.len() as u64));
    group.bench_function("qbvh", |b| {
        b.iter(|| {
            let mut hits = 0usize;
            for &(x, y) in &probes {
                hits += tree.point_hits(x, y).count();
            }
            black_box(hits);
        })
    });
    group.bench_function("linear_scan", |b| {
        b.iter(|| {
            let mut hits = 0usize;
            for &(x, y) in &probes {
                hits += rects.iter().filter(|r| r.contains(x, y)).count();
            }
            black_box(hits);
        })
    });
    group.finish();
}

fn bench_query_region(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_region");
    let rects = gen_random_rects(16384, 2000.0, 12.0, 12.0);
    let probes: Vec<Aabb> = gen_probe_points(64, 1900.0)
        .into_iter()
        .map(|(x, y)| Aabb::from_xywh(x, y, 100.0, 100.0))
        .collect();
    let tree = QuadBvh::from_bounds(rects.clone());
    group.throughput(Throughput::Elements(probes.len() as u64));
    group.bench_function("qbvh", |b| {
        b.iter(|| {
            let mut hits = 0usize;
            for q in &probes {
                hits += tree.query_region(q).len();
            }
            black_box(hits);
        })
    });
    group.bench_function("linear_scan", |b| {
        b.iter(|| {
            let mut hits = 0usize;
            for q in &probes {
                hits += rects.iter().filter(|r| r.intersects(q)).count();
            }
            black_box(hits);
        })
    });
    group.finish();
}

criterion_group!(benches, bench_build, bench_query_point, bench_query_region);
criterion_main!(benches);
