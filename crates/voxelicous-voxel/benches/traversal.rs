//! Benchmarks the builder's rebuild cost and the ESVO traversal's
//! per-ray iteration cost against a small synthetic voxel field.

use criterion::{criterion_group, criterion_main, Criterion};
use glam::Vec3;
use voxelicous_core::math::Ray;
use voxelicous_voxel::{build, cast_ray, AttributeRegistry, AttributeType, AttributeValue, BuildConfig, LodParams, SolidVoxel};

fn scattered_voxels(count: u32) -> Vec<SolidVoxel> {
    (0..count)
        .map(|i| {
            let t = i as f32;
            SolidVoxel {
                position: Vec3::new((t * 1.7) % 60.0, (t * 2.3) % 60.0, (t * 3.1) % 60.0),
                color: Vec3::splat(0.5),
                normal: Vec3::Z,
                material: 1,
            }
        })
        .collect()
}

fn bench_build(c: &mut Criterion) {
    let voxels = scattered_voxels(4096);
    let registry = AttributeRegistry::new();
    registry.register_key("density", AttributeType::F32, AttributeValue::F32(0.0)).unwrap();
    let config = BuildConfig {
        max_levels: 9,
        brick_depth: 3,
        ..BuildConfig::default()
    };

    c.bench_function("builder_rebuild_4096_voxels", |b| {
        b.iter(|| build(&voxels, Vec3::ZERO, Vec3::splat(64.0), &config, &registry).unwrap());
    });
}

fn bench_traversal(c: &mut Criterion) {
    let voxels = scattered_voxels(4096);
    let registry = AttributeRegistry::new();
    registry.register_key("density", AttributeType::F32, AttributeValue::F32(0.0)).unwrap();
    let config = BuildConfig {
        max_levels: 9,
        brick_depth: 3,
        ..BuildConfig::default()
    };
    let octree = build(&voxels, Vec3::ZERO, Vec3::splat(64.0), &config, &registry).unwrap();
    let ray = Ray::new(Vec3::new(-1.0, 32.0, 32.0), Vec3::new(1.0, 0.1, 0.05));

    c.bench_function("cast_ray_single", |b| {
        b.iter(|| cast_ray(&octree, &ray, LodParams::DISABLED));
    });
}

criterion_group!(benches, bench_build, bench_traversal);
criterion_main!(benches);
