//! Benchmarks for atoll-physics
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use atoll_physics::{
    broadphase::Broadphase, narrowphase::Narrowphase, Aabb, DynamicTree, Material, Registry,
    RigidBodyDef, Scalar, SimulationSettings, Solver,
};
use glam::Vec3;

struct Scene {
    registry: Registry,
    broadphase: Broadphase,
    narrowphase: Narrowphase,
    solver: Solver,
    dt: Scalar,
}

fn build_stack_scene(bodies: usize) -> Scene {
    let settings = SimulationSettings::default();
    let mut registry = Registry::new();

    atoll_physics::make_rigidbody(&mut registry, &RigidBodyDef::static_plane(Vec3::Y)).unwrap();
    for i in 0..bodies {
        let column = (i % 4) as Scalar * 3.0;
        let height = 0.6 + (i / 4) as Scalar * 1.1;
        atoll_physics::make_rigidbody(
            &mut registry,
            &RigidBodyDef {
                position: Vec3::new(column, height, 0.0),
                material: Some(Material::new(0.0, 0.6)),
                ..RigidBodyDef::dynamic_box(1.0, Vec3::splat(0.5))
            },
        )
        .unwrap();
    }

    let mut scene = Scene {
        registry,
        broadphase: Broadphase::new(&settings),
        narrowphase: Narrowphase::new(&settings),
        solver: Solver::new(settings.solver_iterations),
        dt: settings.fixed_dt,
    };
    scene.broadphase.update(&mut scene.registry);
    scene.narrowphase.update(&mut scene.registry);
    scene
}

fn step(scene: &mut Scene) {
    scene.solver.update(&mut scene.registry, scene.dt);
    scene.broadphase.update(&mut scene.registry);
    scene.narrowphase.update(&mut scene.registry);
}

// ============================================================================
// Pipeline step benchmarks
// ============================================================================

fn bench_pipeline_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_step");

    group.bench_function("eight_boxes", |b| {
        let mut scene = build_stack_scene(8);
        b.iter(|| {
            step(black_box(&mut scene));
        });
    });

    group.bench_function("forty_boxes", |b| {
        let mut scene = build_stack_scene(40);
        b.iter(|| {
            step(black_box(&mut scene));
        });
    });

    group.finish();
}

// ============================================================================
// Tree benchmarks
// ============================================================================

fn bench_dynamic_tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("dynamic_tree");

    group.bench_function("insert_256", |b| {
        let mut registry = Registry::new();
        let entities: Vec<_> = (0..256).map(|_| registry.create()).collect();
        b.iter(|| {
            let mut tree = DynamicTree::new();
            for (i, &e) in entities.iter().enumerate() {
                let center = Vec3::new((i % 16) as Scalar * 2.0, (i / 16) as Scalar * 2.0, 0.0);
                tree.create(Aabb::from_center_half_extents(center, Vec3::splat(0.5)), e);
            }
            black_box(tree.height())
        });
    });

    group.bench_function("query_256", |b| {
        let mut registry = Registry::new();
        let mut tree = DynamicTree::new();
        for i in 0..256 {
            let center = Vec3::new((i % 16) as Scalar * 2.0, (i / 16) as Scalar * 2.0, 0.0);
            tree.create(
                Aabb::from_center_half_extents(center, Vec3::splat(0.5)),
                registry.create(),
            );
        }
        let query = Aabb::from_center_half_extents(Vec3::new(16.0, 16.0, 0.0), Vec3::splat(4.0));
        b.iter(|| {
            let mut hits = 0;
            tree.query(black_box(&query), |_| hits += 1);
            black_box(hits)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_pipeline_step, bench_dynamic_tree);
criterion_main!(benches);
