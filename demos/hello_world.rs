//! Minimal embedding example: drop a sphere onto a plane and print its
//! height as the islands simulate in the background.
//!
//! Run with: `cargo run --example hello_world`

use atoll_physics::{Position, Registry, RigidBodyDef, SimulationSettings, World};
use glam::Vec3;

fn main() {
    let mut world = World::new(Registry::new(), SimulationSettings::default()).unwrap();

    world
        .make_rigidbody(&RigidBodyDef::static_plane(Vec3::Y))
        .unwrap();
    let sphere = world
        .make_rigidbody(&RigidBodyDef {
            position: Vec3::new(0.0, 5.0, 0.0),
            ..RigidBodyDef::dynamic_sphere(1.0, 0.5)
        })
        .unwrap();

    for frame in 0..180 {
        world.update(1.0 / 60.0);
        if frame % 15 == 0 {
            let y = world.registry().get::<Position>(sphere).0.y;
            println!("t = {:>4.2}s  y = {y:.3}", frame as f32 / 60.0);
        }
        std::thread::sleep(std::time::Duration::from_millis(16));
    }
}
