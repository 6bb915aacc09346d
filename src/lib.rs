//! atoll-physics: rigid-body dynamics with a parallel island scheduler
//!
//! A deterministic fixed-timestep constraint solver combined with an island
//! scheduler that partitions interacting bodies into independent simulation
//! units, each advanced by its own worker on a shared job dispatcher.
//!
//! # Architecture
//!
//! - **Registry**: typed component storage keyed by entity id; bodies,
//!   constraints, manifolds and islands are all entities.
//! - **Broadphase**: two dynamic AABB trees (dynamic vs. static/kinematic
//!   bodies) creating and destroying contact manifolds.
//! - **Narrowphase**: per-pair collision dispatch over the shape matrix plus
//!   persistent manifold point maintenance with warm starting.
//! - **Solver**: sequential-impulse projected Gauss-Seidel over a flat
//!   constraint row cache.
//! - **Islands**: connected components of the interaction graph. One worker
//!   per island owns a private registry; workers and the coordinator
//!   exchange typed registry deltas over message queues.
//!
//! # Example
//!
//! ```no_run
//! use atoll_physics::{RigidBodyDef, Registry, SimulationSettings, World};
//! use glam::Vec3;
//!
//! let mut world = World::new(Registry::new(), SimulationSettings::default()).unwrap();
//!
//! world.make_rigidbody(&RigidBodyDef::static_plane(Vec3::Y)).unwrap();
//! world
//!     .make_rigidbody(&RigidBodyDef {
//!         position: Vec3::new(0.0, 3.0, 0.0),
//!         ..RigidBodyDef::dynamic_sphere(1.0, 0.5)
//!     })
//!     .unwrap();
//!
//! loop {
//!     world.update(1.0 / 60.0);
//!     std::thread::sleep(std::time::Duration::from_millis(16));
//! }
//! ```
//!
//! # Modules
//!
//! - [`registry`]: entity registry adapter
//! - [`components`]: component types and the canonical kind tuple
//! - [`shapes`], [`trimesh`]: collision shapes
//! - [`bvh`]: dynamic bounding-volume tree
//! - [`broadphase`], [`narrowphase`], [`collide`]: collision pipeline
//! - [`row_cache`], [`constraint`], [`solver`]: dynamics
//! - [`graph`]: interaction graph
//! - [`island_worker`], [`island_coordinator`]: parallel island scheduling
//! - [`job_dispatcher`], [`message`]: concurrency plumbing
//! - [`delta`], [`snapshot`]: replication data model
//! - [`world`]: embedding surface

pub mod aabb;
pub mod broadphase;
pub mod bvh;
pub mod collide;
mod collide_polyhedron;
mod collide_primitives;
mod collide_triangle;
pub mod components;
pub mod config;
pub mod constraint;
pub mod delta;
pub mod error;
pub mod filter;
pub mod graph;
pub mod island_coordinator;
pub mod island_worker;
pub mod job_dispatcher;
pub mod material;
pub mod math;
pub mod message;
pub mod narrowphase;
pub mod registry;
pub mod row_cache;
pub mod shapes;
pub mod snapshot;
pub mod solver;
pub mod trimesh;
pub mod world;

// Re-export commonly used types
pub use aabb::Aabb;
pub use broadphase::{destroy_separated_manifolds, make_contact_manifold, Broadphase};
pub use bvh::{DynamicTree, TreeView};
pub use collide::{collide, CollisionContext, CollisionPoint, CollisionResult};
pub use components::{
    AabbComp, AngVel, ComponentKind, ComponentValue, Constraint, ConstraintImpulse,
    ContactManifold, ContactPoint, Continuous, Dirty, DynamicTag, Gravity, Island,
    IslandContainer, IslandTimestamp, KinematicTag, LinAcc, LinVel, Mass, MassInv, Orientation,
    Position, PresentOrientation, PresentPosition, ProceduralTag, ShapeComp, SleepingDisabledTag,
    SleepingTag, StaticTag, MAX_CONTACTS,
};
pub use config::SimulationSettings;
pub use delta::{DeltaBuilder, EntityMap, RegistryDelta};
pub use error::PhysicsError;
pub use filter::CollisionFilter;
pub use graph::Graph;
pub use island_coordinator::IslandCoordinator;
pub use island_worker::IslandWorker;
pub use job_dispatcher::{Job, JobDispatcher};
pub use material::{ContactMaterial, Material, MaterialMixTable};
pub use math::Scalar;
pub use message::{CoordinatorMessage, WorkerMessage};
pub use narrowphase::Narrowphase;
pub use registry::{Entity, Registry};
pub use row_cache::{ConstraintRow, RowCache};
pub use shapes::{CompoundChild, ConvexMesh, Shape};
pub use snapshot::{PoolSnapshot, RegistrySnapshot};
pub use solver::Solver;
pub use trimesh::TriMesh;
pub use world::{
    earth_gravity, make_rigidbody, rigidbody_apply_impulse, rigidbody_set_mass,
    set_external_system_init, set_external_system_post_step, set_external_system_pre_step,
    RigidBodyDef, RigidBodyKind, World,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::aabb::Aabb;
    pub use crate::collide::{collide, CollisionContext, CollisionResult};
    pub use crate::components::{
        AngVel, Constraint, ContactManifold, LinVel, Orientation, Position,
    };
    pub use crate::config::SimulationSettings;
    pub use crate::error::PhysicsError;
    pub use crate::filter::CollisionFilter;
    pub use crate::material::Material;
    pub use crate::math::Scalar;
    pub use crate::registry::{Entity, Registry};
    pub use crate::shapes::Shape;
    pub use crate::snapshot::RegistrySnapshot;
    pub use crate::solver::Solver;
    pub use crate::trimesh::TriMesh;
    pub use crate::world::{make_rigidbody, RigidBodyDef, RigidBodyKind, World};
}
