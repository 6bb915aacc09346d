//! World: the embedding surface
//!
//! A [`World`] owns the main registry and an island coordinator. The
//! embedding application calls [`World::update`] from its main loop; the
//! islands themselves advance on the job dispatcher's threads at their
//! fixed timestep, so `update` is cheap: it drains worker deltas,
//! maintains islands and refreshes the render-facing present transforms.
//!
//! Rigid bodies are created through [`RigidBodyDef`]/[`make_rigidbody`],
//! which assigns the full component set and validates the dynamic-body
//! preconditions.

use std::sync::OnceLock;

use glam::{Mat3, Quat, Vec3};

use crate::components::{
    AabbComp, AngVel, ComponentKind, Continuous, ContinuousContactsTag, DynamicTag, Gravity,
    Inertia, InertiaInv, InertiaWorldInv, IslandContainer, IslandTimestamp, KinematicTag, LinAcc,
    LinVel, Mass, MassInv, Orientation, Position, PresentOrientation, PresentPosition,
    ProceduralTag, RotatedMesh, ShapeComp, SleepingDisabledTag, StaticTag,
};
use crate::config::SimulationSettings;
use crate::error::PhysicsError;
use crate::filter::CollisionFilter;
use crate::island_coordinator::IslandCoordinator;
use crate::job_dispatcher::current_time;
use crate::material::Material;
use crate::math::{inertia_world_inverse, integrate_orientation, Scalar, LARGE_SCALAR};
use crate::registry::{Entity, Registry};
use crate::shapes::Shape;

// ============================================================================
// External hooks
// ============================================================================

/// External system hook signature.
pub type ExternalSystemFn = fn(&mut Registry);

static INIT_HOOK: OnceLock<ExternalSystemFn> = OnceLock::new();
static PRE_STEP_HOOK: OnceLock<ExternalSystemFn> = OnceLock::new();
static POST_STEP_HOOK: OnceLock<ExternalSystemFn> = OnceLock::new();

/// Install the worker-init hook. Write-once at startup; returns false if a
/// hook was already installed.
pub fn set_external_system_init(hook: ExternalSystemFn) -> bool {
    INIT_HOOK.set(hook).is_ok()
}

/// Install the pre-step hook, invoked by every worker before each step.
pub fn set_external_system_pre_step(hook: ExternalSystemFn) -> bool {
    PRE_STEP_HOOK.set(hook).is_ok()
}

/// Install the post-step hook, invoked by every worker after each step.
pub fn set_external_system_post_step(hook: ExternalSystemFn) -> bool {
    POST_STEP_HOOK.set(hook).is_ok()
}

pub(crate) fn external_init() -> Option<ExternalSystemFn> {
    INIT_HOOK.get().copied()
}

pub(crate) fn external_pre_step() -> Option<ExternalSystemFn> {
    PRE_STEP_HOOK.get().copied()
}

pub(crate) fn external_post_step() -> Option<ExternalSystemFn> {
    POST_STEP_HOOK.get().copied()
}

// ============================================================================
// Rigid body construction
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RigidBodyKind {
    Dynamic,
    Kinematic,
    Static,
}

/// Declarative rigid-body definition consumed by [`make_rigidbody`].
#[derive(Clone, Debug)]
pub struct RigidBodyDef {
    pub kind: RigidBodyKind,
    pub position: Vec3,
    pub orientation: Quat,
    pub linvel: Vec3,
    pub angvel: Vec3,
    pub mass: Scalar,
    pub shape: Option<Shape>,
    /// `None` makes the body a sensor: manifolds, no impulses.
    pub material: Option<Material>,
    pub gravity: Option<Vec3>,
    pub linacc: Option<Vec3>,
    pub collision_filter: CollisionFilter,
    pub sleeping_disabled: bool,
    pub continuous_contacts: bool,
    /// Create render-facing present transforms.
    pub presentation: bool,
}

impl Default for RigidBodyDef {
    fn default() -> Self {
        Self {
            kind: RigidBodyKind::Dynamic,
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            linvel: Vec3::ZERO,
            angvel: Vec3::ZERO,
            mass: 1.0,
            shape: None,
            material: Some(Material::default()),
            gravity: Some(earth_gravity()),
            linacc: None,
            collision_filter: CollisionFilter::default(),
            sleeping_disabled: false,
            continuous_contacts: false,
            presentation: false,
        }
    }
}

impl RigidBodyDef {
    pub fn dynamic_sphere(mass: Scalar, radius: Scalar) -> Self {
        Self {
            mass,
            shape: Some(Shape::Sphere { radius }),
            ..Default::default()
        }
    }

    pub fn dynamic_box(mass: Scalar, half_extents: Vec3) -> Self {
        Self {
            mass,
            shape: Some(Shape::Box { half_extents }),
            ..Default::default()
        }
    }

    pub fn static_plane(normal: Vec3) -> Self {
        Self {
            kind: RigidBodyKind::Static,
            shape: Some(Shape::Plane {
                normal,
                constant: 0.0,
            }),
            gravity: None,
            ..Default::default()
        }
    }

    pub fn static_shape(shape: Shape) -> Self {
        Self {
            kind: RigidBodyKind::Static,
            shape: Some(shape),
            gravity: None,
            ..Default::default()
        }
    }
}

/// Standard gravity.
pub fn earth_gravity() -> Vec3 {
    Vec3::new(0.0, -9.81, 0.0)
}

/// Create a rigid body entity with the full component set.
pub fn make_rigidbody(registry: &mut Registry, def: &RigidBodyDef) -> Result<Entity, PhysicsError> {
    if def.kind == RigidBodyKind::Dynamic {
        if !(def.mass > 0.0) || !def.mass.is_finite() {
            return Err(PhysicsError::InvalidRigidBody {
                reason: "dynamic body requires finite mass > 0",
            });
        }
    }
    if let Some(shape) = &def.shape {
        if def.kind == RigidBodyKind::Dynamic && shape.is_static_only() {
            return Err(PhysicsError::InvalidRigidBody {
                reason: "mesh and plane shapes are static-only",
            });
        }
    }
    debug_assert!(
        (def.orientation.length() - 1.0).abs() < 1.0e-3,
        "orientation must be a unit quaternion"
    );

    let entity = registry.create();
    registry.assign(entity, Position(def.position));
    registry.assign(entity, Orientation(def.orientation.normalize()));

    if def.kind == RigidBodyKind::Dynamic {
        let inertia = match &def.shape {
            Some(shape) => shape.inertia(def.mass),
            None => Vec3::splat(0.4 * def.mass), // unit sphere fallback
        };
        debug_assert!(inertia.cmpgt(Vec3::ZERO).all());
        let inv_inertia = Vec3::ONE / inertia;
        registry.assign(entity, Mass(def.mass));
        registry.assign(entity, MassInv(1.0 / def.mass));
        registry.assign(entity, Inertia(inertia));
        registry.assign(entity, InertiaInv(inv_inertia));
        registry.assign(
            entity,
            InertiaWorldInv(inertia_world_inverse(def.orientation, inv_inertia)),
        );
    } else {
        // Infinite mass stored as a sentinel; inverses are zero.
        registry.assign(entity, Mass(LARGE_SCALAR));
        registry.assign(entity, MassInv(0.0));
        registry.assign(entity, Inertia(Vec3::splat(LARGE_SCALAR)));
        registry.assign(entity, InertiaInv(Vec3::ZERO));
        registry.assign(entity, InertiaWorldInv(Mat3::ZERO));
    }

    if def.kind == RigidBodyKind::Static {
        registry.assign(entity, LinVel(Vec3::ZERO));
        registry.assign(entity, AngVel(Vec3::ZERO));
    } else {
        registry.assign(entity, LinVel(def.linvel));
        registry.assign(entity, AngVel(def.angvel));
    }

    if def.kind == RigidBodyKind::Dynamic {
        if let Some(gravity) = def.gravity {
            registry.assign(entity, Gravity(gravity));
        }
        if let Some(linacc) = def.linacc {
            registry.assign(entity, LinAcc(linacc));
        }
    }

    if let Some(material) = def.material {
        registry.assign(entity, material);
    }

    if let Some(shape) = &def.shape {
        registry.assign(entity, AabbComp(shape.aabb(def.position, def.orientation)));
        if let Shape::Polyhedron(_) = shape {
            registry.assign(entity, RotatedMesh::default());
        }
        registry.assign(entity, ShapeComp(shape.clone()));
        registry.assign(entity, def.collision_filter);
    }

    if def.sleeping_disabled {
        registry.assign(entity, SleepingDisabledTag);
    }
    if def.continuous_contacts {
        registry.assign(entity, ContinuousContactsTag);
    }
    if def.presentation {
        registry.assign(entity, PresentPosition(def.position));
        registry.assign(entity, PresentOrientation(def.orientation));
    }

    match def.kind {
        RigidBodyKind::Dynamic => {
            registry.assign(entity, DynamicTag);
            registry.assign(entity, ProceduralTag);
            // Transforms and velocities of simulated bodies replicate on
            // every step.
            let mut continuous = Continuous::default();
            continuous.insert(ComponentKind::Position);
            continuous.insert(ComponentKind::Orientation);
            continuous.insert(ComponentKind::LinVel);
            continuous.insert(ComponentKind::AngVel);
            registry.assign(entity, continuous);
        }
        RigidBodyKind::Kinematic => {
            registry.assign(entity, KinematicTag);
        }
        RigidBodyKind::Static => {
            registry.assign(entity, StaticTag);
        }
    }

    Ok(entity)
}

/// Apply an impulse at a point relative to the center of mass.
pub fn rigidbody_apply_impulse(
    registry: &mut Registry,
    entity: Entity,
    impulse: Vec3,
    rel_location: Vec3,
) {
    let inv_mass = registry.get::<MassInv>(entity).0;
    let inv_inertia = registry.get::<InertiaWorldInv>(entity).0;
    registry.get_mut::<LinVel>(entity).0 += impulse * inv_mass;
    registry.get_mut::<AngVel>(entity).0 += inv_inertia * rel_location.cross(impulse);
}

/// Replace a dynamic body's mass, refreshing the derived inertia state.
pub fn rigidbody_set_mass(
    registry: &mut Registry,
    entity: Entity,
    mass: Scalar,
) -> Result<(), PhysicsError> {
    if !(mass > 0.0) || !mass.is_finite() {
        return Err(PhysicsError::InvalidRigidBody {
            reason: "mass must be finite and positive",
        });
    }
    registry.assign(entity, Mass(mass));
    registry.assign(entity, MassInv(1.0 / mass));

    let shape = registry.get::<ShapeComp>(entity).0.clone();
    let inertia = shape.inertia(mass);
    let inv_inertia = Vec3::ONE / inertia;
    let orn = registry.get::<Orientation>(entity).0;
    registry.assign(entity, Inertia(inertia));
    registry.assign(entity, InertiaInv(inv_inertia));
    registry.assign(entity, InertiaWorldInv(inertia_world_inverse(orn, inv_inertia)));
    Ok(())
}

// ============================================================================
// World
// ============================================================================

/// Owns the main registry and the island coordinator.
pub struct World {
    registry: Registry,
    coordinator: IslandCoordinator,
    settings: SimulationSettings,
    step: u64,
    elapsed: f64,
}

impl World {
    pub fn new(registry: Registry, settings: SimulationSettings) -> Result<Self, PhysicsError> {
        settings.validate()?;
        Ok(Self {
            registry,
            coordinator: IslandCoordinator::new(settings),
            settings,
            step: 0,
            elapsed: 0.0,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    /// Monotonically increasing update counter.
    pub fn current_step(&self) -> u64 {
        self.step
    }

    /// Accumulated wall-clock time handed to `update`.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn island_count(&self) -> usize {
        self.coordinator.island_count()
    }

    /// Create a rigid body; the coordinator picks it up on the next update.
    pub fn make_rigidbody(&mut self, def: &RigidBodyDef) -> Result<Entity, PhysicsError> {
        make_rigidbody(&mut self.registry, def)
    }

    /// One main-loop tick: drain worker deltas, maintain islands, refresh
    /// present-state transforms.
    pub fn update(&mut self, dt: Scalar) {
        self.elapsed += dt as f64;
        self.coordinator.update(&mut self.registry);
        self.update_presentation();
        self.step += 1;
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.coordinator.set_paused(paused);
    }

    /// Advance every island by one step while paused.
    pub fn step_simulation(&mut self) {
        self.coordinator.step_simulation();
    }

    /// Wake the island containing `entity`. Waking an awake island is a
    /// no-op.
    pub fn wake_up_island(&mut self, entity: Entity) {
        self.coordinator.wake_up_island(&self.registry, entity);
    }

    /// Extrapolate present transforms from the last synced state: islands
    /// run behind the wall clock by up to one fixed step.
    fn update_presentation(&mut self) {
        let now = current_time();
        for entity in self.registry.entities_with::<PresentPosition>() {
            let Some(container) = self.registry.try_get::<IslandContainer>(entity) else {
                continue;
            };
            let Some(&island) = container.islands.first() else {
                continue;
            };
            let Some(timestamp) = self.registry.try_get::<IslandTimestamp>(island) else {
                continue;
            };
            let ahead = (now - timestamp.0).clamp(0.0, self.settings.fixed_dt as f64) as Scalar;

            let pos = self.registry.get::<Position>(entity).0;
            let vel = self.registry.get::<LinVel>(entity).0;
            self.registry.get_mut::<PresentPosition>(entity).0 = pos + vel * ahead;

            let orn = self.registry.get::<Orientation>(entity).0;
            let angvel = self.registry.get::<AngVel>(entity).0;
            self.registry.get_mut::<PresentOrientation>(entity).0 =
                integrate_orientation(orn, angvel, ahead);
        }
    }
}

impl Drop for World {
    fn drop(&mut self) {
        self.coordinator.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_dynamic_body_components() {
        let mut registry = Registry::new();
        let def = RigidBodyDef::dynamic_sphere(2.0, 0.5);
        let entity = make_rigidbody(&mut registry, &def).unwrap();

        assert!(registry.has::<DynamicTag>(entity));
        assert!(registry.has::<ProceduralTag>(entity));
        assert_eq!(registry.get::<Mass>(entity).0, 2.0);
        assert_eq!(registry.get::<MassInv>(entity).0, 0.5);
        assert!(registry.get::<Inertia>(entity).0.cmpgt(Vec3::ZERO).all());
        assert!(registry.has::<AabbComp>(entity));
        assert!(registry.has::<Continuous>(entity));
    }

    #[test]
    fn test_dynamic_body_requires_positive_mass() {
        let mut registry = Registry::new();
        let def = RigidBodyDef {
            mass: 0.0,
            ..RigidBodyDef::dynamic_sphere(1.0, 0.5)
        };
        assert!(make_rigidbody(&mut registry, &def).is_err());
    }

    #[test]
    fn test_static_body_has_zero_inverse_mass() {
        let mut registry = Registry::new();
        let def = RigidBodyDef::static_plane(Vec3::Y);
        let entity = make_rigidbody(&mut registry, &def).unwrap();

        assert!(registry.has::<StaticTag>(entity));
        assert!(!registry.has::<ProceduralTag>(entity));
        assert_eq!(registry.get::<MassInv>(entity).0, 0.0);
        assert_eq!(registry.get::<Mass>(entity).0, LARGE_SCALAR);
        assert_eq!(registry.get::<LinVel>(entity).0, Vec3::ZERO);
    }

    #[test]
    fn test_dynamic_mesh_shape_rejected() {
        use crate::trimesh::TriMesh;
        use std::sync::Arc;

        let mesh = TriMesh::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::Z],
            vec![0, 1, 2],
        );
        let mut registry = Registry::new();
        let def = RigidBodyDef {
            shape: Some(Shape::Mesh(Arc::new(mesh))),
            ..Default::default()
        };
        assert!(make_rigidbody(&mut registry, &def).is_err());
    }

    #[test]
    fn test_sensor_body_has_no_material() {
        let mut registry = Registry::new();
        let def = RigidBodyDef {
            material: None,
            ..RigidBodyDef::dynamic_sphere(1.0, 0.5)
        };
        let entity = make_rigidbody(&mut registry, &def).unwrap();
        assert!(!registry.has::<Material>(entity));
    }

    #[test]
    fn test_apply_impulse_changes_velocities() {
        let mut registry = Registry::new();
        let entity =
            make_rigidbody(&mut registry, &RigidBodyDef::dynamic_sphere(2.0, 0.5)).unwrap();

        rigidbody_apply_impulse(
            &mut registry,
            entity,
            Vec3::new(4.0, 0.0, 0.0),
            Vec3::new(0.0, 0.5, 0.0),
        );

        assert_eq!(registry.get::<LinVel>(entity).0, Vec3::new(2.0, 0.0, 0.0));
        assert!(registry.get::<AngVel>(entity).0.length() > 0.0, "off-center impulse spins");
    }

    #[test]
    fn test_set_mass_updates_inertia() {
        let mut registry = Registry::new();
        let entity =
            make_rigidbody(&mut registry, &RigidBodyDef::dynamic_sphere(1.0, 0.5)).unwrap();
        let before = registry.get::<Inertia>(entity).0;

        rigidbody_set_mass(&mut registry, entity, 4.0).unwrap();
        let after = registry.get::<Inertia>(entity).0;
        assert!((after.x - before.x * 4.0).abs() < 1.0e-6);
        assert_eq!(registry.get::<MassInv>(entity).0, 0.25);
    }

    #[test]
    fn test_world_step_counter() {
        let registry = Registry::new();
        let mut world = World::new(registry, SimulationSettings::default()).unwrap();
        assert_eq!(world.current_step(), 0);
        world.update(1.0 / 60.0);
        world.update(1.0 / 60.0);
        assert_eq!(world.current_step(), 2);
    }

    #[test]
    fn test_world_rejects_invalid_settings() {
        let registry = Registry::new();
        let settings = SimulationSettings {
            fixed_dt: -1.0,
            ..Default::default()
        };
        assert!(World::new(registry, settings).is_err());
    }
}
