//! Component types
//!
//! A rigid body is an entity carrying a subset of these components; a
//! constraint is an entity linking two bodies; a contact manifold is a
//! constraint entity that also owns up to four contact points. The
//! [`ComponentKind`]/[`ComponentValue`] pair at the bottom is the canonical
//! component tuple used by deltas and registry snapshots.

use glam::{Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::aabb::Aabb;
use crate::bvh::TreeView;
use crate::filter::CollisionFilter;
pub use crate::material::Material;
use crate::math::Scalar;
use crate::registry::{Entity, Registry};
use crate::shapes::Shape;

// ============================================================================
// Rigid body state
// ============================================================================

/// World-space center of mass.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position(pub Vec3);

/// Unit-length orientation. Renormalized after every angular integration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Orientation(pub Quat);

/// Linear velocity.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinVel(pub Vec3);

/// Angular velocity.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AngVel(pub Vec3);

/// External acceleration applied each step, e.g. thrust.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinAcc(pub Vec3);

/// Per-body gravity acceleration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Gravity(pub Vec3);

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mass(pub Scalar);

/// Zero for static and kinematic bodies.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MassInv(pub Scalar);

/// Body-frame inertia tensor diagonal.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Inertia(pub Vec3);

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct InertiaInv(pub Vec3);

/// World-space inverse inertia, refreshed after every orientation change.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct InertiaWorldInv(pub Mat3);

/// World-space bounds of the body's shape.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AabbComp(pub Aabb);

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShapeComp(pub Shape);

/// World-rotated vertex/normal cache for polyhedron shapes, refreshed after
/// each integration so collision routines don't rotate per query.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RotatedMesh {
    pub vertices: Vec<Vec3>,
    pub normals: Vec<Vec3>,
}

// ============================================================================
// Tags
// ============================================================================

/// Body moved by the solver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicTag;

/// Body moved by user code; pushes dynamic bodies, never reacts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KinematicTag;

/// Immovable body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticTag;

/// Marks entities whose state is produced by the simulation. Procedural
/// bodies live in the dynamic broadphase tree and belong to exactly one
/// island.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProceduralTag;

/// Present on every entity of a sleeping island, and on the island itself.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SleepingTag;

/// Prevents the owning island from ever sleeping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SleepingDisabledTag;

/// Bodies that want their contact points replicated continuously.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuousContactsTag;

// ============================================================================
// Islands
// ============================================================================

/// Marker for island aggregate entities.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Island;

/// Simulation time of the island's last finished step.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct IslandTimestamp(pub f64);

/// The islands an entity belongs to. Procedural bodies have exactly one;
/// static and kinematic bodies may appear in many islands at once.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IslandContainer {
    pub islands: Vec<Entity>,
}

impl IslandContainer {
    pub fn insert(&mut self, island: Entity) {
        if !self.islands.contains(&island) {
            self.islands.push(island);
        }
    }

    pub fn remove(&mut self, island: Entity) {
        self.islands.retain(|&e| e != island);
    }

    pub fn contains(&self, island: Entity) -> bool {
        self.islands.contains(&island)
    }
}

/// Snapshot of a worker's dynamic broadphase tree, published every step for
/// the coordinator's cross-island broadphase.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TreeViewComp(pub TreeView);

// ============================================================================
// Broadphase / graph handles
// ============================================================================

/// Handle into the broadphase tree the body is registered with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNodeId(pub u32);

/// Handle into the interaction graph (bodies).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNodeComp(pub u32);

/// Handle into the interaction graph (constraints/manifolds).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdgeComp(pub u32);

// ============================================================================
// Contacts & constraints
// ============================================================================

/// Maximum number of points a manifold can hold.
pub const MAX_CONTACTS: usize = 4;

/// One persistent contact point. Pivots are in each body's object space, the
/// normal in B's object space; `distance` is the signed separation along the
/// normal, negative when penetrating.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContactPoint {
    pub pivot_a: Vec3,
    pub pivot_b: Vec3,
    pub normal_b: Vec3,
    pub distance: Scalar,
    pub restitution: Scalar,
    pub friction: Scalar,
    /// Steps this point has survived; zeroed when (re)created.
    pub lifetime: u32,
    /// Accumulated normal impulse from the previous solve, for warm starting.
    pub normal_impulse: Scalar,
    /// Accumulated friction impulse from the previous solve.
    pub friction_impulse: Scalar,
}

/// Persistent record of up to four contact points between an ordered pair.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContactManifold {
    pub body: [Entity; 2],
    pub separation_threshold: Scalar,
    pub points: Vec<ContactPoint>,
}

impl ContactManifold {
    pub fn new(body: [Entity; 2], separation_threshold: Scalar) -> Self {
        Self {
            body,
            separation_threshold,
            points: Vec::with_capacity(MAX_CONTACTS),
        }
    }

    #[inline]
    pub fn num_points(&self) -> usize {
        self.points.len()
    }
}

/// Tagged constraint variant. Every kind links two bodies; contact
/// constraints live on the manifold entity and are subsumed by the
/// manifold's graph edge.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Constraint {
    Contact {
        body: [Entity; 2],
        stiffness: Scalar,
        damping: Scalar,
    },
    Distance {
        body: [Entity; 2],
        pivots: [Vec3; 2],
        distance: Scalar,
        stiffness: Scalar,
        damping: Scalar,
    },
    Point {
        body: [Entity; 2],
        pivots: [Vec3; 2],
    },
    Hinge {
        body: [Entity; 2],
        pivots: [Vec3; 2],
        /// Hinge axis in each body's object space.
        axes: [Vec3; 2],
    },
    Generic {
        body: [Entity; 2],
        pivots: [Vec3; 2],
        /// Which linear axes are locked.
        fixed_linear: [bool; 3],
        /// Which angular axes are locked.
        fixed_angular: [bool; 3],
    },
}

impl Constraint {
    pub fn body(&self) -> [Entity; 2] {
        match self {
            Constraint::Contact { body, .. }
            | Constraint::Distance { body, .. }
            | Constraint::Point { body, .. }
            | Constraint::Hinge { body, .. }
            | Constraint::Generic { body, .. } => *body,
        }
    }

    fn body_mut(&mut self) -> &mut [Entity; 2] {
        match self {
            Constraint::Contact { body, .. }
            | Constraint::Distance { body, .. }
            | Constraint::Point { body, .. }
            | Constraint::Hinge { body, .. }
            | Constraint::Generic { body, .. } => body,
        }
    }

    pub fn is_contact(&self) -> bool {
        matches!(self, Constraint::Contact { .. })
    }
}

/// Persistent accumulated impulses per constraint, applied before solving
/// the next step (warm start). Sized for the largest row block: a four-point
/// contact contributes two rows per point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintImpulse {
    pub values: [Scalar; MAX_CONTACTS * 2],
}

// ============================================================================
// Presentation
// ============================================================================

/// Render-facing position, extrapolated by the coordinator between steps.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PresentPosition(pub Vec3);

/// Render-facing orientation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PresentOrientation(pub Quat);

// ============================================================================
// Replication markers
// ============================================================================

/// Component kinds synchronized on every step for the owning entity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Continuous {
    pub kinds: Vec<ComponentKind>,
}

impl Continuous {
    pub fn insert(&mut self, kind: ComponentKind) {
        if !self.kinds.contains(&kind) {
            self.kinds.push(kind);
        }
    }
}

/// Precise record of what changed on an entity since the last sync. Cleared
/// after each delta is published.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Dirty {
    pub is_new_entity: bool,
    pub created: Vec<ComponentKind>,
    pub updated: Vec<ComponentKind>,
    pub destroyed: Vec<ComponentKind>,
}

impl Dirty {
    pub fn set_new(&mut self) -> &mut Self {
        self.is_new_entity = true;
        self
    }

    pub fn created(&mut self, kind: ComponentKind) -> &mut Self {
        if !self.created.contains(&kind) {
            self.created.push(kind);
        }
        self
    }

    pub fn updated(&mut self, kind: ComponentKind) -> &mut Self {
        if !self.updated.contains(&kind) {
            self.updated.push(kind);
        }
        self
    }

    pub fn destroyed(&mut self, kind: ComponentKind) -> &mut Self {
        if !self.destroyed.contains(&kind) {
            self.destroyed.push(kind);
        }
        self
    }
}

/// Marks an entity while its components are being imported from a delta, so
/// observers don't re-emit outgoing changes for them.
pub fn mark_dirty(registry: &mut Registry, entity: Entity) -> &mut Dirty {
    if !registry.has::<Dirty>(entity) {
        registry.assign(entity, Dirty::default());
    }
    registry.get_mut::<Dirty>(entity)
}

// ============================================================================
// Canonical component tuple
// ============================================================================

/// Position of each replicable component kind in the canonical tuple.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComponentKind {
    Position,
    Orientation,
    LinVel,
    AngVel,
    LinAcc,
    Gravity,
    Mass,
    MassInv,
    Inertia,
    InertiaInv,
    InertiaWorldInv,
    Aabb,
    Shape,
    CollisionFilter,
    Material,
    DynamicTag,
    KinematicTag,
    StaticTag,
    ProceduralTag,
    SleepingTag,
    SleepingDisabledTag,
    ContinuousContactsTag,
    Island,
    IslandTimestamp,
    IslandContainer,
    TreeView,
    ContactManifold,
    Constraint,
    ConstraintImpulse,
    Continuous,
}

/// Typed payload for one component, used by deltas and snapshot pools.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ComponentValue {
    Position(Position),
    Orientation(Orientation),
    LinVel(LinVel),
    AngVel(AngVel),
    LinAcc(LinAcc),
    Gravity(Gravity),
    Mass(Mass),
    MassInv(MassInv),
    Inertia(Inertia),
    InertiaInv(InertiaInv),
    InertiaWorldInv(InertiaWorldInv),
    Aabb(AabbComp),
    Shape(ShapeComp),
    CollisionFilter(CollisionFilter),
    Material(Material),
    DynamicTag,
    KinematicTag,
    StaticTag,
    ProceduralTag,
    SleepingTag,
    SleepingDisabledTag,
    ContinuousContactsTag,
    Island,
    IslandTimestamp(IslandTimestamp),
    IslandContainer(IslandContainer),
    TreeView(TreeViewComp),
    ContactManifold(ContactManifold),
    Constraint(Constraint),
    ConstraintImpulse(ConstraintImpulse),
    Continuous(Continuous),
}

impl ComponentValue {
    pub fn kind(&self) -> ComponentKind {
        match self {
            ComponentValue::Position(_) => ComponentKind::Position,
            ComponentValue::Orientation(_) => ComponentKind::Orientation,
            ComponentValue::LinVel(_) => ComponentKind::LinVel,
            ComponentValue::AngVel(_) => ComponentKind::AngVel,
            ComponentValue::LinAcc(_) => ComponentKind::LinAcc,
            ComponentValue::Gravity(_) => ComponentKind::Gravity,
            ComponentValue::Mass(_) => ComponentKind::Mass,
            ComponentValue::MassInv(_) => ComponentKind::MassInv,
            ComponentValue::Inertia(_) => ComponentKind::Inertia,
            ComponentValue::InertiaInv(_) => ComponentKind::InertiaInv,
            ComponentValue::InertiaWorldInv(_) => ComponentKind::InertiaWorldInv,
            ComponentValue::Aabb(_) => ComponentKind::Aabb,
            ComponentValue::Shape(_) => ComponentKind::Shape,
            ComponentValue::CollisionFilter(_) => ComponentKind::CollisionFilter,
            ComponentValue::Material(_) => ComponentKind::Material,
            ComponentValue::DynamicTag => ComponentKind::DynamicTag,
            ComponentValue::KinematicTag => ComponentKind::KinematicTag,
            ComponentValue::StaticTag => ComponentKind::StaticTag,
            ComponentValue::ProceduralTag => ComponentKind::ProceduralTag,
            ComponentValue::SleepingTag => ComponentKind::SleepingTag,
            ComponentValue::SleepingDisabledTag => ComponentKind::SleepingDisabledTag,
            ComponentValue::ContinuousContactsTag => ComponentKind::ContinuousContactsTag,
            ComponentValue::Island => ComponentKind::Island,
            ComponentValue::IslandTimestamp(_) => ComponentKind::IslandTimestamp,
            ComponentValue::IslandContainer(_) => ComponentKind::IslandContainer,
            ComponentValue::TreeView(_) => ComponentKind::TreeView,
            ComponentValue::ContactManifold(_) => ComponentKind::ContactManifold,
            ComponentValue::Constraint(_) => ComponentKind::Constraint,
            ComponentValue::ConstraintImpulse(_) => ComponentKind::ConstraintImpulse,
            ComponentValue::Continuous(_) => ComponentKind::Continuous,
        }
    }

    /// Rewrite every entity reference through `map`. Entries that cannot be
    /// mapped are dropped from collections; pair references keep their value
    /// and the caller decides whether the record is importable.
    pub fn map_entities(&mut self, map: impl Fn(Entity) -> Option<Entity>) {
        match self {
            ComponentValue::ContactManifold(m) => {
                for body in m.body.iter_mut() {
                    if let Some(local) = map(*body) {
                        *body = local;
                    }
                }
            }
            ComponentValue::Constraint(c) => {
                for body in c.body_mut().iter_mut() {
                    if let Some(local) = map(*body) {
                        *body = local;
                    }
                }
            }
            ComponentValue::IslandContainer(c) => {
                let mapped: Vec<Entity> =
                    c.islands.iter().filter_map(|&e| map(e)).collect();
                c.islands = mapped;
            }
            ComponentValue::TreeView(view) => view.0.map_entities(&map),
            _ => {}
        }
    }

    /// Entities referenced by this value that must exist before import.
    pub fn referenced_entities(&self) -> Vec<Entity> {
        match self {
            ComponentValue::ContactManifold(m) => m.body.to_vec(),
            ComponentValue::Constraint(c) => c.body().to_vec(),
            _ => Vec::new(),
        }
    }
}

/// Read component `kind` off an entity as a typed payload.
pub fn extract_component(
    registry: &Registry,
    entity: Entity,
    kind: ComponentKind,
) -> Option<ComponentValue> {
    Some(match kind {
        ComponentKind::Position => ComponentValue::Position(*registry.try_get(entity)?),
        ComponentKind::Orientation => ComponentValue::Orientation(*registry.try_get(entity)?),
        ComponentKind::LinVel => ComponentValue::LinVel(*registry.try_get(entity)?),
        ComponentKind::AngVel => ComponentValue::AngVel(*registry.try_get(entity)?),
        ComponentKind::LinAcc => ComponentValue::LinAcc(*registry.try_get(entity)?),
        ComponentKind::Gravity => ComponentValue::Gravity(*registry.try_get(entity)?),
        ComponentKind::Mass => ComponentValue::Mass(*registry.try_get(entity)?),
        ComponentKind::MassInv => ComponentValue::MassInv(*registry.try_get(entity)?),
        ComponentKind::Inertia => ComponentValue::Inertia(*registry.try_get(entity)?),
        ComponentKind::InertiaInv => ComponentValue::InertiaInv(*registry.try_get(entity)?),
        ComponentKind::InertiaWorldInv => {
            ComponentValue::InertiaWorldInv(*registry.try_get(entity)?)
        }
        ComponentKind::Aabb => ComponentValue::Aabb(*registry.try_get(entity)?),
        ComponentKind::Shape => {
            ComponentValue::Shape(registry.try_get::<ShapeComp>(entity)?.clone())
        }
        ComponentKind::CollisionFilter => {
            ComponentValue::CollisionFilter(*registry.try_get(entity)?)
        }
        ComponentKind::Material => ComponentValue::Material(*registry.try_get(entity)?),
        ComponentKind::DynamicTag => {
            registry.try_get::<DynamicTag>(entity)?;
            ComponentValue::DynamicTag
        }
        ComponentKind::KinematicTag => {
            registry.try_get::<KinematicTag>(entity)?;
            ComponentValue::KinematicTag
        }
        ComponentKind::StaticTag => {
            registry.try_get::<StaticTag>(entity)?;
            ComponentValue::StaticTag
        }
        ComponentKind::ProceduralTag => {
            registry.try_get::<ProceduralTag>(entity)?;
            ComponentValue::ProceduralTag
        }
        ComponentKind::SleepingTag => {
            registry.try_get::<SleepingTag>(entity)?;
            ComponentValue::SleepingTag
        }
        ComponentKind::SleepingDisabledTag => {
            registry.try_get::<SleepingDisabledTag>(entity)?;
            ComponentValue::SleepingDisabledTag
        }
        ComponentKind::ContinuousContactsTag => {
            registry.try_get::<ContinuousContactsTag>(entity)?;
            ComponentValue::ContinuousContactsTag
        }
        ComponentKind::Island => {
            registry.try_get::<Island>(entity)?;
            ComponentValue::Island
        }
        ComponentKind::IslandTimestamp => {
            ComponentValue::IslandTimestamp(*registry.try_get(entity)?)
        }
        ComponentKind::IslandContainer => {
            ComponentValue::IslandContainer(registry.try_get::<IslandContainer>(entity)?.clone())
        }
        ComponentKind::TreeView => {
            ComponentValue::TreeView(registry.try_get::<TreeViewComp>(entity)?.clone())
        }
        ComponentKind::ContactManifold => {
            ComponentValue::ContactManifold(registry.try_get::<ContactManifold>(entity)?.clone())
        }
        ComponentKind::Constraint => {
            ComponentValue::Constraint(registry.try_get::<Constraint>(entity)?.clone())
        }
        ComponentKind::ConstraintImpulse => {
            ComponentValue::ConstraintImpulse(*registry.try_get(entity)?)
        }
        ComponentKind::Continuous => {
            ComponentValue::Continuous(registry.try_get::<Continuous>(entity)?.clone())
        }
    })
}

/// Assign a typed payload to an entity.
pub fn apply_component(registry: &mut Registry, entity: Entity, value: ComponentValue) {
    match value {
        ComponentValue::Position(v) => registry.assign(entity, v),
        ComponentValue::Orientation(v) => registry.assign(entity, v),
        ComponentValue::LinVel(v) => registry.assign(entity, v),
        ComponentValue::AngVel(v) => registry.assign(entity, v),
        ComponentValue::LinAcc(v) => registry.assign(entity, v),
        ComponentValue::Gravity(v) => registry.assign(entity, v),
        ComponentValue::Mass(v) => registry.assign(entity, v),
        ComponentValue::MassInv(v) => registry.assign(entity, v),
        ComponentValue::Inertia(v) => registry.assign(entity, v),
        ComponentValue::InertiaInv(v) => registry.assign(entity, v),
        ComponentValue::InertiaWorldInv(v) => registry.assign(entity, v),
        ComponentValue::Aabb(v) => registry.assign(entity, v),
        ComponentValue::Shape(v) => registry.assign(entity, v),
        ComponentValue::CollisionFilter(v) => registry.assign(entity, v),
        ComponentValue::Material(v) => registry.assign(entity, v),
        ComponentValue::DynamicTag => registry.assign(entity, DynamicTag),
        ComponentValue::KinematicTag => registry.assign(entity, KinematicTag),
        ComponentValue::StaticTag => registry.assign(entity, StaticTag),
        ComponentValue::ProceduralTag => registry.assign(entity, ProceduralTag),
        ComponentValue::SleepingTag => registry.assign(entity, SleepingTag),
        ComponentValue::SleepingDisabledTag => registry.assign(entity, SleepingDisabledTag),
        ComponentValue::ContinuousContactsTag => registry.assign(entity, ContinuousContactsTag),
        ComponentValue::Island => registry.assign(entity, Island),
        ComponentValue::IslandTimestamp(v) => registry.assign(entity, v),
        ComponentValue::IslandContainer(v) => registry.assign(entity, v),
        ComponentValue::TreeView(v) => registry.assign(entity, v),
        ComponentValue::ContactManifold(v) => registry.assign(entity, v),
        ComponentValue::Constraint(v) => registry.assign(entity, v),
        ComponentValue::ConstraintImpulse(v) => registry.assign(entity, v),
        ComponentValue::Continuous(v) => registry.assign(entity, v),
    }
}

/// Remove component `kind` from an entity.
pub fn remove_component(registry: &mut Registry, entity: Entity, kind: ComponentKind) {
    match kind {
        ComponentKind::Position => drop(registry.remove::<Position>(entity)),
        ComponentKind::Orientation => drop(registry.remove::<Orientation>(entity)),
        ComponentKind::LinVel => drop(registry.remove::<LinVel>(entity)),
        ComponentKind::AngVel => drop(registry.remove::<AngVel>(entity)),
        ComponentKind::LinAcc => drop(registry.remove::<LinAcc>(entity)),
        ComponentKind::Gravity => drop(registry.remove::<Gravity>(entity)),
        ComponentKind::Mass => drop(registry.remove::<Mass>(entity)),
        ComponentKind::MassInv => drop(registry.remove::<MassInv>(entity)),
        ComponentKind::Inertia => drop(registry.remove::<Inertia>(entity)),
        ComponentKind::InertiaInv => drop(registry.remove::<InertiaInv>(entity)),
        ComponentKind::InertiaWorldInv => drop(registry.remove::<InertiaWorldInv>(entity)),
        ComponentKind::Aabb => drop(registry.remove::<AabbComp>(entity)),
        ComponentKind::Shape => drop(registry.remove::<ShapeComp>(entity)),
        ComponentKind::CollisionFilter => drop(registry.remove::<CollisionFilter>(entity)),
        ComponentKind::Material => drop(registry.remove::<Material>(entity)),
        ComponentKind::DynamicTag => drop(registry.remove::<DynamicTag>(entity)),
        ComponentKind::KinematicTag => drop(registry.remove::<KinematicTag>(entity)),
        ComponentKind::StaticTag => drop(registry.remove::<StaticTag>(entity)),
        ComponentKind::ProceduralTag => drop(registry.remove::<ProceduralTag>(entity)),
        ComponentKind::SleepingTag => drop(registry.remove::<SleepingTag>(entity)),
        ComponentKind::SleepingDisabledTag => {
            drop(registry.remove::<SleepingDisabledTag>(entity))
        }
        ComponentKind::ContinuousContactsTag => {
            drop(registry.remove::<ContinuousContactsTag>(entity))
        }
        ComponentKind::Island => drop(registry.remove::<Island>(entity)),
        ComponentKind::IslandTimestamp => drop(registry.remove::<IslandTimestamp>(entity)),
        ComponentKind::IslandContainer => drop(registry.remove::<IslandContainer>(entity)),
        ComponentKind::TreeView => drop(registry.remove::<TreeViewComp>(entity)),
        ComponentKind::ContactManifold => drop(registry.remove::<ContactManifold>(entity)),
        ComponentKind::Constraint => drop(registry.remove::<Constraint>(entity)),
        ComponentKind::ConstraintImpulse => drop(registry.remove::<ConstraintImpulse>(entity)),
        ComponentKind::Continuous => drop(registry.remove::<Continuous>(entity)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_apply_roundtrip() {
        let mut reg = Registry::new();
        let e = reg.create();
        reg.assign(e, Position(Vec3::new(1.0, 2.0, 3.0)));
        reg.assign(e, DynamicTag);

        let pos = extract_component(&reg, e, ComponentKind::Position).unwrap();
        let tag = extract_component(&reg, e, ComponentKind::DynamicTag).unwrap();
        assert!(extract_component(&reg, e, ComponentKind::Material).is_none());

        let mut other = Registry::new();
        let f = other.create();
        apply_component(&mut other, f, pos);
        apply_component(&mut other, f, tag);

        assert_eq!(other.get::<Position>(f).0, Vec3::new(1.0, 2.0, 3.0));
        assert!(other.has::<DynamicTag>(f));
    }

    #[test]
    fn test_remove_component_by_kind() {
        let mut reg = Registry::new();
        let e = reg.create();
        reg.assign(e, SleepingTag);
        remove_component(&mut reg, e, ComponentKind::SleepingTag);
        assert!(!reg.has::<SleepingTag>(e));
    }

    #[test]
    fn test_manifold_entity_mapping() {
        let mut reg = Registry::new();
        let a = reg.create();
        let b = reg.create();
        let a2 = reg.create();
        let b2 = reg.create();

        let mut value =
            ComponentValue::ContactManifold(ContactManifold::new([a, b], 0.1));
        value.map_entities(|e| {
            if e == a {
                Some(a2)
            } else if e == b {
                Some(b2)
            } else {
                None
            }
        });

        match value {
            ComponentValue::ContactManifold(m) => assert_eq!(m.body, [a2, b2]),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_dirty_dedup() {
        let mut dirty = Dirty::default();
        dirty
            .created(ComponentKind::Position)
            .created(ComponentKind::Position)
            .updated(ComponentKind::LinVel);
        assert_eq!(dirty.created.len(), 1);
        assert_eq!(dirty.updated.len(), 1);
    }

    #[test]
    fn test_island_container_set_semantics() {
        let mut reg = Registry::new();
        let island_a = reg.create();
        let island_b = reg.create();

        let mut container = IslandContainer::default();
        container.insert(island_a);
        container.insert(island_a);
        container.insert(island_b);
        assert_eq!(container.islands.len(), 2);

        container.remove(island_a);
        assert!(!container.contains(island_a));
        assert!(container.contains(island_b));
    }
}
