//! Entity registry
//!
//! Typed component storage keyed by entity id. Bodies, constraints, manifolds
//! and islands are all entities carrying subsets of the component types in
//! [`crate::components`]. Each pool stores its components densely in insertion
//! order, which is what makes registry iteration (and therefore solver row
//! order) stable and deterministic.
//!
//! Construction of components is recorded in a per-type log that systems
//! drain with [`Registry::take_constructed`]; the broadphase uses this to
//! defer tree insertion until an entity is fully assembled. Destruction
//! bookkeeping (tree proxies, graph nodes and edges) is done explicitly by
//! the system that owns the resource.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Opaque entity identifier. Indices are reused; the generation disambiguates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity {
    index: u32,
    generation: u32,
}

impl Entity {
    /// Slot index of this entity. Only meaningful within its owning registry.
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }
}

/// Marker for types that can be stored as components.
pub trait Component: Send + Sync + 'static {}
impl<T: Send + Sync + 'static> Component for T {}

trait AnyPool: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn remove_entity(&mut self, entity: Entity) -> bool;
    fn contains_entity(&self, entity: Entity) -> bool;
}

struct Pool<T> {
    sparse: HashMap<u32, usize>,
    entities: Vec<Entity>,
    data: Vec<T>,
}

impl<T> Pool<T> {
    fn new() -> Self {
        Self {
            sparse: HashMap::new(),
            entities: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Returns true when the component was newly added rather than replaced.
    fn insert(&mut self, entity: Entity, value: T) -> bool {
        if let Some(&idx) = self.sparse.get(&entity.index) {
            self.entities[idx] = entity;
            self.data[idx] = value;
            false
        } else {
            self.sparse.insert(entity.index, self.data.len());
            self.entities.push(entity);
            self.data.push(value);
            true
        }
    }

    fn get(&self, entity: Entity) -> Option<&T> {
        self.sparse
            .get(&entity.index)
            .filter(|&&idx| self.entities[idx] == entity)
            .map(|&idx| &self.data[idx])
    }

    fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        match self.sparse.get(&entity.index) {
            Some(&idx) if self.entities[idx] == entity => Some(&mut self.data[idx]),
            _ => None,
        }
    }

    fn remove(&mut self, entity: Entity) -> Option<T> {
        let idx = *self.sparse.get(&entity.index)?;
        if self.entities[idx] != entity {
            return None;
        }
        self.sparse.remove(&entity.index);
        self.entities.swap_remove(idx);
        let value = self.data.swap_remove(idx);
        if idx < self.entities.len() {
            self.sparse.insert(self.entities[idx].index, idx);
        }
        Some(value)
    }
}

impl<T: Component> AnyPool for Pool<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn remove_entity(&mut self, entity: Entity) -> bool {
        self.remove(entity).is_some()
    }

    fn contains_entity(&self, entity: Entity) -> bool {
        self.get(entity).is_some()
    }
}

/// Component registry: entity allocator plus one pool per component type.
#[derive(Default)]
pub struct Registry {
    generations: Vec<u32>,
    alive: Vec<bool>,
    free_list: Vec<u32>,
    pools: HashMap<TypeId, Box<dyn AnyPool>>,
    ctx: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    constructed: HashMap<TypeId, Vec<Entity>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new entity.
    pub fn create(&mut self) -> Entity {
        if let Some(index) = self.free_list.pop() {
            self.alive[index as usize] = true;
            Entity {
                index,
                generation: self.generations[index as usize],
            }
        } else {
            let index = self.generations.len() as u32;
            self.generations.push(0);
            self.alive.push(true);
            Entity {
                index,
                generation: 0,
            }
        }
    }

    /// Destroy an entity, removing all of its components.
    pub fn destroy(&mut self, entity: Entity) {
        if !self.alive(entity) {
            return;
        }
        for pool in self.pools.values_mut() {
            pool.remove_entity(entity);
        }
        self.alive[entity.index as usize] = false;
        self.generations[entity.index as usize] = self.generations[entity.index as usize].wrapping_add(1);
        self.free_list.push(entity.index);
    }

    pub fn alive(&self, entity: Entity) -> bool {
        (entity.index as usize) < self.generations.len()
            && self.alive[entity.index as usize]
            && self.generations[entity.index as usize] == entity.generation
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.alive.iter().filter(|&&a| a).count()
    }

    fn pool<T: Component>(&self) -> Option<&Pool<T>> {
        self.pools
            .get(&TypeId::of::<T>())
            .map(|p| p.as_any().downcast_ref::<Pool<T>>().unwrap())
    }

    fn pool_mut<T: Component>(&mut self) -> &mut Pool<T> {
        self.pools
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(Pool::<T>::new()))
            .as_any_mut()
            .downcast_mut::<Pool<T>>()
            .unwrap()
    }

    /// Assign a component, replacing any previous value. Newly added
    /// components are recorded in the construction log.
    pub fn assign<T: Component>(&mut self, entity: Entity, value: T) {
        debug_assert!(self.alive(entity), "assign on a dead entity");
        let newly_added = self.pool_mut::<T>().insert(entity, value);
        if newly_added {
            self.constructed
                .entry(TypeId::of::<T>())
                .or_default()
                .push(entity);
        }
    }

    /// Fetch a component. A missing component during a step indicates a
    /// registry-integrity bug, so this panics rather than returning an error.
    #[track_caller]
    pub fn get<T: Component>(&self, entity: Entity) -> &T {
        self.try_get::<T>(entity).unwrap_or_else(|| {
            panic!(
                "entity {entity:?} is missing component {}",
                std::any::type_name::<T>()
            )
        })
    }

    #[track_caller]
    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> &mut T {
        match self.pool_mut::<T>().get_mut(entity) {
            Some(value) => value,
            None => panic!(
                "entity {entity:?} is missing component {}",
                std::any::type_name::<T>()
            ),
        }
    }

    pub fn try_get<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.pool::<T>()?.get(entity)
    }

    pub fn try_get_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        self.pools
            .get_mut(&TypeId::of::<T>())?
            .as_any_mut()
            .downcast_mut::<Pool<T>>()
            .unwrap()
            .get_mut(entity)
    }

    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.pool::<T>().is_some_and(|p| p.get(entity).is_some())
    }

    /// Remove a component from an entity. Returns the removed value.
    pub fn remove<T: Component>(&mut self, entity: Entity) -> Option<T> {
        self.pools
            .get_mut(&TypeId::of::<T>())?
            .as_any_mut()
            .downcast_mut::<Pool<T>>()
            .unwrap()
            .remove(entity)
    }

    /// Remove a component from every entity that has it.
    pub fn clear_pool<T: Component>(&mut self) {
        if let Some(pool) = self.pools.get_mut(&TypeId::of::<T>()) {
            let pool = pool.as_any_mut().downcast_mut::<Pool<T>>().unwrap();
            pool.sparse.clear();
            pool.entities.clear();
            pool.data.clear();
        }
    }

    /// Entities carrying `T`, in insertion order.
    pub fn entities_with<T: Component>(&self) -> Vec<Entity> {
        self.pool::<T>()
            .map(|p| p.entities.clone())
            .unwrap_or_default()
    }

    /// Number of entities carrying `T`.
    pub fn count<T: Component>(&self) -> usize {
        self.pool::<T>().map(|p| p.entities.len()).unwrap_or(0)
    }

    /// Iterate `(entity, &component)` pairs in insertion order.
    pub fn iter<T: Component>(&self) -> impl Iterator<Item = (Entity, &T)> + '_ {
        self.pool::<T>()
            .into_iter()
            .flat_map(|p| p.entities.iter().copied().zip(p.data.iter()))
    }

    /// Drain the construction log for `T`.
    pub fn take_constructed<T: Component>(&mut self) -> Vec<Entity> {
        self.constructed
            .get_mut(&TypeId::of::<T>())
            .map(std::mem::take)
            .unwrap_or_default()
    }

    /// Insert or replace a per-registry singleton.
    pub fn ctx_insert<T: Component>(&mut self, value: T) {
        self.ctx.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn ctx<T: Component>(&self) -> Option<&T> {
        self.ctx
            .get(&TypeId::of::<T>())
            .map(|v| v.downcast_ref::<T>().unwrap())
    }

    pub fn ctx_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.ctx
            .get_mut(&TypeId::of::<T>())
            .map(|v| v.downcast_mut::<T>().unwrap())
    }
}
