//! Registry deltas
//!
//! A delta is a typed, additive snapshot of entity and component creations,
//! updates and destructions, exchanged between the coordinator and island
//! workers. Entities are always expressed in the *sender's* id space; each
//! side owns an [`EntityMap`] that pairs remote ids with local ones.
//!
//! The pairing is learned incrementally: when a receiver instantiates
//! entities from a delta, its next outgoing delta announces the new
//! `(local, remote)` pairs in `entity_mappings`, closing the loop.

use std::collections::HashMap;

use crate::components::{apply_component, remove_component, ComponentKind, ComponentValue};
use crate::registry::{Entity, Registry};

/// Bidirectional mapping between a remote registry's entity ids and local ones.
#[derive(Clone, Debug, Default)]
pub struct EntityMap {
    remote_to_local: HashMap<Entity, Entity>,
    local_to_remote: HashMap<Entity, Entity>,
}

impl EntityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, remote: Entity, local: Entity) {
        self.remote_to_local.insert(remote, local);
        self.local_to_remote.insert(local, remote);
    }

    pub fn local(&self, remote: Entity) -> Option<Entity> {
        self.remote_to_local.get(&remote).copied()
    }

    pub fn remote(&self, local: Entity) -> Option<Entity> {
        self.local_to_remote.get(&local).copied()
    }

    pub fn contains_remote(&self, remote: Entity) -> bool {
        self.remote_to_local.contains_key(&remote)
    }

    pub fn remove_by_local(&mut self, local: Entity) {
        if let Some(remote) = self.local_to_remote.remove(&local) {
            self.remote_to_local.remove(&remote);
        }
    }

    pub fn remove_by_remote(&mut self, remote: Entity) {
        if let Some(local) = self.remote_to_local.remove(&remote) {
            self.local_to_remote.remove(&local);
        }
    }

    pub fn len(&self) -> usize {
        self.remote_to_local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remote_to_local.is_empty()
    }
}

/// Typed snapshot diff. Entity ids are in the sender's id space.
#[derive(Clone, Debug, Default)]
pub struct RegistryDelta {
    /// `(sender_local, receiver_local)` pairs the sender learned since the
    /// previous delta; lets the receiver complete its entity map.
    pub entity_mappings: Vec<(Entity, Entity)>,
    pub created_entities: Vec<Entity>,
    pub destroyed_entities: Vec<Entity>,
    pub created: Vec<(Entity, ComponentValue)>,
    pub updated: Vec<(Entity, ComponentValue)>,
    pub destroyed: Vec<(Entity, ComponentKind)>,
}

/// Result of importing a delta.
#[derive(Debug, Default)]
pub struct ImportResult {
    /// Remote entities instantiated locally by this import, paired with the
    /// local id. The receiver should announce these in its next delta.
    pub new_mappings: Vec<(Entity, Entity)>,
}

impl RegistryDelta {
    pub fn is_empty(&self) -> bool {
        self.entity_mappings.is_empty()
            && self.created_entities.is_empty()
            && self.destroyed_entities.is_empty()
            && self.created.is_empty()
            && self.updated.is_empty()
            && self.destroyed.is_empty()
    }

    /// Apply this delta to `registry`, translating ids through `map`.
    /// Records for entities or references the map cannot resolve are
    /// skipped; they belong to a different island.
    pub fn import(&self, registry: &mut Registry, map: &mut EntityMap) -> ImportResult {
        let mut result = ImportResult::default();

        // Mapping announcements: sender's local id paired with our own.
        for &(sender_local, receiver_local) in &self.entity_mappings {
            if registry.alive(receiver_local) {
                map.insert(sender_local, receiver_local);
            }
        }

        for &remote in &self.created_entities {
            if !map.contains_remote(remote) {
                let local = registry.create();
                map.insert(remote, local);
                result.new_mappings.push((remote, local));
            }
        }

        for (remote, value) in self.created.iter().chain(self.updated.iter()) {
            let Some(local) = map.local(*remote) else {
                continue;
            };
            if !registry.alive(local) {
                continue;
            }
            let mut value = value.clone();
            // Records referencing entities this registry has never seen are
            // not importable yet.
            let unresolved = value
                .referenced_entities()
                .iter()
                .any(|&e| map.local(e).is_none());
            if unresolved {
                continue;
            }
            value.map_entities(|e| map.local(e));
            apply_component(registry, local, value);
        }

        for &(remote, kind) in &self.destroyed {
            if let Some(local) = map.local(remote) {
                remove_component(registry, local, kind);
            }
        }

        for &remote in &self.destroyed_entities {
            if let Some(local) = map.local(remote) {
                registry.destroy(local);
                map.remove_by_remote(remote);
            }
        }

        result
    }
}

/// Accumulates changes into a [`RegistryDelta`].
#[derive(Default)]
pub struct DeltaBuilder {
    delta: RegistryDelta,
}

impl DeltaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Announce that `local` (ours) corresponds to `remote` (theirs).
    pub fn insert_entity_mapping(&mut self, local: Entity, remote: Entity) {
        self.delta.entity_mappings.push((local, remote));
    }

    pub fn created_entity(&mut self, entity: Entity) {
        if !self.delta.created_entities.contains(&entity) {
            self.delta.created_entities.push(entity);
        }
    }

    pub fn destroyed_entity(&mut self, entity: Entity) {
        if !self.delta.destroyed_entities.contains(&entity) {
            self.delta.destroyed_entities.push(entity);
        }
    }

    pub fn created(&mut self, entity: Entity, value: ComponentValue) {
        self.delta.created.push((entity, value));
    }

    pub fn updated(&mut self, entity: Entity, value: ComponentValue) {
        self.delta.updated.push((entity, value));
    }

    pub fn destroyed(&mut self, entity: Entity, kind: ComponentKind) {
        self.delta.destroyed.push((entity, kind));
    }

    /// Read component `kind` off the registry and record it as created.
    pub fn created_from_registry(
        &mut self,
        registry: &Registry,
        entity: Entity,
        kind: ComponentKind,
    ) {
        if let Some(value) = crate::components::extract_component(registry, entity, kind) {
            self.created(entity, value);
        }
    }

    /// Read component `kind` off the registry and record it as updated.
    pub fn updated_from_registry(
        &mut self,
        registry: &Registry,
        entity: Entity,
        kind: ComponentKind,
    ) {
        if let Some(value) = crate::components::extract_component(registry, entity, kind) {
            self.updated(entity, value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.delta.is_empty()
    }

    /// Take the accumulated delta, leaving the builder empty.
    pub fn finish(&mut self) -> RegistryDelta {
        std::mem::take(&mut self.delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{ContactManifold, LinVel, Position};
    use glam::Vec3;

    #[test]
    fn test_created_entity_roundtrip() {
        let mut sender = Registry::new();
        let e = sender.create();
        sender.assign(e, Position(Vec3::new(1.0, 2.0, 3.0)));

        let mut builder = DeltaBuilder::new();
        builder.created_entity(e);
        builder.created_from_registry(&sender, e, ComponentKind::Position);
        let delta = builder.finish();

        let mut receiver = Registry::new();
        let mut map = EntityMap::new();
        let result = delta.import(&mut receiver, &mut map);

        assert_eq!(result.new_mappings.len(), 1);
        let local = map.local(e).unwrap();
        assert_eq!(receiver.get::<Position>(local).0, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_update_existing_entity() {
        let mut sender = Registry::new();
        let e = sender.create();
        sender.assign(e, LinVel(Vec3::ZERO));

        let mut receiver = Registry::new();
        let mut map = EntityMap::new();

        // First delta instantiates.
        let mut builder = DeltaBuilder::new();
        builder.created_entity(e);
        builder.created_from_registry(&sender, e, ComponentKind::LinVel);
        builder.finish().import(&mut receiver, &mut map);

        // Second delta updates in place.
        sender.get_mut::<LinVel>(e).0 = Vec3::new(0.0, -5.0, 0.0);
        let mut builder = DeltaBuilder::new();
        builder.updated_from_registry(&sender, e, ComponentKind::LinVel);
        builder.finish().import(&mut receiver, &mut map);

        let local = map.local(e).unwrap();
        assert_eq!(receiver.get::<LinVel>(local).0, Vec3::new(0.0, -5.0, 0.0));
        assert_eq!(receiver.entity_count(), 1, "no duplicate entity");
    }

    #[test]
    fn test_entity_references_are_remapped() {
        let mut sender = Registry::new();
        let a = sender.create();
        let b = sender.create();
        let m = sender.create();
        sender.assign(m, ContactManifold::new([a, b], 0.1));

        let mut builder = DeltaBuilder::new();
        builder.created_entity(a);
        builder.created_entity(b);
        builder.created_entity(m);
        builder.created_from_registry(&sender, m, ComponentKind::ContactManifold);
        let delta = builder.finish();

        let mut receiver = Registry::new();
        let mut map = EntityMap::new();
        delta.import(&mut receiver, &mut map);

        let local_m = map.local(m).unwrap();
        let manifold = receiver.get::<ContactManifold>(local_m);
        assert_eq!(manifold.body[0], map.local(a).unwrap());
        assert_eq!(manifold.body[1], map.local(b).unwrap());
    }

    #[test]
    fn test_unresolvable_reference_is_skipped() {
        let mut sender = Registry::new();
        let a = sender.create();
        let b = sender.create();
        let m = sender.create();
        sender.assign(m, ContactManifold::new([a, b], 0.1));

        // Only the manifold is announced; its bodies are unknown to the
        // receiver, so the component must not be imported.
        let mut builder = DeltaBuilder::new();
        builder.created_entity(m);
        builder.created_from_registry(&sender, m, ComponentKind::ContactManifold);
        let delta = builder.finish();

        let mut receiver = Registry::new();
        let mut map = EntityMap::new();
        delta.import(&mut receiver, &mut map);

        let local_m = map.local(m).unwrap();
        assert!(!receiver.has::<ContactManifold>(local_m));
    }

    #[test]
    fn test_destroyed_entity_removes_mapping() {
        let mut sender = Registry::new();
        let e = sender.create();

        let mut receiver = Registry::new();
        let mut map = EntityMap::new();

        let mut builder = DeltaBuilder::new();
        builder.created_entity(e);
        builder.finish().import(&mut receiver, &mut map);
        let local = map.local(e).unwrap();

        let mut builder = DeltaBuilder::new();
        builder.destroyed_entity(e);
        builder.finish().import(&mut receiver, &mut map);

        assert!(!receiver.alive(local));
        assert!(map.local(e).is_none());
        assert!(map.is_empty());
    }

    #[test]
    fn test_mapping_announcement_completes_the_loop() {
        // Receiver instantiated entities from the sender; its announcement
        // lets the original sender resolve receiver-local ids.
        let mut sender = Registry::new();
        let e = sender.create();

        let mut receiver = Registry::new();
        let mut receiver_map = EntityMap::new();
        let mut builder = DeltaBuilder::new();
        builder.created_entity(e);
        let result = builder.finish().import(&mut receiver, &mut receiver_map);
        let receiver_local = result.new_mappings[0].1;

        // Receiver announces (its local, sender's id).
        let mut reply = DeltaBuilder::new();
        reply.insert_entity_mapping(receiver_local, e);
        let reply_delta = reply.finish();

        let mut sender_map = EntityMap::new();
        reply_delta.import(&mut sender, &mut sender_map);
        assert_eq!(sender_map.local(receiver_local), Some(e));
    }
}
