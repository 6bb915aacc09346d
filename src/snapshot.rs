//! Registry snapshots
//!
//! Serializable snapshot of selected component pools for replication. Each
//! pool records the component kind's position in the canonical kind tuple
//! plus the typed payloads per entity. Importing into another registry maps
//! remote entity ids to local ones through an [`EntityMap`].

use serde::{Deserialize, Serialize};

use crate::components::{apply_component, extract_component, ComponentKind, ComponentValue};
use crate::delta::EntityMap;
use crate::error::PhysicsError;
use crate::registry::{Entity, Registry};

/// One component pool of a snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolSnapshot {
    /// Position of the component kind in the canonical kind tuple.
    pub component_index: u32,
    pub entities: Vec<Entity>,
    pub values: Vec<ComponentValue>,
}

/// Snapshot of a set of entities and selected component pools.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub entities: Vec<Entity>,
    pub pools: Vec<PoolSnapshot>,
}

impl RegistrySnapshot {
    /// Capture `kinds` for the given entities. Entities missing a kind are
    /// simply absent from that pool.
    pub fn export(registry: &Registry, entities: &[Entity], kinds: &[ComponentKind]) -> Self {
        let mut snapshot = RegistrySnapshot {
            entities: entities.to_vec(),
            pools: Vec::new(),
        };

        for &kind in kinds {
            let mut pool = PoolSnapshot {
                component_index: kind as u32,
                entities: Vec::new(),
                values: Vec::new(),
            };
            for &entity in entities {
                if let Some(value) = extract_component(registry, entity, kind) {
                    pool.entities.push(entity);
                    pool.values.push(value);
                }
            }
            if !pool.entities.is_empty() {
                snapshot.pools.push(pool);
            }
        }
        snapshot
    }

    /// Import into `registry`, creating local twins for unknown remote
    /// entities and rewriting entity references through `map`.
    pub fn import(
        &self,
        registry: &mut Registry,
        map: &mut EntityMap,
    ) -> Result<(), PhysicsError> {
        for &remote in &self.entities {
            if !map.contains_remote(remote) {
                let local = registry.create();
                map.insert(remote, local);
            }
        }

        for pool in &self.pools {
            if pool.entities.len() != pool.values.len() {
                return Err(PhysicsError::MalformedSnapshot {
                    reason: "pool entity/value length mismatch",
                });
            }
            for (remote, value) in pool.entities.iter().zip(pool.values.iter()) {
                let local = map
                    .local(*remote)
                    .ok_or(PhysicsError::UnknownEntity(*remote))?;
                let mut value = value.clone();
                for referenced in value.referenced_entities() {
                    if map.local(referenced).is_none() {
                        return Err(PhysicsError::UnknownEntity(referenced));
                    }
                }
                value.map_entities(|e| map.local(e));
                apply_component(registry, local, value);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{LinVel, Orientation, Position};
    use glam::{Quat, Vec3};

    const TRANSFORM_KINDS: [ComponentKind; 3] = [
        ComponentKind::Position,
        ComponentKind::Orientation,
        ComponentKind::LinVel,
    ];

    fn sample_registry() -> (Registry, Vec<Entity>) {
        let mut reg = Registry::new();
        let mut entities = Vec::new();
        for i in 0..3 {
            let e = reg.create();
            reg.assign(e, Position(Vec3::new(i as f32, 2.0 * i as f32, 0.0)));
            reg.assign(e, Orientation(Quat::from_rotation_y(0.1 * i as f32)));
            reg.assign(e, LinVel(Vec3::new(0.0, -(i as f32), 0.0)));
            entities.push(e);
        }
        (reg, entities)
    }

    #[test]
    fn test_export_import_equality() {
        let (source, entities) = sample_registry();
        let snapshot = RegistrySnapshot::export(&source, &entities, &TRANSFORM_KINDS);

        let mut target = Registry::new();
        let mut map = EntityMap::new();
        snapshot.import(&mut target, &mut map).unwrap();

        for &remote in &entities {
            let local = map.local(remote).unwrap();
            assert_eq!(
                source.get::<Position>(remote).0,
                target.get::<Position>(local).0
            );
            assert_eq!(
                source.get::<Orientation>(remote).0,
                target.get::<Orientation>(local).0
            );
            assert_eq!(source.get::<LinVel>(remote).0, target.get::<LinVel>(local).0);
        }
    }

    #[test]
    fn test_snapshot_serde_roundtrip() {
        let (source, entities) = sample_registry();
        let snapshot = RegistrySnapshot::export(&source, &entities, &TRANSFORM_KINDS);

        let json = serde_json::to_string(&snapshot).unwrap();
        let decoded: RegistrySnapshot = serde_json::from_str(&json).unwrap();

        let mut target = Registry::new();
        let mut map = EntityMap::new();
        decoded.import(&mut target, &mut map).unwrap();

        for &remote in &entities {
            let local = map.local(remote).unwrap();
            assert_eq!(
                source.get::<Position>(remote).0,
                target.get::<Position>(local).0
            );
        }
    }

    #[test]
    fn test_missing_components_are_absent_not_defaulted() {
        let mut reg = Registry::new();
        let with_vel = reg.create();
        let without_vel = reg.create();
        reg.assign(with_vel, Position(Vec3::ONE));
        reg.assign(with_vel, LinVel(Vec3::X));
        reg.assign(without_vel, Position(Vec3::ZERO));

        let snapshot =
            RegistrySnapshot::export(&reg, &[with_vel, without_vel], &TRANSFORM_KINDS);

        let mut target = Registry::new();
        let mut map = EntityMap::new();
        snapshot.import(&mut target, &mut map).unwrap();

        assert!(target.has::<LinVel>(map.local(with_vel).unwrap()));
        assert!(!target.has::<LinVel>(map.local(without_vel).unwrap()));
    }

    #[test]
    fn test_component_index_matches_kind_position() {
        let (source, entities) = sample_registry();
        let snapshot =
            RegistrySnapshot::export(&source, &entities, &[ComponentKind::Orientation]);
        assert_eq!(snapshot.pools.len(), 1);
        assert_eq!(
            snapshot.pools[0].component_index,
            ComponentKind::Orientation as u32
        );
    }
}
