//! Replication registry (module C).
//!
//! The only place that knows how to convert between in-world component
//! values and bytes. Ids are dense (`0, 1, 2, ...`) in registration order
//! unless an explicit hint is given, and are assumed identical across the
//! server and every client (§3 "FnsId / ReplicationId" — divergence here is
//! undefined behavior).

use std::any::TypeId;

use bevy::prelude::{Component, Entity, Resource, World};
use fnv::FnvHashMap;
use serde::{de::DeserializeOwned, Serialize};

use crate::{codec::EntityId, error::RegistryError, tick::Tick};

/// Numeric id assigned to a registered component type. Stable for the
/// process lifetime.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct FnsId(u32);

impl FnsId {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for FnsId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Context available while serializing a component for the wire.
pub struct SerializeCtx {
    /// Whether this call happens on the authoritative server (always `true`
    /// today; kept distinct from `DeserializeCtx` since client-side
    /// prediction code may one day serialize speculatively).
    pub is_server: bool,
    pub tick: Tick,
}

/// Context available while deserializing a component from the wire.
pub struct DeserializeCtx<'a> {
    pub tick: Tick,
    /// Maps a server entity id embedded in component data to the local
    /// client entity, when known. Entities with no mapping yet pass through
    /// unchanged (§4.C policy) — they may be registered by a later message.
    pub map_entity: Option<&'a dyn Fn(EntityId) -> EntityId>,
}

impl DeserializeCtx<'_> {
    /// Rewrites an embedded entity reference through the current map,
    /// passing it through unchanged if there's no entry (or no map at all,
    /// e.g. during server-side speculative use).
    pub fn map_entity(&self, server_entity: EntityId) -> EntityId {
        match self.map_entity {
            Some(map) => map(server_entity),
            None => server_entity,
        }
    }
}

/// Implemented by components with embedded [`EntityId`] fields so the
/// registry can rewrite them during deserialization.
pub trait MapEntities {
    fn map_entities(&mut self, ctx: &DeserializeCtx);
}

type SerializeFn = Box<dyn Fn(&SerializeCtx, &World, Entity) -> Result<Option<Vec<u8>>, RegistryError> + Send + Sync>;
type DeserializeFn = Box<
    dyn Fn(&DeserializeCtx, &[u8], &mut World, Entity) -> Result<(), RegistryError> + Send + Sync,
>;
type RemoveFn = Box<dyn Fn(&mut World, Entity) + Send + Sync>;

/// Type-erased serialize/deserialize/remove trio for one component type.
pub struct ComponentFns {
    serialize: SerializeFn,
    deserialize: DeserializeFn,
    remove: RemoveFn,
}

impl ComponentFns {
    pub fn serialize(
        &self,
        ctx: &SerializeCtx,
        world: &World,
        entity: Entity,
    ) -> Result<Option<Vec<u8>>, RegistryError> {
        (self.serialize)(ctx, world, entity)
    }

    pub fn deserialize(
        &self,
        ctx: &DeserializeCtx,
        bytes: &[u8],
        world: &mut World,
        entity: Entity,
    ) -> Result<(), RegistryError> {
        (self.deserialize)(ctx, bytes, world, entity)
    }

    pub fn remove(&self, world: &mut World, entity: Entity) {
        (self.remove)(world, entity)
    }
}

/// Maps component types to stable [`FnsId`]s and holds their serialize and
/// deserialize closures.
#[derive(Default, Resource)]
pub struct ReplicationRegistry {
    by_id: Vec<ComponentFns>,
    by_type: FnvHashMap<TypeId, FnsId>,
}

impl ReplicationRegistry {
    /// Registers `C` using `postcard` for the component payload itself (the
    /// wire format for entities/counts/ticks stays the bit-exact varint
    /// codec from module A; component bytes are opaque per §4.C).
    ///
    /// Re-registering the same type is an error (`AlreadyRegistered`).
    pub fn register<C>(&mut self) -> Result<FnsId, RegistryError>
    where
        C: Component + Serialize + DeserializeOwned + Clone,
    {
        let fns = ComponentFns {
            serialize: Box::new(|_ctx, world, entity| {
                let Some(component) = world.get::<C>(entity) else {
                    return Ok(None);
                };
                postcard::to_allocvec(component)
                    .map(Some)
                    .map_err(RegistryError::SerializeFailed)
            }),
            deserialize: Box::new(|_ctx, bytes, world, entity| {
                let component: C =
                    postcard::from_bytes(bytes).map_err(RegistryError::DeserializeFailed)?;
                world.entity_mut(entity).insert(component);
                Ok(())
            }),
            remove: Box::new(|world, entity| {
                world.entity_mut(entity).remove::<C>();
            }),
        };
        self.insert_fns::<C>(fns)
    }

    /// Like [`Self::register`], but `C` contains embedded [`EntityId`]
    /// fields that must be rewritten via [`MapEntities`] on deserialize
    /// (§4.C: "missing entries pass through unchanged").
    pub fn register_mapped<C>(&mut self) -> Result<FnsId, RegistryError>
    where
        C: Component + Serialize + DeserializeOwned + Clone + MapEntities,
    {
        let fns = ComponentFns {
            serialize: Box::new(|_ctx, world, entity| {
                let Some(component) = world.get::<C>(entity) else {
                    return Ok(None);
                };
                postcard::to_allocvec(component)
                    .map(Some)
                    .map_err(RegistryError::SerializeFailed)
            }),
            deserialize: Box::new(|ctx, bytes, world, entity| {
                let mut component: C =
                    postcard::from_bytes(bytes).map_err(RegistryError::DeserializeFailed)?;
                component.map_entities(ctx);
                world.entity_mut(entity).insert(component);
                Ok(())
            }),
            remove: Box::new(|world, entity| {
                world.entity_mut(entity).remove::<C>();
            }),
        };
        self.insert_fns::<C>(fns)
    }

    fn insert_fns<C: Component>(&mut self, fns: ComponentFns) -> Result<FnsId, RegistryError> {
        let type_id = TypeId::of::<C>();
        if self.by_type.contains_key(&type_id) {
            return Err(RegistryError::AlreadyRegistered);
        }

        let id = FnsId(self.by_id.len() as u32);
        self.by_id.push(fns);
        self.by_type.insert(type_id, id);
        Ok(id)
    }

    pub fn get_by_id(&self, id: FnsId) -> Option<&ComponentFns> {
        self.by_id.get(id.0 as usize)
    }

    /// Looks up the id a component type was registered under, if any.
    pub fn fns_id_of<C: Component>(&self) -> Option<FnsId> {
        self.by_type.get(&TypeId::of::<C>()).copied()
    }

    pub fn all_components(&self) -> impl Iterator<Item = (FnsId, &ComponentFns)> {
        self.by_id
            .iter()
            .enumerate()
            .map(|(i, fns)| (FnsId(i as u32), fns))
    }
}
