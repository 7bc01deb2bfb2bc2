//! Bidirectional server↔client entity association (§3 "Server entity map
//! (on client)"). Single-owner on the client side — nothing else mutates
//! it directly.

use bevy::{
    ecs::entity::EntityHashMap,
    prelude::{Entity, Resource},
};
use fnv::FnvHashMap;

use crate::codec::EntityId;

#[derive(Default, Resource)]
pub struct ServerEntityMap {
    // Keyed by `EntityId` (a wire value, not a bevy `Entity`), so the
    // entity-specialized hasher doesn't apply — `FnvHashMap` mirrors the
    // registry's fast-hasher idiom for dense non-`Entity` keys instead.
    server_to_client: FnvHashMap<EntityId, Entity>,
    client_to_server: EntityHashMap<EntityId>,
    /// Entities the client pre-spawned for prediction, keyed by whatever id
    /// it told the server about itself. Consumed by [`Self::resolve`] when
    /// the server's MAPPINGS segment confirms the pairing (§8 scenario 2).
    predictions: FnvHashMap<EntityId, Entity>,
}

impl ServerEntityMap {
    /// Records a locally pre-spawned entity under the id it was announced
    /// to the server as, so a later MAPPINGS pair resolves to it instead
    /// of spawning a duplicate.
    pub fn register_prediction(&mut self, predicted_id: EntityId, entity: Entity) {
        self.predictions.insert(predicted_id, entity);
    }

    /// Looks up (and consumes) a pending prediction for `predicted_id`,
    /// without yet binding it to a server entity.
    pub fn take_prediction(&mut self, predicted_id: EntityId) -> Option<Entity> {
        self.predictions.remove(&predicted_id)
    }

    /// Associates `server_entity` with `client_entity`, overwriting any
    /// prior mapping on either side.
    pub fn bind(&mut self, server_entity: EntityId, client_entity: Entity) {
        if let Some(old_client) = self.server_to_client.remove(&server_entity) {
            self.client_to_server.remove(&old_client);
        }
        if let Some(old_server) = self.client_to_server.remove(&client_entity) {
            self.server_to_client.remove(&old_server);
        }
        self.server_to_client.insert(server_entity, client_entity);
        self.client_to_server.insert(client_entity, server_entity);
    }

    pub fn client_entity(&self, server_entity: EntityId) -> Option<Entity> {
        self.server_to_client.get(&server_entity).copied()
    }

    pub fn server_entity(&self, client_entity: Entity) -> Option<EntityId> {
        self.client_to_server.get(&client_entity).copied()
    }

    /// Removes the mapping for `server_entity`, returning the client
    /// entity it referred to, if any (§4.F DESPAWNS handling).
    pub fn remove_by_server(&mut self, server_entity: EntityId) -> Option<Entity> {
        let client_entity = self.server_to_client.remove(&server_entity)?;
        self.client_to_server.remove(&client_entity);
        Some(client_entity)
    }

    /// Drops every mapping and pending prediction (§4.F "a disconnected
    /// transport calls the applicator's clear_state").
    pub fn clear(&mut self) {
        self.server_to_client.clear();
        self.client_to_server.clear();
        self.predictions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_then_lookup_both_directions() {
        let mut map = ServerEntityMap::default();
        map.bind(EntityId(7), Entity::from_raw(1));
        assert_eq!(map.client_entity(EntityId(7)), Some(Entity::from_raw(1)));
        assert_eq!(map.server_entity(Entity::from_raw(1)), Some(EntityId(7)));
    }

    #[test]
    fn prediction_round_trip() {
        let mut map = ServerEntityMap::default();
        let predicted = Entity::from_raw(9999);
        map.register_prediction(EntityId(9999), predicted);

        let resolved = map.take_prediction(EntityId(9999));
        assert_eq!(resolved, Some(predicted));
        assert_eq!(map.take_prediction(EntityId(9999)), None);
    }

    #[test]
    fn rebinding_clears_stale_reverse_entry() {
        let mut map = ServerEntityMap::default();
        map.bind(EntityId(1), Entity::from_raw(1));
        map.bind(EntityId(1), Entity::from_raw(2));

        assert_eq!(map.client_entity(EntityId(1)), Some(Entity::from_raw(2)));
        assert_eq!(map.server_entity(Entity::from_raw(1)), None);
    }

    #[test]
    fn clear_drops_everything() {
        let mut map = ServerEntityMap::default();
        map.bind(EntityId(1), Entity::from_raw(1));
        map.register_prediction(EntityId(2), Entity::from_raw(2));
        map.clear();

        assert_eq!(map.client_entity(EntityId(1)), None);
        assert_eq!(map.take_prediction(EntityId(2)), None);
    }
}
