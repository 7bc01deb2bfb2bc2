//! Server-side pending client-entity mappings (§3 "Client entity map").
//!
//! One list per client. A host system pushes `(server_entity,
//! client_pregen_entity)` pairs here when it learns a client has
//! pre-spawned an entity for prediction (e.g. a client-fired bullet); the
//! collector drains the whole list into the next Updates message's
//! MAPPINGS segment and clears it.

use crate::codec::EntityId;

#[derive(Default)]
pub struct ClientEntityMap(Vec<(EntityId, EntityId)>);

impl ClientEntityMap {
    /// Queues a mapping to be sent with the next Updates message.
    pub fn insert(&mut self, server_entity: EntityId, client_pregen_entity: EntityId) {
        self.0.push((server_entity, client_pregen_entity));
    }

    /// Drains every pending mapping, clearing the list (§4.E step d).
    pub fn drain(&mut self) -> Vec<(EntityId, EntityId)> {
        std::mem::take(&mut self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_clears_the_list() {
        let mut map = ClientEntityMap::default();
        map.insert(EntityId(1), EntityId(9999));
        assert!(!map.is_empty());

        let drained = map.drain();
        assert_eq!(drained, vec![(EntityId(1), EntityId(9999))]);
        assert!(map.is_empty());
    }
}
