//! The `Replicated` marker (§3) and the registry of component types to walk
//! for each such entity.

use bevy::prelude::{Component, Entity};

use crate::{codec::EntityId, tick::Tick};

/// Marks an entity as a candidate for replication. Only entities bearing
/// this marker are considered by the collector (§3).
///
/// Invariant: `last_updated_tick >= created_tick`, maintained by the
/// collector alone — nothing else should construct one with a stale
/// `last_updated_tick`.
#[derive(Component, Clone, Copy, Debug)]
pub struct Replicated {
    /// The entity's server-side identity as perceived by clients. Often
    /// just the server [`Entity`]'s index, but kept distinct since a host
    /// may want to assign a stable id independent of ECS recycling.
    pub replication_id: EntityId,
    pub created_tick: Tick,
    pub last_updated_tick: Tick,
}

impl Replicated {
    /// Creates a marker for a just-spawned entity: `created_tick` and
    /// `last_updated_tick` both equal `tick`, satisfying the invariant
    /// trivially.
    pub fn new(server_entity: Entity, tick: Tick) -> Self {
        Self {
            replication_id: server_entity.into(),
            created_tick: tick,
            last_updated_tick: tick,
        }
    }

    /// Creates a marker for an entity materialized on the client from a
    /// received message, where the authoritative id is already an
    /// [`EntityId`] rather than a local [`Entity`] (§4.F steps 3/6).
    pub fn remote(replication_id: EntityId, tick: Tick) -> Self {
        Self {
            replication_id,
            created_tick: tick,
            last_updated_tick: tick,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_marker_satisfies_tick_invariant() {
        let marker = Replicated::new(Entity::PLACEHOLDER, Tick::new(5));
        assert!(marker.last_updated_tick >= marker.created_tick);
    }
}
