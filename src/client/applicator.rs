//! The client-side applicator (module F, §4.F).
//!
//! Like [`crate::server::collector`], the algorithm is exposed as plain
//! functions over `&mut World` so it can be driven directly in tests; the
//! plugin in [`super`] wires them into `PreUpdate`.

use bevy::prelude::*;

use crate::{
    error::ApplyError,
    registry::{DeserializeCtx, ReplicationRegistry},
    replicated::Replicated,
    tick::Tick,
    wire,
};

use super::{mutation_tick::MutationTick, server_entity_map::ServerEntityMap};

/// Tracks the latest Updates `server_tick` this client has accepted
/// (§4.F step 1: "current_server_update_tick").
#[derive(Resource, Default)]
pub struct ClientTick {
    server_update_tick: Option<Tick>,
}

fn resolve_entity_mapper(entity_map: &ServerEntityMap) -> impl Fn(crate::codec::EntityId) -> crate::codec::EntityId + '_ {
    move |server_id| {
        entity_map
            .client_entity(server_id)
            .map(crate::codec::EntityId::from)
            .unwrap_or(server_id)
    }
}

/// Applies one received Updates message (§4.F "Algorithm per received
/// Updates message").
pub fn apply_update(
    world: &mut World,
    registry: &ReplicationRegistry,
    entity_map: &mut ServerEntityMap,
    client_tick: &mut ClientTick,
    bytes: &[u8],
) -> Result<(), ApplyError> {
    let parsed = wire::decode_update_message(bytes)?;

    let stale = client_tick
        .server_update_tick
        .is_some_and(|current| parsed.server_tick < current);
    if !stale {
        client_tick.server_update_tick = Some(parsed.server_tick);
    }

    // MAPPINGS and DESPAWNS are monotone correctness-preserving and are
    // always applied, even for a stale message (§4.F step 1).
    for (server_entity, client_pregen) in parsed.mappings {
        let client_entity = entity_map
            .take_prediction(client_pregen)
            .unwrap_or_else(|| world.spawn_empty().id());
        entity_map.bind(server_entity, client_entity);
    }

    for server_entity in parsed.despawns {
        if let Some(client_entity) = entity_map.remove_by_server(server_entity) {
            if world.get_entity(client_entity).is_ok() {
                world.despawn(client_entity);
            }
        }
    }

    if stale {
        return Ok(());
    }

    for (server_entity, fns_ids) in parsed.removals {
        let Some(client_entity) = entity_map.client_entity(server_entity) else {
            continue;
        };
        for fns_id in fns_ids {
            match registry.get_by_id(fns_id) {
                Some(fns) => fns.remove(world, client_entity),
                None => log::warn!("removal referenced unknown component id {fns_id:?}"),
            }
        }
    }

    for (server_entity, components) in parsed.changes {
        let client_entity = match entity_map.client_entity(server_entity) {
            Some(entity) => entity,
            None => {
                let entity = world
                    .spawn(Replicated::remote(server_entity, parsed.server_tick))
                    .id();
                entity_map.bind(server_entity, entity);
                entity
            }
        };

        apply_components(world, registry, entity_map, parsed.server_tick, client_entity, components);
    }

    Ok(())
}

/// Applies one received Mutations message (§4.F "Algorithm per received
/// Mutations message"). Per-entity staleness is tracked via
/// [`MutationTick`] rather than dropping the whole message (§9: a
/// conservative fallback is allowed, but per-entity filtering is the
/// stronger guarantee and costs little extra here).
pub fn apply_mutations(
    world: &mut World,
    registry: &ReplicationRegistry,
    entity_map: &mut ServerEntityMap,
    bytes: &[u8],
) -> Result<(), ApplyError> {
    let parsed = wire::decode_mutate_message(bytes)?;

    for (server_entity, components) in parsed.entities {
        let client_entity = match entity_map.client_entity(server_entity) {
            Some(entity) => entity,
            None => {
                let entity = world
                    .spawn(Replicated::remote(server_entity, parsed.server_tick))
                    .id();
                entity_map.bind(server_entity, entity);
                entity
            }
        };

        let accepted = MutationTick::accepts(world.get::<MutationTick>(client_entity), parsed.server_tick);
        if !accepted {
            continue;
        }

        apply_components(world, registry, entity_map, parsed.server_tick, client_entity, components);
        world
            .entity_mut(client_entity)
            .insert(MutationTick(parsed.server_tick));
    }

    Ok(())
}

fn apply_components(
    world: &mut World,
    registry: &ReplicationRegistry,
    entity_map: &ServerEntityMap,
    tick: Tick,
    client_entity: Entity,
    components: Vec<(crate::registry::FnsId, Vec<u8>)>,
) {
    let mapper = resolve_entity_mapper(entity_map);
    for (fns_id, bytes) in components {
        let Some(fns) = registry.get_by_id(fns_id) else {
            log::warn!("skipping unknown component id {fns_id:?}");
            continue;
        };
        let ctx = DeserializeCtx {
            tick,
            map_entity: Some(&mapper),
        };
        if let Err(err) = fns.deserialize(&ctx, &bytes, world, client_entity) {
            log::warn!("failed to deserialize component {fns_id:?}: {err}");
        }
    }
}

/// Drops all client-side replication state (§4.F "a disconnected transport
/// calls the applicator's clear_state").
pub fn clear_state(entity_map: &mut ServerEntityMap, client_tick: &mut ClientTick) {
    entity_map.clear();
    client_tick.server_update_tick = None;
}
