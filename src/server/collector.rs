//! The per-tick collection algorithm (module E, §4.E).
//!
//! [`collect`] is a plain function over `&mut World` rather than a system
//! so it can be unit-tested directly against a bare `World`; [`super`]
//! wires it into a real schedule via [`super::send_replication`].

use std::collections::HashSet;

use bevy::prelude::*;
use bytes::Bytes;

use crate::{
    registry::{ReplicationRegistry, SerializeCtx},
    replicated::Replicated,
    server::{
        connected_clients::ConnectedClients, despawn_buffer::DespawnBuffer,
        removal_buffer::RemovalBuffer, visibility::VisibilityEngine,
    },
    tick::Tick,
    transport::ClientId,
};

/// One client's outbound bytes for a tick, or `None` where there was
/// nothing to say (§8 "empty client set -> no messages emitted"
/// generalizes per-client).
pub struct OutboundMessage {
    pub client: ClientId,
    pub reliable: Option<Bytes>,
    pub unreliable: Option<Bytes>,
}

/// Whether an entity is due to be (re-)sent to a client that already
/// considers it visible, absent a visibility transition. §9 leaves
/// per-component dirty tracking unspecified; this conservative gate
/// re-sends an entity whenever it's been touched (or created) since the
/// last successful send to this client, which also satisfies "collecting
/// twice with no world changes yields identical payloads" (§8) since both
/// ticks re-evaluate to the same bytes.
fn needs_replication(replicated: &Replicated, last_sent_tick: Tick) -> bool {
    replicated.last_updated_tick >= last_sent_tick || replicated.created_tick >= last_sent_tick
}

/// Runs one full collection pass over every connected client (§4.E).
///
/// `despawn_buffer` and `removal_buffer` are drained in full; callers are
/// expected to have populated them earlier the same tick (e.g. via
/// [`super::despawn_buffer::buffer_despawns`] /
/// [`super::removal_buffer::buffer_removals`]).
pub fn collect(
    world: &mut World,
    registry: &ReplicationRegistry,
    visibility: &mut VisibilityEngine,
    clients: &mut ConnectedClients,
    despawn_buffer: &mut DespawnBuffer,
    removal_buffer: &mut RemovalBuffer,
    current_tick: Tick,
) -> Vec<OutboundMessage> {
    let snapshot: Vec<(Entity, Replicated)> = world
        .query::<(Entity, &Replicated)>()
        .iter(world)
        .map(|(entity, replicated)| (entity, *replicated))
        .collect();
    let entities: Vec<Entity> = snapshot.iter().map(|&(e, _)| e).collect();

    // Bulk reconciliation (§4.D): purge visibility state for entities that
    // no longer carry `Replicated` and clients the transport no longer
    // reports, before evaluating visibility for this pass.
    let alive_entities: HashSet<Entity> = entities.iter().copied().collect();
    visibility.cleanup_removed_entities(&alive_entities);
    let alive_clients: HashSet<ClientId> = clients.client_ids().collect();
    visibility.cleanup_disconnected_clients(&alive_clients);

    let global_despawns = despawn_buffer.drain();
    let global_removals = removal_buffer.drain();

    let ctx = SerializeCtx {
        is_server: true,
        tick: current_tick,
    };

    let mut touched = Vec::new();
    let mut outbound = Vec::new();

    for (client_id, client) in clients.iter_mut() {
        client.begin_tick();

        let changes = visibility.compute_changes(&entities, std::slice::from_ref(&client_id));
        let became_visible: HashSet<Entity> =
            changes.became_visible.into_iter().map(|(e, _)| e).collect();
        let became_hidden: HashSet<Entity> =
            changes.became_hidden.into_iter().map(|(e, _)| e).collect();

        for &(entity, replicated) in &snapshot {
            if became_hidden.contains(&entity) {
                // Still alive and visible to other clients; this client
                // alone is told to drop it (§8 scenario 4).
                client.updates.push_despawn(&mut client.buffer, entity.into());
                continue;
            }

            if !visibility.is_visible(entity, client_id) {
                continue;
            }

            let force_resend = became_visible.contains(&entity);
            if !force_resend && !needs_replication(&replicated, client.last_sent_tick) {
                continue;
            }

            let mut components = Vec::new();
            for (fns_id, fns) in registry.all_components() {
                match fns.serialize(&ctx, world, entity) {
                    Ok(Some(bytes)) => components.push((fns_id, bytes)),
                    Ok(None) => {}
                    Err(err) => {
                        log::warn!("skipping component {fns_id:?} on {entity:?}: {err}");
                    }
                }
            }

            if components.is_empty() {
                continue;
            }

            // Serializes once into the per-client arena (module B);
            // CHANGES and, for same-tick spawns, Mutations reference the
            // same ranges rather than re-serializing (§9).
            let entity_id = entity.into();
            let Some((entity_range, component_ranges)) =
                client.updates.push_change(&mut client.buffer, entity_id, &components)
            else {
                continue;
            };
            if replicated.created_tick == current_tick {
                client.mutations.push_entity_ranges(entity_range, component_ranges);
            }

            touched.push(entity);
        }

        let mappings = client.pending_mappings.drain();
        client.updates.set_mappings(&mut client.buffer, &mappings);

        for &server_entity in &global_despawns {
            client.updates.push_despawn(&mut client.buffer, server_entity);
        }
        for (&entity, fns_ids) in &global_removals {
            client.updates.push_removals(&mut client.buffer, entity.into(), fns_ids);
        }

        let reliable = client.updates.finish(&mut client.buffer, current_tick);
        let unreliable = client.mutations.finish(&mut client.buffer, current_tick, current_tick);
        client.last_sent_tick = current_tick;

        outbound.push(OutboundMessage {
            client: client_id,
            reliable,
            unreliable,
        });
    }

    visibility.apply_changes();

    for entity in touched {
        if let Some(mut replicated) = world.get_mut::<Replicated>(entity) {
            replicated.last_updated_tick = current_tick;
        }
    }

    outbound
}
