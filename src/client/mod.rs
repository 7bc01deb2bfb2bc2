//! Client-side half of the replication core: module F (applicator).

pub mod applicator;
pub mod log_throttle;
pub mod mutation_tick;
pub mod server_entity_map;

use bevy::prelude::*;

use crate::{config::ReplicationConfig, registry::ReplicationRegistry, transport::{Channel, ClientTransport}};
use applicator::{apply_mutations, apply_update, clear_state, ClientTick};
use log_throttle::LogThrottle;
use server_entity_map::ServerEntityMap;

/// Drains `T`'s received bytes and applies them in channel order. The
/// order between the two channels isn't itself meaningful (§5: Updates are
/// self-ordered, Mutations tolerate reordering); what matters is that
/// MAPPINGS/DESPAWNS/REMOVALS/CHANGES stay in order *within* one Updates
/// message, which [`apply_update`] already guarantees.
pub fn receive_replication<T: ClientTransport>(world: &mut World) {
    let messages = world.resource_mut::<T>().receive();

    world.resource_scope(|world, registry: Mut<ReplicationRegistry>| {
        world.resource_scope(|world, mut entity_map: Mut<ServerEntityMap>| {
            world.resource_scope(|world, mut client_tick: Mut<ClientTick>| {
                world.resource_scope(|world, mut throttle: Mut<LogThrottle>| {
                    for (channel, bytes) in messages {
                        let result = match channel {
                            Channel::Updates => {
                                apply_update(world, &registry, &mut entity_map, &mut client_tick, &bytes)
                            }
                            Channel::Mutations => {
                                apply_mutations(world, &registry, &mut entity_map, &bytes)
                            }
                        };
                        if let Err(err) = result {
                            throttle.warn(
                                err.kind(),
                                format_args!("dropping malformed replication message: {err}"),
                            );
                        }
                    }
                })
            })
        })
    });
}

/// Wires the client-side resources and the application system into an
/// `App`. Generic over the transport implementation (§6).
pub struct ClientPlugin<T: ClientTransport> {
    _marker: std::marker::PhantomData<T>,
}

impl<T: ClientTransport> Default for ClientPlugin<T> {
    fn default() -> Self {
        Self {
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T: ClientTransport> Plugin for ClientPlugin<T> {
    fn build(&self, app: &mut App) {
        app.init_resource::<ReplicationRegistry>()
            .init_resource::<ReplicationConfig>()
            .init_resource::<ServerEntityMap>()
            .init_resource::<ClientTick>()
            .init_resource::<LogThrottle>()
            .add_systems(PreUpdate, receive_replication::<T>);
    }
}

/// Clears all client-side replication state, e.g. on disconnect (§4.F).
pub fn on_disconnect(mut entity_map: ResMut<ServerEntityMap>, mut client_tick: ResMut<ClientTick>) {
    clear_state(&mut entity_map, &mut client_tick);
}
