//! Server-side half of the replication core: modules D (visibility) and E
//! (collector), plus the supporting buffers from §3/§4.E.

pub mod client_entity_map;
pub mod collector;
pub mod connected_clients;
pub mod despawn_buffer;
pub mod messages;
pub mod removal_buffer;
pub mod visibility;

use bevy::prelude::*;

use crate::{config::ReplicationConfig, registry::ReplicationRegistry, tick::Tick, transport::ServerTransport};
use connected_clients::ConnectedClients;
use despawn_buffer::{buffer_despawns, DespawnBuffer};
use removal_buffer::{buffer_removals, RemovalBuffer};
use visibility::VisibilityEngine;

/// Server-authoritative tick counter (§3 "Tick"), advanced once per
/// [`send_replication`] run.
#[derive(Resource, Clone, Copy, Debug, Default)]
pub struct ServerTick(pub Tick);

/// System-ordering label: every despawn/removal buffering system runs in
/// this set, which [`send_replication`] always runs after, regardless of
/// which concrete transport it's instantiated with.
#[derive(SystemSet, Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ServerCollectSet;

/// Extension point used to register a replicated component type: wires up
/// both the registry entry (module C) and its dedicated removal-detection
/// system (§4.E "REMOVALS"), joining registration and removal tracking
/// at the same call site.
pub trait AppReplicationExt {
    fn replicate<C>(&mut self) -> &mut Self
    where
        C: Component + Clone + serde::Serialize + serde::de::DeserializeOwned;
}

impl AppReplicationExt for App {
    fn replicate<C>(&mut self) -> &mut Self
    where
        C: Component + Clone + serde::Serialize + serde::de::DeserializeOwned,
    {
        let fns_id = {
            let mut registry = self.world_mut().resource_mut::<ReplicationRegistry>();
            registry
                .register::<C>()
                .expect("component type registered only once")
        };

        self.add_systems(
            PostUpdate,
            (move |removed: RemovedComponents<C>,
                   alive: Query<(), With<crate::replicated::Replicated>>,
                   buffer: ResMut<RemovalBuffer>| {
                buffer_removals::<C>(removed, alive, fns_id, buffer)
            })
            .in_set(ServerCollectSet),
        );

        self
    }
}

/// Drives one full collection pass (module E) and hands the resulting
/// bytes to `T`'s reliable/unreliable channels.
pub fn send_replication<T: ServerTransport>(world: &mut World) {
    let connected = world.resource::<T>().connected_clients();
    world.resource_mut::<ConnectedClients>().sync(&connected);

    let current_tick = {
        let mut server_tick = world.resource_mut::<ServerTick>();
        server_tick.0 += 1;
        server_tick.0
    };

    let outbound = world.resource_scope(|world, registry: Mut<ReplicationRegistry>| {
        world.resource_scope(|world, mut visibility: Mut<VisibilityEngine>| {
            world.resource_scope(|world, mut clients: Mut<ConnectedClients>| {
                world.resource_scope(|world, mut despawns: Mut<DespawnBuffer>| {
                    world.resource_scope(|world, mut removals: Mut<RemovalBuffer>| {
                        collector::collect(
                            world,
                            &registry,
                            &mut visibility,
                            &mut clients,
                            &mut despawns,
                            &mut removals,
                            current_tick,
                        )
                    })
                })
            })
        })
    });

    let mut transport = world.resource_mut::<T>();
    for message in outbound {
        if let Some(bytes) = message.reliable {
            transport.send_reliable(message.client, bytes);
        }
        if let Some(bytes) = message.unreliable {
            transport.send_unreliable(message.client, bytes);
        }
    }
}

/// Wires the server-side resources and the collection system into an
/// `App`. Generic over the transport implementation so the core never
/// depends on a concrete backend (§6).
pub struct ServerPlugin<T: ServerTransport> {
    pub config: ReplicationConfig,
    _marker: std::marker::PhantomData<T>,
}

impl<T: ServerTransport> ServerPlugin<T> {
    pub fn new(config: ReplicationConfig) -> Self {
        Self {
            config,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T: ServerTransport> Default for ServerPlugin<T> {
    fn default() -> Self {
        Self::new(ReplicationConfig::default())
    }
}

impl<T: ServerTransport> Plugin for ServerPlugin<T> {
    fn build(&self, app: &mut App) {
        app.init_resource::<ReplicationRegistry>()
            .insert_resource(VisibilityEngine::new(&self.config))
            .insert_resource(self.config.clone())
            .init_resource::<ConnectedClients>()
            .init_resource::<DespawnBuffer>()
            .init_resource::<RemovalBuffer>()
            .init_resource::<ServerTick>()
            .add_systems(PostUpdate, buffer_despawns.in_set(ServerCollectSet))
            .add_systems(
                PostUpdate,
                send_replication::<T>.after(ServerCollectSet),
            );
    }
}
