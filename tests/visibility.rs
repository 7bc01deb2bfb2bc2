//! Server-only integration coverage for the visibility engine wired into a
//! real collection pass (module D, §4.D, §8 scenario 4), decoding the raw
//! wire bytes directly since this test doesn't build the `client` feature.

mod common;

use bevy::prelude::*;
use common::MemoryServerTransport;
use forge_replicon::{
    prelude::*,
    server::{connected_clients::ConnectedClients, visibility::VisibilityEngine},
    wire,
};
use serde::{Deserialize, Serialize};

#[derive(Component, Clone, Serialize, Deserialize)]
struct Health(u32);

fn app(policy: VisibilityPolicy, default_visible: bool) -> App {
    let mut app = App::new();
    app.add_plugins(ServerPlugin::<MemoryServerTransport>::new(
        ReplicationConfig {
            visibility_policy: policy,
            default_visible,
            ..Default::default()
        },
    ))
    .insert_resource(MemoryServerTransport::default())
    .replicate::<Health>();
    app
}

fn connect(app: &mut App, client: ClientId) {
    app.world_mut()
        .resource_mut::<MemoryServerTransport>()
        .connect(client);
    app.world_mut().resource_mut::<ConnectedClients>().sync(&[client]);
}

fn upcoming_tick(app: &App) -> Tick {
    app.world().resource::<ServerTick>().0 + 1
}

#[test]
fn whitelist_entity_flips_visible_then_hidden() {
    let mut app = app(VisibilityPolicy::Whitelist, false);
    let client = ClientId(1);
    connect(&mut app, client);

    let tick = upcoming_tick(&app);
    let entity = app
        .world_mut()
        .spawn((Replicated::new(Entity::PLACEHOLDER, tick), Health(100)))
        .id();

    // Not on the whitelist yet: nothing is sent for this client.
    app.update();
    let server = app.world_mut().resource_mut::<MemoryServerTransport>();
    let mut messages = server_clone_drain(server, client);
    assert!(messages.is_empty(), "invisible entity should not be sent");

    app.world_mut()
        .resource_mut::<VisibilityEngine>()
        .set(entity, client, true);
    app.update();
    let server = app.world_mut().resource_mut::<MemoryServerTransport>();
    messages = server_clone_drain(server, client);
    let reliable = messages
        .iter()
        .find(|(channel, _)| *channel == forge_replicon::transport::Channel::Updates)
        .expect("becoming visible should emit an Updates message")
        .1
        .clone();
    let parsed = wire::decode_update_message(&reliable).unwrap();
    assert_eq!(parsed.changes[0].0, entity.into());

    app.world_mut()
        .resource_mut::<VisibilityEngine>()
        .set(entity, client, false);
    app.update();
    let server = app.world_mut().resource_mut::<MemoryServerTransport>();
    messages = server_clone_drain(server, client);
    let reliable = messages
        .iter()
        .find(|(channel, _)| *channel == forge_replicon::transport::Channel::Updates)
        .expect("becoming hidden should emit a despawn")
        .1
        .clone();
    let parsed = wire::decode_update_message(&reliable).unwrap();
    assert_eq!(parsed.despawns, vec![entity.into()]);
}

#[test]
fn blacklist_hides_explicitly_listed_client() {
    let mut app = app(VisibilityPolicy::Blacklist, true);
    let client = ClientId(7);
    connect(&mut app, client);

    let tick = upcoming_tick(&app);
    let entity = app
        .world_mut()
        .spawn((Replicated::new(Entity::PLACEHOLDER, tick), Health(50)))
        .id();

    app.update();
    let server = app.world_mut().resource_mut::<MemoryServerTransport>();
    let messages = server_clone_drain(server, client);
    let reliable = messages
        .iter()
        .find(|(channel, _)| *channel == forge_replicon::transport::Channel::Updates)
        .expect("visible-by-default entity should be sent")
        .1
        .clone();
    let parsed = wire::decode_update_message(&reliable).unwrap();
    assert_eq!(parsed.changes[0].0, entity.into());

    app.world_mut()
        .resource_mut::<VisibilityEngine>()
        .set(entity, client, true); // blacklisted -> hidden
    app.update();
    let server = app.world_mut().resource_mut::<MemoryServerTransport>();
    let messages = server_clone_drain(server, client);
    let reliable = messages
        .iter()
        .find(|(channel, _)| *channel == forge_replicon::transport::Channel::Updates)
        .expect("losing visibility should emit a despawn")
        .1
        .clone();
    let parsed = wire::decode_update_message(&reliable).unwrap();
    assert_eq!(parsed.despawns, vec![entity.into()]);
}

#[test]
fn disconnecting_a_client_cleans_up_visibility_state() {
    let mut app = app(VisibilityPolicy::Whitelist, false);
    let client = ClientId(3);
    connect(&mut app, client);

    let tick = upcoming_tick(&app);
    let entity = app
        .world_mut()
        .spawn((Replicated::new(Entity::PLACEHOLDER, tick), Health(10)))
        .id();
    app.world_mut()
        .resource_mut::<VisibilityEngine>()
        .set(entity, client, true);
    app.update();

    app.world_mut()
        .resource_mut::<MemoryServerTransport>()
        .disconnect(client);
    // Next collection pass observes the transport no longer reports the
    // client and drops its `ConnectedClients`/visibility state.
    app.update();

    assert!(app.world().resource::<ConnectedClients>().is_empty());
}

/// Test-only helper: grabs a client's pending messages without requiring
/// a real `ClientTransport` on the other end (this suite only builds the
/// `server` feature).
fn server_clone_drain(
    mut server: Mut<MemoryServerTransport>,
    client: ClientId,
) -> Vec<(forge_replicon::transport::Channel, bytes::Bytes)> {
    server.drain_for_test(client)
}
