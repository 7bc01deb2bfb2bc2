//! In-memory transport test double implementing [`ServerTransport`] /
//! [`ClientTransport`] directly, collapsed to a single in-process channel
//! since these tests never cross a real socket.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use bytes::Bytes;
use forge_replicon::transport::{Channel, ClientId, ClientTransport, ServerTransport};

#[derive(Clone, Default)]
struct Link(Arc<Mutex<VecDeque<(Channel, Bytes)>>>);

impl Link {
    fn push(&self, channel: Channel, bytes: Bytes) {
        self.0.lock().unwrap().push_back((channel, bytes));
    }

    fn drain(&self) -> Vec<(Channel, Bytes)> {
        self.0.lock().unwrap().drain(..).collect()
    }
}

/// Server-side half: one outbox per connected client.
#[derive(bevy::prelude::Resource, Default)]
pub struct MemoryServerTransport {
    connected: Vec<ClientId>,
    links: HashMap<ClientId, Link>,
}

impl MemoryServerTransport {
    /// Connects `client`, returning the paired [`MemoryClientTransport`]
    /// that will receive everything sent to it.
    pub fn connect(&mut self, client: ClientId) -> MemoryClientTransport {
        let link = Link::default();
        self.links.insert(client, link.clone());
        self.connected.push(client);
        MemoryClientTransport { link }
    }

    pub fn disconnect(&mut self, client: ClientId) {
        self.connected.retain(|&id| id != client);
        self.links.remove(&client);
    }

    /// Drains whatever has been sent to `client` so far, for assertions in
    /// tests that never construct a matching `ClientTransport`.
    pub fn drain_for_test(&mut self, client: ClientId) -> Vec<(Channel, Bytes)> {
        self.links
            .get(&client)
            .map(|link| link.drain())
            .unwrap_or_default()
    }
}

impl ServerTransport for MemoryServerTransport {
    fn send_reliable(&mut self, client: ClientId, bytes: Bytes) {
        if let Some(link) = self.links.get(&client) {
            link.push(Channel::Updates, bytes);
        }
    }

    fn send_unreliable(&mut self, client: ClientId, bytes: Bytes) {
        if let Some(link) = self.links.get(&client) {
            link.push(Channel::Mutations, bytes);
        }
    }

    fn connected_clients(&self) -> Vec<ClientId> {
        self.connected.clone()
    }
}

/// Client-side half: a single inbox fed by the server's outbox for this
/// client.
#[derive(bevy::prelude::Resource)]
pub struct MemoryClientTransport {
    link: Link,
}

impl ClientTransport for MemoryClientTransport {
    fn receive(&mut self) -> Vec<(Channel, Bytes)> {
        self.link.drain()
    }
}
