//! Per-client server-side replication state (§4.E step 1: "ensure
//! per-client state exists").

use std::collections::HashMap;

use bevy::prelude::Resource;

use crate::{
    serialized_data::SerializedData,
    server::{
        client_entity_map::ClientEntityMap,
        messages::{MutateMessage, UpdateMessage},
    },
    tick::Tick,
    transport::ClientId,
};

/// Everything the collector threads through a tick for one connected
/// client.
#[derive(Default)]
pub struct ReplicatedClient {
    pub last_sent_tick: Tick,
    pub pending_mappings: ClientEntityMap,
    /// Per-client scratch arena (module B). Cleared at the start of every
    /// collection pass; kept around between ticks purely to reuse its
    /// allocation.
    pub buffer: SerializedData,
    pub updates: UpdateMessage,
    pub mutations: MutateMessage,
}

impl ReplicatedClient {
    /// §4.E step 2a: clear per-client buffers at the start of a collection
    /// pass. Does not touch `last_sent_tick` or pending mappings — those
    /// carry real state across the clear.
    pub fn begin_tick(&mut self) {
        self.buffer.clear();
        self.updates.clear();
        self.mutations.clear();
    }
}

/// Tracks one [`ReplicatedClient`] per currently-connected client,
/// dropping state for clients the transport no longer reports (§4.E step
/// 3).
#[derive(Default, Resource)]
pub struct ConnectedClients(HashMap<ClientId, ReplicatedClient>);

impl ConnectedClients {
    /// Reconciles against the transport's authoritative connected set:
    /// inserts fresh state for newly-seen clients, drops state for clients
    /// no longer present.
    pub fn sync(&mut self, connected: &[ClientId]) {
        self.0.retain(|id, _| connected.contains(id));
        for &id in connected {
            self.0.entry(id).or_default();
        }
    }

    pub fn get_mut(&mut self, id: ClientId) -> Option<&mut ReplicatedClient> {
        self.0.get_mut(&id)
    }

    /// Currently-tracked client ids, for bulk reconciliation against the
    /// visibility engine (§4.D `cleanup_disconnected_clients`).
    pub fn client_ids(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.0.keys().copied()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ClientId, &mut ReplicatedClient)> {
        self.0.iter_mut().map(|(&id, client)| (id, client))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_adds_and_drops_clients() {
        let mut clients = ConnectedClients::default();
        clients.sync(&[ClientId(1), ClientId(2)]);
        assert_eq!(clients.len(), 2);

        clients.sync(&[ClientId(1)]);
        assert_eq!(clients.len(), 1);
        assert!(clients.get_mut(ClientId(2)).is_none());
    }

    #[test]
    fn sync_preserves_existing_state() {
        let mut clients = ConnectedClients::default();
        clients.sync(&[ClientId(1)]);
        clients.get_mut(ClientId(1)).unwrap().last_sent_tick = Tick::new(7);

        clients.sync(&[ClientId(1)]);
        assert_eq!(clients.get_mut(ClientId(1)).unwrap().last_sent_tick, Tick::new(7));
    }
}
