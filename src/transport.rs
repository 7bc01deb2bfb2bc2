//! The transport boundary (§6): two narrow traits a networking backend
//! implements. The core never depends on a concrete backend (renet, raw
//! TCP, an in-memory test double) — only on these.

use bevy::prelude::Resource;
use bytes::Bytes;

/// Opaque id for a connected client, assigned by the backend.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct ClientId(pub u64);

/// Which of the two fixed replication channels a message travels on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Channel {
    /// Ordered, reliable: carries `Updates` messages.
    Updates,
    /// May drop or reorder: carries `Mutations` messages.
    Mutations,
}

/// Server-side half of the transport boundary.
///
/// Implementors must buffer and return immediately — §5 requires
/// non-blocking semantics; there is no blocking I/O internal to the core.
#[cfg(feature = "server")]
pub trait ServerTransport: Resource {
    fn send_reliable(&mut self, client: ClientId, bytes: Bytes);
    fn send_unreliable(&mut self, client: ClientId, bytes: Bytes);
    /// Clients currently known to be connected. The collector drops
    /// per-client state for ids no longer present here.
    fn connected_clients(&self) -> Vec<ClientId>;
}

/// Client-side half of the transport boundary.
#[cfg(feature = "client")]
pub trait ClientTransport: Resource {
    /// Drains all messages received since the last call, tagged by channel.
    fn receive(&mut self) -> Vec<(Channel, Bytes)>;
}
