//! A server-authoritative replication core for a Bevy-style ECS: a
//! compact entity/varint wire codec, a zero-copy serialization scratch
//! buffer, a typed component registry, a per-client visibility engine, and
//! the server collector / client applicator that sit on top of them.
//!
//! The crate never depends on a concrete transport — see [`transport`] —
//! and splits its two halves behind the `server` and `client` features
//! (both enabled by default) so a pure client or pure server build can
//! drop the other side's systems and resources entirely.

pub mod codec;
pub mod config;
pub mod error;
pub mod registry;
pub mod replicated;
pub mod serialized_data;
pub mod tick;
pub mod transport;
pub mod wire;

#[cfg(feature = "server")]
pub mod server;

#[cfg(feature = "client")]
pub mod client;

/// Re-exports the pieces most host applications need to construct a
/// replicated `App`.
pub mod prelude {
    pub use crate::{
        codec::EntityId,
        config::{ReplicationConfig, VisibilityPolicy},
        error::{ApplyError, CodecError, RegistryError},
        registry::{FnsId, MapEntities, ReplicationRegistry},
        replicated::Replicated,
        tick::Tick,
        transport::{Channel, ClientId},
    };

    #[cfg(feature = "server")]
    pub use crate::{
        server::{AppReplicationExt, ServerPlugin, ServerTick},
        transport::ServerTransport,
    };

    #[cfg(feature = "client")]
    pub use crate::{
        client::ClientPlugin,
        transport::ClientTransport,
    };
}
