//! Explicit configuration (§9: "dynamic named parameters" replaced with a
//! single struct enumerating every option, rather than a loose options bag
//! or scattered setters).

use std::time::Duration;

use bevy::prelude::Resource;

/// Global visibility policy (module D).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum VisibilityPolicy {
    /// Every entity is visible to every client; explicit lists are ignored.
    #[default]
    All,
    /// An entity is visible to a client iff the client is on its explicit
    /// list, or the entity is globally visible.
    Whitelist,
    /// An entity is visible to a client iff the client is *not* on its
    /// explicit list, or the entity is globally visible.
    Blacklist,
}

/// Every tunable the replication core exposes, supplied once at
/// construction time.
#[derive(Resource, Clone, Debug)]
pub struct ReplicationConfig {
    pub visibility_policy: VisibilityPolicy,
    /// Governs entities with no explicit list under `Whitelist`/`Blacklist`.
    pub default_visible: bool,
    /// Caps the bounded history of visibility transitions. `None` disables
    /// history tracking entirely.
    pub history_cap: Option<usize>,
    /// TTL for the `is_visible` query cache. Must be less than one tick for
    /// correctness when used inside collection (§4.D).
    pub cache_ttl: Duration,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            visibility_policy: VisibilityPolicy::All,
            default_visible: true,
            history_cap: Some(64),
            cache_ttl: Duration::from_millis(1),
        }
    }
}
