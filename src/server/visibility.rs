//! Per-client visibility engine (module D).
//!
//! Policy semantics (§4.D):
//! - `All`: every entity visible to every client, explicit lists ignored.
//! - `Whitelist`: visible to a client iff explicitly listed for it, or
//!   globally visible.
//! - `Blacklist`: visible to a client iff *not* explicitly listed for it, or
//!   globally visible.
//!
//! `default_visible` governs entities with no explicit list under
//! `Whitelist`/`Blacklist`.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    time::{Duration, Instant},
};

use bevy::{
    ecs::entity::{EntityHashMap, EntityHashSet},
    prelude::{Entity, Resource},
};

use crate::{
    config::{ReplicationConfig, VisibilityPolicy},
    transport::ClientId,
};

/// One `(entity, client)` transition recorded into the bounded history.
#[derive(Clone, Copy, Debug)]
pub struct VisibilityTransition {
    pub entity: Entity,
    pub client: ClientId,
    pub was_visible: bool,
    pub is_visible: bool,
}

/// Result of comparing a previous-frame snapshot to the current evaluation
/// for a set of `(entity, client)` pairs.
#[derive(Default, Debug)]
pub struct VisibilityChanges {
    pub became_visible: Vec<(Entity, ClientId)>,
    pub became_hidden: Vec<(Entity, ClientId)>,
    pub unchanged: Vec<(Entity, ClientId)>,
}

struct CacheEntry {
    visible: bool,
    stamped_at: Instant,
}

/// Per-client entity filtering with change tracking and a short-TTL query
/// cache (§4.D). A missing `ReplicationConfig` resource is treated as
/// `VisibilityPolicy::All` by whoever constructs this without one — see
/// [`Self::new`]'s `Default` config.
#[derive(Resource)]
pub struct VisibilityEngine {
    policy: VisibilityPolicy,
    default_visible: bool,
    history_cap: Option<usize>,
    cache_ttl: Duration,

    per_entity_clients: EntityHashMap<HashSet<ClientId>>,
    per_client_entities: HashMap<ClientId, EntityHashSet>,
    globally_visible: EntityHashSet,

    history: VecDeque<VisibilityTransition>,
    cache: HashMap<(Entity, ClientId), CacheEntry>,

    /// Snapshot as of the last `apply_changes` call.
    previous: HashMap<(Entity, ClientId), bool>,
    /// Accumulates this frame's evaluations until `apply_changes` rotates
    /// them into `previous`.
    current: HashMap<(Entity, ClientId), bool>,
}

impl VisibilityEngine {
    pub fn new(config: &ReplicationConfig) -> Self {
        Self {
            policy: config.visibility_policy,
            default_visible: config.default_visible,
            history_cap: config.history_cap,
            cache_ttl: config.cache_ttl,
            per_entity_clients: EntityHashMap::default(),
            per_client_entities: HashMap::new(),
            globally_visible: EntityHashSet::default(),
            history: VecDeque::new(),
            cache: HashMap::new(),
            previous: HashMap::new(),
            current: HashMap::new(),
        }
    }

    /// Sets explicit per-client visibility for `entity`. Invalidates any
    /// cached result for this pair.
    pub fn set(&mut self, entity: Entity, client: ClientId, visible: bool) {
        if visible {
            self.per_entity_clients.entry(entity).or_default().insert(client);
            self.per_client_entities.entry(client).or_default().insert(entity);
        } else {
            if let Some(clients) = self.per_entity_clients.get_mut(&entity) {
                clients.remove(&client);
            }
            if let Some(entities) = self.per_client_entities.get_mut(&client) {
                entities.remove(&entity);
            }
        }
        self.cache.remove(&(entity, client));
    }

    /// Marks `entity` as bypassing per-client rules entirely.
    pub fn set_global(&mut self, entity: Entity, visible: bool) {
        if visible {
            self.globally_visible.insert(entity);
        } else {
            self.globally_visible.remove(&entity);
        }
        self.cache.retain(|&(e, _), _| e != entity);
    }

    fn evaluate(&self, entity: Entity, client: ClientId) -> bool {
        if self.globally_visible.contains(&entity) {
            return true;
        }

        match self.policy {
            VisibilityPolicy::All => true,
            VisibilityPolicy::Whitelist => self
                .per_entity_clients
                .get(&entity)
                .map(|clients| clients.contains(&client))
                .unwrap_or(self.default_visible),
            VisibilityPolicy::Blacklist => self
                .per_entity_clients
                .get(&entity)
                .map(|clients| !clients.contains(&client))
                .unwrap_or(self.default_visible),
        }
    }

    /// Returns whether `entity` is visible to `client`, consulting (and
    /// populating) the short-TTL cache. A stale hit would be incorrect, so
    /// entries older than `cache_ttl` are recomputed rather than trusted.
    pub fn is_visible(&mut self, entity: Entity, client: ClientId) -> bool {
        let now = Instant::now();
        if let Some(entry) = self.cache.get(&(entity, client)) {
            if now.duration_since(entry.stamped_at) < self.cache_ttl {
                return entry.visible;
            }
        }

        let visible = self.evaluate(entity, client);
        self.cache.insert(
            (entity, client),
            CacheEntry {
                visible,
                stamped_at: now,
            },
        );
        visible
    }

    /// Clients with an *explicit* mapping for `entity` (policy-dependent
    /// meaning); does not include clients that see it only through the
    /// default or global rules.
    pub fn visible_clients_of(&self, entity: Entity) -> impl Iterator<Item = ClientId> + '_ {
        self.per_entity_clients
            .get(&entity)
            .into_iter()
            .flatten()
            .copied()
    }

    pub fn visible_entities_of(&self, client: ClientId) -> impl Iterator<Item = Entity> + '_ {
        self.per_client_entities
            .get(&client)
            .into_iter()
            .flatten()
            .copied()
    }

    /// Evaluates visibility for every `(entity, client)` pair in the
    /// cartesian product of `entities` and `clients`, recording into
    /// `current` and diffing against `previous` (the snapshot as of the
    /// last `apply_changes`). Also records into the bounded history when
    /// enabled.
    pub fn compute_changes(&mut self, entities: &[Entity], clients: &[ClientId]) -> VisibilityChanges {
        let mut changes = VisibilityChanges::default();

        for &entity in entities {
            for &client in clients {
                let is_visible = self.is_visible(entity, client);
                let was_visible = self
                    .previous
                    .get(&(entity, client))
                    .copied()
                    .unwrap_or(false);

                self.current.insert((entity, client), is_visible);

                if is_visible && !was_visible {
                    changes.became_visible.push((entity, client));
                } else if !is_visible && was_visible {
                    changes.became_hidden.push((entity, client));
                } else {
                    changes.unchanged.push((entity, client));
                }

                if is_visible != was_visible {
                    if let Some(cap) = self.history_cap {
                        if self.history.len() >= cap {
                            self.history.pop_front();
                        }
                        self.history.push_back(VisibilityTransition {
                            entity,
                            client,
                            was_visible,
                            is_visible,
                        });
                    }
                }
            }
        }

        changes
    }

    /// Rotates `current` into `previous` and trims expired cache entries.
    /// Call once per tick after collection.
    pub fn apply_changes(&mut self) {
        self.previous.clear();
        std::mem::swap(&mut self.previous, &mut self.current);

        let now = Instant::now();
        let ttl = self.cache_ttl;
        self.cache
            .retain(|_, entry| now.duration_since(entry.stamped_at) < ttl);
    }

    pub fn history(&self) -> impl Iterator<Item = &VisibilityTransition> {
        self.history.iter()
    }

    /// Purges all state related to a despawned entity, from both
    /// directions of the per-entity/per-client maps, plus caches.
    pub fn remove_entity(&mut self, entity: Entity) {
        if let Some(clients) = self.per_entity_clients.remove(&entity) {
            for client in clients {
                if let Some(entities) = self.per_client_entities.get_mut(&client) {
                    entities.remove(&entity);
                }
            }
        }
        self.globally_visible.remove(&entity);
        self.cache.retain(|&(e, _), _| e != entity);
        self.previous.retain(|&(e, _), _| e != entity);
        self.current.retain(|&(e, _), _| e != entity);
    }

    /// Purges all state related to a disconnected client.
    pub fn remove_client(&mut self, client: ClientId) {
        if let Some(entities) = self.per_client_entities.remove(&client) {
            for entity in entities {
                if let Some(clients) = self.per_entity_clients.get_mut(&entity) {
                    clients.remove(&client);
                }
            }
        }
        self.cache.retain(|&(_, c), _| c != client);
        self.previous.retain(|&(_, c), _| c != client);
        self.current.retain(|&(_, c), _| c != client);
    }

    /// Bulk reconciliation against an authoritative alive-entity set.
    /// Idempotent: entities already absent are simply skipped.
    pub fn cleanup_removed_entities(&mut self, alive: &HashSet<Entity>) {
        let stale: Vec<_> = self
            .per_entity_clients
            .keys()
            .chain(self.globally_visible.iter())
            .filter(|e| !alive.contains(e))
            .copied()
            .collect();
        for entity in stale {
            self.remove_entity(entity);
        }
    }

    /// Bulk reconciliation against an authoritative connected-client set.
    pub fn cleanup_disconnected_clients(&mut self, alive: &HashSet<ClientId>) {
        let stale: Vec<_> = self
            .per_client_entities
            .keys()
            .filter(|c| !alive.contains(c))
            .copied()
            .collect();
        for client in stale {
            self.remove_client(client);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(policy: VisibilityPolicy, default_visible: bool) -> VisibilityEngine {
        VisibilityEngine::new(&ReplicationConfig {
            visibility_policy: policy,
            default_visible,
            ..Default::default()
        })
    }

    #[test]
    fn all_policy_ignores_explicit_lists() {
        let mut engine = engine(VisibilityPolicy::All, false);
        engine.set(Entity::PLACEHOLDER, ClientId(1), false);
        assert!(engine.is_visible(Entity::PLACEHOLDER, ClientId(1)));
    }

    #[test]
    fn whitelist_hides_by_default() {
        let mut engine = engine(VisibilityPolicy::Whitelist, false);
        assert!(!engine.is_visible(Entity::PLACEHOLDER, ClientId(1)));
        engine.set(Entity::PLACEHOLDER, ClientId(1), true);
        assert!(engine.is_visible(Entity::PLACEHOLDER, ClientId(1)));
        engine.set(Entity::PLACEHOLDER, ClientId(1), false);
        assert!(!engine.is_visible(Entity::PLACEHOLDER, ClientId(1)));
    }

    #[test]
    fn blacklist_shows_by_default() {
        let mut engine = engine(VisibilityPolicy::Blacklist, true);
        assert!(engine.is_visible(Entity::PLACEHOLDER, ClientId(1)));
        engine.set(Entity::PLACEHOLDER, ClientId(1), false);
        assert!(!engine.is_visible(Entity::PLACEHOLDER, ClientId(1)));
    }

    #[test]
    fn global_visibility_bypasses_policy() {
        let mut engine = engine(VisibilityPolicy::Whitelist, false);
        engine.set_global(Entity::PLACEHOLDER, true);
        assert!(engine.is_visible(Entity::PLACEHOLDER, ClientId(99)));
    }

    #[test]
    fn compute_changes_detects_gain_and_loss() {
        let mut engine = engine(VisibilityPolicy::Whitelist, false);
        let entity = Entity::PLACEHOLDER;
        let client = ClientId(1);

        let changes = engine.compute_changes(&[entity], &[client]);
        assert_eq!(changes.unchanged, vec![(entity, client)]);
        engine.apply_changes();

        engine.set(entity, client, true);
        let changes = engine.compute_changes(&[entity], &[client]);
        assert_eq!(changes.became_visible, vec![(entity, client)]);
        engine.apply_changes();

        engine.set(entity, client, false);
        let changes = engine.compute_changes(&[entity], &[client]);
        assert_eq!(changes.became_hidden, vec![(entity, client)]);
    }

    #[test]
    fn remove_entity_clears_symmetric_state() {
        let mut engine = engine(VisibilityPolicy::Whitelist, false);
        let entity = Entity::PLACEHOLDER;
        let client = ClientId(1);
        engine.set(entity, client, true);

        engine.remove_entity(entity);

        assert!(engine.visible_clients_of(entity).next().is_none());
        assert!(engine.visible_entities_of(client).next().is_none());
    }

    #[test]
    fn remove_client_clears_symmetric_state() {
        let mut engine = engine(VisibilityPolicy::Whitelist, false);
        let entity = Entity::from_raw(5);
        let client = ClientId(1);
        engine.set(entity, client, true);

        engine.remove_client(client);

        assert!(engine.visible_clients_of(entity).next().is_none());
        assert!(engine.visible_entities_of(client).next().is_none());
    }

    #[test]
    fn cleanup_is_idempotent() {
        let mut engine = engine(VisibilityPolicy::Whitelist, false);
        let entity = Entity::from_raw(5);
        let client = ClientId(1);
        engine.set(entity, client, true);

        let alive = HashSet::new();
        engine.cleanup_removed_entities(&alive);
        engine.cleanup_removed_entities(&alive); // second call: no-op, no panic
    }
}
