//! Buffers component removals on replicated entities between collection
//! ticks (§4.E step "DESPAWNS / REMOVALS").
//!
//! A removal system is added per registered component type by
//! [`crate::server::AppReplicationExt::replicate`]; each instance only
//! watches its own `C`, so there's no reflection over the registry's
//! type-erased entries here.

use bevy::{ecs::entity::EntityHashMap, prelude::*};

use crate::{registry::FnsId, replicated::Replicated};

/// Component removals recorded since the buffer was last drained, grouped
/// by entity. Despawns are excluded — `Replicated` is removed on despawn
/// too, but [`super::despawn_buffer`] handles that case separately.
#[derive(Default, Resource)]
pub struct RemovalBuffer(EntityHashMap<Vec<FnsId>>);

impl RemovalBuffer {
    fn record(&mut self, entity: Entity, fns_id: FnsId) {
        self.0.entry(entity).or_default().push(fns_id);
    }

    pub fn drain(&mut self) -> EntityHashMap<Vec<FnsId>> {
        std::mem::take(&mut self.0)
    }
}

/// Registered once per replicated component type `C`, by
/// [`crate::server::AppReplicationExt::replicate`].
pub fn buffer_removals<C: Component>(
    mut removed: RemovedComponents<C>,
    still_alive: Query<(), With<Replicated>>,
    fns_id: FnsId,
    mut buffer: ResMut<RemovalBuffer>,
) {
    for entity in removed.read() {
        // A removal on an entity that's also been despawned this tick isn't
        // a "removal" in the replication sense; despawn_buffer owns that.
        if still_alive.get(entity).is_ok() {
            buffer.record(entity, fns_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::{registry::ReplicationRegistry, tick::Tick};

    #[derive(Component, Clone, Serialize, Deserialize)]
    struct Health(u32);

    fn make_app() -> (App, FnsId) {
        let mut registry = ReplicationRegistry::default();
        let fns_id = registry.register::<Health>().unwrap();

        let mut app = App::new();
        app.init_resource::<RemovalBuffer>()
            .insert_resource(registry)
            .add_systems(
                PostUpdate,
                (move |removed: RemovedComponents<Health>,
                       alive: Query<(), With<Replicated>>,
                       buffer: ResMut<RemovalBuffer>| {
                    buffer_removals::<Health>(removed, alive, fns_id, buffer)
                }),
            );
        (app, fns_id)
    }

    #[test]
    fn removal_of_tracked_component_is_buffered() {
        let (mut app, fns_id) = make_app();
        app.update();

        let entity = app
            .world_mut()
            .spawn((Replicated::new(Entity::PLACEHOLDER, Tick::new(0)), Health(10)))
            .id();
        app.world_mut().entity_mut(entity).remove::<Health>();
        app.update();

        let mut buffer = app.world_mut().resource_mut::<RemovalBuffer>();
        let drained = buffer.drain();
        assert_eq!(drained.get(&entity), Some(&vec![fns_id]));
    }

    #[test]
    fn despawn_is_not_recorded_as_a_removal() {
        let (mut app, _fns_id) = make_app();
        app.update();

        let entity = app
            .world_mut()
            .spawn((Replicated::new(Entity::PLACEHOLDER, Tick::new(0)), Health(10)))
            .id();
        app.world_mut().despawn(entity);
        app.update();

        let mut buffer = app.world_mut().resource_mut::<RemovalBuffer>();
        assert!(buffer.drain().is_empty());
    }
}
