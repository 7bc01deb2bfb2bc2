//! Buffers despawns of replicated entities between collection ticks.
//!
//! Treating a `Replicated` removal as a despawn (rather than hooking
//! `World::despawn` directly) catches despawns that happen between two
//! collection ticks without requiring the collector to run every frame.

use bevy::prelude::*;

use crate::{codec::EntityId, replicated::Replicated};

/// Entities that lost their [`Replicated`] marker since the buffer was last
/// drained.
#[derive(Default, Resource)]
pub struct DespawnBuffer(Vec<EntityId>);

impl DespawnBuffer {
    pub fn drain(&mut self) -> Vec<EntityId> {
        std::mem::take(&mut self.0)
    }
}

pub fn buffer_despawns(
    mut removed: RemovedComponents<Replicated>,
    mut buffer: ResMut<DespawnBuffer>,
) {
    for entity in removed.read() {
        buffer.0.push(entity.into());
    }
}
