//! Updates/Mutations message builders (§3, §6).
//!
//! Each per-client [`super::connected_clients::ReplicatedClient`] owns one
//! of each, plus the [`SerializedData`] arena they write into. The
//! collector fills them in during a tick by writing entity ids, component
//! records and mappings into the shared buffer and recording the
//! resulting [`ByteRange`]s here; [`UpdateMessage::finish`]/
//! [`MutateMessage::finish`] then reassemble the final wire bytes by
//! copying those ranges out of the buffer in wire order — no component
//! payload is ever serialized or cloned twice. Decoding the same bytes
//! back lives in [`crate::wire`].

use bytes::Bytes;

use crate::{
    codec::{self, ByteRange, EntityId},
    registry::FnsId,
    serialized_data::SerializedData,
    tick::Tick,
    wire::UpdateFlags,
};

/// Appends `range` onto `ranges`, merging it into the last entry when
/// adjacent (§4.B "adjacent ranges may be coalesced").
fn push_coalesced(ranges: &mut Vec<ByteRange>, range: ByteRange) {
    if let Some(last) = ranges.last_mut() {
        if let Some(merged) = SerializedData::coalesce(last, &range) {
            *last = merged;
            return;
        }
    }
    ranges.push(range);
}

/// Writes one entity's changed components into `buffer` and returns the
/// entity range plus one (possibly coalesced) range per contiguous run of
/// component records. `None` if there was nothing to write.
fn write_component_changes(
    buffer: &mut SerializedData,
    entity: EntityId,
    components: &[(FnsId, Vec<u8>)],
) -> Option<(ByteRange, Vec<ByteRange>)> {
    if components.is_empty() {
        return None;
    }

    let entity_range = buffer.write_entity(entity);
    let mut component_ranges: Vec<ByteRange> = Vec::new();
    for (fns_id, bytes) in components {
        let range = buffer.write_component_record(*fns_id, bytes);
        push_coalesced(&mut component_ranges, range);
    }

    Some((entity_range, component_ranges))
}

fn components_total_len(ranges: &[ByteRange]) -> usize {
    ranges.iter().map(ByteRange::len).sum()
}

/// Reliable-channel message: structural changes plus initial component
/// state (§3 "Updates message"). Stores ranges into the per-client
/// [`SerializedData`] rather than owned bytes.
#[derive(Default)]
pub struct UpdateMessage {
    mappings: ByteRange,
    despawns: Vec<ByteRange>,
    despawns_len: usize,
    removals: Vec<ComponentRemovals>,
    changes: Vec<(ByteRange, Vec<ByteRange>)>,
}

struct ComponentRemovals {
    entity: ByteRange,
    ids_len: usize,
    fn_ids: ByteRange,
}

impl UpdateMessage {
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
            && self.despawns.is_empty()
            && self.removals.is_empty()
            && self.changes.is_empty()
    }

    /// Writes the MAPPINGS segment wholesale; called once per tick with
    /// the client's drained [`super::client_entity_map::ClientEntityMap`].
    pub fn set_mappings(&mut self, buffer: &mut SerializedData, mappings: &[(EntityId, EntityId)]) {
        self.mappings = buffer.write_mappings(mappings);
    }

    pub fn push_despawn(&mut self, buffer: &mut SerializedData, entity: EntityId) {
        self.despawns_len += 1;
        let range = buffer.write_entity(entity);
        push_coalesced(&mut self.despawns, range);
    }

    pub fn push_removals(&mut self, buffer: &mut SerializedData, entity: EntityId, fns_ids: &[FnsId]) {
        if fns_ids.is_empty() {
            return;
        }

        let entity_range = buffer.write_entity(entity);
        let start = buffer.len();
        for id in fns_ids {
            buffer.write_uvarint(u64::from(id.get()));
        }
        let fn_ids_range = start..buffer.len();

        self.removals.push(ComponentRemovals {
            entity: entity_range,
            ids_len: fns_ids.len(),
            fn_ids: fn_ids_range,
        });
    }

    /// Writes `entity`'s changed components into `buffer` and records the
    /// range under CHANGES. Returns the same ranges so a newly-created
    /// entity's bytes can be reused for [`MutateMessage::push_entity_ranges`]
    /// without re-serializing (§9's "unify by duplicating" choice).
    pub fn push_change(
        &mut self,
        buffer: &mut SerializedData,
        entity: EntityId,
        components: &[(FnsId, Vec<u8>)],
    ) -> Option<(ByteRange, Vec<ByteRange>)> {
        let written = write_component_changes(buffer, entity, components)?;
        self.changes.push(written.clone());
        Some(written)
    }

    pub fn clear(&mut self) {
        self.mappings = ByteRange::default();
        self.despawns.clear();
        self.despawns_len = 0;
        self.removals.clear();
        self.changes.clear();
    }

    /// Produces the final message bytes, or `None` if nothing was
    /// collected this tick (§8 "empty client set -> no messages emitted"
    /// generalizes to "nothing to say -> no message"). Writes `server_tick`
    /// into `buffer` so the whole message, header included, is assembled
    /// from arena ranges.
    pub fn finish(&self, buffer: &mut SerializedData, server_tick: Tick) -> Option<Bytes> {
        if self.is_empty() {
            return None;
        }

        let tick_range = buffer.write_tick(server_tick);

        let mut flags = UpdateFlags::empty();
        flags.set(UpdateFlags::MAPPINGS, !self.mappings.is_empty());
        flags.set(UpdateFlags::DESPAWNS, !self.despawns.is_empty());
        flags.set(UpdateFlags::REMOVALS, !self.removals.is_empty());
        flags.set(UpdateFlags::CHANGES, !self.changes.is_empty());

        let mut out = Vec::new();
        out.extend_from_slice(buffer.get_range(tick_range));
        out.push(flags.bits());

        if !self.mappings.is_empty() {
            out.extend_from_slice(buffer.get_range(self.mappings.clone()));
        }

        if !self.despawns.is_empty() {
            codec::encode_uvarint(self.despawns_len as u64, &mut out);
            for range in &self.despawns {
                out.extend_from_slice(buffer.get_range(range.clone()));
            }
        }

        if !self.removals.is_empty() {
            codec::encode_uvarint(self.removals.len() as u64, &mut out);
            for removals in &self.removals {
                out.extend_from_slice(buffer.get_range(removals.entity.clone()));
                codec::encode_uvarint(removals.ids_len as u64, &mut out);
                out.extend_from_slice(buffer.get_range(removals.fn_ids.clone()));
            }
        }

        if !self.changes.is_empty() {
            codec::encode_uvarint(self.changes.len() as u64, &mut out);
            for (entity_range, component_ranges) in &self.changes {
                out.extend_from_slice(buffer.get_range(entity_range.clone()));
                codec::encode_uvarint(components_total_len(component_ranges) as u64, &mut out);
                for range in component_ranges {
                    out.extend_from_slice(buffer.get_range(range.clone()));
                }
            }
        }

        Some(Bytes::from(out))
    }
}

/// Unreliable-channel message: full current component snapshots (§3
/// "Mutations message").
#[derive(Default)]
pub struct MutateMessage {
    entities: Vec<(ByteRange, Vec<ByteRange>)>,
}

impl MutateMessage {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Serializes `entity`'s components afresh into `buffer` and records
    /// the range.
    pub fn push_entity(&mut self, buffer: &mut SerializedData, entity: EntityId, components: &[(FnsId, Vec<u8>)]) {
        if let Some(written) = write_component_changes(buffer, entity, components) {
            self.entities.push(written);
        }
    }

    /// Reuses ranges already written by [`UpdateMessage::push_change`] for
    /// a same-tick spawn, avoiding a second serialize pass (§9).
    pub fn push_entity_ranges(&mut self, entity_range: ByteRange, component_ranges: Vec<ByteRange>) {
        if !component_ranges.is_empty() {
            self.entities.push((entity_range, component_ranges));
        }
    }

    pub fn clear(&mut self) {
        self.entities.clear();
    }

    pub fn finish(&self, buffer: &mut SerializedData, update_tick: Tick, server_tick: Tick) -> Option<Bytes> {
        if self.is_empty() {
            return None;
        }

        let update_tick_range = buffer.write_tick(update_tick);
        let server_tick_range = buffer.write_tick(server_tick);

        let mut out = Vec::new();
        out.extend_from_slice(buffer.get_range(update_tick_range));
        out.extend_from_slice(buffer.get_range(server_tick_range));
        codec::encode_uvarint(self.entities.len() as u64, &mut out);

        for (entity_range, component_ranges) in &self.entities {
            out.extend_from_slice(buffer.get_range(entity_range.clone()));
            codec::encode_uvarint(components_total_len(component_ranges) as u64, &mut out);
            for range in component_ranges {
                out.extend_from_slice(buffer.get_range(range.clone()));
            }
        }

        Some(Bytes::from(out))
    }
}
