//! Decodes the bit-exact wire format of Updates/Mutations messages (§6).
//!
//! Encoding lives next to the builders that produce it
//! ([`crate::server::messages`]); decoding is shared here since both the
//! client applicator and integration tests need to parse the same bytes.

use bitflags::bitflags;

use crate::{codec, codec::EntityId, error::CodecError, registry::FnsId, tick::Tick};

bitflags! {
    /// Which segments are present in an Updates message, in the exact
    /// wire order they appear: MAPPINGS, DESPAWNS, REMOVALS, CHANGES (§6).
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct UpdateFlags: u8 {
        const MAPPINGS = 0b0000_0001;
        const DESPAWNS = 0b0000_0010;
        const REMOVALS = 0b0000_0100;
        const CHANGES  = 0b0000_1000;
    }
}

/// A parsed Updates message, segments in the order they appeared on the
/// wire (§5: entity/component order within a segment carries no meaning,
/// but segment order — MAPPINGS, DESPAWNS, REMOVALS, CHANGES — does).
#[derive(Debug, Default, PartialEq)]
pub struct ParsedUpdate {
    pub server_tick: Tick,
    pub mappings: Vec<(EntityId, EntityId)>,
    pub despawns: Vec<EntityId>,
    pub removals: Vec<(EntityId, Vec<FnsId>)>,
    pub changes: Vec<(EntityId, Vec<(FnsId, Vec<u8>)>)>,
}

#[derive(Debug, Default, PartialEq)]
pub struct ParsedMutate {
    pub update_tick: Tick,
    pub server_tick: Tick,
    pub entities: Vec<(EntityId, Vec<(FnsId, Vec<u8>)>)>,
}

fn read_component_records(
    buf: &[u8],
    mut offset: usize,
    bytes_total: u64,
) -> Result<(Vec<(FnsId, Vec<u8>)>, usize), CodecError> {
    let start = offset;
    let mut components = Vec::new();
    let mut consumed = 0u64;

    while consumed < bytes_total {
        let (id, r1) = codec::decode_uvarint(buf, offset)?;
        offset += r1;
        let (size, r2) = codec::decode_uvarint(buf, offset)?;
        offset += r2;
        let size = size as usize;
        let bytes = buf
            .get(offset..offset + size)
            .ok_or(CodecError::BufferExhausted {
                read: buf.len().saturating_sub(offset),
                requested: size,
            })?
            .to_vec();
        offset += size;
        consumed += (r1 + r2 + size) as u64;
        components.push((FnsId::from(id as u32), bytes));
    }

    Ok((components, offset - start))
}

pub fn decode_update_message(buf: &[u8]) -> Result<ParsedUpdate, CodecError> {
    let (tick_value, mut offset) = codec::decode_uvarint(buf, 0)?;
    let server_tick = Tick::new(tick_value as u32);

    let &flags_byte = buf
        .get(offset)
        .ok_or(CodecError::BufferExhausted { read: 0, requested: 1 })?;
    let flags = UpdateFlags::from_bits_truncate(flags_byte);
    offset += 1;

    let mut parsed = ParsedUpdate {
        server_tick,
        ..Default::default()
    };

    if flags.contains(UpdateFlags::MAPPINGS) {
        let (mappings, read) = codec::decode_mappings(buf, offset)?;
        parsed.mappings = mappings;
        offset += read;
    }

    if flags.contains(UpdateFlags::DESPAWNS) {
        let (despawns, read) = codec::decode_entity_array(buf, offset, false)?;
        parsed.despawns = despawns;
        offset += read;
    }

    if flags.contains(UpdateFlags::REMOVALS) {
        let (count, mut read) = codec::decode_uvarint(buf, offset)?;
        let start = offset;
        let mut removals = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let (entity, r1) = codec::decode_entity(buf, start + read)?;
            read += r1;
            let (k, r2) = codec::decode_uvarint(buf, start + read)?;
            read += r2;
            let mut fns_ids = Vec::with_capacity(k as usize);
            for _ in 0..k {
                let (id, r3) = codec::decode_uvarint(buf, start + read)?;
                read += r3;
                fns_ids.push(FnsId::from(id as u32));
            }
            removals.push((entity, fns_ids));
        }
        parsed.removals = removals;
        offset = start + read;
    }

    if flags.contains(UpdateFlags::CHANGES) {
        let (count, mut read) = codec::decode_uvarint(buf, offset)?;
        let start = offset;
        let mut changes = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let (entity, r1) = codec::decode_entity(buf, start + read)?;
            read += r1;
            let (bytes_total, r2) = codec::decode_uvarint(buf, start + read)?;
            read += r2;
            let (components, r3) = read_component_records(buf, start + read, bytes_total)?;
            read += r3;
            changes.push((entity, components));
        }
        parsed.changes = changes;
        offset = start + read;
    }

    let _ = offset;
    Ok(parsed)
}

pub fn decode_mutate_message(buf: &[u8]) -> Result<ParsedMutate, CodecError> {
    let (update_tick, mut offset) = codec::decode_uvarint(buf, 0)?;
    let (server_tick, read) = codec::decode_uvarint(buf, offset)?;
    offset += read;
    let (count, read) = codec::decode_uvarint(buf, offset)?;
    offset += read;

    let mut entities = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (entity, r1) = codec::decode_entity(buf, offset)?;
        offset += r1;
        let (bytes_total, r2) = codec::decode_uvarint(buf, offset)?;
        offset += r2;
        let (components, r3) = read_component_records(buf, offset, bytes_total)?;
        offset += r3;
        entities.push((entity, components));
    }

    Ok(ParsedMutate {
        update_tick: Tick::new(update_tick as u32),
        server_tick: Tick::new(server_tick as u32),
        entities,
    })
}
