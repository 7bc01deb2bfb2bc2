//! Append-only byte arena producing reusable `(start, end)` ranges (module B).
//!
//! One instance is owned per client per tick. Ranges stay valid until
//! [`SerializedData::clear`] runs at the next frame boundary; reads borrow
//! by slicing rather than handing out references that would outlive the
//! arena, so there's nothing unsafe to uphold here — just don't hold a
//! `ByteRange` across a `clear()`.

use crate::{
    codec::{self, ByteRange, EntityId},
    error::CodecError,
    registry::FnsId,
    tick::Tick,
};

/// Single continuous buffer backing one tick's worth of serialized ranges
/// for one client. See [`UpdateMessage`](crate::server::messages::UpdateMessage)
/// and [`MutateMessage`](crate::server::messages::MutateMessage).
#[derive(Default)]
pub struct SerializedData(Vec<u8>);

impl SerializedData {
    /// Appends raw bytes and returns the range they landed in.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> ByteRange {
        let start = self.0.len();
        self.0.extend_from_slice(bytes);
        start..self.0.len()
    }

    pub fn write_entity(&mut self, entity: EntityId) -> ByteRange {
        let start = self.0.len();
        codec::encode_entity(entity, &mut self.0);
        start..self.0.len()
    }

    pub fn write_tick(&mut self, tick: Tick) -> ByteRange {
        let start = self.0.len();
        codec::encode_uvarint(u64::from(tick.get()), &mut self.0);
        start..self.0.len()
    }

    pub fn write_mappings(&mut self, pairs: &[(EntityId, EntityId)]) -> ByteRange {
        let start = self.0.len();
        codec::encode_mappings(pairs, &mut self.0);
        start..self.0.len()
    }

    /// Writes one component record — `fns_id` as a varint, the payload
    /// length as a varint, then the raw payload — and returns the range
    /// spanning all three pieces (§6 CHANGES/body segment layout).
    pub fn write_component_record(&mut self, fns_id: FnsId, bytes: &[u8]) -> ByteRange {
        let start = self.len();
        self.write_uvarint(u64::from(fns_id.get()));
        self.write_uvarint(bytes.len() as u64);
        self.write_bytes(bytes);
        start..self.len()
    }

    /// Writes a single unsigned integer (used for counts, lengths, and
    /// `fns_id`s), returning the range it landed in.
    pub fn write_uvarint(&mut self, value: u64) -> ByteRange {
        let start = self.0.len();
        codec::encode_uvarint(value, &mut self.0);
        start..self.0.len()
    }

    /// Borrows the bytes in `range` without copying.
    pub fn get_range(&self, range: ByteRange) -> &[u8] {
        &self.0[range]
    }

    /// Current length, i.e. the `start` a subsequent write will land at.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Empties the buffer for reuse next tick. Any `ByteRange`s produced
    /// before this call are no longer valid to read.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Coalesces `new` onto `existing` if they're adjacent (`existing.end ==
    /// new.start`), returning the merged range; otherwise returns both
    /// unchanged via `None`.
    pub fn coalesce(existing: &ByteRange, new: &ByteRange) -> Option<ByteRange> {
        if existing.end == new.start {
            Some(existing.start..new.end)
        } else {
            None
        }
    }

    /// Static parsers mirroring the write side (§4.B's contract), for
    /// reading values back out of the arena by offset rather than by a
    /// previously-handed-out [`ByteRange`].
    pub fn read_entity_at(&self, offset: usize) -> Result<(EntityId, usize), CodecError> {
        codec::decode_entity(&self.0, offset)
    }

    pub fn read_tick_at(&self, offset: usize) -> Result<(Tick, usize), CodecError> {
        let (value, read) = codec::decode_uvarint(&self.0, offset)?;
        Ok((Tick::new(value as u32), read))
    }

    pub fn read_uvarint_at(&self, offset: usize) -> Result<(u64, usize), CodecError> {
        codec::decode_uvarint(&self.0, offset)
    }

    pub fn read_mappings(
        &self,
        offset: usize,
    ) -> Result<(Vec<(EntityId, EntityId)>, usize), CodecError> {
        codec::decode_mappings(&self.0, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_back() {
        let mut data = SerializedData::default();
        let range = data.write_entity(EntityId(42));
        let (decoded, read) = data.read_entity_at(range.start).unwrap();
        assert_eq!(decoded, EntityId(42));
        assert_eq!(read, range.len());
    }

    #[test]
    fn coalesces_adjacent_ranges() {
        let mut data = SerializedData::default();
        let first = data.write_entity(EntityId(1));
        let second = data.write_entity(EntityId(2));
        let merged = SerializedData::coalesce(&first, &second).unwrap();
        assert_eq!(merged, first.start..second.end);
    }

    #[test]
    fn clear_invalidates_for_reuse() {
        let mut data = SerializedData::default();
        data.write_entity(EntityId(1));
        assert!(!data.is_empty());
        data.clear();
        assert!(data.is_empty());
    }

    #[test]
    fn component_record_round_trips_through_get_range() {
        let mut data = SerializedData::default();
        let range = data.write_component_record(FnsId::from(3), &[9, 8, 7]);

        let bytes = data.get_range(range);
        let (id, r1) = codec::decode_uvarint(bytes, 0).unwrap();
        let (len, r2) = codec::decode_uvarint(bytes, r1).unwrap();
        assert_eq!(id, 3);
        assert_eq!(len, 3);
        assert_eq!(&bytes[r1 + r2..], &[9, 8, 7]);
    }
}
