use crate::{Error, MAX_CHUNK_SLOTS, MAX_MESSAGE_LEN};
use libre_buf::Buffer;
use std::collections::HashMap;

/// Sentinel written into an 11/7-byte header's 3-byte timestamp field when
/// the real value needs the 4-byte extended-timestamp field that follows.
pub const EXTENDED_TIMESTAMP_MARKER: u32 = 0xFF_FFFF;

/// `(format, chunk_id)` as read off (or about to be written onto) the wire.
/// Basic header encoding supports `chunk_id` up to 65599 via the 2- or
/// 3-byte forms (spec.md §9 Open Questions: the teacher's own encoder
/// restricted this to a single format byte capping chunk_id at 63 — this
/// implementation keeps the full RFC range).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicHeader {
    pub format: u8,
    pub chunk_id: u32,
}

impl BasicHeader {
    pub fn encode(&self, buf: &mut Buffer) {
        assert!(self.format <= 3);
        let fmt_bits = self.format << 6;
        match self.chunk_id {
            2..=63 => buf.write_u8(fmt_bits | self.chunk_id as u8),
            64..=319 => {
                buf.write_u8(fmt_bits);
                buf.write_u8((self.chunk_id - 64) as u8);
            }
            320..=65599 => {
                buf.write_u8(fmt_bits | 0x01);
                let id = (self.chunk_id - 64) as u16;
                // little-endian per spec.md §6.
                buf.write_u8((id & 0xFF) as u8);
                buf.write_u8((id >> 8) as u8);
            }
            other => panic!("chunk id {other} out of representable range"),
        }
    }

    pub fn decode(buf: &mut Buffer) -> Result<Self, Error> {
        if buf.remaining() < 1 {
            return Err(Error::NeedsMoreData);
        }
        let first = buf.read_u8()?;
        let format = first >> 6;
        let low = first & 0x3F;
        let chunk_id = match low {
            0 => {
                if buf.remaining() < 1 {
                    return Err(Error::NeedsMoreData);
                }
                64 + buf.read_u8()? as u32
            }
            1 => {
                if buf.remaining() < 2 {
                    return Err(Error::NeedsMoreData);
                }
                let lo = buf.read_u8()? as u32;
                let hi = buf.read_u8()? as u32;
                64 + (hi << 8 | lo)
            }
            id => id as u32,
        };
        Ok(Self { format, chunk_id })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub timestamp: u32,
    pub timestamp_delta: u32,
    pub length: u32,
    pub msg_type_id: u8,
    pub msg_stream_id: u32,
}

/// Stateless chunker: given a full message, split it into a first chunk at
/// `format` followed by `format=3` continuation chunks (spec.md §4.6).
pub struct Chunker;

impl Chunker {
    /// Encode `payload` as chunks of at most `max_chunk_size` bytes each.
    pub fn chunk(
        format: u8,
        chunk_id: u32,
        timestamp: u32,
        delta: u32,
        msg_type_id: u8,
        msg_stream_id: u32,
        payload: &[u8],
        max_chunk_size: usize,
    ) -> Vec<u8> {
        assert!(max_chunk_size > 0);
        let mut out = Buffer::with_capacity(payload.len() + payload.len() / max_chunk_size.max(1) * 16 + 32);

        let ts_field = match format {
            0 => timestamp,
            1 | 2 => delta,
            _ => 0,
        };
        let extended = ts_field >= EXTENDED_TIMESTAMP_MARKER;

        BasicHeader { format, chunk_id }.encode(&mut out);
        write_message_header(&mut out, format, ts_field, extended, payload.len() as u32, msg_type_id, msg_stream_id);
        if extended {
            out.write_u32(ts_field);
        }

        for (i, window) in payload.chunks(max_chunk_size).enumerate() {
            if i > 0 {
                BasicHeader { format: 3, chunk_id }.encode(&mut out);
                if extended {
                    out.write_u32(ts_field);
                }
            }
            out.write_bytes(window);
        }

        out.into_vec()
    }
}

fn write_message_header(buf: &mut Buffer, format: u8, ts_field: u32, extended: bool, length: u32, msg_type_id: u8, msg_stream_id: u32) {
    let ts_written = if extended { EXTENDED_TIMESTAMP_MARKER } else { ts_field };
    match format {
        0 => {
            buf.write_u24(ts_written);
            buf.write_u24(length);
            buf.write_u8(msg_type_id);
            buf.write_u32_le(msg_stream_id);
        }
        1 => {
            buf.write_u24(ts_written);
            buf.write_u24(length);
            buf.write_u8(msg_type_id);
        }
        2 => buf.write_u24(ts_written),
        3 => {}
        other => panic!("invalid chunk format {other}"),
    }
}

struct Slot {
    timestamp: u32,
    timestamp_delta: u32,
    length: u32,
    msg_type_id: u8,
    msg_stream_id: u32,
    extended_timestamp: bool,
    partial: Vec<u8>,
    /// Whether `partial` belongs to a message that has already been fully
    /// delivered; the next format-3 chunk for this slot starts a new one and
    /// advances `timestamp` by `timestamp_delta` (spec.md §4.6).
    message_complete: bool,
}

/// A message assembled from one or more chunks for a given chunk id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    pub chunk_id: u32,
    pub timestamp: u32,
    pub msg_type_id: u8,
    pub msg_stream_id: u32,
    pub payload: Vec<u8>,
}

/// Stateful per-chunk-id reassembly (spec.md §3, §4.6). At most
/// [`MAX_CHUNK_SLOTS`] chunk ids are tracked simultaneously; exceeding that
/// cap fails the connection with [`Error::Overflow`], matching the
/// dechunker's slot-table budget.
pub struct Dechunker {
    slots: HashMap<u32, Slot>,
    max_chunk_size: usize,
}

impl Dechunker {
    pub fn new() -> Self {
        Self { slots: HashMap::new(), max_chunk_size: 128 }
    }

    /// `Set Chunk Size` (control message type 1) updates this.
    pub fn set_max_chunk_size(&mut self, size: u32) {
        self.max_chunk_size = size as usize;
    }

    /// Reset a chunk id's partial buffer without failing the connection;
    /// used by RTMP `Abort Message` (type 2), supplementing spec.md §4.6
    /// (original `re_rtmp.h`/`conn.c` handle this control type).
    pub fn abort(&mut self, chunk_id: u32) {
        if let Some(slot) = self.slots.get_mut(&chunk_id) {
            slot.partial.clear();
        }
    }

    /// Feed one chunk (basic header already consumed by the caller, which
    /// passes its parsed form in). Returns a [`Delivered`] message once the
    /// slot's accumulated payload reaches its declared length.
    pub fn feed_chunk(&mut self, header: BasicHeader, buf: &mut Buffer) -> Result<Option<Delivered>, Error> {
        let starting_new_slot = !self.slots.contains_key(&header.chunk_id);
        if header.format != 0 && starting_new_slot {
            return Err(Error::BadMessage("chunk for unknown chunk id with format != 0"));
        }
        if starting_new_slot && self.slots.len() >= MAX_CHUNK_SLOTS {
            return Err(Error::Overflow);
        }

        let (length, msg_type_id, msg_stream_id, ts_field, extended_marker_seen) = match header.format {
            0 => {
                if buf.remaining() < 11 {
                    return Err(Error::NeedsMoreData);
                }
                let ts = buf.read_u24()?;
                let length = buf.read_u24()?;
                let msg_type_id = buf.read_u8()?;
                let msg_stream_id = buf.read_u32_le()?;
                (Some(length), Some(msg_type_id), Some(msg_stream_id), ts, ts == EXTENDED_TIMESTAMP_MARKER)
            }
            1 => {
                if buf.remaining() < 7 {
                    return Err(Error::NeedsMoreData);
                }
                let delta = buf.read_u24()?;
                let length = buf.read_u24()?;
                let msg_type_id = buf.read_u8()?;
                (Some(length), Some(msg_type_id), None, delta, delta == EXTENDED_TIMESTAMP_MARKER)
            }
            2 => {
                if buf.remaining() < 3 {
                    return Err(Error::NeedsMoreData);
                }
                let delta = buf.read_u24()?;
                (None, None, None, delta, delta == EXTENDED_TIMESTAMP_MARKER)
            }
            3 => (None, None, None, 0, false),
            other => return Err(Error::BadMessage(format_is_invalid(other))),
        };

        // format 3's extended-timestamp presence is governed by the flag
        // recorded when the slot's header was last set (spec.md §4.6), not
        // by a marker in this chunk (format 3 carries no timestamp field at
        // all besides the extended one).
        let slot_extended_before = self.slots.get(&header.chunk_id).map(|s| s.extended_timestamp).unwrap_or(false);
        let reads_extended = match header.format {
            0 | 1 | 2 => extended_marker_seen,
            _ => slot_extended_before,
        };
        let extended_ts = if reads_extended {
            if buf.remaining() < 4 {
                return Err(Error::NeedsMoreData);
            }
            Some(buf.read_u32()?)
        } else {
            None
        };

        let slot = self.slots.entry(header.chunk_id).or_insert_with(|| Slot {
            timestamp: 0,
            timestamp_delta: 0,
            length: 0,
            msg_type_id: 0,
            msg_stream_id: 0,
            extended_timestamp: false,
            partial: Vec::new(),
            message_complete: true,
        });

        match header.format {
            0 => {
                slot.timestamp = extended_ts.unwrap_or(ts_field);
                slot.timestamp_delta = 0;
                slot.length = length.unwrap();
                slot.msg_type_id = msg_type_id.unwrap();
                slot.msg_stream_id = msg_stream_id.unwrap();
                slot.extended_timestamp = reads_extended;
                slot.partial.clear();
                slot.message_complete = false;
            }
            1 => {
                slot.timestamp_delta = extended_ts.unwrap_or(ts_field);
                slot.timestamp = slot.timestamp.wrapping_add(slot.timestamp_delta);
                slot.length = length.unwrap();
                slot.msg_type_id = msg_type_id.unwrap();
                slot.extended_timestamp = reads_extended;
                slot.partial.clear();
                slot.message_complete = false;
            }
            2 => {
                slot.timestamp_delta = extended_ts.unwrap_or(ts_field);
                slot.timestamp = slot.timestamp.wrapping_add(slot.timestamp_delta);
                slot.extended_timestamp = reads_extended;
                slot.partial.clear();
                slot.message_complete = false;
            }
            3 => {
                if slot.message_complete {
                    slot.timestamp = slot.timestamp.wrapping_add(slot.timestamp_delta);
                    slot.partial.clear();
                    slot.message_complete = false;
                }
            }
            _ => unreachable!(),
        }

        if slot.length as usize > MAX_MESSAGE_LEN {
            return Err(Error::Overflow);
        }

        let want = (slot.length as usize).saturating_sub(slot.partial.len());
        // a single wire chunk carries at most max_chunk_size bytes of
        // payload; requiring the full amount up front (rather than taking
        // whatever's available) keeps a short read from being mistaken for
        // the chunk boundary and misparsing the next basic header.
        let this_chunk_payload = want.min(self.max_chunk_size.max(1));
        if buf.remaining() < this_chunk_payload {
            return Err(Error::NeedsMoreData);
        }
        let bytes = buf.read_bytes(this_chunk_payload)?;
        slot.partial.extend_from_slice(bytes);

        if slot.partial.len() >= slot.length as usize {
            slot.message_complete = true;
            let delivered = Delivered {
                chunk_id: header.chunk_id,
                timestamp: slot.timestamp,
                msg_type_id: slot.msg_type_id,
                msg_stream_id: slot.msg_stream_id,
                payload: std::mem::take(&mut slot.partial),
            };
            Ok(Some(delivered))
        } else {
            Ok(None)
        }
    }

    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }
}

impl Default for Dechunker {
    fn default() -> Self {
        Self::new()
    }
}

fn format_is_invalid(_format: u8) -> &'static str {
    "chunk basic header format must be 0-3"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(payload: &[u8], max_chunk_size: usize) -> Delivered {
        let bytes = Chunker::chunk(0, 3, 1000, 0, 0x14, 1, payload, max_chunk_size);
        let mut buf = Buffer::from_vec(bytes);
        let mut dechunker = Dechunker::new();
        dechunker.set_max_chunk_size(max_chunk_size as u32);

        let mut delivered = None;
        while delivered.is_none() {
            let header = BasicHeader::decode(&mut buf).unwrap();
            delivered = dechunker.feed_chunk(header, &mut buf).unwrap();
        }
        delivered.unwrap()
    }

    #[test]
    fn chunk_then_dechunk_recovers_payload_exactly() {
        let payload = vec![0xABu8; 300];
        let l = payload.len();
        for &size in &[1usize, 128, 4096, l - 1, l, l + 1] {
            let delivered = roundtrip(&payload, size);
            assert_eq!(delivered.payload, payload, "size={size}");
            assert_eq!(delivered.msg_type_id, 0x14);
            assert_eq!(delivered.msg_stream_id, 1);
        }
    }

    #[test]
    fn basic_header_round_trips_across_all_three_widths() {
        for &chunk_id in &[2u32, 63, 64, 319, 320, 65599] {
            let header = BasicHeader { format: 1, chunk_id };
            let mut buf = Buffer::with_capacity(8);
            header.encode(&mut buf);
            let mut reader = Buffer::from_vec(buf.into_vec());
            let decoded = BasicHeader::decode(&mut reader).unwrap();
            assert_eq!(decoded, header);
        }
    }

    #[test]
    fn format_nonzero_for_unknown_chunk_id_is_bad_message() {
        let mut dechunker = Dechunker::new();
        let mut buf = Buffer::with_capacity(8);
        let header = BasicHeader { format: 3, chunk_id: 7 };
        assert!(matches!(dechunker.feed_chunk(header, &mut buf), Err(Error::BadMessage(_))));
    }

    #[test]
    fn slot_cap_overflow_fails_the_connection() {
        let mut dechunker = Dechunker::new();
        for id in 2..2 + MAX_CHUNK_SLOTS as u32 {
            let bytes = Chunker::chunk(0, id, 0, 0, 0x14, 1, b"x", 128);
            let mut buf = Buffer::from_vec(bytes);
            let header = BasicHeader::decode(&mut buf).unwrap();
            dechunker.feed_chunk(header, &mut buf).unwrap();
        }
        let bytes = Chunker::chunk(0, 2 + MAX_CHUNK_SLOTS as u32, 0, 0, 0x14, 1, b"x", 128);
        let mut buf = Buffer::from_vec(bytes);
        let header = BasicHeader::decode(&mut buf).unwrap();
        assert!(matches!(dechunker.feed_chunk(header, &mut buf), Err(Error::Overflow)));
    }

    #[test]
    fn extended_timestamp_round_trips() {
        let payload = b"hello world".to_vec();
        let bytes = Chunker::chunk(0, 5, EXTENDED_TIMESTAMP_MARKER + 10, 0, 0x12, 2, &payload, 128);
        let mut buf = Buffer::from_vec(bytes);
        let mut dechunker = Dechunker::new();
        let header = BasicHeader::decode(&mut buf).unwrap();
        let delivered = dechunker.feed_chunk(header, &mut buf).unwrap().unwrap();
        assert_eq!(delivered.timestamp, EXTENDED_TIMESTAMP_MARKER + 10);
        assert_eq!(delivered.payload, payload);
    }
}
