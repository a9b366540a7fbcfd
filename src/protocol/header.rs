//! Chunk header codec
//!
//! Every chunk starts with a basic header (format + chunk stream id in 1-3
//! bytes) followed by a format-dependent message header:
//!
//! ```text
//! format 0 - 11 bytes: timestamp(3) + length(3) + type(1) + stream id(4 LE)
//! format 1 -  7 bytes: delta(3) + length(3) + type(1)
//! format 2 -  3 bytes: delta(3)
//! format 3 -  0 bytes
//! ```
//!
//! Formats 1-3 omit fields that are inherited from the last complete header
//! seen on the same chunk stream id. A 3-byte timestamp/delta of 0xFFFFFF
//! means the real value follows as a 4-byte extended timestamp.
//!
//! Byte order peculiarity: everything is big-endian except the message
//! stream id in a format-0 header, which is little-endian on the wire.

use bytes::{BufMut, BytesMut};

use crate::protocol::constants::*;

/// Decoded chunk header
///
/// `header_length` records how many bytes the header occupied on the wire;
/// the decoder uses it for acknowledgement accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Header format (0-3)
    pub format: u8,
    /// Chunk stream id
    pub csid: u32,
    /// Absolute timestamp (format 0, or inherited)
    pub timestamp: u32,
    /// Timestamp delta (formats 1-2, or inherited)
    pub timestamp_delta: u32,
    /// Extended timestamp, present when the 3-byte field saturates
    pub extended_timestamp: Option<u32>,
    /// Total message payload length in bytes
    pub message_length: u32,
    /// Message type id
    pub message_type_id: u8,
    /// Message stream id (little-endian on the wire)
    pub message_stream_id: u32,
    /// Bytes this header consumed on the wire
    pub header_length: usize,
}

impl ChunkHeader {
    /// Build a full (format 0) header for an outbound message
    pub fn message(message_type_id: u8, csid: u32, message_stream_id: u32, length: u32) -> Self {
        Self {
            format: CHUNK_TYPE_0,
            csid,
            message_type_id,
            message_stream_id,
            message_length: length,
            ..Default::default()
        }
    }

    /// Parse a complete chunk header from the front of `buf`
    ///
    /// Returns `None` when the buffer does not yet hold the whole header;
    /// nothing is consumed in that case. On success the caller must advance
    /// the buffer by `header_length`.
    pub fn parse(buf: &[u8]) -> Option<ChunkHeader> {
        let first = *buf.first()?;
        let format = first >> 6;
        let low = u32::from(first & 0x3F);

        // Basic header: 2- and 3-byte forms encode ids >= 64
        let (csid, mut offset) = match low {
            0 => (u32::from(*buf.get(1)?) + 64, 2),
            1 => {
                let b1 = u32::from(*buf.get(1)?);
                let b2 = u32::from(*buf.get(2)?);
                (b2 * 256 + b1 + 64, 3)
            }
            _ => (low, 1),
        };

        let mut header = ChunkHeader {
            format,
            csid,
            ..Default::default()
        };

        match format {
            CHUNK_TYPE_0 => {
                if buf.len() < offset + 11 {
                    return None;
                }
                header.timestamp = read_u24(&buf[offset..]);
                header.message_length = read_u24(&buf[offset + 3..]);
                header.message_type_id = buf[offset + 6];
                header.message_stream_id = u32::from_le_bytes([
                    buf[offset + 7],
                    buf[offset + 8],
                    buf[offset + 9],
                    buf[offset + 10],
                ]);
                offset += 11;
                if header.timestamp == MAX_TIMESTAMP {
                    if buf.len() < offset + 4 {
                        return None;
                    }
                    header.extended_timestamp = Some(read_u32(&buf[offset..]));
                    offset += 4;
                }
            }
            CHUNK_TYPE_1 => {
                if buf.len() < offset + 7 {
                    return None;
                }
                header.timestamp_delta = read_u24(&buf[offset..]);
                header.message_length = read_u24(&buf[offset + 3..]);
                header.message_type_id = buf[offset + 6];
                offset += 7;
                if header.timestamp_delta == MAX_TIMESTAMP {
                    if buf.len() < offset + 4 {
                        return None;
                    }
                    header.extended_timestamp = Some(read_u32(&buf[offset..]));
                    offset += 4;
                }
            }
            CHUNK_TYPE_2 => {
                if buf.len() < offset + 3 {
                    return None;
                }
                header.timestamp_delta = read_u24(&buf[offset..]);
                offset += 3;
                if header.timestamp_delta == MAX_TIMESTAMP {
                    if buf.len() < offset + 4 {
                        return None;
                    }
                    header.extended_timestamp = Some(read_u32(&buf[offset..]));
                    offset += 4;
                }
            }
            // CHUNK_TYPE_3: no message header
            _ => {}
        }

        header.header_length = offset;
        Some(header)
    }

    /// Fill omitted fields from the last complete header on the same id
    pub fn inherit_from(&mut self, prior: &ChunkHeader) {
        match self.format {
            CHUNK_TYPE_1 => {
                self.message_stream_id = prior.message_stream_id;
                self.timestamp = prior.timestamp;
            }
            CHUNK_TYPE_2 => {
                self.message_stream_id = prior.message_stream_id;
                self.timestamp = prior.timestamp;
                self.message_length = prior.message_length;
                self.message_type_id = prior.message_type_id;
            }
            CHUNK_TYPE_3 => {
                self.message_stream_id = prior.message_stream_id;
                self.timestamp = prior.timestamp;
                self.timestamp_delta = prior.timestamp_delta;
                self.message_length = prior.message_length;
                self.message_type_id = prior.message_type_id;
            }
            _ => {}
        }
    }
}

/// Write the 1/2/3-byte basic header for (format, csid)
///
/// Ids 0-63 fit the first byte, 64-319 use the 2-byte form, anything above
/// the 3-byte form. The decoder applies the same thresholds; the symmetry
/// is load-bearing for interoperability.
pub fn put_basic_header(buf: &mut BytesMut, format: u8, csid: u32) {
    if csid >= 64 + 256 {
        buf.put_u8((format << 6) | 1);
        buf.put_u8(((csid - 64) & 0xFF) as u8);
        buf.put_u8(((csid - 64) >> 8) as u8);
    } else if csid >= 64 {
        buf.put_u8(format << 6);
        buf.put_u8((csid - 64) as u8);
    } else {
        buf.put_u8((format << 6) | csid as u8);
    }
}

fn read_u24(buf: &[u8]) -> u32 {
    u32::from(buf[0]) << 16 | u32::from(buf[1]) << 8 | u32::from(buf[2])
}

fn read_u32(buf: &[u8]) -> u32 {
    u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]])
}
