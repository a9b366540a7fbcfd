//! Chunk encoder
//!
//! Fragments outbound protocol messages into chunks. The first chunk of a
//! message carries a full or compact message header; every following chunk
//! carries only a format-3 basic header.
//!
//! Header format selection mirrors common encoder behavior: the first
//! audio message, the first video message, and every non-media message get
//! a full format-0 header; subsequent media rides on format-1 headers that
//! carry only the timestamp delta. Format-0 media timestamps are
//! milliseconds elapsed since the encoder was created.

use std::time::Instant;

use bytes::{BufMut, BytesMut};

use crate::protocol::constants::*;
use crate::protocol::header::put_basic_header;
use crate::protocol::message::ProtocolMessage;

/// Stateful per-connection chunk encoder
#[derive(Debug)]
pub struct ChunkEncoder {
    /// Our outbound chunk size, updated when a set-chunk-size is encoded
    chunk_size: u32,
    /// Baseline for format-0 media timestamps
    epoch: Instant,
    sent_audio: bool,
    sent_video: bool,
}

impl ChunkEncoder {
    /// Create an encoder with the protocol default chunk size
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            epoch: Instant::now(),
            sent_audio: false,
            sent_video: false,
        }
    }

    /// Current outbound chunk size
    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Fragment `message` into chunks appended to `dst`
    pub fn encode(&mut self, message: &ProtocolMessage, dst: &mut BytesMut) {
        let header = &message.header;
        let payload = &message.payload;

        match self.pick_format(message) {
            CHUNK_TYPE_1 => {
                put_basic_header(dst, CHUNK_TYPE_1, header.csid);
                let extended = put_u24_or_saturate(dst, header.timestamp_delta);
                put_u24(dst, payload.len() as u32);
                dst.put_u8(header.message_type_id);
                if let Some(value) = extended {
                    dst.put_u32(value);
                }
            }
            _ => {
                let timestamp = if message.is_media() {
                    self.epoch.elapsed().as_millis() as u32
                } else {
                    0
                };
                put_basic_header(dst, CHUNK_TYPE_0, header.csid);
                let extended = put_u24_or_saturate(dst, timestamp);
                put_u24(dst, payload.len() as u32);
                dst.put_u8(header.message_type_id);
                dst.put_u32_le(header.message_stream_id);
                if let Some(value) = extended {
                    dst.put_u32(value);
                }
            }
        }

        // payload split at the chunk size, continuations under format 3
        let chunk = self.chunk_size as usize;
        let mut offset = 0;
        loop {
            let end = (offset + chunk).min(payload.len());
            dst.put_slice(&payload[offset..end]);
            offset = end;
            if offset >= payload.len() {
                break;
            }
            put_basic_header(dst, CHUNK_TYPE_3, header.csid);
        }

        // our own announcement changes the size for everything after it
        if header.message_type_id == MSG_SET_CHUNK_SIZE && payload.len() >= 4 {
            self.chunk_size =
                u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
        }
    }

    fn pick_format(&mut self, message: &ProtocolMessage) -> u8 {
        match message.type_id() {
            MSG_AUDIO => {
                if self.sent_audio {
                    CHUNK_TYPE_1
                } else {
                    self.sent_audio = true;
                    CHUNK_TYPE_0
                }
            }
            MSG_VIDEO => {
                if self.sent_video {
                    CHUNK_TYPE_1
                } else {
                    self.sent_video = true;
                    CHUNK_TYPE_0
                }
            }
            _ => CHUNK_TYPE_0,
        }
    }
}

impl Default for ChunkEncoder {
    fn default() -> Self {
        Self::new()
    }
}

fn put_u24(buf: &mut BytesMut, value: u32) {
    buf.put_u8((value >> 16) as u8);
    buf.put_u8((value >> 8) as u8);
    buf.put_u8(value as u8);
}

/// Write a 3-byte timestamp field, saturating to 0xFFFFFF when the value
/// needs the extended timestamp; returns the value to append after the
/// fixed header in that case
fn put_u24_or_saturate(buf: &mut BytesMut, value: u32) -> Option<u32> {
    if value >= MAX_TIMESTAMP {
        put_u24(buf, MAX_TIMESTAMP);
        Some(value)
    } else {
        put_u24(buf, value);
        None
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::protocol::message;

    fn msg(type_id: u8, csid: u32, payload: Vec<u8>) -> ProtocolMessage {
        ProtocolMessage::new(type_id, csid, DEFAULT_MESSAGE_STREAM_ID, Bytes::from(payload))
    }

    #[test]
    fn test_single_chunk_layout() {
        let mut encoder = ChunkEncoder::new();
        let mut dst = BytesMut::new();
        encoder.encode(&msg(MSG_COMMAND_AMF0, 3, vec![1, 2, 3]), &mut dst);

        assert_eq!(dst.len(), 12 + 3);
        assert_eq!(dst[0], 0x03); // format 0, csid 3
        assert_eq!(&dst[1..4], &[0, 0, 0]); // non-media timestamp
        assert_eq!(&dst[4..7], &[0, 0, 3]); // length
        assert_eq!(dst[7], MSG_COMMAND_AMF0);
        assert_eq!(&dst[8..12], &42u32.to_le_bytes()); // stream id LE
        assert_eq!(&dst[12..], &[1, 2, 3]);
    }

    #[test]
    fn test_multi_chunk_continuation_headers() {
        let mut encoder = ChunkEncoder::new();
        let mut dst = BytesMut::new();
        encoder.encode(&msg(MSG_DATA_AMF0, 3, vec![0xAA; 300]), &mut dst);

        // 300 bytes at chunk size 128: 3 chunks, 2 format-3 continuations
        assert_eq!(dst.len(), 12 + 300 + 2);
        assert_eq!(dst[12 + 128], (CHUNK_TYPE_3 << 6) | 3);
        assert_eq!(dst[12 + 128 + 1 + 128], (CHUNK_TYPE_3 << 6) | 3);
    }

    #[test]
    fn test_exact_chunk_size_has_no_continuation() {
        let mut encoder = ChunkEncoder::new();
        let mut dst = BytesMut::new();
        encoder.encode(&msg(MSG_DATA_AMF0, 3, vec![0xAA; 128]), &mut dst);
        assert_eq!(dst.len(), 12 + 128);
    }

    #[test]
    fn test_empty_payload_is_header_only() {
        let mut encoder = ChunkEncoder::new();
        let mut dst = BytesMut::new();
        encoder.encode(&msg(MSG_COMMAND_AMF0, 3, vec![]), &mut dst);
        assert_eq!(dst.len(), 12);
        assert_eq!(&dst[4..7], &[0, 0, 0]);
    }

    #[test]
    fn test_first_media_full_then_compact() {
        let mut encoder = ChunkEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(&msg(MSG_VIDEO, 6, vec![0x17, 0x01]), &mut dst);
        assert_eq!(dst[0] >> 6, CHUNK_TYPE_0);

        dst.clear();
        encoder.encode(&msg(MSG_VIDEO, 6, vec![0x27, 0x01]), &mut dst);
        assert_eq!(dst[0] >> 6, CHUNK_TYPE_1);
        // 7-byte message header after the basic header
        assert_eq!(dst.len(), 1 + 7 + 2);
    }

    #[test]
    fn test_audio_and_video_tracked_separately() {
        let mut encoder = ChunkEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(&msg(MSG_VIDEO, 6, vec![0x17]), &mut dst);
        dst.clear();
        // first audio still gets a full header
        encoder.encode(&msg(MSG_AUDIO, 4, vec![0xAF]), &mut dst);
        assert_eq!(dst[0] >> 6, CHUNK_TYPE_0);
    }

    #[test]
    fn test_compact_header_carries_delta() {
        let mut encoder = ChunkEncoder::new();
        let mut dst = BytesMut::new();
        encoder.encode(&msg(MSG_AUDIO, 4, vec![0xAF]), &mut dst);
        dst.clear();

        let mut second = msg(MSG_AUDIO, 4, vec![0xAF, 0x01]);
        second.header.timestamp_delta = 33;
        encoder.encode(&second, &mut dst);

        assert_eq!(&dst[1..4], &[0, 0, 33]);
    }

    #[test]
    fn test_set_chunk_size_applies_to_later_messages() {
        let mut encoder = ChunkEncoder::new();
        let mut dst = BytesMut::new();
        encoder.encode(&message::set_chunk_size(4096), &mut dst);
        assert_eq!(encoder.chunk_size(), 4096);

        dst.clear();
        encoder.encode(&msg(MSG_DATA_AMF0, 3, vec![0xAA; 300]), &mut dst);
        // fits in one 4096-byte chunk now
        assert_eq!(dst.len(), 12 + 300);
    }

    #[test]
    fn test_two_byte_csid_on_continuations() {
        let mut encoder = ChunkEncoder::new();
        let mut dst = BytesMut::new();
        encoder.encode(&msg(MSG_DATA_AMF0, 100, vec![0xAA; 200]), &mut dst);

        // 2-byte basic header: format bits then csid - 64
        assert_eq!(dst[0], 0x00);
        assert_eq!(dst[1], 100 - 64);
        let continuation = 2 + 11 + 128;
        assert_eq!(dst[continuation], CHUNK_TYPE_3 << 6);
        assert_eq!(dst[continuation + 1], 100 - 64);
    }

    #[test]
    fn test_extended_delta() {
        let mut encoder = ChunkEncoder::new();
        let mut dst = BytesMut::new();
        encoder.encode(&msg(MSG_AUDIO, 4, vec![0xAF]), &mut dst);
        dst.clear();

        let mut second = msg(MSG_AUDIO, 4, vec![0xAF]);
        second.header.timestamp_delta = 0x0100_0000;
        encoder.encode(&second, &mut dst);

        assert_eq!(&dst[1..4], &[0xFF, 0xFF, 0xFF]);
        assert_eq!(&dst[8..12], &0x0100_0000u32.to_be_bytes());
    }
}
