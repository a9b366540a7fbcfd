//! Resumable chunk decoder
//!
//! Reassembles complete protocol messages from chunks multiplexed across
//! many chunk stream ids on one connection. Input arrives in arbitrary
//! fragments; the decoder checkpoints between `ReadHeader` and `Payload`
//! and consumes nothing until the current step is fully buffered, so a
//! partial read never corrupts state.
//!
//! Protocol control messages (set-chunk-size, window-ack-size,
//! acknowledgement, abort) are intercepted here and update decoder state
//! instead of being forwarded. Window acknowledgements owed to the peer
//! accumulate in an outgoing queue the connection drains after each feed.

use std::collections::HashMap;

use bytes::{Buf, BytesMut};

use crate::error::ChunkError;
use crate::protocol::constants::*;
use crate::protocol::header::ChunkHeader;
use crate::protocol::message::{self, ProtocolMessage};

/// Hard cap on a declared message length, well under the 24-bit field max
const MAX_MESSAGE_SIZE: usize = 8 * 1024 * 1024;

#[derive(Debug)]
enum DecodeState {
    /// Waiting for the next chunk header
    ReadHeader,
    /// Waiting for the current chunk's payload slice
    Payload(ChunkHeader),
}

/// Stateful per-connection chunk decoder
#[derive(Debug)]
pub struct ChunkDecoder {
    state: DecodeState,

    /// Peer's chunk size, updated by set-chunk-size
    chunk_size: u32,
    /// Peer's acknowledgement window, 0 until announced
    ack_window: u32,
    bytes_received: u32,
    last_acked: u32,

    /// Last complete (format 0/1/2) header per chunk stream id
    last_headers: HashMap<u32, ChunkHeader>,
    /// In-flight payload buffers per chunk stream id
    partials: HashMap<u32, BytesMut>,

    /// Acknowledgements owed to the peer
    outgoing: Vec<ProtocolMessage>,
}

impl ChunkDecoder {
    /// Create a decoder with protocol defaults
    pub fn new() -> Self {
        Self {
            state: DecodeState::ReadHeader,
            chunk_size: DEFAULT_CHUNK_SIZE,
            ack_window: 0,
            bytes_received: 0,
            last_acked: 0,
            last_headers: HashMap::new(),
            partials: HashMap::with_capacity(4),
            outgoing: Vec::new(),
        }
    }

    /// Peer's current chunk size
    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Peer's announced acknowledgement window
    pub fn ack_window(&self) -> u32 {
        self.ack_window
    }

    /// Take the acknowledgements owed to the peer
    pub fn drain_outgoing(&mut self) -> Vec<ProtocolMessage> {
        std::mem::take(&mut self.outgoing)
    }

    /// Consume as much of `src` as possible, appending complete messages
    /// to `out`
    ///
    /// Returns once `src` no longer holds the next full decode step; call
    /// again after more bytes arrive.
    pub fn decode(
        &mut self,
        src: &mut BytesMut,
        out: &mut Vec<ProtocolMessage>,
    ) -> Result<(), ChunkError> {
        loop {
            match &self.state {
                DecodeState::ReadHeader => {
                    let Some(mut header) = ChunkHeader::parse(src) else {
                        return Ok(());
                    };
                    src.advance(header.header_length);

                    match self.last_headers.get(&header.csid) {
                        Some(prior) => header.inherit_from(prior),
                        None => {
                            // Format 1 still carries length and type; 2 and 3
                            // are undecodable without a prior header
                            if header.format >= CHUNK_TYPE_2 {
                                return Err(ChunkError::MissingPriorHeader(header.csid));
                            }
                        }
                    }

                    let length = header.message_length as usize;
                    if length > MAX_MESSAGE_SIZE {
                        return Err(ChunkError::MessageTooLarge(length));
                    }

                    if header.format != CHUNK_TYPE_3 {
                        // A full header always starts a new message and
                        // becomes the inheritance source for its id
                        self.partials
                            .insert(header.csid, BytesMut::with_capacity(length));
                        self.last_headers.insert(header.csid, header.clone());
                    } else {
                        // Continuation, or a format-3 first chunk reusing
                        // the inherited length
                        self.partials
                            .entry(header.csid)
                            .or_insert_with(|| BytesMut::with_capacity(length));
                    }

                    self.state = DecodeState::Payload(header);
                }
                DecodeState::Payload(header) => {
                    let csid = header.csid;
                    let total = header.message_length as usize;
                    let buffered = self.partials.get(&csid).map_or(0, |b| b.len());
                    let want = (total - buffered).min(self.chunk_size as usize);

                    if src.len() < want {
                        return Ok(());
                    }

                    let partial = self
                        .partials
                        .get_mut(&csid)
                        .expect("payload state without partial buffer");
                    partial.extend_from_slice(&src.split_to(want));

                    let header = match std::mem::replace(&mut self.state, DecodeState::ReadHeader)
                    {
                        DecodeState::Payload(header) => header,
                        _ => unreachable!(),
                    };

                    if self.partials[&csid].len() < total {
                        continue;
                    }

                    let payload = self
                        .partials
                        .remove(&csid)
                        .expect("completed message without buffer")
                        .freeze();

                    self.account(header.header_length + total);

                    match header.message_type_id {
                        MSG_SET_CHUNK_SIZE => self.handle_chunk_size(&payload)?,
                        MSG_WINDOW_ACK_SIZE => self.handle_window_ack_size(&payload)?,
                        MSG_ACKNOWLEDGEMENT => self.handle_ack(&payload)?,
                        MSG_ABORT => self.handle_abort(&payload)?,
                        _ => out.push(ProtocolMessage { header, payload }),
                    }
                }
            }
        }
    }

    /// Acknowledgement accounting per completed message
    ///
    /// An acknowledgement is owed every `ack_window` received bytes, and
    /// unconditionally past the rollover watermark, where the counter
    /// resets to stay clear of overflow.
    fn account(&mut self, received: usize) {
        self.bytes_received = self.bytes_received.saturating_add(received as u32);

        if self.bytes_received > ACK_ROLLOVER_WATERMARK {
            self.outgoing.push(message::acknowledgement(self.bytes_received));
            self.bytes_received = 0;
            self.last_acked = 0;
            return;
        }

        if self.ack_window > 0 && self.bytes_received - self.last_acked >= self.ack_window {
            self.last_acked = self.bytes_received;
            self.outgoing.push(message::acknowledgement(self.last_acked));
        }
    }

    fn handle_chunk_size(&mut self, payload: &[u8]) -> Result<(), ChunkError> {
        let size = read_control_u32(payload, MSG_SET_CHUNK_SIZE)?;
        if size == 0 || size > 0x7FFF_FFFF {
            return Err(ChunkError::InvalidChunkSize(size));
        }
        tracing::debug!(chunk_size = size, "Peer changed chunk size");
        self.chunk_size = size;
        Ok(())
    }

    fn handle_window_ack_size(&mut self, payload: &[u8]) -> Result<(), ChunkError> {
        self.ack_window = read_control_u32(payload, MSG_WINDOW_ACK_SIZE)?;
        tracing::debug!(window = self.ack_window, "Peer changed acknowledgement window");
        Ok(())
    }

    fn handle_ack(&mut self, payload: &[u8]) -> Result<(), ChunkError> {
        let sequence = read_control_u32(payload, MSG_ACKNOWLEDGEMENT)?;
        tracing::debug!(sequence = sequence, "Acknowledgement received");
        Ok(())
    }

    /// Abort discards the in-flight message on the named chunk stream
    fn handle_abort(&mut self, payload: &[u8]) -> Result<(), ChunkError> {
        let csid = read_control_u32(payload, MSG_ABORT)?;
        tracing::debug!(csid = csid, "Abort received");
        self.partials.remove(&csid);
        Ok(())
    }
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn read_control_u32(payload: &[u8], type_id: u8) -> Result<u32, ChunkError> {
    if payload.len() < 4 {
        return Err(ChunkError::TruncatedControl(type_id));
    }
    Ok(u32::from_be_bytes([
        payload[0], payload[1], payload[2], payload[3],
    ]))
}
