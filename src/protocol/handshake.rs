//! Server-side RTMP handshake
//!
//! Three-step exchange that must complete before any chunked traffic is
//! interpreted:
//!
//! ```text
//! Client                                   Server
//!   |------- C0 (1 byte: version) --------->|
//!   |------- C1 (1536 bytes: time+random) ->|
//!   |<------ S0 S1 S2 (1 + 2*1536 bytes) ---|
//!   |------- C2 (1536 bytes: echo S1) ----->|
//!   |          [handshake complete]          |
//! ```
//!
//! This is the simple handshake (no HMAC digest). A version other than 3 is
//! logged and accepted; strict servers reject, but common encoders vary.
//! After [`HandshakeState::Done`] the state machine never touches the byte
//! stream again.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::protocol::constants::{HANDSHAKE_RANDOM_SIZE, HANDSHAKE_SIZE, RTMP_VERSION};

/// Handshake progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Waiting for the client's C0+C1
    AwaitGreeting,
    /// S0S1S2 sent, waiting for the client's C2
    AwaitConfirm,
    /// Exchange complete; all further bytes are chunk data
    Done,
}

/// Server handshake state machine
///
/// Resumable: [`Handshake::advance`] consumes nothing until a full step is
/// buffered, so arbitrarily fragmented reads are fine.
#[derive(Debug)]
pub struct Handshake {
    state: HandshakeState,
}

impl Handshake {
    /// Create a handshake in the initial state
    pub fn new() -> Self {
        Self {
            state: HandshakeState::AwaitGreeting,
        }
    }

    /// Current state
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Check whether the exchange has completed
    pub fn is_done(&self) -> bool {
        self.state == HandshakeState::Done
    }

    /// Consume buffered peer bytes and produce the next response, if any
    ///
    /// Returns `None` when more bytes are needed or nothing is owed to the
    /// peer; leftover bytes stay in `buf` untouched.
    pub fn advance(&mut self, buf: &mut BytesMut) -> Option<Bytes> {
        match self.state {
            HandshakeState::AwaitGreeting => {
                if buf.len() < 1 + HANDSHAKE_SIZE {
                    return None;
                }

                // C0
                let version = buf.get_u8();
                if version != RTMP_VERSION {
                    tracing::info!(version = version, "Client requests unsupported version");
                }

                // C1: timestamp + zero + random
                let timestamp = buf.get_u32();
                let _zero = buf.get_u32();
                buf.advance(HANDSHAKE_RANDOM_SIZE);

                self.state = HandshakeState::AwaitConfirm;
                Some(generate_s0s1s2(timestamp))
            }
            HandshakeState::AwaitConfirm => {
                if buf.len() < HANDSHAKE_SIZE {
                    return None;
                }

                // C2: echo of S1, consumed without verification
                buf.advance(HANDSHAKE_SIZE);

                self.state = HandshakeState::Done;
                tracing::debug!("Handshake complete");
                None
            }
            HandshakeState::Done => None,
        }
    }
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the S0+S1+S2 reply
///
/// S1 carries a zero timestamp and random fill; S2 echoes the client's C1
/// timestamp with fresh random fill.
fn generate_s0s1s2(peer_timestamp: u32) -> Bytes {
    let mut resp = BytesMut::with_capacity(1 + HANDSHAKE_SIZE * 2);

    // S0
    resp.put_u8(RTMP_VERSION);

    // S1
    resp.put_u32(0);
    resp.put_u32(0);
    put_random(&mut resp);

    // S2
    resp.put_u32(peer_timestamp);
    resp.put_u32(0);
    put_random(&mut resp);

    resp.freeze()
}

/// Fill with pseudo-random bytes
///
/// The handshake random block carries no security weight, so a seeded LCG
/// avoids pulling in an RNG dependency.
fn put_random(buf: &mut BytesMut) {
    let mut seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0x5DEECE66D);

    let mut block = [0u8; HANDSHAKE_RANDOM_SIZE];
    for chunk in block.chunks_mut(8) {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = seed.to_le_bytes();
        chunk.copy_from_slice(&bytes[..chunk.len()]);
    }
    buf.put_slice(&block);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_c0c1(timestamp: u32) -> BytesMut {
        let mut buf = BytesMut::with_capacity(1 + HANDSHAKE_SIZE);
        buf.put_u8(RTMP_VERSION);
        buf.put_u32(timestamp);
        buf.put_u32(0);
        buf.put_slice(&[0xAB; HANDSHAKE_RANDOM_SIZE]);
        buf
    }

    #[test]
    fn test_full_exchange() {
        let mut handshake = Handshake::new();
        assert_eq!(handshake.state(), HandshakeState::AwaitGreeting);

        let mut buf = client_c0c1(1234);
        let reply = handshake.advance(&mut buf).expect("expected S0S1S2");
        assert_eq!(reply.len(), 1 + HANDSHAKE_SIZE * 2);
        assert_eq!(reply[0], RTMP_VERSION);
        assert_eq!(handshake.state(), HandshakeState::AwaitConfirm);
        assert!(buf.is_empty());

        // C2
        buf.put_slice(&[0u8; HANDSHAKE_SIZE]);
        assert!(handshake.advance(&mut buf).is_none());
        assert!(handshake.is_done());
    }

    #[test]
    fn test_s2_echoes_client_timestamp() {
        let mut handshake = Handshake::new();
        let mut buf = client_c0c1(0xDEADBEEF);

        let reply = handshake.advance(&mut buf).unwrap();
        let s2 = &reply[1 + HANDSHAKE_SIZE..];
        assert_eq!(&s2[0..4], &0xDEADBEEFu32.to_be_bytes());
        assert_eq!(&s2[4..8], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_s1_timestamp_is_zero() {
        let mut handshake = Handshake::new();
        let mut buf = client_c0c1(42);

        let reply = handshake.advance(&mut buf).unwrap();
        let s1 = &reply[1..1 + HANDSHAKE_SIZE];
        assert_eq!(&s1[0..8], &[0u8; 8]);
    }

    #[test]
    fn test_partial_greeting_consumes_nothing() {
        let mut handshake = Handshake::new();
        let mut buf = BytesMut::new();
        buf.put_slice(&[RTMP_VERSION; 100]);

        assert!(handshake.advance(&mut buf).is_none());
        assert_eq!(buf.len(), 100);
        assert_eq!(handshake.state(), HandshakeState::AwaitGreeting);
    }

    #[test]
    fn test_partial_confirm_consumes_nothing() {
        let mut handshake = Handshake::new();
        let mut buf = client_c0c1(0);
        handshake.advance(&mut buf).unwrap();

        buf.put_slice(&[0u8; 1000]);
        assert!(handshake.advance(&mut buf).is_none());
        assert_eq!(buf.len(), 1000);
        assert_eq!(handshake.state(), HandshakeState::AwaitConfirm);
    }

    #[test]
    fn test_version_mismatch_is_permitted() {
        let mut handshake = Handshake::new();
        let mut buf = client_c0c1(0);
        buf[0] = 31;

        assert!(handshake.advance(&mut buf).is_some());
        assert_eq!(handshake.state(), HandshakeState::AwaitConfirm);
    }

    #[test]
    fn test_excess_bytes_left_in_buffer() {
        let mut handshake = Handshake::new();
        let mut buf = client_c0c1(0);
        // chunk data arriving glued to C2
        buf.put_slice(&[0u8; HANDSHAKE_SIZE]);
        buf.put_slice(&[0x02, 0x03, 0x04]);

        handshake.advance(&mut buf);
        handshake.advance(&mut buf);

        assert!(handshake.is_done());
        assert_eq!(buf.as_ref(), &[0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_done_state_ignores_input() {
        let mut handshake = Handshake::new();
        let mut buf = client_c0c1(0);
        handshake.advance(&mut buf);
        buf.put_slice(&[0u8; HANDSHAKE_SIZE]);
        handshake.advance(&mut buf);

        buf.put_slice(&[1, 2, 3]);
        assert!(handshake.advance(&mut buf).is_none());
        assert_eq!(buf.len(), 3);
    }
}
