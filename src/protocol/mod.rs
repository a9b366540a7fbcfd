//! RTMP protocol engine
//!
//! Byte-level building blocks in dependency order: wire constants, the
//! one-time handshake, the chunk header codec, protocol message types and
//! builders, then the stateful chunk decoder/encoder that sit on either
//! side of a connection.

pub mod constants;
pub mod decoder;
pub mod encoder;
pub mod handshake;
pub mod header;
pub mod message;

pub use decoder::ChunkDecoder;
pub use encoder::ChunkEncoder;
pub use handshake::{Handshake, HandshakeState};
pub use header::ChunkHeader;
pub use message::{MediaMessage, ProtocolMessage};
