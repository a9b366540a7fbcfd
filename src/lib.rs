//! RTMP live-media ingest/relay server library
//!
//! Publishers push audio/video over a persistent TCP connection; the server
//! caches the current group of pictures per stream and fans frames out to
//! every subscriber of the same application name in real time.
//!
//! Pipeline per connection:
//!
//! ```text
//! raw bytes -> Handshake -> ChunkDecoder -> SessionHandler -> Stream fan-out
//!                                                |                 |
//!                                                v                 v
//!                                          ChunkEncoder  ->  subscriber sockets
//! ```
//!
//! The crate exposes the protocol codecs (`protocol`, `amf`), the stream
//! registry (`registry`), the per-connection session machinery (`session`)
//! and the TCP server front end (`server`). Authorization and transcoding
//! are external collaborators reached through the traits in [`ports`].

pub mod amf;
pub mod error;
pub mod ports;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;

pub use amf::value::AmfValue;
pub use error::{Error, Result};
pub use ports::{AuthorizationPort, TranscodeJob, TranscodePort};
pub use protocol::message::{MediaMessage, ProtocolMessage};
pub use registry::{Stream, StreamRegistry};
pub use server::{RelayServer, ServerConfig};
