//! Per-connection session layer
//!
//! [`Connection`] owns the socket lifecycle: handshake, read loop, and the
//! writer task. [`SessionHandler`] interprets decoded messages and carries
//! the session's role (publisher, subscriber, or neither).

pub mod connection;
pub mod handler;

pub use connection::{Connection, ConnectionHandle, Outbound};
pub use handler::SessionHandler;
