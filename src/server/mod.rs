//! Server configuration and TCP listener

pub mod config;
pub mod listener;

pub use config::ServerConfig;
pub use listener::RelayServer;
