//! Stream registry and fan-out
//!
//! The registry maps application names to live [`Stream`]s. A publisher
//! owns a stream for the duration of its session; subscribers attach to
//! the stream published under their own connect application name and
//! receive metadata, cached codec configuration, the buffered group of
//! pictures, and then live media in that order, so a late joiner renders
//! video without waiting for the next key frame.

pub mod error;
pub mod store;
pub mod stream;

pub use error::RegistryError;
pub use store::StreamRegistry;
pub use stream::Stream;
