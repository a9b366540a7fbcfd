//! AMF0 serialization
//!
//! Command and metadata payloads are AMF0-encoded sequences of tagged
//! values. [`value::AmfValue`] is the in-memory representation, [`amf0`]
//! the wire codec.

pub mod amf0;
pub mod value;

pub use value::AmfValue;
