//! Error types
//!
//! One enum per protocol area plus a crate-wide [`Error`] that they all
//! convert into. Framing errors close the connection; session errors are
//! answered with a status message first; port errors are retried a bounded
//! number of times before they become fatal.

use std::fmt;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// I/O error on the underlying socket
    Io(std::io::Error),
    /// Handshake failure
    Handshake(HandshakeError),
    /// Chunk framing failure
    Chunk(ChunkError),
    /// AMF0 codec failure
    Amf(AmfError),
    /// Session-level protocol violation
    Session(SessionError),
    /// External collaborator failure
    Port(PortError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "io error: {}", e),
            Error::Handshake(e) => write!(f, "handshake error: {}", e),
            Error::Chunk(e) => write!(f, "chunk error: {}", e),
            Error::Amf(e) => write!(f, "amf error: {}", e),
            Error::Session(e) => write!(f, "session error: {}", e),
            Error::Port(e) => write!(f, "port error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Handshake(e) => Some(e),
            Error::Chunk(e) => Some(e),
            Error::Amf(e) => Some(e),
            Error::Session(e) => Some(e),
            Error::Port(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<HandshakeError> for Error {
    fn from(e: HandshakeError) -> Self {
        Error::Handshake(e)
    }
}

impl From<ChunkError> for Error {
    fn from(e: ChunkError) -> Self {
        Error::Chunk(e)
    }
}

impl From<AmfError> for Error {
    fn from(e: AmfError) -> Self {
        Error::Amf(e)
    }
}

impl From<SessionError> for Error {
    fn from(e: SessionError) -> Self {
        Error::Session(e)
    }
}

impl From<PortError> for Error {
    fn from(e: PortError) -> Self {
        Error::Port(e)
    }
}

/// Handshake errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeError {
    /// Peer greeting shorter than the fixed handshake layout allows
    TruncatedGreeting,
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeError::TruncatedGreeting => write!(f, "truncated handshake greeting"),
        }
    }
}

impl std::error::Error for HandshakeError {}

/// Chunk framing errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    /// Format 1/2/3 chunk arrived with no prior complete header for its id
    MissingPriorHeader(u32),
    /// Declared message length exceeds the configured maximum
    MessageTooLarge(usize),
    /// Peer sent a zero or absurd chunk size
    InvalidChunkSize(u32),
    /// Control message payload shorter than its fixed layout
    TruncatedControl(u8),
}

impl fmt::Display for ChunkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkError::MissingPriorHeader(csid) => {
                write!(f, "no prior header for chunk stream {}", csid)
            }
            ChunkError::MessageTooLarge(len) => write!(f, "message length {} too large", len),
            ChunkError::InvalidChunkSize(size) => write!(f, "invalid chunk size {}", size),
            ChunkError::TruncatedControl(type_id) => {
                write!(f, "truncated control message type {}", type_id)
            }
        }
    }
}

impl std::error::Error for ChunkError {}

/// AMF0 codec errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmfError {
    /// Buffer ended in the middle of a value
    UnexpectedEof,
    /// Value nesting exceeds the decode depth limit
    NestingTooDeep,
    /// String bytes are not valid UTF-8
    InvalidUtf8,
    /// Object properties not terminated by the end marker
    InvalidObjectEnd,
}

impl fmt::Display for AmfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmfError::UnexpectedEof => write!(f, "unexpected end of buffer"),
            AmfError::NestingTooDeep => write!(f, "nesting too deep"),
            AmfError::InvalidUtf8 => write!(f, "invalid utf-8 in string"),
            AmfError::InvalidObjectEnd => write!(f, "missing object end marker"),
        }
    }
}

impl std::error::Error for AmfError {}

/// Session-level errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Peer requested the AMF3 object encoding
    UnsupportedObjectEncoding(u32),
    /// Publish with a stream type other than "live"
    UnsupportedStreamType(String),
    /// Command payload missing a required argument
    MalformedCommand(&'static str),
    /// Connection closed by protocol decision (play miss, publish rejection)
    Closed(&'static str),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::UnsupportedObjectEncoding(v) => {
                write!(f, "unsupported object encoding {}", v)
            }
            SessionError::UnsupportedStreamType(t) => {
                write!(f, "unsupported stream type {:?}", t)
            }
            SessionError::MalformedCommand(cmd) => write!(f, "malformed {} command", cmd),
            SessionError::Closed(reason) => write!(f, "connection closed: {}", reason),
        }
    }
}

impl std::error::Error for SessionError {}

/// External collaborator (authorization/transcode) errors
#[derive(Debug, Clone)]
pub struct PortError {
    message: String,
}

impl PortError {
    /// Wrap a collaborator failure description
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for PortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for PortError {}
