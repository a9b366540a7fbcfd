//! RTMP wire constants

/// Protocol version carried in C0/S0
pub const RTMP_VERSION: u8 = 3;

/// Size of the C1/S1/C2/S2 handshake packets
pub const HANDSHAKE_SIZE: usize = 1536;

/// Random payload of a handshake packet (timestamp + zero field excluded)
pub const HANDSHAKE_RANDOM_SIZE: usize = HANDSHAKE_SIZE - 8;

/// Largest timestamp representable in the 3-byte header field; larger
/// values spill into the extended timestamp
pub const MAX_TIMESTAMP: u32 = 0xFF_FFFF;

/// Chunk size both peers start with before any set-chunk-size
pub const DEFAULT_CHUNK_SIZE: u32 = 128;

/// Outbound chunk size the server negotiates during connect
pub const DEFAULT_OUTPUT_CHUNK_SIZE: u32 = 4096;

/// Window acknowledgement size the server announces
pub const DEFAULT_WINDOW_ACK_SIZE: u32 = 5_000_000;

/// Peer bandwidth the server announces (dynamic limit type)
pub const DEFAULT_PEER_BANDWIDTH: u32 = 5_000_000;

/// Received-bytes watermark that forces an acknowledgement and resets the
/// counter, keeping it clear of i32 overflow
pub const ACK_ROLLOVER_WATERMARK: u32 = 0x7000_0000;

/// Fixed message stream id returned by createStream. The chunk layer treats
/// it as opaque; one stream per connection is assumed.
pub const DEFAULT_MESSAGE_STREAM_ID: u32 = 42;

/// Chunk stream id used for protocol control messages
pub const CSID_PROTOCOL_CONTROL: u32 = 2;

/// Chunk stream id used for command/data messages
pub const CSID_COMMAND: u32 = 3;

// Chunk header formats
pub const CHUNK_TYPE_0: u8 = 0; // 11 bytes: timestamp(3) + length(3) + type(1) + stream id(4)
pub const CHUNK_TYPE_1: u8 = 1; // 7 bytes: delta(3) + length(3) + type(1)
pub const CHUNK_TYPE_2: u8 = 2; // 3 bytes: delta(3)
pub const CHUNK_TYPE_3: u8 = 3; // no message header

// Protocol control message types
pub const MSG_SET_CHUNK_SIZE: u8 = 1;
pub const MSG_ABORT: u8 = 2;
pub const MSG_ACKNOWLEDGEMENT: u8 = 3;
pub const MSG_USER_CONTROL: u8 = 4;
pub const MSG_WINDOW_ACK_SIZE: u8 = 5;
pub const MSG_SET_PEER_BANDWIDTH: u8 = 6;

// Media message types
pub const MSG_AUDIO: u8 = 8;
pub const MSG_VIDEO: u8 = 9;

// Data and command message types
pub const MSG_DATA_AMF3: u8 = 15;
pub const MSG_COMMAND_AMF3: u8 = 17;
pub const MSG_DATA_AMF0: u8 = 18;
pub const MSG_COMMAND_AMF0: u8 = 20;

// User control event codes
pub const EVENT_STREAM_BEGIN: u16 = 0x00;
pub const EVENT_STREAM_EOF: u16 = 0x01;
pub const EVENT_STREAM_DRY: u16 = 0x02;
