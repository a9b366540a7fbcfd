//! Protocol messages and outbound message builders
//!
//! [`ProtocolMessage`] is the unit the chunk layer reassembles and
//! re-fragments. [`MediaMessage`] is the audio/video specialization that
//! the stream cache and fan-out operate on; its payload predicates drive
//! config caching and GOP boundaries.

use bytes::{BufMut, Bytes, BytesMut};

use crate::amf::{amf0, AmfValue};
use crate::protocol::constants::*;
use crate::protocol::header::ChunkHeader;

/// A complete protocol message: header plus reassembled payload
///
/// Cheap to clone; the payload is reference-counted.
#[derive(Debug, Clone)]
pub struct ProtocolMessage {
    /// Message header (csid, type, length, stream id, timestamps)
    pub header: ChunkHeader,
    /// Reassembled payload bytes
    pub payload: Bytes,
}

impl ProtocolMessage {
    /// Build a message, deriving the header length field from the payload
    pub fn new(message_type_id: u8, csid: u32, message_stream_id: u32, payload: Bytes) -> Self {
        Self {
            header: ChunkHeader::message(
                message_type_id,
                csid,
                message_stream_id,
                payload.len() as u32,
            ),
            payload,
        }
    }

    /// Message type id shorthand
    pub fn type_id(&self) -> u8 {
        self.header.message_type_id
    }

    /// Check whether this is an audio or video message
    pub fn is_media(&self) -> bool {
        matches!(self.type_id(), MSG_AUDIO | MSG_VIDEO)
    }
}

/// Audio/video message with payload-derived predicates
#[derive(Debug, Clone)]
pub struct MediaMessage {
    /// Header carried over from the decoded message
    pub header: ChunkHeader,
    /// Media payload
    pub payload: Bytes,
}

impl MediaMessage {
    /// Wrap a decoded media message
    pub fn from_message(message: &ProtocolMessage) -> Self {
        Self {
            header: message.header.clone(),
            payload: message.payload.clone(),
        }
    }

    /// Convert back into a relayable protocol message
    pub fn to_message(&self) -> ProtocolMessage {
        ProtocolMessage {
            header: self.header.clone(),
            payload: self.payload.clone(),
        }
    }

    /// Check whether this is an audio message
    pub fn is_audio(&self) -> bool {
        self.header.message_type_id == MSG_AUDIO
    }

    /// Check whether this is a video message
    pub fn is_video(&self) -> bool {
        self.header.message_type_id == MSG_VIDEO
    }

    /// Video key frame: frame-type nibble 1, AVC codec id 7
    pub fn is_key_frame(&self) -> bool {
        self.payload.len() > 1 && self.payload[0] == 0x17
    }

    /// Codec configuration frame (sequence header)
    ///
    /// The second payload byte is the AVC/AAC packet type; 0x00 marks the
    /// decoder configuration record for both codecs.
    pub fn is_config(&self) -> bool {
        self.payload.len() > 1 && self.payload[1] == 0x00
    }
}

/// Outbound acknowledgement: bytes received so far
pub fn acknowledgement(sequence: u32) -> ProtocolMessage {
    let mut payload = BytesMut::with_capacity(4);
    payload.put_u32(sequence);
    ProtocolMessage::new(MSG_ACKNOWLEDGEMENT, CSID_PROTOCOL_CONTROL, 0, payload.freeze())
}

/// Window acknowledgement size announcement
pub fn window_ack_size(size: u32) -> ProtocolMessage {
    let mut payload = BytesMut::with_capacity(4);
    payload.put_u32(size);
    ProtocolMessage::new(MSG_WINDOW_ACK_SIZE, CSID_PROTOCOL_CONTROL, 0, payload.freeze())
}

/// Peer bandwidth announcement (limit type 2 = dynamic)
pub fn set_peer_bandwidth(bandwidth: u32, limit_type: u8) -> ProtocolMessage {
    let mut payload = BytesMut::with_capacity(5);
    payload.put_u32(bandwidth);
    payload.put_u8(limit_type);
    ProtocolMessage::new(MSG_SET_PEER_BANDWIDTH, CSID_PROTOCOL_CONTROL, 0, payload.freeze())
}

/// Outbound chunk size announcement
pub fn set_chunk_size(size: u32) -> ProtocolMessage {
    let mut payload = BytesMut::with_capacity(4);
    payload.put_u32(size);
    ProtocolMessage::new(MSG_SET_CHUNK_SIZE, CSID_PROTOCOL_CONTROL, 0, payload.freeze())
}

/// User control event with the default stream id as event data
pub fn user_control_event(event: u16) -> ProtocolMessage {
    let mut payload = BytesMut::with_capacity(6);
    payload.put_u16(event);
    payload.put_u32(DEFAULT_MESSAGE_STREAM_ID);
    ProtocolMessage::new(
        MSG_USER_CONTROL,
        CSID_PROTOCOL_CONTROL,
        DEFAULT_MESSAGE_STREAM_ID,
        payload.freeze(),
    )
}

/// AMF0 command message on the command chunk stream
pub fn command(values: &[AmfValue]) -> ProtocolMessage {
    ProtocolMessage::new(
        MSG_COMMAND_AMF0,
        CSID_COMMAND,
        DEFAULT_MESSAGE_STREAM_ID,
        amf0::encode_all(values),
    )
}

/// AMF0 data message on the command chunk stream
pub fn data(values: &[AmfValue]) -> ProtocolMessage {
    ProtocolMessage::new(
        MSG_DATA_AMF0,
        CSID_COMMAND,
        DEFAULT_MESSAGE_STREAM_ID,
        amf0::encode_all(values),
    )
}

/// onStatus command with the conventional level/code/description object
pub fn on_status(level: &str, code: &str, description: &str) -> ProtocolMessage {
    command(&[
        "onStatus".into(),
        AmfValue::Number(0.0),
        AmfValue::Null,
        AmfValue::object(vec![
            ("level", level.into()),
            ("code", code.into()),
            ("description", description.into()),
        ]),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media(type_id: u8, payload: &'static [u8]) -> MediaMessage {
        MediaMessage {
            header: ChunkHeader::message(type_id, 6, 1, payload.len() as u32),
            payload: Bytes::from_static(payload),
        }
    }

    #[test]
    fn test_key_frame_detection() {
        assert!(media(MSG_VIDEO, &[0x17, 0x01, 0x00]).is_key_frame());
        assert!(!media(MSG_VIDEO, &[0x27, 0x01, 0x00]).is_key_frame());
        assert!(!media(MSG_VIDEO, &[0x17]).is_key_frame());
    }

    #[test]
    fn test_config_detection() {
        assert!(media(MSG_VIDEO, &[0x17, 0x00]).is_config());
        assert!(media(MSG_AUDIO, &[0xAF, 0x00]).is_config());
        assert!(!media(MSG_VIDEO, &[0x17, 0x01]).is_config());
        assert!(!media(MSG_AUDIO, &[0xAF]).is_config());
    }

    #[test]
    fn test_media_type_predicates() {
        assert!(media(MSG_AUDIO, &[0xAF, 0x01]).is_audio());
        assert!(!media(MSG_AUDIO, &[0xAF, 0x01]).is_video());
        assert!(media(MSG_VIDEO, &[0x27, 0x01]).is_video());
    }

    #[test]
    fn test_media_roundtrip_to_message() {
        let m = media(MSG_VIDEO, &[0x17, 0x01, 0xAA]);
        let message = m.to_message();
        assert_eq!(message.header, m.header);
        assert_eq!(message.payload, m.payload);
        assert!(message.is_media());
    }

    #[test]
    fn test_acknowledgement_layout() {
        let message = acknowledgement(123456);
        assert_eq!(message.type_id(), MSG_ACKNOWLEDGEMENT);
        assert_eq!(message.header.csid, CSID_PROTOCOL_CONTROL);
        assert_eq!(message.header.message_length, 4);
        assert_eq!(message.payload.as_ref(), &123456u32.to_be_bytes());
    }

    #[test]
    fn test_set_peer_bandwidth_layout() {
        let message = set_peer_bandwidth(5_000_000, 2);
        assert_eq!(message.header.message_length, 5);
        assert_eq!(message.payload[4], 2);
    }

    #[test]
    fn test_user_control_event_layout() {
        let message = user_control_event(EVENT_STREAM_EOF);
        assert_eq!(message.type_id(), MSG_USER_CONTROL);
        assert_eq!(message.header.message_length, 6);
        assert_eq!(&message.payload[0..2], &EVENT_STREAM_EOF.to_be_bytes());
    }

    #[test]
    fn test_on_status_decodes() {
        let message = on_status("status", "NetStream.Play.Start", "Start live");
        assert_eq!(message.type_id(), MSG_COMMAND_AMF0);
        assert_eq!(message.header.csid, CSID_COMMAND);

        let values = amf0::decode_all(&message.payload).unwrap();
        assert_eq!(values[0].as_str(), Some("onStatus"));
        assert_eq!(values[3].get_str("code"), Some("NetStream.Play.Start"));
    }

    #[test]
    fn test_command_header_matches_payload() {
        let message = command(&["_result".into(), AmfValue::Number(1.0), AmfValue::Null]);
        assert_eq!(message.header.message_length as usize, message.payload.len());
    }
}
