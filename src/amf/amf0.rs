//! AMF0 encoder and decoder
//!
//! Every value starts with a one-byte type marker:
//!
//! ```text
//! 0x00 - Number (IEEE 754 double, big-endian)
//! 0x01 - Boolean
//! 0x02 - String (UTF-8, 16-bit length prefix)
//! 0x03 - Object (name/value pairs until 0x000009)
//! 0x05 - Null
//! 0x06 - Undefined
//! 0x08 - ECMA Array (32-bit count + object encoding)
//! 0x09 - Object End (only valid inside objects)
//! 0x0A - Strict Array (32-bit count + values)
//! 0x0B - Date (double + 16-bit timezone, timezone always zero)
//! 0x0C - Long String (UTF-8, 32-bit length prefix)
//! 0x0D - Unsupported
//! ```
//!
//! Markers outside this set decode to [`AmfValue::Null`] so that a single
//! exotic value does not fail the whole command message.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::value::AmfValue;
use crate::error::AmfError;

const MARKER_NUMBER: u8 = 0x00;
const MARKER_BOOLEAN: u8 = 0x01;
const MARKER_STRING: u8 = 0x02;
const MARKER_OBJECT: u8 = 0x03;
const MARKER_NULL: u8 = 0x05;
const MARKER_UNDEFINED: u8 = 0x06;
const MARKER_ECMA_ARRAY: u8 = 0x08;
const MARKER_OBJECT_END: u8 = 0x09;
const MARKER_STRICT_ARRAY: u8 = 0x0A;
const MARKER_DATE: u8 = 0x0B;
const MARKER_LONG_STRING: u8 = 0x0C;
const MARKER_UNSUPPORTED: u8 = 0x0D;

/// Maximum nesting depth for objects/arrays (prevents stack overflow)
const MAX_NESTING_DEPTH: usize = 64;

/// AMF0 decoder
pub struct Amf0Decoder {
    depth: usize,
}

impl Amf0Decoder {
    /// Create a new decoder
    pub fn new() -> Self {
        Self { depth: 0 }
    }

    /// Decode a single value from the buffer
    pub fn decode(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        if buf.is_empty() {
            return Err(AmfError::UnexpectedEof);
        }

        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(AmfError::NestingTooDeep);
        }

        let marker = buf.get_u8();
        let result = self.decode_value(marker, buf);
        self.depth -= 1;
        result
    }

    /// Decode values until the buffer is exhausted
    pub fn decode_all(&mut self, buf: &mut Bytes) -> Result<Vec<AmfValue>, AmfError> {
        let mut values = Vec::new();
        while buf.has_remaining() {
            values.push(self.decode(buf)?);
        }
        Ok(values)
    }

    fn decode_value(&mut self, marker: u8, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        match marker {
            MARKER_NUMBER => self.decode_number(buf),
            MARKER_BOOLEAN => self.decode_boolean(buf),
            MARKER_STRING => Ok(AmfValue::String(read_utf8(buf)?)),
            MARKER_OBJECT => Ok(AmfValue::Object(self.decode_pairs(buf)?)),
            MARKER_NULL => Ok(AmfValue::Null),
            MARKER_UNDEFINED => Ok(AmfValue::Undefined),
            MARKER_ECMA_ARRAY => self.decode_ecma_array(buf),
            MARKER_STRICT_ARRAY => self.decode_strict_array(buf),
            MARKER_DATE => self.decode_date(buf),
            MARKER_LONG_STRING => Ok(AmfValue::LongString(read_utf8_long(buf)?)),
            MARKER_UNSUPPORTED => Ok(AmfValue::Unsupported),
            // Reference, RecordSet, XML, typed objects and anything newer:
            // swallow the marker, yield a null-equivalent
            _ => Ok(AmfValue::Null),
        }
    }

    fn decode_number(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        if buf.remaining() < 8 {
            return Err(AmfError::UnexpectedEof);
        }
        Ok(AmfValue::Number(buf.get_f64()))
    }

    fn decode_boolean(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        if buf.is_empty() {
            return Err(AmfError::UnexpectedEof);
        }
        Ok(AmfValue::Boolean(buf.get_u8() != 0))
    }

    /// Decode name/value pairs until the 0x00 0x00 0x09 end marker
    fn decode_pairs(&mut self, buf: &mut Bytes) -> Result<Vec<(String, AmfValue)>, AmfError> {
        let mut pairs = Vec::new();

        loop {
            let name = read_utf8(buf)?;
            if name.is_empty() {
                if buf.is_empty() {
                    return Err(AmfError::UnexpectedEof);
                }
                if buf.get_u8() == MARKER_OBJECT_END {
                    break;
                }
                return Err(AmfError::InvalidObjectEnd);
            }

            let value = self.decode(buf)?;
            pairs.push((name, value));
        }

        Ok(pairs)
    }

    fn decode_ecma_array(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        if buf.remaining() < 4 {
            return Err(AmfError::UnexpectedEof);
        }
        // Count prefix is only a hint; the end marker is authoritative
        let _count = buf.get_u32();
        Ok(AmfValue::EcmaArray(self.decode_pairs(buf)?))
    }

    fn decode_strict_array(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        if buf.remaining() < 4 {
            return Err(AmfError::UnexpectedEof);
        }

        let count = buf.get_u32() as usize;
        let mut elements = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            elements.push(self.decode(buf)?);
        }

        Ok(AmfValue::StrictArray(elements))
    }

    fn decode_date(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        if buf.remaining() < 10 {
            return Err(AmfError::UnexpectedEof);
        }

        let timestamp = buf.get_f64();
        let _timezone = buf.get_i16();

        Ok(AmfValue::Date(timestamp))
    }
}

impl Default for Amf0Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// AMF0 encoder
pub struct Amf0Encoder {
    buf: BytesMut,
}

impl Amf0Encoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
        }
    }

    /// Take the encoded bytes, leaving the encoder empty
    pub fn finish(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    /// Current encoded length
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check whether nothing has been encoded yet
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Encode a single value
    pub fn encode(&mut self, value: &AmfValue) {
        match value {
            AmfValue::Number(n) => {
                self.buf.put_u8(MARKER_NUMBER);
                self.buf.put_f64(*n);
            }
            AmfValue::Boolean(b) => {
                self.buf.put_u8(MARKER_BOOLEAN);
                self.buf.put_u8(u8::from(*b));
            }
            AmfValue::String(s) => {
                if s.len() > u16::MAX as usize {
                    self.put_long_string(s);
                } else {
                    self.buf.put_u8(MARKER_STRING);
                    self.write_utf8(s);
                }
            }
            AmfValue::Object(pairs) => {
                self.buf.put_u8(MARKER_OBJECT);
                self.encode_pairs(pairs);
            }
            AmfValue::Null => {
                self.buf.put_u8(MARKER_NULL);
            }
            AmfValue::Undefined => {
                self.buf.put_u8(MARKER_UNDEFINED);
            }
            AmfValue::EcmaArray(pairs) => {
                self.buf.put_u8(MARKER_ECMA_ARRAY);
                self.buf.put_u32(pairs.len() as u32);
                self.encode_pairs(pairs);
            }
            AmfValue::StrictArray(elements) => {
                self.buf.put_u8(MARKER_STRICT_ARRAY);
                self.buf.put_u32(elements.len() as u32);
                for element in elements {
                    self.encode(element);
                }
            }
            AmfValue::Date(timestamp) => {
                self.buf.put_u8(MARKER_DATE);
                self.buf.put_f64(*timestamp);
                self.buf.put_i16(0);
            }
            AmfValue::LongString(s) => {
                self.put_long_string(s);
            }
            AmfValue::Unsupported => {
                self.buf.put_u8(MARKER_UNSUPPORTED);
            }
        }
    }

    /// Encode multiple values back to back
    pub fn encode_all(&mut self, values: &[AmfValue]) {
        for value in values {
            self.encode(value);
        }
    }

    fn encode_pairs(&mut self, pairs: &[(String, AmfValue)]) {
        for (name, value) in pairs {
            self.write_utf8(name);
            self.encode(value);
        }
        // End marker: empty name + 0x09
        self.buf.put_u16(0);
        self.buf.put_u8(MARKER_OBJECT_END);
    }

    fn put_long_string(&mut self, s: &str) {
        self.buf.put_u8(MARKER_LONG_STRING);
        self.buf.put_u32(s.len() as u32);
        self.buf.put_slice(s.as_bytes());
    }

    /// Write a UTF-8 string with 16-bit length prefix (no type marker)
    fn write_utf8(&mut self, s: &str) {
        let len = s.len().min(u16::MAX as usize);
        self.buf.put_u16(len as u16);
        self.buf.put_slice(&s.as_bytes()[..len]);
    }
}

impl Default for Amf0Encoder {
    fn default() -> Self {
        Self::new()
    }
}

fn read_utf8(buf: &mut Bytes) -> Result<String, AmfError> {
    if buf.remaining() < 2 {
        return Err(AmfError::UnexpectedEof);
    }

    let len = buf.get_u16() as usize;
    if buf.remaining() < len {
        return Err(AmfError::UnexpectedEof);
    }

    let bytes = buf.copy_to_bytes(len);
    String::from_utf8(bytes.to_vec()).map_err(|_| AmfError::InvalidUtf8)
}

fn read_utf8_long(buf: &mut Bytes) -> Result<String, AmfError> {
    if buf.remaining() < 4 {
        return Err(AmfError::UnexpectedEof);
    }

    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(AmfError::UnexpectedEof);
    }

    let bytes = buf.copy_to_bytes(len);
    String::from_utf8(bytes.to_vec()).map_err(|_| AmfError::InvalidUtf8)
}

/// Encode a single value into a fresh buffer
pub fn encode(value: &AmfValue) -> Bytes {
    let mut encoder = Amf0Encoder::new();
    encoder.encode(value);
    encoder.finish()
}

/// Encode a value sequence into a fresh buffer
pub fn encode_all(values: &[AmfValue]) -> Bytes {
    let mut encoder = Amf0Encoder::new();
    encoder.encode_all(values);
    encoder.finish()
}

/// Decode a single value from a byte slice
pub fn decode(data: &[u8]) -> Result<AmfValue, AmfError> {
    let mut decoder = Amf0Decoder::new();
    let mut buf = Bytes::copy_from_slice(data);
    decoder.decode(&mut buf)
}

/// Decode every value in a byte slice
pub fn decode_all(data: &[u8]) -> Result<Vec<AmfValue>, AmfError> {
    let mut decoder = Amf0Decoder::new();
    let mut buf = Bytes::copy_from_slice(data);
    decoder.decode_all(&mut buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_roundtrip() {
        for n in [0.0, -1.5, 42.5, 1e12] {
            let value = AmfValue::Number(n);
            let encoded = encode(&value);
            assert_eq!(decode(&encoded).unwrap(), value);
            // encode(decode(bytes)) == bytes
            assert_eq!(encode(&decode(&encoded).unwrap()), encoded);
        }
    }

    #[test]
    fn test_boolean_roundtrip() {
        for b in [true, false] {
            let value = AmfValue::Boolean(b);
            let encoded = encode(&value);
            assert_eq!(decode(&encoded).unwrap(), value);
        }
    }

    #[test]
    fn test_string_roundtrip() {
        let value = AmfValue::String("hello world".into());
        let encoded = encode(&value);
        assert_eq!(decode(&encoded).unwrap(), value);
    }

    #[test]
    fn test_empty_string_roundtrip() {
        let value = AmfValue::String(String::new());
        let encoded = encode(&value);
        assert_eq!(decode(&encoded).unwrap(), value);
    }

    #[test]
    fn test_null_and_undefined() {
        assert_eq!(decode(&encode(&AmfValue::Null)).unwrap(), AmfValue::Null);
        assert_eq!(
            decode(&encode(&AmfValue::Undefined)).unwrap(),
            AmfValue::Undefined
        );
    }

    #[test]
    fn test_object_roundtrip_preserves_order() {
        let value = AmfValue::object(vec![
            ("level", "status".into()),
            ("code", "NetConnection.Connect.Success".into()),
            ("description", "Connection succeeded".into()),
            ("objectEncoding", AmfValue::Number(0.0)),
        ]);

        let encoded = encode(&value);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(encode(&decoded), encoded);
    }

    #[test]
    fn test_empty_object_roundtrip() {
        let value = AmfValue::Object(Vec::new());
        let encoded = encode(&value);
        // marker + end marker only
        assert_eq!(encoded.as_ref(), &[0x03, 0x00, 0x00, 0x09]);
        assert_eq!(decode(&encoded).unwrap(), value);
    }

    #[test]
    fn test_nested_object_roundtrip() {
        let inner = AmfValue::object(vec![("key", "value".into())]);
        let value = AmfValue::object(vec![("inner", inner), ("count", AmfValue::Number(5.0))]);

        let encoded = encode(&value);
        assert_eq!(decode(&encoded).unwrap(), value);
    }

    #[test]
    fn test_ecma_array_roundtrip() {
        let value = AmfValue::EcmaArray(vec![
            ("width".to_string(), AmfValue::Number(1920.0)),
            ("height".to_string(), AmfValue::Number(1080.0)),
        ]);

        let encoded = encode(&value);
        assert_eq!(decode(&encoded).unwrap(), value);
        assert_eq!(encode(&decode(&encoded).unwrap()), encoded);
    }

    #[test]
    fn test_strict_array_roundtrip() {
        let value = AmfValue::StrictArray(vec![
            AmfValue::Number(1.0),
            AmfValue::String("two".into()),
            AmfValue::Boolean(true),
        ]);

        let encoded = encode(&value);
        assert_eq!(decode(&encoded).unwrap(), value);
    }

    #[test]
    fn test_empty_strict_array_roundtrip() {
        let value = AmfValue::StrictArray(Vec::new());
        let encoded = encode(&value);
        assert_eq!(decode(&encoded).unwrap(), value);
    }

    #[test]
    fn test_date_roundtrip() {
        let value = AmfValue::Date(1_700_000_000_000.0);
        let encoded = encode(&value);
        assert_eq!(decode(&encoded).unwrap(), value);
        assert_eq!(encode(&decode(&encoded).unwrap()), encoded);
    }

    #[test]
    fn test_long_string_roundtrip() {
        let long = "x".repeat(70_000);
        let value = AmfValue::String(long.clone());
        let encoded = encode(&value);
        assert_eq!(encoded[0], 0x0C);
        assert_eq!(decode(&encoded).unwrap(), AmfValue::LongString(long));
    }

    #[test]
    fn test_command_sequence_roundtrip() {
        let values = vec![
            AmfValue::String("connect".into()),
            AmfValue::Number(1.0),
            AmfValue::object(vec![
                ("app", "live".into()),
                ("tcUrl", "rtmp://localhost/live".into()),
                ("objectEncoding", AmfValue::Number(0.0)),
            ]),
        ];

        let encoded = encode_all(&values);
        let decoded = decode_all(&encoded).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_unknown_marker_decodes_to_null() {
        // 0x10 is a typed object; we do not support it
        let decoded = decode(&[0x10]).unwrap();
        assert_eq!(decoded, AmfValue::Null);
    }

    #[test]
    fn test_unsupported_marker_roundtrip() {
        let encoded = encode(&AmfValue::Unsupported);
        assert_eq!(decode(&encoded).unwrap(), AmfValue::Unsupported);
    }

    #[test]
    fn test_decode_empty_buffer() {
        assert!(matches!(decode(&[]), Err(AmfError::UnexpectedEof)));
    }

    #[test]
    fn test_decode_truncated_number() {
        let data = [0x00, 0x40, 0x45];
        assert!(matches!(decode(&data), Err(AmfError::UnexpectedEof)));
    }

    #[test]
    fn test_decode_truncated_string() {
        // length says 16 but no bytes follow
        let data = [0x02, 0x00, 0x10];
        assert!(matches!(decode(&data), Err(AmfError::UnexpectedEof)));
    }

    #[test]
    fn test_decode_unterminated_object() {
        // object marker, one property, no end marker
        let mut encoder = Amf0Encoder::new();
        encoder.buf.put_u8(0x03);
        encoder.write_utf8("key");
        encoder.encode(&AmfValue::Number(1.0));
        let encoded = encoder.finish();

        assert!(matches!(decode(&encoded), Err(AmfError::UnexpectedEof)));
    }

    #[test]
    fn test_nesting_depth_limit() {
        let mut value = AmfValue::Object(Vec::new());
        for _ in 0..70 {
            value = AmfValue::Object(vec![("nested".to_string(), value)]);
        }

        let encoded = encode(&value);
        assert!(matches!(decode(&encoded), Err(AmfError::NestingTooDeep)));
    }
}
