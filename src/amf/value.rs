//! AMF value types
//!
//! Objects and ECMA arrays keep their properties in insertion order: the
//! order is observable on the wire (trailing end-marker scan, names read
//! back by clients), so a plain map would not round-trip.

/// Tagged AMF0 value
#[derive(Debug, Clone, PartialEq)]
pub enum AmfValue {
    /// IEEE 754 double (marker 0x00)
    Number(f64),
    /// Boolean (marker 0x01)
    Boolean(bool),
    /// UTF-8 string with 16-bit length (marker 0x02)
    String(String),
    /// Ordered name/value pairs (marker 0x03)
    Object(Vec<(String, AmfValue)>),
    /// Null (marker 0x05)
    Null,
    /// Undefined (marker 0x06)
    Undefined,
    /// Associative array: count prefix + object encoding (marker 0x08)
    EcmaArray(Vec<(String, AmfValue)>),
    /// Dense array of values (marker 0x0A)
    StrictArray(Vec<AmfValue>),
    /// Epoch milliseconds + unused timezone (marker 0x0B)
    Date(f64),
    /// UTF-8 string with 32-bit length (marker 0x0C)
    LongString(String),
    /// Reserved marker 0x0D; decoded but carries nothing
    Unsupported,
}

impl AmfValue {
    /// Build an object from owned pairs
    pub fn object(pairs: Vec<(&str, AmfValue)>) -> Self {
        AmfValue::Object(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    /// Try to get this value as a string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AmfValue::String(s) | AmfValue::LongString(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get this value as a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AmfValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Try to get this value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AmfValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get this value's property pairs
    pub fn as_pairs(&self) -> Option<&[(String, AmfValue)]> {
        match self {
            AmfValue::Object(pairs) | AmfValue::EcmaArray(pairs) => Some(pairs),
            _ => None,
        }
    }

    /// Check whether this value is null or undefined
    pub fn is_null_or_undefined(&self) -> bool {
        matches!(self, AmfValue::Null | AmfValue::Undefined)
    }

    /// Look up a property by name (first match wins)
    pub fn get(&self, key: &str) -> Option<&AmfValue> {
        self.as_pairs()?
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }

    /// Look up a string property by name
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }

    /// Look up a numeric property by name
    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key)?.as_number()
    }
}

impl Default for AmfValue {
    fn default() -> Self {
        AmfValue::Null
    }
}

impl From<bool> for AmfValue {
    fn from(v: bool) -> Self {
        AmfValue::Boolean(v)
    }
}

impl From<f64> for AmfValue {
    fn from(v: f64) -> Self {
        AmfValue::Number(v)
    }
}

impl From<u32> for AmfValue {
    fn from(v: u32) -> Self {
        AmfValue::Number(v as f64)
    }
}

impl From<i32> for AmfValue {
    fn from(v: i32) -> Self {
        AmfValue::Number(v as f64)
    }
}

impl From<&str> for AmfValue {
    fn from(v: &str) -> Self {
        AmfValue::String(v.to_string())
    }
}

impl From<String> for AmfValue {
    fn from(v: String) -> Self {
        AmfValue::String(v)
    }
}
