// ── Domain model ──
//
// Typed identities, metadata, and value shapes for the two addressable
// entities of the Web API. The value shape is resolved *once* from
// metadata into `ValueKind`; nothing downstream re-infers it per message.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use xplink_api::rest::{CommandInfo, DatarefInfo, ValueType};

use crate::error::CoreError;

// ── Identifiers ──────────────────────────────────────────────────────

/// Simulator-assigned dataref identifier.
///
/// Valid for a single connection epoch: an aircraft change or reconnect
/// invalidates every previously seen id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatarefId(pub u64);

/// Simulator-assigned command identifier. Same epoch rules as [`DatarefId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(pub u64);

impl fmt::Display for DatarefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ── Metadata ─────────────────────────────────────────────────────────

/// Cached metadata for one dataref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatarefMeta {
    pub name: String,
    pub id: DatarefId,
    pub value_type: ValueType,
    pub is_writable: bool,
}

impl DatarefMeta {
    pub fn kind(&self) -> ValueKind {
        ValueKind::from(self.value_type)
    }

    pub fn is_array(&self) -> bool {
        self.value_type.is_array()
    }
}

impl From<DatarefInfo> for DatarefMeta {
    fn from(info: DatarefInfo) -> Self {
        Self {
            name: info.name,
            id: DatarefId(info.id),
            value_type: info.value_type,
            is_writable: info.is_writable,
        }
    }
}

/// Cached metadata for one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandMeta {
    pub name: String,
    pub id: CommandId,
    pub description: String,
}

impl From<CommandInfo> for CommandMeta {
    fn from(info: CommandInfo) -> Self {
        Self {
            name: info.name,
            id: CommandId(info.id),
            description: info.description,
        }
    }
}

// ── Value shapes ─────────────────────────────────────────────────────

/// The three value shapes a dataref can take on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// One number (`int`, `float`, `double`).
    Scalar,
    /// Packed number array (`int_array`, `float_array`).
    Array,
    /// Byte buffer (`data`), base64-encoded on the wire.
    Bytes,
}

impl From<ValueType> for ValueKind {
    fn from(value_type: ValueType) -> Self {
        match value_type {
            ValueType::Int | ValueType::Float | ValueType::Double => Self::Scalar,
            ValueType::IntArray | ValueType::FloatArray => Self::Array,
            ValueType::Data => Self::Bytes,
        }
    }
}

/// A parsed dataref value.
#[derive(Debug, Clone, PartialEq)]
pub enum DatarefValue {
    Int(i64),
    Float(f64),
    Array(Vec<f64>),
    /// Decoded text of a `data` dataref, NULs stripped.
    Text(String),
}

impl DatarefValue {
    /// Parse a raw wire value according to the dataref's resolved kind.
    pub fn parse(kind: ValueKind, raw: &serde_json::Value, path: &str) -> Result<Self, CoreError> {
        match kind {
            ValueKind::Scalar => {
                if let Some(i) = raw.as_i64() {
                    Ok(Self::Int(i))
                } else if let Some(f) = raw.as_f64() {
                    Ok(Self::Float(f))
                } else {
                    Err(shape_error(path, "expected a number", raw))
                }
            }
            ValueKind::Array => {
                let items = raw
                    .as_array()
                    .ok_or_else(|| shape_error(path, "expected an array", raw))?;
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(
                        item.as_f64()
                            .ok_or_else(|| shape_error(path, "non-numeric array element", raw))?,
                    );
                }
                Ok(Self::Array(values))
            }
            ValueKind::Bytes => {
                let encoded = raw
                    .as_str()
                    .ok_or_else(|| shape_error(path, "expected a base64 string", raw))?;
                let bytes = BASE64.decode(encoded).map_err(|e| CoreError::ValueShape {
                    path: path.to_string(),
                    reason: format!("invalid base64: {e}"),
                })?;
                let text = String::from_utf8_lossy(&bytes).replace('\u{0}', "");
                Ok(Self::Text(text))
            }
        }
    }

    /// Parse a single element of a packed array payload.
    pub(crate) fn parse_element(value_type: ValueType, raw: &serde_json::Value) -> Option<Self> {
        match value_type {
            ValueType::IntArray => raw.as_i64().map(Self::Int),
            _ => raw.as_f64().map(Self::Float),
        }
    }

    /// Encode for the wire: numbers stay numbers, text is base64-encoded.
    pub fn to_wire(&self) -> serde_json::Value {
        match self {
            Self::Int(i) => serde_json::json!(i),
            Self::Float(f) => serde_json::json!(f),
            Self::Array(values) => serde_json::json!(values),
            Self::Text(text) => serde_json::json!(BASE64.encode(text.as_bytes())),
        }
    }

    /// Numeric view, when the value is a scalar.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Display for DatarefValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => i.fmt(f),
            Self::Float(v) => v.fmt(f),
            Self::Array(values) => write!(f, "{values:?}"),
            Self::Text(text) => text.fmt(f),
        }
    }
}

fn shape_error(path: &str, reason: &str, raw: &serde_json::Value) -> CoreError {
    CoreError::ValueShape {
        path: path.to_string(),
        reason: format!("{reason}, got {raw}"),
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_is_resolved_once_from_value_type() {
        assert_eq!(ValueKind::from(ValueType::Int), ValueKind::Scalar);
        assert_eq!(ValueKind::from(ValueType::Double), ValueKind::Scalar);
        assert_eq!(ValueKind::from(ValueType::FloatArray), ValueKind::Array);
        assert_eq!(ValueKind::from(ValueType::Data), ValueKind::Bytes);
    }

    #[test]
    fn parse_scalar_keeps_integer_values_integral() {
        let value = DatarefValue::parse(ValueKind::Scalar, &json!(4), "sim/x").unwrap();
        assert_eq!(value, DatarefValue::Int(4));

        let value = DatarefValue::parse(ValueKind::Scalar, &json!(1.5), "sim/x").unwrap();
        assert_eq!(value, DatarefValue::Float(1.5));
    }

    #[test]
    fn parse_array_collects_numbers() {
        let value = DatarefValue::parse(ValueKind::Array, &json!([1.0, 2.5]), "sim/a").unwrap();
        assert_eq!(value, DatarefValue::Array(vec![1.0, 2.5]));
    }

    #[test]
    fn parse_array_rejects_scalar_payload() {
        let err = DatarefValue::parse(ValueKind::Array, &json!(3.0), "sim/a").unwrap_err();
        assert!(matches!(err, CoreError::ValueShape { .. }), "got {err:?}");
    }

    #[test]
    fn parse_bytes_decodes_base64_and_strips_nuls() {
        // "N172\0\0" base64-encoded
        let raw = json!(BASE64.encode(b"N172\0\0"));
        let value = DatarefValue::parse(ValueKind::Bytes, &raw, "sim/tailnum").unwrap();
        assert_eq!(value, DatarefValue::Text("N172".into()));
    }

    #[test]
    fn text_round_trips_through_wire_encoding() {
        let value = DatarefValue::Text("N172".into());
        let wire = value.to_wire();
        let back = DatarefValue::parse(ValueKind::Bytes, &wire, "sim/tailnum").unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn parse_element_respects_int_arrays() {
        assert_eq!(
            DatarefValue::parse_element(ValueType::IntArray, &json!(3)),
            Some(DatarefValue::Int(3))
        );
        assert_eq!(
            DatarefValue::parse_element(ValueType::FloatArray, &json!(3)),
            Some(DatarefValue::Float(3.0))
        );
    }
}
