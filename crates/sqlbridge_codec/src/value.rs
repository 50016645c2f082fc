//! The typed SQL value that crosses the command channel.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// A SQL scalar with an explicit type tag.
///
/// This is the only representation of a parameter or result cell that is
/// valid on the wire. The tag keeps integer/real/text/blob distinctions
/// intact where a plain JSON value would blur them (a blob is not an array
/// of numbers, `3` is not `3.0`).
///
/// Wire shape: `{"type": "int", "value": 42}`, `{"type": "null"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum TypedValue {
    /// SQL NULL.
    Null,
    /// Boolean. Stored by the engine as integer 0 or 1.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit IEEE float with a fractional part or beyond the safe integer range.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Ordered byte sequence.
    Blob(Vec<u8>),
}

impl TypedValue {
    /// Returns the wire tag of this value.
    pub fn type_name(&self) -> &'static str {
        match self {
            TypedValue::Null => "null",
            TypedValue::Bool(_) => "bool",
            TypedValue::Int(_) => "int",
            TypedValue::Real(_) => "real",
            TypedValue::Text(_) => "text",
            TypedValue::Blob(_) => "blob",
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, TypedValue::Null)
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TypedValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            TypedValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a float, if it is a real.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            TypedValue::Real(f) => Some(*f),
            _ => None,
        }
    }

    /// Get this value as a string, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            TypedValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as bytes, if it is a blob.
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            TypedValue::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Renders this value as the plain JSON a JSON-only client would see.
    ///
    /// Blobs become arrays of byte values. Reals that JSON cannot represent
    /// become null, so prefer the tagged form whenever exactness matters.
    pub fn to_json(&self) -> JsonValue {
        match self {
            TypedValue::Null => JsonValue::Null,
            TypedValue::Bool(b) => JsonValue::Bool(*b),
            TypedValue::Int(n) => JsonValue::from(*n),
            TypedValue::Real(f) => serde_json::Number::from_f64(*f)
                .map_or(JsonValue::Null, JsonValue::Number),
            TypedValue::Text(s) => JsonValue::String(s.clone()),
            TypedValue::Blob(b) => JsonValue::Array(b.iter().map(|&x| JsonValue::from(x)).collect()),
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Null => f.write_str("NULL"),
            TypedValue::Bool(b) => write!(f, "{b}"),
            TypedValue::Int(n) => write!(f, "{n}"),
            TypedValue::Real(x) => write!(f, "{x}"),
            TypedValue::Text(s) => write!(f, "'{s}'"),
            TypedValue::Blob(b) => write!(f, "<blob {} bytes>", b.len()),
        }
    }
}

impl Default for TypedValue {
    fn default() -> Self {
        TypedValue::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_is_tagged() {
        let json = serde_json::to_value(TypedValue::Int(42)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "int", "value": 42}));

        let json = serde_json::to_value(TypedValue::Null).unwrap();
        assert_eq!(json, serde_json::json!({"type": "null"}));

        let json = serde_json::to_value(TypedValue::Blob(vec![1, 2, 3])).unwrap();
        assert_eq!(json, serde_json::json!({"type": "blob", "value": [1, 2, 3]}));
    }

    #[test]
    fn wire_deserialization() {
        let value: TypedValue = serde_json::from_str(r#"{"type":"null"}"#).unwrap();
        assert_eq!(value, TypedValue::Null);

        let value: TypedValue = serde_json::from_str(r#"{"type":"text","value":"hello"}"#).unwrap();
        assert_eq!(value, TypedValue::Text("hello".to_string()));

        let value: TypedValue = serde_json::from_str(r#"{"type":"real","value":0.1}"#).unwrap();
        assert_eq!(value, TypedValue::Real(0.1));

        let params: Vec<TypedValue> =
            serde_json::from_str(r#"[{"type":"bool","value":true},{"type":"blob","value":[255]}]"#)
                .unwrap();
        assert_eq!(params, vec![TypedValue::Bool(true), TypedValue::Blob(vec![255])]);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let result: Result<TypedValue, _> = serde_json::from_str(r#"{"type":"date","value":1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn value_accessors() {
        assert!(TypedValue::Null.is_null());
        assert!(!TypedValue::Int(0).is_null());
        assert_eq!(TypedValue::Bool(true).as_bool(), Some(true));
        assert_eq!(TypedValue::Int(7).as_integer(), Some(7));
        assert_eq!(TypedValue::Int(7).as_real(), None);
        assert_eq!(TypedValue::Real(1.5).as_real(), Some(1.5));
        assert_eq!(TypedValue::Text("a".into()).as_text(), Some("a"));
        assert_eq!(TypedValue::Blob(vec![9]).as_blob(), Some(&[9u8][..]));
    }

    #[test]
    fn plain_json_rendering() {
        assert_eq!(TypedValue::Blob(vec![1, 2]).to_json(), serde_json::json!([1, 2]));
        assert_eq!(TypedValue::Real(f64::NAN).to_json(), JsonValue::Null);
        assert_eq!(TypedValue::Int(-3).to_json(), serde_json::json!(-3));
    }
}
