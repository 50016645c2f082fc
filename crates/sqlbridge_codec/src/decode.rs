//! Conversion from typed values back into Rust types.

use crate::error::{CodecError, CodecResult};
use crate::value::TypedValue;
use serde_json::Value as JsonValue;

/// Conversion out of the wire representation.
///
/// The inverse of [`ToTypedValue`](crate::ToTypedValue): for every value `x`
/// that classifies to `v`, `T::from_typed_value(&v)` yields `x` again.
/// Accepts the engine's storage coercions where they are lossless
/// (booleans come back as integers 0/1).
pub trait FromTypedValue: Sized {
    /// Converts a typed value into `Self`.
    fn from_typed_value(value: &TypedValue) -> CodecResult<Self>;
}

impl FromTypedValue for TypedValue {
    fn from_typed_value(value: &TypedValue) -> CodecResult<Self> {
        Ok(value.clone())
    }
}

impl FromTypedValue for JsonValue {
    fn from_typed_value(value: &TypedValue) -> CodecResult<Self> {
        Ok(value.to_json())
    }
}

impl FromTypedValue for bool {
    fn from_typed_value(value: &TypedValue) -> CodecResult<Self> {
        match value {
            TypedValue::Bool(b) => Ok(*b),
            TypedValue::Int(0) => Ok(false),
            TypedValue::Int(1) => Ok(true),
            TypedValue::Int(n) => Err(CodecError::integer_overflow(*n, "bool")),
            other => Err(CodecError::type_mismatch("bool", other.type_name())),
        }
    }
}

impl FromTypedValue for i64 {
    fn from_typed_value(value: &TypedValue) -> CodecResult<Self> {
        match value {
            TypedValue::Int(n) => Ok(*n),
            TypedValue::Bool(b) => Ok(i64::from(*b)),
            other => Err(CodecError::type_mismatch("i64", other.type_name())),
        }
    }
}

macro_rules! narrow_int {
    ($($t:ty),*) => {
        $(impl FromTypedValue for $t {
            fn from_typed_value(value: &TypedValue) -> CodecResult<Self> {
                let n = i64::from_typed_value(value).map_err(|_| {
                    CodecError::type_mismatch(stringify!($t), value.type_name())
                })?;
                <$t>::try_from(n).map_err(|_| CodecError::integer_overflow(n, stringify!($t)))
            }
        })*
    };
}

narrow_int!(i8, i16, i32, u8, u16, u32, usize);

impl FromTypedValue for u64 {
    fn from_typed_value(value: &TypedValue) -> CodecResult<Self> {
        match value {
            // Values above i64::MAX travel as their decimal text
            TypedValue::Text(s) => s
                .parse::<u64>()
                .map_err(|_| CodecError::type_mismatch("u64", "text")),
            other => {
                let n = i64::from_typed_value(other)
                    .map_err(|_| CodecError::type_mismatch("u64", other.type_name()))?;
                u64::try_from(n).map_err(|_| CodecError::integer_overflow(n, "u64"))
            }
        }
    }
}

impl FromTypedValue for f64 {
    #[allow(clippy::cast_precision_loss)]
    fn from_typed_value(value: &TypedValue) -> CodecResult<Self> {
        match value {
            TypedValue::Real(f) => Ok(*f),
            TypedValue::Int(n) => Ok(*n as f64),
            TypedValue::Text(s) => match s.as_str() {
                "NaN" => Ok(f64::NAN),
                "Infinity" => Ok(f64::INFINITY),
                "-Infinity" => Ok(f64::NEG_INFINITY),
                _ => Err(CodecError::type_mismatch("f64", "text")),
            },
            other => Err(CodecError::type_mismatch("f64", other.type_name())),
        }
    }
}

impl FromTypedValue for String {
    fn from_typed_value(value: &TypedValue) -> CodecResult<Self> {
        match value {
            TypedValue::Text(s) => Ok(s.clone()),
            other => Err(CodecError::type_mismatch("text", other.type_name())),
        }
    }
}

impl FromTypedValue for Vec<u8> {
    fn from_typed_value(value: &TypedValue) -> CodecResult<Self> {
        match value {
            TypedValue::Blob(b) => Ok(b.clone()),
            other => Err(CodecError::type_mismatch("blob", other.type_name())),
        }
    }
}

impl FromTypedValue for bytes::Bytes {
    fn from_typed_value(value: &TypedValue) -> CodecResult<Self> {
        Vec::<u8>::from_typed_value(value).map(bytes::Bytes::from)
    }
}

impl<T: FromTypedValue> FromTypedValue for Option<T> {
    fn from_typed_value(value: &TypedValue) -> CodecResult<Self> {
        match value {
            TypedValue::Null => Ok(None),
            other => T::from_typed_value(other).map(Some),
        }
    }
}

/// Parses a tagged wire value (`{"type": .., "value": ..}`).
pub fn from_wire(value: &JsonValue) -> CodecResult<TypedValue> {
    serde_json::from_value(value.clone()).map_err(|e| CodecError::malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_accepts_stored_integers() {
        assert!(bool::from_typed_value(&TypedValue::Int(1)).unwrap());
        assert!(!bool::from_typed_value(&TypedValue::Int(0)).unwrap());
        assert!(bool::from_typed_value(&TypedValue::Bool(true)).unwrap());
        assert!(bool::from_typed_value(&TypedValue::Int(2)).is_err());
        assert!(bool::from_typed_value(&TypedValue::Text("true".into())).is_err());
    }

    #[test]
    fn narrow_integers_check_range() {
        assert_eq!(i32::from_typed_value(&TypedValue::Int(-5)).unwrap(), -5);
        assert_eq!(
            u8::from_typed_value(&TypedValue::Int(300)),
            Err(CodecError::integer_overflow(300, "u8"))
        );
        assert_eq!(
            u32::from_typed_value(&TypedValue::Real(1.5)),
            Err(CodecError::type_mismatch("u32", "real"))
        );
    }

    #[test]
    fn u64_reads_text_fallback() {
        let v = TypedValue::Text(u64::MAX.to_string());
        assert_eq!(u64::from_typed_value(&v).unwrap(), u64::MAX);
        assert_eq!(u64::from_typed_value(&TypedValue::Int(9)).unwrap(), 9);
    }

    #[test]
    fn option_maps_null() {
        assert_eq!(Option::<String>::from_typed_value(&TypedValue::Null).unwrap(), None);
        assert_eq!(
            Option::<i64>::from_typed_value(&TypedValue::Int(3)).unwrap(),
            Some(3)
        );
    }

    #[test]
    fn text_is_not_blob() {
        assert!(Vec::<u8>::from_typed_value(&TypedValue::Text("ab".into())).is_err());
        assert!(String::from_typed_value(&TypedValue::Blob(vec![1])).is_err());
    }

    #[test]
    fn wire_parse() {
        let v = from_wire(&serde_json::json!({"type": "int", "value": 4})).unwrap();
        assert_eq!(v, TypedValue::Int(4));
        assert!(from_wire(&serde_json::json!({"value": 4})).is_err());
    }
}
