//! Total classification of application values into typed values.
//!
//! Rules, applied in order:
//! - null / absent → `Null`
//! - boolean → `Bool`
//! - number → `Int` if mathematically integral and exactly representable,
//!   else `Real`
//! - string → `Text`
//! - byte sequence → `Blob`
//! - anything else → `Text` holding a deterministic textual rendering
//!
//! Classification never fails and never drops precision: a value that no
//! numeric variant can hold exactly falls back to its decimal text.

use crate::value::TypedValue;
use bytes::Bytes;
use serde_json::Value as JsonValue;

/// Largest integer a 64-bit float holds exactly (2^53 - 1).
pub const MAX_SAFE_INTEGER: i64 = (1 << 53) - 1;

/// Conversion into the wire representation.
///
/// Implemented for Rust scalars, byte containers, `Option<T>` and
/// `serde_json::Value`.
pub trait ToTypedValue {
    /// Classifies `self` into a typed value.
    fn to_typed_value(&self) -> TypedValue;
}

/// Classifies a dynamic JSON value.
pub fn classify(value: &JsonValue) -> TypedValue {
    match value {
        JsonValue::Null => TypedValue::Null,
        JsonValue::Bool(b) => TypedValue::Bool(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                TypedValue::Int(i)
            } else if n.is_u64() {
                // Above i64::MAX: only the decimal text is exact
                TypedValue::Text(n.to_string())
            } else {
                n.as_f64().map_or_else(|| TypedValue::Text(n.to_string()), classify_float)
            }
        }
        JsonValue::String(s) => TypedValue::Text(s.clone()),
        JsonValue::Array(_) | JsonValue::Object(_) => TypedValue::Text(value.to_string()),
    }
}

/// Classifies a float by whether it is mathematically integral.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn classify_float(f: f64) -> TypedValue {
    if !f.is_finite() {
        return TypedValue::Text(non_finite_text(f).to_string());
    }
    if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER as f64 {
        TypedValue::Int(f as i64)
    } else {
        TypedValue::Real(f)
    }
}

fn non_finite_text(f: f64) -> &'static str {
    if f.is_nan() {
        "NaN"
    } else if f.is_sign_positive() {
        "Infinity"
    } else {
        "-Infinity"
    }
}

impl ToTypedValue for TypedValue {
    fn to_typed_value(&self) -> TypedValue {
        self.clone()
    }
}

impl ToTypedValue for JsonValue {
    fn to_typed_value(&self) -> TypedValue {
        classify(self)
    }
}

impl ToTypedValue for () {
    fn to_typed_value(&self) -> TypedValue {
        TypedValue::Null
    }
}

impl ToTypedValue for bool {
    fn to_typed_value(&self) -> TypedValue {
        TypedValue::Bool(*self)
    }
}

macro_rules! lossless_int {
    ($($t:ty),*) => {
        $(impl ToTypedValue for $t {
            fn to_typed_value(&self) -> TypedValue {
                TypedValue::Int(i64::from(*self))
            }
        })*
    };
}

lossless_int!(i8, i16, i32, i64, u8, u16, u32);

macro_rules! wide_int {
    ($($t:ty),*) => {
        $(impl ToTypedValue for $t {
            fn to_typed_value(&self) -> TypedValue {
                i64::try_from(*self)
                    .map_or_else(|_| TypedValue::Text(self.to_string()), TypedValue::Int)
            }
        })*
    };
}

wide_int!(u64, i128, u128, usize, isize);

impl ToTypedValue for f64 {
    fn to_typed_value(&self) -> TypedValue {
        classify_float(*self)
    }
}

impl ToTypedValue for f32 {
    fn to_typed_value(&self) -> TypedValue {
        classify_float(f64::from(*self))
    }
}

impl ToTypedValue for str {
    fn to_typed_value(&self) -> TypedValue {
        TypedValue::Text(self.to_string())
    }
}

impl ToTypedValue for String {
    fn to_typed_value(&self) -> TypedValue {
        TypedValue::Text(self.clone())
    }
}

impl ToTypedValue for [u8] {
    fn to_typed_value(&self) -> TypedValue {
        TypedValue::Blob(self.to_vec())
    }
}

impl<const N: usize> ToTypedValue for [u8; N] {
    fn to_typed_value(&self) -> TypedValue {
        TypedValue::Blob(self.to_vec())
    }
}

impl ToTypedValue for Vec<u8> {
    fn to_typed_value(&self) -> TypedValue {
        TypedValue::Blob(self.clone())
    }
}

impl ToTypedValue for Bytes {
    fn to_typed_value(&self) -> TypedValue {
        TypedValue::Blob(self.to_vec())
    }
}

impl<T: ToTypedValue> ToTypedValue for Option<T> {
    fn to_typed_value(&self) -> TypedValue {
        self.as_ref().map_or(TypedValue::Null, |v| v.to_typed_value())
    }
}

impl<T: ToTypedValue + ?Sized> ToTypedValue for &T {
    fn to_typed_value(&self) -> TypedValue {
        (**self).to_typed_value()
    }
}

impl<T: ToTypedValue + ?Sized> ToTypedValue for Box<T> {
    fn to_typed_value(&self) -> TypedValue {
        (**self).to_typed_value()
    }
}

impl From<bool> for TypedValue {
    fn from(b: bool) -> Self {
        TypedValue::Bool(b)
    }
}

impl From<i64> for TypedValue {
    fn from(n: i64) -> Self {
        TypedValue::Int(n)
    }
}

impl From<i32> for TypedValue {
    fn from(n: i32) -> Self {
        TypedValue::Int(i64::from(n))
    }
}

impl From<f64> for TypedValue {
    fn from(f: f64) -> Self {
        classify_float(f)
    }
}

impl From<String> for TypedValue {
    fn from(s: String) -> Self {
        TypedValue::Text(s)
    }
}

impl From<&str> for TypedValue {
    fn from(s: &str) -> Self {
        TypedValue::Text(s.to_string())
    }
}

impl From<Vec<u8>> for TypedValue {
    fn from(b: Vec<u8>) -> Self {
        TypedValue::Blob(b)
    }
}

impl From<&[u8]> for TypedValue {
    fn from(b: &[u8]) -> Self {
        TypedValue::Blob(b.to_vec())
    }
}

impl From<Bytes> for TypedValue {
    fn from(b: Bytes) -> Self {
        TypedValue::Blob(b.to_vec())
    }
}

impl From<()> for TypedValue {
    fn from((): ()) -> Self {
        TypedValue::Null
    }
}

impl From<&JsonValue> for TypedValue {
    fn from(value: &JsonValue) -> Self {
        classify(value)
    }
}

impl From<JsonValue> for TypedValue {
    fn from(value: JsonValue) -> Self {
        classify(&value)
    }
}
