//! # SQLBridge Codec
//!
//! Typed SQL values for the SQLBridge command channel.
//!
//! Every parameter sent to the engine and every cell read back from it
//! travels as a [`TypedValue`]: a closed tagged variant over
//! null/bool/int/real/text/blob. This keeps the distinctions that a plain
//! JSON channel would lose:
//! - blobs stay ordered byte sequences, never arrays or text
//! - integers survive exactly, fractional reals keep full precision
//! - a value no numeric variant can hold exactly falls back to text
//!
//! The [`wire`] module holds the command names and the argument/result
//! frames both ends of the channel agree on.
//!
//! ## Usage
//!
//! ```
//! use sqlbridge_codec::{typed_params, FromTypedValue, ToTypedValue, TypedValue};
//!
//! let params = typed_params!["id-1", 42, 1.5, vec![0u8, 1], None::<i64>];
//! assert_eq!(params[1], TypedValue::Int(42));
//! assert_eq!(params[3], TypedValue::Blob(vec![0, 1]));
//!
//! let back = i64::from_typed_value(&params[1]).unwrap();
//! assert_eq!(back, 42);
//! assert_eq!(2.0f64.to_typed_value(), TypedValue::Int(2));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod classify;
mod decode;
mod error;
mod value;
pub mod wire;

pub use classify::{classify, classify_float, ToTypedValue, MAX_SAFE_INTEGER};
pub use decode::{from_wire, FromTypedValue};
pub use error::{CodecError, CodecResult};
pub use value::TypedValue;

/// Builds a `Vec<TypedValue>` from heterogeneous values.
///
/// Each argument is classified with [`ToTypedValue`].
#[macro_export]
macro_rules! typed_params {
    () => {
        ::std::vec::Vec::<$crate::TypedValue>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::ToTypedValue::to_typed_value(&$value)),+]
    };
}

/// Classifies every element of a slice.
pub fn classify_all<T: ToTypedValue>(values: &[T]) -> Vec<TypedValue> {
    values.iter().map(ToTypedValue::to_typed_value).collect()
}
