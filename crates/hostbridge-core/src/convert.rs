//! Conversion traits for argument extraction and return values.
//!
//! - [`FromNative`]: extract a Rust value from a coerced [`NativeValue`]
//! - [`IntoReturn`]: turn a Rust value into a [`ReturnValue`]
//! - [`Buffer`]: owned bytes crossing as a binary buffer
//!
//! Arguments have already been coerced to their declared kind by the time a
//! body runs, so these conversions only bridge representation (an `Int`
//! parameter arrives as `i64` and may be narrowed here).

use std::collections::BTreeMap;
use std::ops::Deref;

use crate::error::ConversionError;
use crate::{NativeValue, ObjectRef, ReturnValue, SharedRef};

/// Extract a value from a coerced argument.
pub trait FromNative: Sized {
    /// Extract a value from the given argument.
    fn from_native(value: &NativeValue) -> Result<Self, ConversionError>;
}

/// Convert a value into a native return value.
pub trait IntoReturn {
    /// Convert this value into a return value.
    fn into_return(self) -> ReturnValue;
}

fn mismatch(expected: &'static str, value: &NativeValue) -> ConversionError {
    ConversionError::TypeMismatch {
        expected,
        actual: value.type_name(),
    }
}

// ============================================================================
// Integer implementations
// ============================================================================

macro_rules! impl_int {
    ($($ty:ty),*) => {
        $(
            impl FromNative for $ty {
                fn from_native(value: &NativeValue) -> Result<Self, ConversionError> {
                    match value {
                        NativeValue::Int(v) => <$ty>::try_from(*v).map_err(|_| {
                            ConversionError::IntegerOverflow {
                                value: *v,
                                target_type: stringify!($ty),
                            }
                        }),
                        other => Err(mismatch("int", other)),
                    }
                }
            }
        )*
    };
}

impl_int!(i8, i16, i32, i64, u8, u16, u32, u64, usize);

macro_rules! impl_int_return {
    ($($ty:ty),*) => {
        $(
            impl IntoReturn for $ty {
                fn into_return(self) -> ReturnValue {
                    ReturnValue::Int(i64::from(self))
                }
            }
        )*
    };
}

impl_int_return!(i8, i16, i32, i64, u8, u16, u32);

// values past i64::MAX cross as the nearest float
macro_rules! impl_wide_return {
    ($($ty:ty),*) => {
        $(
            impl IntoReturn for $ty {
                fn into_return(self) -> ReturnValue {
                    match i64::try_from(self) {
                        Ok(v) => ReturnValue::Int(v),
                        Err(_) => ReturnValue::Float(self as f64),
                    }
                }
            }
        )*
    };
}

impl_wide_return!(u64, usize);

// ============================================================================
// Float implementations
// ============================================================================

impl FromNative for f64 {
    fn from_native(value: &NativeValue) -> Result<Self, ConversionError> {
        match value {
            NativeValue::Float(v) => Ok(*v),
            NativeValue::Int(v) => Ok(*v as f64),
            other => Err(mismatch("float", other)),
        }
    }
}

impl FromNative for f32 {
    fn from_native(value: &NativeValue) -> Result<Self, ConversionError> {
        f64::from_native(value).map(|v| v as f32)
    }
}

impl IntoReturn for f64 {
    fn into_return(self) -> ReturnValue {
        ReturnValue::Float(self)
    }
}

impl IntoReturn for f32 {
    fn into_return(self) -> ReturnValue {
        ReturnValue::Float(self as f64)
    }
}

// ============================================================================
// Other scalars
// ============================================================================

impl FromNative for bool {
    fn from_native(value: &NativeValue) -> Result<Self, ConversionError> {
        match value {
            NativeValue::Bool(v) => Ok(*v),
            other => Err(mismatch("bool", other)),
        }
    }
}

impl IntoReturn for bool {
    fn into_return(self) -> ReturnValue {
        ReturnValue::Bool(self)
    }
}

impl FromNative for String {
    fn from_native(value: &NativeValue) -> Result<Self, ConversionError> {
        match value {
            NativeValue::String(s) => Ok(s.clone()),
            other => Err(mismatch("string", other)),
        }
    }
}

impl IntoReturn for String {
    fn into_return(self) -> ReturnValue {
        ReturnValue::String(self)
    }
}

impl IntoReturn for &str {
    fn into_return(self) -> ReturnValue {
        ReturnValue::String(self.to_string())
    }
}

impl IntoReturn for () {
    fn into_return(self) -> ReturnValue {
        ReturnValue::Void
    }
}

impl IntoReturn for ReturnValue {
    fn into_return(self) -> ReturnValue {
        self
    }
}

impl IntoReturn for SharedRef {
    fn into_return(self) -> ReturnValue {
        ReturnValue::Shared(self)
    }
}

impl FromNative for ObjectRef {
    fn from_native(value: &NativeValue) -> Result<Self, ConversionError> {
        match value {
            NativeValue::Object(obj) => Ok(obj.clone()),
            other => Err(mismatch("object", other)),
        }
    }
}

impl FromNative for NativeValue {
    fn from_native(value: &NativeValue) -> Result<Self, ConversionError> {
        Ok(value.clone())
    }
}

// ============================================================================
// Buffers
// ============================================================================

/// Bytes passed as a binary buffer.
///
/// `Vec<u8>` already converts as an array of numbers, hence the wrapper.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buffer(pub Vec<u8>);

impl Buffer {
    /// Consume into the bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl Deref for Buffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(bytes: Vec<u8>) -> Self {
        Buffer(bytes)
    }
}

impl FromNative for Buffer {
    fn from_native(value: &NativeValue) -> Result<Self, ConversionError> {
        match value {
            NativeValue::Buffer(bytes) => Ok(Buffer(bytes.clone())),
            other => Err(mismatch("buffer", other)),
        }
    }
}

impl IntoReturn for Buffer {
    fn into_return(self) -> ReturnValue {
        ReturnValue::Buffer(self.0)
    }
}

// ============================================================================
// Containers
// ============================================================================

impl<T: FromNative> FromNative for Option<T> {
    fn from_native(value: &NativeValue) -> Result<Self, ConversionError> {
        match value {
            NativeValue::Null | NativeValue::Void => Ok(None),
            other => T::from_native(other).map(Some),
        }
    }
}

impl<T: IntoReturn> IntoReturn for Option<T> {
    fn into_return(self) -> ReturnValue {
        match self {
            Some(v) => v.into_return(),
            None => ReturnValue::Null,
        }
    }
}

impl<T: FromNative> FromNative for Vec<T> {
    fn from_native(value: &NativeValue) -> Result<Self, ConversionError> {
        match value {
            NativeValue::Array(items) => items.iter().map(T::from_native).collect(),
            other => Err(mismatch("array", other)),
        }
    }
}

impl<T: IntoReturn> IntoReturn for Vec<T> {
    fn into_return(self) -> ReturnValue {
        ReturnValue::Array(self.into_iter().map(IntoReturn::into_return).collect())
    }
}

impl<T: FromNative> FromNative for BTreeMap<String, T> {
    fn from_native(value: &NativeValue) -> Result<Self, ConversionError> {
        match value {
            NativeValue::Map(entries) => entries
                .iter()
                .map(|(k, v)| T::from_native(v).map(|v| (k.clone(), v)))
                .collect(),
            other => Err(mismatch("map", other)),
        }
    }
}

impl<T: IntoReturn> IntoReturn for BTreeMap<String, T> {
    fn into_return(self) -> ReturnValue {
        ReturnValue::Map(self.into_iter().map(|(k, v)| (k, v.into_return())).collect())
    }
}
