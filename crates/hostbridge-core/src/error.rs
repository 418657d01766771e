//! Error types for the bridge.
//!
//! ## Key Types
//!
//! - [`CoercionFailure`]: why one argument did not fit one parameter kind
//! - [`Rejection`]: why one overload candidate was rejected
//! - [`ConversionError`] / [`NativeError`]: failures raised inside native bodies
//! - [`BridgeError`]: everything the scripting side can observe

use thiserror::Error;

use crate::NativeHandle;

/// Why an argument could not be coerced to a parameter kind.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoercionFailure {
    #[error("Not a number")]
    NotANumber,

    #[error("Not a string")]
    NotAString,

    #[error("Not a boolean")]
    NotABoolean,

    #[error("Expected an object")]
    NotAnObject,

    #[error("Expected an array")]
    NotAnArray,

    #[error("Expected a map")]
    NotAMap,

    #[error("Expected a Buffer")]
    NotABuffer,

    /// Object of an unrelated class, or an object the registry no longer knows
    #[error("Expected a {expected}, got {actual}")]
    WrongClass { expected: String, actual: String },

    #[error("Null is not allowed here")]
    NullNotAllowed,

    /// Raised by a user typemap
    #[error("{message}")]
    Custom { message: String },

    #[error("element {index}: {failure}")]
    Element {
        index: usize,
        failure: Box<CoercionFailure>,
    },

    #[error("entry {key:?}: {failure}")]
    Entry {
        key: String,
        failure: Box<CoercionFailure>,
    },
}

/// Why a single overload candidate was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("Expected {expected} arguments, got {got}")]
    Arity { expected: usize, got: usize },

    #[error("argument {index}: {failure}")]
    Param {
        index: usize,
        failure: CoercionFailure,
    },
}

/// Errors converting a coerced native value into a Rust type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("integer overflow: value {value} does not fit in {target_type}")]
    IntegerOverflow {
        value: i64,
        target_type: &'static str,
    },
}

/// Errors raised by native function bodies.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NativeError {
    #[error("conversion error: {0}")]
    Conversion(#[from] ConversionError),

    #[error("invalid 'this' reference: {message}")]
    InvalidThis { message: String },

    #[error("argument index {index} out of bounds (function has {count} arguments)")]
    ArgumentIndexOutOfBounds { index: usize, count: usize },

    #[error("object is not a {type_name}")]
    TypeMismatch { type_name: &'static str },

    #[error("object {handle} has been freed")]
    StaleHandle { handle: NativeHandle },

    /// The same native object was borrowed twice within one call
    #[error("object is already borrowed by this call")]
    AlreadyBorrowed,

    #[error("native function panicked: {message}")]
    Panic { message: String },

    #[error("{message}")]
    Other { message: String },
}

impl NativeError {
    /// Create an "invalid this" error with a message.
    pub fn invalid_this(message: impl Into<String>) -> Self {
        NativeError::InvalidThis {
            message: message.into(),
        }
    }

    /// Create a generic native error.
    pub fn other(message: impl Into<String>) -> Self {
        NativeError::Other {
            message: message.into(),
        }
    }

    /// Build a panic error from a caught panic payload.
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        NativeError::Panic { message }
    }
}

/// Errors observable by the scripting side.
///
/// Async failures are delivered through promises, which may be inspected
/// more than once, hence `Clone`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    #[error("{callable}: Expected {expected} arguments, got {got}")]
    ArityMismatch {
        callable: String,
        expected: usize,
        got: usize,
    },

    #[error("{callable}: argument {index}: {failure}")]
    Coercion {
        callable: String,
        index: usize,
        failure: CoercionFailure,
    },

    #[error("{callable}: no overload matches the arguments [{}]", render_rejections(.rejections))]
    NoMatchingOverload {
        callable: String,
        rejections: Vec<Rejection>,
    },

    #[error("Cannot construct {class}: {message}")]
    ConstructionFailure { class: String, message: String },

    #[error("{callable}: Returned nullptr")]
    NullReturnRejected { callable: String },

    #[error("{callable}: {message}")]
    NativeOperationFailure { callable: String, message: String },

    #[error("Unknown callable {name}")]
    UnknownCallable { name: String },

    #[error("Class {name} not found, is the class defined?")]
    UnknownClass { name: String },

    #[error("Object {handle} is no longer alive")]
    ObjectExpired { handle: NativeHandle },

    #[error("{callable}: object {key} is busy with an asynchronous call")]
    WouldBlock { callable: String, key: NativeHandle },
}

fn render_rejections(rejections: &[Rejection]) -> String {
    rejections
        .iter()
        .enumerate()
        .map(|(i, r)| format!("#{i}: {r}"))
        .collect::<Vec<_>>()
        .join("; ")
}

impl BridgeError {
    /// Native body failure for `callable`.
    pub fn native(callable: impl Into<String>, error: &NativeError) -> Self {
        BridgeError::NativeOperationFailure {
            callable: callable.into(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coercion_messages() {
        assert_eq!(CoercionFailure::NotANumber.to_string(), "Not a number");
        assert_eq!(CoercionFailure::NotAString.to_string(), "Not a string");
        let wrong = CoercionFailure::WrongClass {
            expected: "Counter".into(),
            actual: "Widget".into(),
        };
        assert_eq!(wrong.to_string(), "Expected a Counter, got Widget");
        assert_eq!(CoercionFailure::NotABuffer.to_string(), "Expected a Buffer");
        let custom = CoercionFailure::Custom {
            message: "Expected a string".into(),
        };
        assert_eq!(custom.to_string(), "Expected a string");
        let nested = CoercionFailure::Element {
            index: 2,
            failure: Box::new(CoercionFailure::NotANumber),
        };
        assert_eq!(nested.to_string(), "element 2: Not a number");
    }

    #[test]
    fn no_matching_overload_lists_every_candidate() {
        let err = BridgeError::NoMatchingOverload {
            callable: "add".into(),
            rejections: vec![
                Rejection::Arity {
                    expected: 1,
                    got: 2,
                },
                Rejection::Param {
                    index: 1,
                    failure: CoercionFailure::NotAString,
                },
            ],
        };
        let text = err.to_string();
        assert!(text.contains("#0: Expected 1 arguments, got 2"));
        assert!(text.contains("#1: argument 1: Not a string"));
    }

    #[test]
    fn panic_payloads() {
        let err = NativeError::from_panic(&"boom");
        assert_eq!(err, NativeError::Panic { message: "boom".into() });
        let err = NativeError::from_panic(&String::from("bang"));
        assert_eq!(err.to_string(), "native function panicked: bang");
        let err = NativeError::from_panic(&42u8);
        assert!(err.to_string().contains("unknown"));
    }

    #[test]
    fn native_failure_wraps_message() {
        let err = BridgeError::native("Counter.fail", &NativeError::other("exploded"));
        assert_eq!(err.to_string(), "Counter.fail: exploded");
    }
}
