//! Dynamically typed values as the scripting runtime sees them.

use std::collections::BTreeMap;
use std::fmt;

use crate::Proxy;

/// A value on the scripting side of the bridge.
///
/// Maps are key-ordered. Objects are proxies whose identity is reference
/// equality.
#[derive(Clone, PartialEq)]
pub enum ScriptValue {
    /// Absent value
    Undefined,
    /// Explicit null
    Null,
    /// Boolean value
    Bool(bool),
    /// Number value (the scripting runtime has a single numeric type)
    Number(f64),
    /// String value
    String(String),
    /// Ordered sequence
    Array(Vec<ScriptValue>),
    /// Key-ordered mapping
    Map(BTreeMap<String, ScriptValue>),
    /// Wrapped native object
    Object(Proxy),
    /// Binary buffer
    Buffer(Vec<u8>),
}

impl ScriptValue {
    /// Get a human-readable name for this value's type.
    pub fn type_name(&self) -> &'static str {
        match self {
            ScriptValue::Undefined => "undefined",
            ScriptValue::Null => "null",
            ScriptValue::Bool(_) => "boolean",
            ScriptValue::Number(_) => "number",
            ScriptValue::String(_) => "string",
            ScriptValue::Array(_) => "array",
            ScriptValue::Map(_) => "map",
            ScriptValue::Object(_) => "object",
            ScriptValue::Buffer(_) => "buffer",
        }
    }

    /// Check if this is `null` or `undefined`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, ScriptValue::Undefined | ScriptValue::Null)
    }

    /// The number inside, if this is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ScriptValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The string inside, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScriptValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// The boolean inside, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScriptValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The proxy inside, if this is an object.
    pub fn as_object(&self) -> Option<&Proxy> {
        match self {
            ScriptValue::Object(p) => Some(p),
            _ => None,
        }
    }

    /// The elements, if this is an array.
    pub fn as_array(&self) -> Option<&[ScriptValue]> {
        match self {
            ScriptValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// The bytes, if this is a buffer.
    pub fn as_buffer(&self) -> Option<&[u8]> {
        match self {
            ScriptValue::Buffer(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// The entries, if this is a map.
    pub fn as_map(&self) -> Option<&BTreeMap<String, ScriptValue>> {
        match self {
            ScriptValue::Map(entries) => Some(entries),
            _ => None,
        }
    }
}

impl fmt::Debug for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptValue::Undefined => write!(f, "Undefined"),
            ScriptValue::Null => write!(f, "Null"),
            ScriptValue::Bool(v) => write!(f, "Bool({})", v),
            ScriptValue::Number(v) => write!(f, "Number({})", v),
            ScriptValue::String(s) => write!(f, "String({:?})", s),
            ScriptValue::Array(items) => f.debug_list().entries(items).finish(),
            ScriptValue::Map(entries) => f.debug_map().entries(entries).finish(),
            ScriptValue::Object(p) => write!(f, "Object({:?})", p.handle()),
            ScriptValue::Buffer(bytes) => write!(f, "Buffer({} bytes)", bytes.len()),
        }
    }
}

impl From<f64> for ScriptValue {
    fn from(value: f64) -> Self {
        ScriptValue::Number(value)
    }
}

impl From<i32> for ScriptValue {
    fn from(value: i32) -> Self {
        ScriptValue::Number(value as f64)
    }
}

impl From<bool> for ScriptValue {
    fn from(value: bool) -> Self {
        ScriptValue::Bool(value)
    }
}

impl From<&str> for ScriptValue {
    fn from(value: &str) -> Self {
        ScriptValue::String(value.to_string())
    }
}

impl From<String> for ScriptValue {
    fn from(value: String) -> Self {
        ScriptValue::String(value)
    }
}

impl From<Proxy> for ScriptValue {
    fn from(value: Proxy) -> Self {
        ScriptValue::Object(value)
    }
}

impl From<Vec<ScriptValue>> for ScriptValue {
    fn from(value: Vec<ScriptValue>) -> Self {
        ScriptValue::Array(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names() {
        assert_eq!(ScriptValue::Undefined.type_name(), "undefined");
        assert_eq!(ScriptValue::from(1).type_name(), "number");
        assert_eq!(ScriptValue::from("x").type_name(), "string");
        assert_eq!(ScriptValue::from(true).type_name(), "boolean");
        assert_eq!(ScriptValue::Array(vec![]).type_name(), "array");
        assert_eq!(ScriptValue::Buffer(vec![1]).type_name(), "buffer");
    }

    #[test]
    fn nullish() {
        assert!(ScriptValue::Null.is_nullish());
        assert!(ScriptValue::Undefined.is_nullish());
        assert!(!ScriptValue::from(0).is_nullish());
    }

    #[test]
    fn accessors() {
        assert_eq!(ScriptValue::from(2.5).as_number(), Some(2.5));
        assert_eq!(ScriptValue::from("a").as_str(), Some("a"));
        assert_eq!(ScriptValue::from("a").as_number(), None);
        assert_eq!(ScriptValue::from(false).as_bool(), Some(false));
        assert_eq!(ScriptValue::Buffer(vec![1, 2]).as_buffer(), Some(&[1u8, 2][..]));
        assert_eq!(ScriptValue::from("a").as_buffer(), None);
    }
}
