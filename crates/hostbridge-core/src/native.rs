//! Coerced argument values as native bodies see them.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::heap::{MemberProjection, NativeCell};
use crate::{NativeHandle, TypeHash};

/// An argument after coercion to its parameter kind.
#[derive(Clone)]
pub enum NativeValue {
    /// Nothing
    Void,
    /// Null for a nullable parameter
    Null,
    /// Boolean value
    Bool(bool),
    /// Integral number
    Int(i64),
    /// Floating point number
    Float(f64),
    /// String value
    String(String),
    /// Reference to a bridged native object
    Object(ObjectRef),
    /// Sequence of coerced elements
    Array(Vec<NativeValue>),
    /// Key-ordered mapping of coerced values
    Map(BTreeMap<String, NativeValue>),
    /// Binary buffer
    Buffer(Vec<u8>),
}

impl NativeValue {
    /// Get a human-readable name for this value's type.
    pub fn type_name(&self) -> &'static str {
        match self {
            NativeValue::Void => "void",
            NativeValue::Null => "null",
            NativeValue::Bool(_) => "bool",
            NativeValue::Int(_) => "int",
            NativeValue::Float(_) => "float",
            NativeValue::String(_) => "string",
            NativeValue::Object(_) => "object",
            NativeValue::Array(_) => "array",
            NativeValue::Map(_) => "map",
            NativeValue::Buffer(_) => "buffer",
        }
    }

    /// Lock keys of every object reachable from this value.
    pub fn collect_lock_keys(&self, keys: &mut Vec<NativeHandle>) {
        match self {
            NativeValue::Object(obj) => keys.push(obj.lock_key),
            NativeValue::Array(items) => items.iter().for_each(|v| v.collect_lock_keys(keys)),
            NativeValue::Map(entries) => entries.values().for_each(|v| v.collect_lock_keys(keys)),
            _ => {}
        }
    }
}

impl fmt::Debug for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeValue::Void => write!(f, "Void"),
            NativeValue::Null => write!(f, "Null"),
            NativeValue::Bool(v) => write!(f, "Bool({})", v),
            NativeValue::Int(v) => write!(f, "Int({})", v),
            NativeValue::Float(v) => write!(f, "Float({})", v),
            NativeValue::String(s) => write!(f, "String({:?})", s),
            NativeValue::Object(obj) => write!(f, "Object({:?})", obj.handle),
            NativeValue::Array(items) => f.debug_list().entries(items).finish(),
            NativeValue::Map(entries) => f.debug_map().entries(entries).finish(),
            NativeValue::Buffer(bytes) => write!(f, "Buffer({} bytes)", bytes.len()),
        }
    }
}

/// A bridged object viewed as some class.
///
/// `class` is the object's runtime class, `view` the class the parameter
/// (or method receiver) declared. `path` upcasts from the runtime class to
/// the view.
#[derive(Clone)]
pub struct ObjectRef {
    /// Native object identity
    pub handle: NativeHandle,
    /// Runtime class
    pub class: TypeHash,
    /// Declared class
    pub view: TypeHash,
    /// Serialization key (the outermost owner for nested members)
    pub lock_key: NativeHandle,
    cell: Arc<NativeCell>,
    path: Vec<MemberProjection>,
}

impl ObjectRef {
    /// Create an object reference.
    pub fn new(
        handle: NativeHandle,
        view: TypeHash,
        lock_key: NativeHandle,
        cell: Arc<NativeCell>,
        path: Vec<MemberProjection>,
    ) -> Self {
        Self {
            handle,
            class: cell.class(),
            view,
            lock_key,
            cell,
            path,
        }
    }

    /// Typed mutable access.
    ///
    /// `T` may be the runtime class or any class on the upcast path to the
    /// declared view.
    pub fn with_mut<T: Any, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.cell.with_mut(&self.path, f)
    }

    /// Upcast steps from the runtime class to the view.
    pub fn path(&self) -> &[MemberProjection] {
        &self.path
    }

    /// Backing storage.
    pub fn cell(&self) -> &Arc<NativeCell> {
        &self.cell
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("handle", &self.handle)
            .field("class", &self.class)
            .field("view", &self.view)
            .field("lock_key", &self.lock_key)
            .field("upcasts", &self.path.len())
            .finish()
    }
}
