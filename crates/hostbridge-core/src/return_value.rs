//! What a native body hands back to the bridge.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

use crate::heap::{MemberProjection, project, projection};
use crate::{NativeHandle, ObjectRef, SharedRef, TypeHash};

/// A native return value before it crosses into the scripting side.
///
/// The variant says where an object lives, which decides its default
/// ownership once wrapped: a fresh value is owned by its wrapper, a pointer
/// is owned unless marked borrowed, a reference is borrowed unless marked
/// owned, a shared owner is counted, and members and elements belong to
/// the object they live in.
pub enum ReturnValue {
    /// Nothing
    Void,
    /// Null pointer
    Null,
    /// Boolean value
    Bool(bool),
    /// Integral number
    Int(i64),
    /// Floating point number
    Float(f64),
    /// String value
    String(String),
    /// Freshly created object, not yet on the heap
    New {
        class: TypeHash,
        value: Box<dyn Any + Send>,
    },
    /// Pointer to a heap object
    Pointer(NativeHandle),
    /// Reference to a heap object
    Reference(NativeHandle),
    /// Shared owner of a heap object
    Shared(SharedRef),
    /// Member object of the receiver
    Member {
        class: TypeHash,
        name: &'static str,
        project: MemberProjection,
    },
    /// Element `index` of `container`, in place
    Element {
        container: ObjectRef,
        class: TypeHash,
        index: usize,
        project: MemberProjection,
    },
    /// Fresh iterator over the receiver; its wrapper keeps the receiver's
    /// wrapper alive
    Iterator {
        class: TypeHash,
        value: Box<dyn Any + Send>,
    },
    /// Sequence of values
    Array(Vec<ReturnValue>),
    /// Key-ordered mapping of values
    Map(BTreeMap<String, ReturnValue>),
    /// Binary buffer
    Buffer(Vec<u8>),
}

impl ReturnValue {
    /// A fresh object of the class named `class`.
    pub fn object<T: Any + Send>(class: &str, value: T) -> Self {
        ReturnValue::New {
            class: TypeHash::from_name(class),
            value: Box::new(value),
        }
    }

    /// The member `name` of the receiver, reached through `f`.
    pub fn member<P: Any, C: Any>(class: &str, name: &'static str, f: fn(&mut P) -> &mut C) -> Self {
        ReturnValue::Member {
            class: TypeHash::from_name(class),
            name,
            project: project(f),
        }
    }

    /// Element `index` of `container`, reached through `at`.
    pub fn element<P: Any, C: Any>(
        container: ObjectRef,
        class: &str,
        index: usize,
        at: fn(&mut P, usize) -> Option<&mut C>,
    ) -> Self {
        ReturnValue::Element {
            container,
            class: TypeHash::from_name(class),
            index,
            project: projection(move |any| {
                any.downcast_mut::<P>()
                    .and_then(|p| at(p, index))
                    .map(|c| c as &mut dyn Any)
            }),
        }
    }

    /// A pointer that may be null.
    pub fn pointer(handle: Option<NativeHandle>) -> Self {
        handle.map_or(ReturnValue::Null, ReturnValue::Pointer)
    }

    /// Check if this is a null pointer.
    pub fn is_null(&self) -> bool {
        matches!(self, ReturnValue::Null)
    }

    /// Get a human-readable name for this value's shape.
    pub fn type_name(&self) -> &'static str {
        match self {
            ReturnValue::Void => "void",
            ReturnValue::Null => "null",
            ReturnValue::Bool(_) => "bool",
            ReturnValue::Int(_) => "int",
            ReturnValue::Float(_) => "float",
            ReturnValue::String(_) => "string",
            ReturnValue::New { .. } => "new object",
            ReturnValue::Pointer(_) => "pointer",
            ReturnValue::Reference(_) => "reference",
            ReturnValue::Shared(_) => "shared",
            ReturnValue::Member { .. } => "member",
            ReturnValue::Element { .. } => "element",
            ReturnValue::Iterator { .. } => "iterator",
            ReturnValue::Array(_) => "array",
            ReturnValue::Map(_) => "map",
            ReturnValue::Buffer(_) => "buffer",
        }
    }
}

impl fmt::Debug for ReturnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnValue::Void => write!(f, "Void"),
            ReturnValue::Null => write!(f, "Null"),
            ReturnValue::Bool(v) => write!(f, "Bool({})", v),
            ReturnValue::Int(v) => write!(f, "Int({})", v),
            ReturnValue::Float(v) => write!(f, "Float({})", v),
            ReturnValue::String(s) => write!(f, "String({:?})", s),
            ReturnValue::New { class, .. } => write!(f, "New({:?})", class),
            ReturnValue::Pointer(h) => write!(f, "Pointer({:?})", h),
            ReturnValue::Reference(h) => write!(f, "Reference({:?})", h),
            ReturnValue::Shared(s) => write!(f, "Shared({:?})", s.handle()),
            ReturnValue::Member { class, name, .. } => write!(f, "Member({}: {:?})", name, class),
            ReturnValue::Element {
                container, index, ..
            } => write!(f, "Element({:?}[{}])", container.handle, index),
            ReturnValue::Iterator { class, .. } => write!(f, "Iterator({:?})", class),
            ReturnValue::Array(items) => f.debug_list().entries(items).finish(),
            ReturnValue::Map(entries) => f.debug_map().entries(entries).finish(),
            ReturnValue::Buffer(bytes) => write!(f, "Buffer({} bytes)", bytes.len()),
        }
    }
}
