//! Declared call signatures.
//!
//! ## Key Types
//!
//! - [`ParamKind`]: the kind of value a parameter accepts or a call returns
//! - [`Signature`]: ordered parameter kinds plus a return kind
//! - [`ReturnAttr`]: flags controlling how a return value crosses the bridge

use bitflags::bitflags;

use crate::TypeHash;

/// Kind of a parameter or return value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// No value (returns only)
    Void,
    /// Integral number
    Int,
    /// Floating point number
    Float,
    /// String
    String,
    /// Boolean
    Bool,
    /// Object of the given class or a subclass
    Object(TypeHash),
    /// Pointer to an object of the given class or a subclass
    Pointer(TypeHash),
    /// Sequence of elements
    Array(Box<ParamKind>),
    /// String-keyed mapping
    Map(Box<ParamKind>),
    /// The inner kind, or null/undefined
    Nullable(Box<ParamKind>),
    /// Binary buffer
    Buffer,
    /// Converted by the user typemap with this name hash
    Custom(TypeHash),
    /// One iterator step, `{ value, done }`, whose value is the inner kind
    /// (returns only)
    IterStep(Box<ParamKind>),
}

impl ParamKind {
    /// Object parameter of the class named `class`.
    pub fn object(class: &str) -> Self {
        ParamKind::Object(TypeHash::from_name(class))
    }

    /// Pointer parameter of the class named `class`.
    pub fn pointer(class: &str) -> Self {
        ParamKind::Pointer(TypeHash::from_name(class))
    }

    /// Array of `element`.
    pub fn array(element: ParamKind) -> Self {
        ParamKind::Array(Box::new(element))
    }

    /// Map of `value`.
    pub fn map(value: ParamKind) -> Self {
        ParamKind::Map(Box::new(value))
    }

    /// `inner` or null.
    pub fn nullable(inner: ParamKind) -> Self {
        ParamKind::Nullable(Box::new(inner))
    }

    /// Kind converted by the typemap named `name`.
    pub fn custom(name: &str) -> Self {
        ParamKind::Custom(TypeHash::from_name(name))
    }

    /// Iterator step yielding `value`.
    pub fn iter_step(value: ParamKind) -> Self {
        ParamKind::IterStep(Box::new(value))
    }

    /// Replace every occurrence of `from`, at any depth, with `to`.
    pub fn substitute(&self, from: &ParamKind, to: &ParamKind) -> ParamKind {
        if self == from {
            return to.clone();
        }
        match self {
            ParamKind::Array(inner) => ParamKind::array(inner.substitute(from, to)),
            ParamKind::Map(inner) => ParamKind::map(inner.substitute(from, to)),
            ParamKind::Nullable(inner) => ParamKind::nullable(inner.substitute(from, to)),
            ParamKind::IterStep(inner) => ParamKind::iter_step(inner.substitute(from, to)),
            other => other.clone(),
        }
    }

    /// Typemaps referenced by this kind, at any depth.
    pub fn collect_custom(&self, out: &mut Vec<TypeHash>) {
        match self {
            ParamKind::Custom(hash) => out.push(*hash),
            ParamKind::Array(inner)
            | ParamKind::Map(inner)
            | ParamKind::Nullable(inner)
            | ParamKind::IterStep(inner) => inner.collect_custom(out),
            _ => {}
        }
    }

    /// Class referenced by this kind, looking through `Nullable`.
    pub fn class(&self) -> Option<TypeHash> {
        match self {
            ParamKind::Object(class) | ParamKind::Pointer(class) => Some(*class),
            ParamKind::Nullable(inner) => inner.class(),
            _ => None,
        }
    }

    /// Check if null is accepted.
    pub fn is_nullable(&self) -> bool {
        matches!(self, ParamKind::Nullable(_))
    }

    /// Structural hash used to derive callable ids.
    pub fn type_hash(&self) -> TypeHash {
        match self {
            ParamKind::Void => TypeHash::from_name("void"),
            ParamKind::Int => TypeHash::from_name("int"),
            ParamKind::Float => TypeHash::from_name("float"),
            ParamKind::String => TypeHash::from_name("string"),
            ParamKind::Bool => TypeHash::from_name("bool"),
            ParamKind::Object(class) => *class,
            ParamKind::Pointer(class) => TypeHash(class.0 ^ TypeHash::from_name("*").0),
            ParamKind::Array(inner) => {
                TypeHash::from_function("array", &[inner.type_hash()])
            }
            ParamKind::Map(inner) => TypeHash::from_function("map", &[inner.type_hash()]),
            ParamKind::Nullable(inner) => {
                TypeHash::from_function("nullable", &[inner.type_hash()])
            }
            ParamKind::Buffer => TypeHash::from_name("buffer"),
            ParamKind::Custom(name) => TypeHash::from_function("custom", &[*name]),
            ParamKind::IterStep(inner) => TypeHash::from_function("step", &[inner.type_hash()]),
        }
    }
}

bitflags! {
    /// Flags controlling how a returned value crosses the bridge.
    ///
    /// Ownership flags override the default derived from the shape of the
    /// native return (fresh value, pointer, reference, shared owner or
    /// member). `NON_NULL` turns a null return into an error.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ReturnAttr: u16 {
        /// The scripting side takes ownership of the returned object.
        const OWNED = 1 << 0;
        /// The native side keeps ownership.
        const BORROWED = 1 << 1;
        /// The returned object lives inside the receiver.
        const NESTED = 1 << 2;
        /// Return a copy as the declared class.
        const COPY = 1 << 3;
        /// The callable runs on the worker pool and settles a promise.
        const ASYNC = 1 << 4;
        /// Null returns are allowed.
        const NULLABLE = 1 << 5;
        /// Null returns are rejected.
        const NON_NULL = 1 << 6;
    }
}

/// A declared candidate for a callable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Expected parameter kinds, in order
    pub params: Vec<ParamKind>,
    /// Kind of the returned value
    pub returns: ParamKind,
    /// Return handling flags
    pub attrs: ReturnAttr,
}

impl Signature {
    /// Signature with the given parameters returning nothing.
    pub fn new(params: Vec<ParamKind>) -> Self {
        Self {
            params,
            returns: ParamKind::Void,
            attrs: ReturnAttr::empty(),
        }
    }

    /// Set the return kind.
    pub fn returns(mut self, kind: ParamKind) -> Self {
        self.returns = kind;
        self
    }

    /// Add return flags.
    pub fn with_attrs(mut self, attrs: ReturnAttr) -> Self {
        self.attrs |= attrs;
        self
    }

    /// Number of parameters.
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Whether this signature runs asynchronously.
    pub fn is_async(&self) -> bool {
        self.attrs.contains(ReturnAttr::ASYNC)
    }

    /// Apply [`ParamKind::substitute`] to every parameter and the return.
    pub fn substitute(&self, from: &ParamKind, to: &ParamKind) -> Signature {
        Signature {
            params: self.params.iter().map(|p| p.substitute(from, to)).collect(),
            returns: self.returns.substitute(from, to),
            attrs: self.attrs,
        }
    }

    /// Hashes of the parameter kinds, for callable ids.
    pub fn param_hashes(&self) -> Vec<TypeHash> {
        self.params.iter().map(ParamKind::type_hash).collect()
    }
}
