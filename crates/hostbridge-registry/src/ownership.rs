//! Ownership disciplines for bridged objects.
//!
//! Every registry entry carries an [`Ownership`]. It decides what happens to
//! the native object once its wrapper is collected, and which lock key
//! serializes calls on it. The ownership of a returned object is derived from
//! the shape of the native return plus its [`ReturnAttr`] flags (see
//! [`adopt`]).

use std::fmt;

use hostbridge_core::{NativeHandle, ReturnAttr};
use thiserror::Error;

/// Who may destroy a native object, and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ownership {
    /// The wrapper owns the object; collecting it destroys the object.
    Owned,
    /// The wrapper holds one shared count; collecting it releases the count.
    SharedCounted,
    /// Native code owns the object; collecting the wrapper only unregisters it.
    Borrowed,
    /// The object lives inside the given parent and dies with it.
    NestedChild(NativeHandle),
}

/// What the finalization bridge does to the native object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposal {
    /// Destroy the object now
    Destroy,
    /// Give back one shared count
    Release,
    /// Leave the object alone
    Keep,
}

impl Ownership {
    /// Action to take when the wrapper is collected.
    pub fn disposal(self) -> Disposal {
        match self {
            Ownership::Owned => Disposal::Destroy,
            Ownership::SharedCounted => Disposal::Release,
            Ownership::Borrowed | Ownership::NestedChild(_) => Disposal::Keep,
        }
    }

    /// Whether an entry with this ownership may be promoted to `to`.
    ///
    /// Only borrowed objects can be promoted, and only to an owning
    /// discipline.
    pub fn can_promote_to(self, to: Ownership) -> bool {
        matches!(
            (self, to),
            (Ownership::Borrowed, Ownership::Owned | Ownership::SharedCounted)
        )
    }
}

impl fmt::Display for Ownership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ownership::Owned => write!(f, "owned"),
            Ownership::SharedCounted => write!(f, "shared"),
            Ownership::Borrowed => write!(f, "borrowed"),
            Ownership::NestedChild(parent) => write!(f, "nested in {parent}"),
        }
    }
}

/// Rejected ownership promotion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromotionError {
    #[error("object {handle} is not registered")]
    NotRegistered { handle: NativeHandle },

    #[error("cannot promote {from} object {handle} to {to}")]
    Forbidden {
        handle: NativeHandle,
        from: Ownership,
        to: Ownership,
    },
}

/// Where a returned object lives on the native side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnShape {
    /// A fresh value created by the call
    Fresh,
    /// A pointer to an existing object
    Pointer,
    /// A reference to an existing object
    Reference,
    /// A shared owner
    Shared,
    /// A member of the receiver
    Member,
}

/// How a returned object crosses into the scripting side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adoption {
    /// Wrap the object itself with the given ownership.
    Wrap(Ownership),
    /// Wrap an owned copy made as the declared class.
    Copy,
}

/// Decide how a returned object is adopted.
///
/// `receiver` is the object the call was made on, if any. Flag precedence
/// is `COPY`, then `NESTED`, then `OWNED`, then `BORROWED`. A fresh value
/// is always owned, and a shared owner is always counted.
pub fn adopt(shape: ReturnShape, attrs: ReturnAttr, receiver: Option<NativeHandle>) -> Adoption {
    let nested = || match receiver {
        Some(parent) => Ownership::NestedChild(parent),
        None => Ownership::Borrowed,
    };
    match shape {
        ReturnShape::Fresh => Adoption::Wrap(Ownership::Owned),
        _ if attrs.contains(ReturnAttr::COPY) => Adoption::Copy,
        ReturnShape::Shared => Adoption::Wrap(Ownership::SharedCounted),
        ReturnShape::Member => Adoption::Wrap(nested()),
        ReturnShape::Pointer | ReturnShape::Reference if attrs.contains(ReturnAttr::NESTED) => {
            Adoption::Wrap(nested())
        }
        ReturnShape::Pointer | ReturnShape::Reference if attrs.contains(ReturnAttr::OWNED) => {
            Adoption::Wrap(Ownership::Owned)
        }
        ReturnShape::Pointer | ReturnShape::Reference
            if attrs.contains(ReturnAttr::BORROWED) =>
        {
            Adoption::Wrap(Ownership::Borrowed)
        }
        ReturnShape::Pointer => Adoption::Wrap(Ownership::Owned),
        ReturnShape::Reference => Adoption::Wrap(Ownership::Borrowed),
    }
}
