//! Native function storage and callable trait.

use std::fmt;
use std::sync::Arc;

use crate::{CallContext, NativeError, TypeHash};

/// Type-erased native function body.
///
/// Each `NativeFn` carries the id of the overload it implements. The inner
/// callable is shared, so clones are cheap and can be sent to worker
/// threads.
pub struct NativeFn {
    /// Overload id (see [`TypeHash::from_function`] and friends)
    pub id: TypeHash,
    inner: Arc<dyn NativeCallable + Send + Sync>,
}

impl NativeFn {
    /// Create a new NativeFn from a callable with a specific ID.
    pub fn new<F>(id: TypeHash, f: F) -> Self
    where
        F: NativeCallable + Send + Sync + 'static,
    {
        Self {
            id,
            inner: Arc::new(f),
        }
    }

    /// Call this native function with the given context.
    pub fn call(&self, ctx: &mut CallContext) -> Result<(), NativeError> {
        self.inner.call(ctx)
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFn")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Clone for NativeFn {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Trait for callable native functions.
///
/// The `call` method receives a [`CallContext`] holding the coerced
/// arguments and receiver, and stores the result with `set_return`.
pub trait NativeCallable {
    /// Call this function with the given context.
    fn call(&self, ctx: &mut CallContext) -> Result<(), NativeError>;
}

impl<F> NativeCallable for F
where
    F: Fn(&mut CallContext) -> Result<(), NativeError>,
{
    fn call(&self, ctx: &mut CallContext) -> Result<(), NativeError> {
        (self)(ctx)
    }
}
