//! Iterators over native containers.
//!
//! An iterable class gets an `iterator()` method that returns a fresh
//! [`Cursor`] wrapped as the companion class `<Class>Iterator`. The
//! cursor's wrapper keeps the container's wrapper alive and shares its lock
//! key. Each `next()` reads the element at the cursor and returns
//! `{ value, done }`; a cursor past the end stays there.

use std::any::Any;
use std::collections::BTreeMap;

use hostbridge_core::{CallContext, IntoReturn, NativeError, ObjectRef, ReturnValue, TypeHash};

/// One iterator's position in its container.
pub(crate) struct Cursor {
    container: ObjectRef,
    next: usize,
}

/// Name of the iterator class of `container`.
pub(crate) fn iterator_class(container: &str) -> String {
    format!("{container}Iterator")
}

/// Body of `iterator()`: a cursor at the start of the receiver.
pub(crate) fn open(class: TypeHash) -> impl Fn(&mut CallContext) -> Result<(), NativeError> + Send + Sync + 'static {
    move |ctx: &mut CallContext| {
        let container = ctx.this_ref()?.clone();
        ctx.set_return(ReturnValue::Iterator {
            class,
            value: Box::new(Cursor { container, next: 0 }),
        });
        Ok(())
    }
}

/// Body of `next()` for copy iteration.
pub(crate) fn next_copy<T, V>(at: fn(&T, usize) -> Option<V>) -> impl Fn(&mut CallContext) -> Result<(), NativeError> + Send + Sync + 'static
where
    T: Any,
    V: IntoReturn + 'static,
{
    move |ctx: &mut CallContext| {
        let (container, index) = position(ctx)?;
        let item = ctx.with_object(&container, |this: &mut T| at(this, index))?;
        if item.is_some() {
            advance(ctx)?;
        }
        ctx.set_return(step(item.map(IntoReturn::into_return)));
        Ok(())
    }
}

/// Body of `next()` for nested-reference iteration.
pub(crate) fn next_nested<T, E>(
    element: String,
    at: fn(&mut T, usize) -> Option<&mut E>,
) -> impl Fn(&mut CallContext) -> Result<(), NativeError> + Send + Sync + 'static
where
    T: Any,
    E: Any,
{
    move |ctx: &mut CallContext| {
        let (container, index) = position(ctx)?;
        let found = ctx.with_object(&container, |this: &mut T| at(this, index).is_some())?;
        let item = if found {
            advance(ctx)?;
            Some(ReturnValue::element(container, &element, index, at))
        } else {
            None
        };
        ctx.set_return(step(item));
        Ok(())
    }
}

/// The cursor's container and position. Fails once the container is gone.
fn position(ctx: &CallContext) -> Result<(ObjectRef, usize), NativeError> {
    let (container, index) = ctx.with_this(|cursor: &mut Cursor| (cursor.container.clone(), cursor.next))?;
    if !ctx.heap().contains(container.handle) {
        return Err(NativeError::StaleHandle {
            handle: container.handle,
        });
    }
    Ok((container, index))
}

fn advance(ctx: &CallContext) -> Result<(), NativeError> {
    ctx.with_this(|cursor: &mut Cursor| cursor.next += 1)
}

/// `{ value, done }`; `None` is the end.
fn step(value: Option<ReturnValue>) -> ReturnValue {
    ReturnValue::Map(BTreeMap::from([
        ("done".to_string(), ReturnValue::Bool(value.is_none())),
        ("value".to_string(), value.unwrap_or(ReturnValue::Void)),
    ]))
}
