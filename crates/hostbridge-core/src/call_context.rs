//! Call context handed to native function bodies.

use std::any::{Any, type_name};
use std::cell::RefCell;
use std::fmt;

use crate::convert::{FromNative, IntoReturn};
use crate::{NativeError, NativeHeap, NativeValue, ObjectRef, ReturnValue};

/// Context for one native call.
///
/// Holds the receiver and the coerced arguments, and collects the return
/// value. A context owns everything it holds, so an asynchronous call can
/// build it on the control thread and run it on a worker.
///
/// ## Typed Argument Access
///
/// ```ignore
/// let amount: f64 = ctx.arg(0)?;
/// let total = ctx.with_this(|c: &mut Counter| {
///     c.value += amount;
///     c.value
/// })?;
/// ctx.set_return(total);
/// ```
pub struct CallContext {
    heap: NativeHeap,
    this: Option<ObjectRef>,
    args: Vec<NativeValue>,
    return_value: ReturnValue,
    /// Root cells currently borrowed by `with_object`
    borrowed: RefCell<Vec<usize>>,
}

impl CallContext {
    /// Create a new call context.
    pub fn new(heap: NativeHeap, this: Option<ObjectRef>, args: Vec<NativeValue>) -> Self {
        Self {
            heap,
            this,
            args,
            return_value: ReturnValue::Void,
            borrowed: RefCell::new(Vec::new()),
        }
    }

    /// Get the number of arguments (excluding the receiver).
    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// Get a raw reference to an argument.
    pub fn arg_slot(&self, index: usize) -> Result<&NativeValue, NativeError> {
        self.args
            .get(index)
            .ok_or(NativeError::ArgumentIndexOutOfBounds {
                index,
                count: self.args.len(),
            })
    }

    /// Get a typed argument value.
    pub fn arg<T: FromNative>(&self, index: usize) -> Result<T, NativeError> {
        T::from_native(self.arg_slot(index)?).map_err(NativeError::Conversion)
    }

    /// Get an object argument.
    pub fn object_arg(&self, index: usize) -> Result<&ObjectRef, NativeError> {
        match self.arg_slot(index)? {
            NativeValue::Object(obj) => Ok(obj),
            other => Err(NativeError::Conversion(
                crate::ConversionError::TypeMismatch {
                    expected: "object",
                    actual: other.type_name(),
                },
            )),
        }
    }

    /// The receiver of a method call.
    pub fn this_ref(&self) -> Result<&ObjectRef, NativeError> {
        self.this
            .as_ref()
            .ok_or_else(|| NativeError::invalid_this("no receiver for this call"))
    }

    /// Mutable access to the receiver as a `T`.
    pub fn with_this<T: Any, R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, NativeError> {
        let this = self.this_ref()?;
        self.with_object(this, f)
    }

    /// Mutable access to object argument `index` as a `T`.
    pub fn with_arg<T: Any, R>(&self, index: usize, f: impl FnOnce(&mut T) -> R) -> Result<R, NativeError> {
        let obj = self.object_arg(index)?;
        self.with_object(obj, f)
    }

    /// Mutable access to any object reference as a `T`.
    ///
    /// Borrowing an object that is already borrowed in this call (directly
    /// or through a member of it) fails with [`NativeError::AlreadyBorrowed`].
    pub fn with_object<T: Any, R>(&self, obj: &ObjectRef, f: impl FnOnce(&mut T) -> R) -> Result<R, NativeError> {
        let root = obj.cell().root_id();
        {
            let mut borrowed = self.borrowed.borrow_mut();
            if borrowed.contains(&root) {
                return Err(NativeError::AlreadyBorrowed);
            }
            borrowed.push(root);
        }
        let result = obj.with_mut(f);
        self.borrowed.borrow_mut().retain(|r| *r != root);
        result.ok_or(NativeError::TypeMismatch {
            type_name: type_name::<T>(),
        })
    }

    /// Set a typed return value.
    pub fn set_return<T: IntoReturn>(&mut self, value: T) {
        self.return_value = value.into_return();
    }

    /// Consume the context, yielding the return value.
    pub fn into_return(self) -> ReturnValue {
        self.return_value
    }

    /// Access to the native heap, for allocating or sharing objects.
    pub fn heap(&self) -> &NativeHeap {
        &self.heap
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("arg_count", &self.arg_count())
            .field("has_this", &self.this.is_some())
            .finish()
    }
}
