//! Settle-once promise handles.
//!
//! A [`Promise`] is what the scripting side holds; the matching
//! [`Deferred`] is the only way to settle it. Settling consumes the
//! deferred, so a promise is resolved or rejected at most once.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// Observable state of a promise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseStatus {
    /// Not settled yet
    Pending,
    /// Settled with a value
    Fulfilled,
    /// Settled with an error
    Rejected,
}

enum Slot<T, E> {
    Pending,
    Fulfilled(T),
    Rejected(E),
}

/// Scripting-side handle to an asynchronous result.
pub struct Promise<T, E> {
    slot: Arc<Mutex<Slot<T, E>>>,
}

/// Settling side of a [`Promise`].
pub struct Deferred<T, E> {
    slot: Arc<Mutex<Slot<T, E>>>,
}

impl<T, E> Promise<T, E> {
    /// Create a pending promise and its settling side.
    pub fn pending() -> (Promise<T, E>, Deferred<T, E>) {
        let slot = Arc::new(Mutex::new(Slot::Pending));
        (
            Promise {
                slot: Arc::clone(&slot),
            },
            Deferred { slot },
        )
    }

    /// Create an already rejected promise.
    pub fn rejected(error: E) -> Self {
        Promise {
            slot: Arc::new(Mutex::new(Slot::Rejected(error))),
        }
    }

    /// Current state.
    pub fn status(&self) -> PromiseStatus {
        match &*self.slot.lock() {
            Slot::Pending => PromiseStatus::Pending,
            Slot::Fulfilled(_) => PromiseStatus::Fulfilled,
            Slot::Rejected(_) => PromiseStatus::Rejected,
        }
    }

    /// Whether the promise has been resolved or rejected.
    pub fn is_settled(&self) -> bool {
        self.status() != PromiseStatus::Pending
    }
}

impl<T: Clone, E: Clone> Promise<T, E> {
    /// The settled outcome, if any.
    pub fn result(&self) -> Option<Result<T, E>> {
        match &*self.slot.lock() {
            Slot::Pending => None,
            Slot::Fulfilled(value) => Some(Ok(value.clone())),
            Slot::Rejected(error) => Some(Err(error.clone())),
        }
    }
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Promise {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise").field("status", &self.status()).finish()
    }
}

impl<T, E> Deferred<T, E> {
    /// Fulfil the promise.
    pub fn resolve(self, value: T) {
        *self.slot.lock() = Slot::Fulfilled(value);
    }

    /// Reject the promise.
    pub fn reject(self, error: E) {
        *self.slot.lock() = Slot::Rejected(error);
    }

    /// Settle with either outcome.
    pub fn settle(self, outcome: Result<T, E>) {
        match outcome {
            Ok(value) => self.resolve(value),
            Err(error) => self.reject(error),
        }
    }
}

impl<T, E> fmt::Debug for Deferred<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_once() {
        let (promise, deferred) = Promise::<i32, String>::pending();
        assert_eq!(promise.status(), PromiseStatus::Pending);
        assert_eq!(promise.result(), None);
        deferred.resolve(4);
        assert_eq!(promise.status(), PromiseStatus::Fulfilled);
        assert_eq!(promise.result(), Some(Ok(4)));
        // observable repeatedly
        assert_eq!(promise.clone().result(), Some(Ok(4)));
    }

    #[test]
    fn rejection() {
        let (promise, deferred) = Promise::<i32, String>::pending();
        deferred.settle(Err("nope".into()));
        assert_eq!(promise.result(), Some(Err("nope".to_string())));
        let early = Promise::<i32, String>::rejected("bad".into());
        assert!(early.is_settled());
    }
}
