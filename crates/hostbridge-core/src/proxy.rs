//! Scripting-side wrappers for native objects.
//!
//! A [`Proxy`] is what the scripting runtime holds. Reference equality of
//! proxies is scripting-side identity. When the last strong reference to a
//! proxy goes away the proxy posts a [`Finalization`] notice; the control
//! thread drains those notices and decides what happens to the native
//! object.

use std::fmt;
use std::sync::{Arc, Weak};

use crossbeam_channel::Sender;

use crate::{NativeHandle, TypeHash, WrapperId};

/// Notice that a proxy became unreachable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Finalization {
    /// Native object the proxy stood for
    pub handle: NativeHandle,
    /// Identity of the collected wrapper
    pub wrapper: WrapperId,
}

struct ProxyInner {
    handle: NativeHandle,
    class: TypeHash,
    wrapper: WrapperId,
    parent: Option<Proxy>,
    reaper: Option<Sender<Finalization>>,
}

impl Drop for ProxyInner {
    fn drop(&mut self) {
        if let Some(reaper) = &self.reaper {
            // The receiver is gone only when the bridge itself is being torn down.
            let _ = reaper.send(Finalization {
                handle: self.handle,
                wrapper: self.wrapper,
            });
        }
    }
}

/// Reference-counted scripting-side wrapper.
#[derive(Clone)]
pub struct Proxy(Arc<ProxyInner>);

impl Proxy {
    /// Create a proxy that reports its collection on `reaper`.
    ///
    /// `parent` is kept alive for as long as this proxy lives.
    pub fn new(
        handle: NativeHandle,
        class: TypeHash,
        wrapper: WrapperId,
        parent: Option<Proxy>,
        reaper: Sender<Finalization>,
    ) -> Self {
        Self(Arc::new(ProxyInner {
            handle,
            class,
            wrapper,
            parent,
            reaper: Some(reaper),
        }))
    }

    /// Create a proxy that nobody is told about when it dies.
    pub fn detached(handle: NativeHandle, class: TypeHash, wrapper: WrapperId) -> Self {
        Self(Arc::new(ProxyInner {
            handle,
            class,
            wrapper,
            parent: None,
            reaper: None,
        }))
    }

    /// Native object behind this proxy.
    pub fn handle(&self) -> NativeHandle {
        self.0.handle
    }

    /// Runtime class of the native object.
    pub fn class(&self) -> TypeHash {
        self.0.class
    }

    /// Registry entry generation that created this proxy.
    pub fn wrapper_id(&self) -> WrapperId {
        self.0.wrapper
    }

    /// Parent kept alive by this (nested) proxy.
    pub fn parent(&self) -> Option<&Proxy> {
        self.0.parent.as_ref()
    }

    /// Weak reference that does not keep the proxy alive.
    pub fn downgrade(&self) -> WeakProxy {
        WeakProxy(Arc::downgrade(&self.0))
    }

    /// Reference equality.
    pub fn ptr_eq(a: &Proxy, b: &Proxy) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// Number of live strong references.
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl PartialEq for Proxy {
    fn eq(&self, other: &Self) -> bool {
        Proxy::ptr_eq(self, other)
    }
}

impl Eq for Proxy {}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("handle", &self.0.handle)
            .field("class", &self.0.class)
            .field("wrapper", &self.0.wrapper)
            .field("nested", &self.0.parent.is_some())
            .finish()
    }
}

/// Weak reference to a proxy.
#[derive(Clone, Default)]
pub struct WeakProxy(Weak<ProxyInner>);

impl WeakProxy {
    /// Get the proxy if it is still alive.
    pub fn upgrade(&self) -> Option<Proxy> {
        self.0.upgrade().map(Proxy)
    }

    /// Whether the proxy is still alive.
    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl fmt::Debug for WeakProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakProxy").field("alive", &self.is_alive()).finish()
    }
}
