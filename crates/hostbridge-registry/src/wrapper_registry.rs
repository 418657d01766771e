//! The object store: one wrapper per native object.
//!
//! The registry maps native handles to weak references of their proxies. It
//! never holds a proxy strongly, so collection of the proxy stays in the
//! hands of the scripting side. Entries outlive their proxy until the
//! finalization bridge processes the matching notice; a lookup in between
//! revives the entry with a new proxy and a new [`WrapperId`], which makes
//! the late notice for the old proxy stale.

use hostbridge_core::{Finalization, NativeHandle, Proxy, TypeHash, WeakProxy, WrapperId};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::{Ownership, PromotionError};

/// Registry record for one bridged native object.
#[derive(Debug, Clone)]
pub struct WrapperEntry {
    /// Identity of the current wrapper
    pub wrapper: WrapperId,
    /// Runtime class of the object
    pub class: TypeHash,
    /// Destruction discipline
    pub ownership: Ownership,
    /// Serialization key for calls touching this object
    pub lock_key: NativeHandle,
    proxy: WeakProxy,
}

impl WrapperEntry {
    /// Whether the wrapper is still reachable.
    pub fn is_alive(&self) -> bool {
        self.proxy.is_alive()
    }
}

/// Everything needed to wrap an object that has no live wrapper yet.
#[derive(Debug, Clone)]
pub struct WrapRequest {
    /// Native object to wrap
    pub handle: NativeHandle,
    /// Runtime class of the object
    pub class: TypeHash,
    /// Ownership to record if the object is new to the registry
    pub ownership: Ownership,
    /// Serialization key for the object
    pub lock_key: NativeHandle,
    /// Proxy the new wrapper keeps alive (nested children)
    pub parent: Option<Proxy>,
}

/// Result of [`WrapperRegistry::lookup_or_create`].
#[derive(Debug, Clone)]
pub enum Exposure {
    /// The object already had a live wrapper.
    Existing(Proxy),
    /// The object was new to the registry.
    Created(Proxy),
    /// The object's entry outlived its wrapper; a new wrapper was issued
    /// under the entry's original ownership.
    Revived(Proxy),
}

impl Exposure {
    /// The wrapper.
    pub fn proxy(&self) -> &Proxy {
        match self {
            Exposure::Existing(p) | Exposure::Created(p) | Exposure::Revived(p) => p,
        }
    }

    /// Consume into the wrapper.
    pub fn into_proxy(self) -> Proxy {
        match self {
            Exposure::Existing(p) | Exposure::Created(p) | Exposure::Revived(p) => p,
        }
    }

    /// Whether a new registry entry was made.
    pub fn is_created(&self) -> bool {
        matches!(self, Exposure::Created(_))
    }
}

struct RegistryState {
    entries: FxHashMap<NativeHandle, WrapperEntry>,
    next_wrapper: u64,
}

impl RegistryState {
    fn issue(&mut self) -> WrapperId {
        self.next_wrapper += 1;
        WrapperId(self.next_wrapper)
    }
}

/// Maps native identity to the single wrapper that represents it.
pub struct WrapperRegistry {
    state: Mutex<RegistryState>,
    reaper: Sender<Finalization>,
}

impl WrapperRegistry {
    /// Create a registry whose proxies report collection on `reaper`.
    pub fn new(reaper: Sender<Finalization>) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                entries: FxHashMap::default(),
                next_wrapper: 0,
            }),
            reaper,
        }
    }

    /// Return the wrapper for `request.handle`, creating it if needed.
    ///
    /// An existing entry keeps its ownership: the first ownership assigned
    /// wins (see [`WrapperRegistry::promote`] for the explicit exception).
    pub fn lookup_or_create(&self, request: WrapRequest) -> Exposure {
        let mut state = self.state.lock();
        if let Some(entry) = state.entries.get(&request.handle)
            && let Some(proxy) = entry.proxy.upgrade()
        {
            tracing::trace!(target: "hostbridge::store", handle = %request.handle, wrapper = %proxy.wrapper_id(), "reusing wrapper");
            return Exposure::Existing(proxy);
        }

        let wrapper = state.issue();
        match state.entries.get_mut(&request.handle) {
            Some(entry) => {
                let proxy = Proxy::new(
                    request.handle,
                    entry.class,
                    wrapper,
                    request.parent,
                    self.reaper.clone(),
                );
                tracing::debug!(
                    target: "hostbridge::store",
                    handle = %request.handle,
                    old = %entry.wrapper,
                    new = %wrapper,
                    "reviving entry with a new wrapper"
                );
                entry.wrapper = wrapper;
                entry.proxy = proxy.downgrade();
                Exposure::Revived(proxy)
            }
            None => {
                let proxy = Proxy::new(
                    request.handle,
                    request.class,
                    wrapper,
                    request.parent,
                    self.reaper.clone(),
                );
                tracing::debug!(
                    target: "hostbridge::store",
                    handle = %request.handle,
                    %wrapper,
                    ownership = %request.ownership,
                    "registering wrapper"
                );
                state.entries.insert(
                    request.handle,
                    WrapperEntry {
                        wrapper,
                        class: request.class,
                        ownership: request.ownership,
                        lock_key: request.lock_key,
                        proxy: proxy.downgrade(),
                    },
                );
                Exposure::Created(proxy)
            }
        }
    }

    /// The live wrapper for `handle`, if any.
    pub fn lookup(&self, handle: NativeHandle) -> Option<Proxy> {
        self.state.lock().entries.get(&handle)?.proxy.upgrade()
    }

    /// A copy of the entry for `handle`.
    pub fn entry(&self, handle: NativeHandle) -> Option<WrapperEntry> {
        self.state.lock().entries.get(&handle).cloned()
    }

    /// Whether `proxy` is the wrapper currently registered for its handle.
    pub fn is_registered(&self, proxy: &Proxy) -> bool {
        self.state
            .lock()
            .entries
            .get(&proxy.handle())
            .is_some_and(|entry| entry.wrapper == proxy.wrapper_id())
    }

    /// Ownership recorded for `handle`.
    pub fn ownership(&self, handle: NativeHandle) -> Option<Ownership> {
        Some(self.state.lock().entries.get(&handle)?.ownership)
    }

    /// Lock key recorded for `handle`.
    pub fn lock_key(&self, handle: NativeHandle) -> Option<NativeHandle> {
        Some(self.state.lock().entries.get(&handle)?.lock_key)
    }

    /// Remove the entry for `handle` if it still belongs to `wrapper`.
    ///
    /// Only the finalization bridge calls this. A notice for a wrapper that
    /// has since been replaced returns `None` and leaves the entry alone.
    pub fn release(&self, handle: NativeHandle, wrapper: WrapperId) -> Option<WrapperEntry> {
        let mut state = self.state.lock();
        match state.entries.get(&handle) {
            Some(entry) if entry.wrapper == wrapper && !entry.is_alive() => {
                tracing::trace!(target: "hostbridge::store", %handle, %wrapper, "releasing entry");
                state.entries.remove(&handle)
            }
            _ => {
                tracing::trace!(target: "hostbridge::store", %handle, %wrapper, "ignoring stale release");
                None
            }
        }
    }

    /// Promote a borrowed entry to an owning discipline.
    ///
    /// Returns the previous ownership. A promotion to
    /// [`Ownership::SharedCounted`] hands one shared count to the registry;
    /// the caller must have transferred it.
    pub fn promote(&self, handle: NativeHandle, to: Ownership) -> Result<Ownership, PromotionError> {
        let mut state = self.state.lock();
        let entry = state
            .entries
            .get_mut(&handle)
            .ok_or(PromotionError::NotRegistered { handle })?;
        if !entry.ownership.can_promote_to(to) {
            return Err(PromotionError::Forbidden {
                handle,
                from: entry.ownership,
                to,
            });
        }
        let previous = entry.ownership;
        entry.ownership = to;
        tracing::debug!(target: "hostbridge::store", %handle, from = %previous, %to, "promoted ownership");
        Ok(previous)
    }

    /// Number of entries, including ones awaiting finalization.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Check if the registry has no entries.
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Number of entries whose wrapper is still reachable.
    pub fn live_wrappers(&self) -> usize {
        self.state
            .lock()
            .entries
            .values()
            .filter(|entry| entry.is_alive())
            .count()
    }
}

impl std::fmt::Debug for WrapperRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrapperRegistry")
            .field("entries", &self.len())
            .finish()
    }
}
