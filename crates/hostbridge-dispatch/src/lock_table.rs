//! Reentrant, FIFO-fair locks keyed by native object.
//!
//! Every lock key has an owner, a re-entry depth and a queue of tickets.
//! Tickets come from one global counter and a request takes its tickets for
//! all of its keys under a single table lock, so any two requests are
//! ordered the same way on every key they share. The oldest waiting request
//! is therefore always at the front of each of its queues, which rules out
//! lock-order deadlocks between requests.
//!
//! Two kinds of request wait in those queues:
//!
//! - [`LockTable::lock`] blocks the calling thread until its ticket is at
//!   the front of every queue and the keys are free. A thread that already
//!   owns a key re-enters it without a ticket.
//! - [`LockTable::reserve`] never blocks. The request is parked in the table
//!   and its dispatch callback runs with a [`Grant`] as soon as the request
//!   is first in line for every key. Releasing keys promotes the next parked
//!   request, so no thread sits waiting for a ticket.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use hostbridge_core::NativeHandle;
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;

/// Who holds a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Owner {
    Thread(ThreadId),
    /// Granted to a parked request that no thread has claimed yet
    Grant(u64),
}

#[derive(Debug, Default)]
struct KeyState {
    owner: Option<Owner>,
    depth: u32,
    queue: VecDeque<u64>,
}

impl KeyState {
    fn is_idle(&self) -> bool {
        self.owner.is_none() && self.queue.is_empty()
    }
}

type Dispatch = Box<dyn FnOnce(Grant) + Send>;

struct Parked {
    keys: Vec<NativeHandle>,
    dispatch: Dispatch,
}

#[derive(Default)]
struct TableState {
    keys: FxHashMap<NativeHandle, KeyState>,
    parked: FxHashMap<u64, Parked>,
    next_ticket: u64,
}

impl TableState {
    fn issue(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    /// Whether `ticket` may take `key` now.
    fn ready(&self, key: NativeHandle, ticket: u64) -> bool {
        self.keys
            .get(&key)
            .is_some_and(|state| state.owner.is_none() && state.queue.front() == Some(&ticket))
    }

    fn take(&mut self, key: NativeHandle, ticket: u64, owner: Owner) {
        if let Some(state) = self.keys.get_mut(&key) {
            if state.queue.front() == Some(&ticket) {
                state.queue.pop_front();
            }
            state.owner = Some(owner);
            state.depth = 1;
        }
    }

    /// Leave `key` once. Returns true if that freed it.
    fn exit(&mut self, key: NativeHandle) -> bool {
        let Some(state) = self.keys.get_mut(&key) else {
            return false;
        };
        state.depth = state.depth.saturating_sub(1);
        if state.depth > 0 {
            return false;
        }
        state.owner = None;
        if state.is_idle() {
            self.keys.remove(&key);
        }
        true
    }

    /// Grant every parked request that is now first in line on all of its
    /// keys. Only the fronts of `changed` can have moved.
    fn promote(&mut self, changed: &[NativeHandle]) -> Vec<(u64, Parked)> {
        let mut granted = Vec::new();
        for key in changed {
            let Some(ticket) = self.keys.get(key).and_then(|state| state.queue.front().copied()) else {
                continue;
            };
            let ready = self
                .parked
                .get(&ticket)
                .is_some_and(|parked| parked.keys.iter().all(|k| self.ready(*k, ticket)));
            if !ready {
                continue;
            }
            if let Some(parked) = self.parked.remove(&ticket) {
                for k in &parked.keys {
                    self.take(*k, ticket, Owner::Grant(ticket));
                }
                granted.push((ticket, parked));
            }
        }
        granted
    }
}

struct LockInner {
    state: Mutex<TableState>,
    released: Condvar,
}

impl LockInner {
    /// Release `keys`, wake blocked lockers and dispatch promoted requests.
    fn release(self: &Arc<Self>, keys: &[NativeHandle]) {
        let mut state = self.state.lock();
        let freed: Vec<NativeHandle> = keys.iter().copied().filter(|key| state.exit(*key)).collect();
        let granted = state.promote(&freed);
        drop(state);
        self.released.notify_all();
        self.dispatch(granted);
    }

    /// Run dispatch callbacks outside the table lock.
    fn dispatch(self: &Arc<Self>, granted: Vec<(u64, Parked)>) {
        for (ticket, parked) in granted {
            tracing::trace!(target: "hostbridge::lock", ticket, keys = ?parked.keys, "granted reservation");
            let grant = Grant {
                inner: Arc::clone(self),
                keys: parked.keys,
                ticket,
                claimed: false,
            };
            (parked.dispatch)(grant);
        }
    }
}

/// Table of per-object locks.
///
/// Cloning gives another handle to the same table.
#[derive(Clone)]
pub struct LockTable {
    inner: Arc<LockInner>,
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(keys: &[NativeHandle]) -> Vec<NativeHandle> {
    let mut keys = keys.to_vec();
    keys.sort_unstable();
    keys.dedup();
    keys
}

impl LockTable {
    /// Create an empty lock table.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LockInner {
                state: Mutex::new(TableState::default()),
                released: Condvar::new(),
            }),
        }
    }

    /// Lock every key for the current thread, waiting as long as needed.
    pub fn lock(&self, keys: &[NativeHandle]) -> LockGuard {
        let keys = normalize(keys);
        let me = Owner::Thread(thread::current().id());
        let mut state = self.inner.state.lock();

        let mut reentered = Vec::new();
        let mut waiting = Vec::new();
        let ticket = state.issue();
        for key in keys {
            let entry = state.keys.entry(key).or_default();
            if entry.owner == Some(me) {
                entry.depth += 1;
                reentered.push(key);
            } else {
                entry.queue.push_back(ticket);
                waiting.push(key);
            }
        }
        if !reentered.is_empty() {
            tracing::trace!(target: "hostbridge::lock", ?reentered, "re-entered lock keys");
        }

        if !waiting.iter().all(|key| state.ready(*key, ticket)) {
            tracing::trace!(target: "hostbridge::lock", ticket, keys = ?waiting, "waiting for lock keys");
            while !waiting.iter().all(|key| state.ready(*key, ticket)) {
                self.inner.released.wait(&mut state);
            }
        }
        for key in &waiting {
            state.take(*key, ticket, me);
        }
        drop(state);

        reentered.extend(waiting);
        LockGuard {
            inner: Arc::clone(&self.inner),
            keys: reentered,
        }
    }

    /// Lock every key only if that needs no waiting.
    pub fn try_lock(&self, keys: &[NativeHandle]) -> Option<LockGuard> {
        if self.is_contended(keys) {
            return None;
        }
        Some(self.lock(keys))
    }

    /// Whether locking `keys` from the current thread would have to wait.
    pub fn is_contended(&self, keys: &[NativeHandle]) -> bool {
        let me = Owner::Thread(thread::current().id());
        let state = self.inner.state.lock();
        keys.iter().any(|key| {
            state.keys.get(key).is_some_and(|entry| {
                entry.owner != Some(me) && (entry.owner.is_some() || !entry.queue.is_empty())
            })
        })
    }

    /// Queue for `keys` without blocking.
    ///
    /// `dispatch` runs exactly once, with the keys granted, as soon as this
    /// request is first in line for all of them. That happens either right
    /// here or on whichever thread releases the last key in the way.
    /// Requests reserved one after another on the same key are granted in
    /// that order.
    pub fn reserve<F>(&self, keys: &[NativeHandle], dispatch: F)
    where
        F: FnOnce(Grant) + Send + 'static,
    {
        let keys = normalize(keys);
        let mut state = self.inner.state.lock();
        let ticket = state.issue();
        if keys.is_empty() {
            drop(state);
            self.inner.dispatch(vec![(
                ticket,
                Parked {
                    keys,
                    dispatch: Box::new(dispatch),
                },
            )]);
            return;
        }
        for key in &keys {
            state.keys.entry(*key).or_default().queue.push_back(ticket);
        }
        tracing::trace!(target: "hostbridge::lock", ticket, ?keys, "reserved lock keys");
        state.parked.insert(
            ticket,
            Parked {
                keys: keys.clone(),
                dispatch: Box::new(dispatch),
            },
        );
        let granted = state.promote(&keys);
        drop(state);
        self.inner.dispatch(granted);
    }

    /// Number of keys that are held or waited on.
    pub fn active_keys(&self) -> usize {
        self.inner.state.lock().keys.len()
    }

    /// Number of reservations still waiting for their keys.
    pub fn parked(&self) -> usize {
        self.inner.state.lock().parked.len()
    }
}

impl std::fmt::Debug for LockTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("LockTable")
            .field("active_keys", &state.keys.len())
            .field("parked", &state.parked.len())
            .finish()
    }
}

/// Keys granted to a reservation, not yet tied to a thread.
///
/// Dropping an unclaimed grant releases its keys.
pub struct Grant {
    inner: Arc<LockInner>,
    keys: Vec<NativeHandle>,
    ticket: u64,
    claimed: bool,
}

impl Grant {
    /// Take the granted keys for the current thread. Never waits.
    pub fn claim(mut self) -> LockGuard {
        let me = thread::current().id();
        let mut state = self.inner.state.lock();
        for key in &self.keys {
            if let Some(entry) = state.keys.get_mut(key)
                && entry.owner == Some(Owner::Grant(self.ticket))
            {
                entry.owner = Some(Owner::Thread(me));
            }
        }
        drop(state);
        self.claimed = true;
        LockGuard {
            inner: Arc::clone(&self.inner),
            keys: std::mem::take(&mut self.keys),
        }
    }

    /// Granted keys.
    pub fn keys(&self) -> &[NativeHandle] {
        &self.keys
    }
}

impl Drop for Grant {
    fn drop(&mut self) {
        if self.claimed || self.keys.is_empty() {
            return;
        }
        tracing::trace!(target: "hostbridge::lock", ticket = self.ticket, "grant dropped unclaimed");
        self.inner.release(&self.keys);
    }
}

impl std::fmt::Debug for Grant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Grant")
            .field("ticket", &self.ticket)
            .field("keys", &self.keys)
            .finish()
    }
}

/// Held lock keys; released on drop.
pub struct LockGuard {
    inner: Arc<LockInner>,
    keys: Vec<NativeHandle>,
}

impl LockGuard {
    /// Keys held by this guard.
    pub fn keys(&self) -> &[NativeHandle] {
        &self.keys
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.keys.is_empty() {
            return;
        }
        self.inner.release(&self.keys);
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard").field("keys", &self.keys).finish()
    }
}
