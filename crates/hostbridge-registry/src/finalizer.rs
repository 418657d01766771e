//! Finalization bridge.
//!
//! Proxies post a [`Finalization`] notice when they die, from whatever
//! thread dropped the last reference. The control thread drains the
//! notices here and applies the entry's [`Disposal`]. Applying a disposal
//! can drop more proxies (a destroyed object may own shared references),
//! so [`Finalizer::drain`] keeps going until the channel is empty.

use crossbeam_channel::{Receiver, Sender, unbounded};
use hostbridge_core::{Finalization, NativeHeap};

use crate::{Disposal, Ownership, WrapperRegistry};

/// Outcome of one finalization notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finalized {
    /// The wrapper had been replaced or revived; nothing was done.
    Stale,
    /// The owned object was destroyed.
    Destroyed,
    /// The owned object had already been destroyed elsewhere.
    AlreadyGone,
    /// The registry's shared count was given back.
    SharedReleased {
        /// Whether that was the last count
        freed: bool,
    },
    /// A borrowed object was unregistered and left alone.
    Unwrapped,
    /// A nested child was unregistered; its parent still owns it.
    Detached,
}

/// Receiving end of the finalization channel.
#[derive(Debug)]
pub struct Finalizer {
    receiver: Receiver<Finalization>,
}

impl Finalizer {
    /// Create a finalization channel.
    pub fn channel() -> (Sender<Finalization>, Finalizer) {
        let (sender, receiver) = unbounded();
        (sender, Finalizer { receiver })
    }

    /// Number of notices waiting to be processed.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Process every queued notice, including ones queued while processing.
    pub fn drain(&self, registry: &WrapperRegistry, heap: &NativeHeap) -> Vec<Finalized> {
        let mut outcomes = Vec::new();
        while let Ok(notice) = self.receiver.try_recv() {
            outcomes.push(on_proxy_collected(notice, registry, heap));
        }
        outcomes
    }
}

/// Apply the disposal for one collected proxy.
///
/// The entry is only touched if it still belongs to the collected wrapper,
/// so a notice that arrives after the object was re-exposed is harmless.
pub fn on_proxy_collected(
    notice: Finalization,
    registry: &WrapperRegistry,
    heap: &NativeHeap,
) -> Finalized {
    let Some(entry) = registry.release(notice.handle, notice.wrapper) else {
        return Finalized::Stale;
    };
    let outcome = match entry.ownership.disposal() {
        Disposal::Destroy => {
            if heap.destroy(notice.handle) {
                Finalized::Destroyed
            } else {
                Finalized::AlreadyGone
            }
        }
        Disposal::Release => Finalized::SharedReleased {
            freed: heap.release(notice.handle),
        },
        Disposal::Keep => match entry.ownership {
            Ownership::NestedChild(_) => Finalized::Detached,
            _ => Finalized::Unwrapped,
        },
    };
    tracing::debug!(
        target: "hostbridge::store",
        handle = %notice.handle,
        wrapper = %notice.wrapper,
        ownership = %entry.ownership,
        ?outcome,
        "finalized wrapper"
    );
    outcome
}

impl WrapperRegistry {
    /// Create a registry together with the finalizer for its proxies.
    pub fn with_finalizer() -> (WrapperRegistry, Finalizer) {
        let (sender, finalizer) = Finalizer::channel();
        (WrapperRegistry::new(sender), finalizer)
    }
}
