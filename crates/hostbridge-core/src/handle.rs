//! Identities for native objects and their script-side wrappers.

use std::fmt;

/// Identity of a native object stored in the [`NativeHeap`](crate::NativeHeap).
///
/// The generation makes handles to freed slots detectable: a slot that is
/// reused gets a new generation, so a stale handle never resolves.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeHandle {
    /// Index into the heap's slot table
    pub index: u32,
    /// Generation for use-after-free detection
    pub generation: u32,
}

impl NativeHandle {
    /// Create a new native handle.
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Identity of one wrapper generation for a native handle.
///
/// Every proxy the registry creates gets a fresh id. A finalization notice
/// carries the id of the proxy that died, which lets the registry ignore
/// notices for a wrapper that has already been replaced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WrapperId(pub u64);

impl fmt::Display for WrapperId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}
