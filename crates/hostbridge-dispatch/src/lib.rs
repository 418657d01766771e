//! Asynchronous dispatch for hostbridge.
//!
//! Native bodies marked asynchronous run on a worker pool while the
//! scripting control thread keeps going. Calls that touch the same native
//! object are serialized through per-object lock keys, granted in the order
//! the calls were submitted.
//!
//! ## Key Types
//!
//! - [`LockTable`]: reentrant, FIFO-fair locks keyed by native handle
//! - [`Scheduler`]: worker pool whose completions return to the control thread
//! - [`Spawner`]: hands jobs to the workers from any thread
//! - [`Promise`] / [`Deferred`]: settle-once result handles

mod lock_table;
mod promise;
mod scheduler;

pub use lock_table::{Grant, LockGuard, LockTable};
pub use promise::{Deferred, Promise, PromiseStatus};
pub use scheduler::{Completion, DispatchError, Scheduler, Spawner, TaskId, TaskPanic, TaskState};
