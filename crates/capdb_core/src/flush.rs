//! Background flush scheduling.
//!
//! The store does not own a timer thread. Periodic durability is driven by
//! an external scheduling service, abstracted here as [`FlushScheduler`].
//! At wiring time the store registers a single task that syncs its header
//! bookkeeping; the task holds only a weak reference to the store and asks
//! to be cancelled once the store is gone.

use std::time::Duration;

/// A periodic task registered with a [`FlushScheduler`].
///
/// The task returns `true` to stay scheduled and `false` once its target no
/// longer exists, at which point the scheduler must stop invoking it.
pub type FlushTask = Box<dyn FnMut() -> bool + Send>;

/// The external scheduling collaborator that drives periodic durability.
pub trait FlushScheduler {
    /// Registers `task` to run roughly every `every`.
    fn schedule(&self, every: Duration, task: FlushTask);
}
