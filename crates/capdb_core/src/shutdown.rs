//! Process-shutdown handler registry.
//!
//! A store must flush its bookkeeping before the process exits even when
//! the owner never calls `close` explicitly. Rather than an ambient global
//! hook, the owner creates a [`ShutdownRegistry`], passes it to every store
//! it opens, and invokes [`ShutdownRegistry::run`] from its own
//! process-exit path. Registration returns a [`ShutdownHandle`] whose drop
//! deregisters the handler deterministically, so an orderly close leaves no
//! dangling reference to a closed store.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

type Handler = Box<dyn Fn() + Send + Sync>;

/// A registry of callbacks to run when the process is shutting down.
pub struct ShutdownRegistry {
    handlers: Mutex<Vec<(u64, Handler)>>,
    next_id: AtomicU64,
}

impl ShutdownRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            handlers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        })
    }

    /// Registers a shutdown handler.
    ///
    /// The handler stays registered until the returned handle is dropped or
    /// [`run`](Self::run) consumes it.
    pub fn register(self: &Arc<Self>, handler: Handler) -> ShutdownHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.lock().push((id, handler));
        ShutdownHandle {
            registry: Arc::downgrade(self),
            id,
        }
    }

    /// Runs all registered handlers.
    ///
    /// Handlers are drained before any of them is invoked: a handler that
    /// closes a store drops that store's handle, and deregistration must
    /// not contend with the lock held here.
    pub fn run(&self) {
        let handlers = std::mem::take(&mut *self.handlers.lock());
        for (_, handler) in handlers {
            handler();
        }
    }

    /// Returns the number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.lock().len()
    }

    /// Returns true if no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn deregister(&self, id: u64) {
        self.handlers.lock().retain(|(handler_id, _)| *handler_id != id);
    }
}

impl fmt::Debug for ShutdownRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownRegistry")
            .field("handlers", &self.len())
            .finish()
    }
}

/// Deregistration guard returned by [`ShutdownRegistry::register`].
pub struct ShutdownHandle {
    registry: Weak<ShutdownRegistry>,
    id: u64,
}

impl Drop for ShutdownHandle {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.deregister(self.id);
        }
    }
}

impl fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownHandle").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn run_invokes_registered_handlers() {
        let registry = ShutdownRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_clone = Arc::clone(&calls);
        let _handle = registry.register(Box::new(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        }));

        registry.run();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn run_consumes_handlers() {
        let registry = ShutdownRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_clone = Arc::clone(&calls);
        let _handle = registry.register(Box::new(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        }));

        registry.run();
        registry.run();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn dropping_handle_deregisters() {
        let registry = ShutdownRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_clone = Arc::clone(&calls);
        let handle = registry.register(Box::new(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(registry.len(), 1);

        drop(handle);
        assert!(registry.is_empty());

        registry.run();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn handle_outliving_registry_is_harmless() {
        let registry = ShutdownRegistry::new();
        let handle = registry.register(Box::new(|| {}));
        drop(registry);
        drop(handle);
    }
}
