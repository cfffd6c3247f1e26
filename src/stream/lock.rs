//! Reference-counted network lock
//!
//! Discovery and streaming need the network kept awake for multicast traffic
//! while they run. The lock is held through [`NetworkLockGuard`]s: cloning a
//! guard adds a reference, dropping one removes it, and the last drop releases
//! the lock. Because release lives in `Drop` it also runs while unwinding.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

type ReleaseHook = Box<dyn FnOnce() + Send>;

struct LockState {
    name: String,
    holders: AtomicUsize,
    releases: AtomicUsize,
    on_release: Mutex<Option<ReleaseHook>>,
}

/// Named lock shared by everything that needs the network
#[derive(Clone)]
pub struct NetworkLock {
    state: Arc<LockState>,
}

impl NetworkLock {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            state: Arc::new(LockState {
                name: name.into(),
                holders: AtomicUsize::new(0),
                releases: AtomicUsize::new(0),
                on_release: Mutex::new(None),
            }),
        }
    }

    /// Run `hook` once, when the last holder lets go
    pub fn on_release(self, hook: impl FnOnce() + Send + 'static) -> Self {
        *self.state.on_release.lock() = Some(Box::new(hook));
        self
    }

    /// Take a reference on the lock
    pub fn acquire(&self) -> NetworkLockGuard {
        let previous = self.state.holders.fetch_add(1, Ordering::AcqRel);
        if previous == 0 {
            tracing::info!(lock = %self.state.name, "Network lock acquired");
        }
        NetworkLockGuard {
            state: Arc::clone(&self.state),
        }
    }

    pub fn is_held(&self) -> bool {
        self.state.holders.load(Ordering::Acquire) > 0
    }

    pub fn holders(&self) -> usize {
        self.state.holders.load(Ordering::Acquire)
    }

    /// How many times the lock went from held to released
    pub fn release_count(&self) -> usize {
        self.state.releases.load(Ordering::Acquire)
    }
}

/// One reference on a [`NetworkLock`]
pub struct NetworkLockGuard {
    state: Arc<LockState>,
}

impl Clone for NetworkLockGuard {
    fn clone(&self) -> Self {
        self.state.holders.fetch_add(1, Ordering::AcqRel);
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl Drop for NetworkLockGuard {
    fn drop(&mut self) {
        if self.state.holders.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.state.releases.fetch_add(1, Ordering::AcqRel);
            tracing::info!(lock = %self.state.name, "Network lock released");
            if let Some(hook) = self.state.on_release.lock().take() {
                hook();
            }
        }
    }
}
