//! The lock collaborator — how a [`crate::jsr::JsonRegistry`] serializes
//! access to its in-memory tree.
//!
//! Grounded on `iwjsreg.c`'s `rlock_fn`/`wlock_fn`/`unlock_fn`/`fn_data`
//! triple: a registry can either own its lock, or be handed one by a caller
//! that already coordinates access to the same path some other way (e.g. two
//! registries sharing one file).

use parking_lot::RwLock;
use std::sync::Arc;

/// A locking strategy for a [`crate::jsr::JsonRegistry`].
pub enum LockAdapter {
    /// The registry owns a private `RwLock`, acquired around every
    /// operation's critical section.
    Owned(Arc<RwLock<()>>),
    /// The registry acquires a caller-supplied `RwLock`, shared with
    /// whatever else the caller already coordinates through it (e.g. two
    /// registries backed by the same path). Acquired the same way as
    /// `Owned`, just not privately created.
    Shared(Arc<RwLock<()>>),
    /// The registry defers to caller-supplied read/write/unlock closures,
    /// mirroring the source's externally supplied function-pointer triple.
    External {
        rlock: Arc<dyn Fn() + Send + Sync>,
        wlock: Arc<dyn Fn() + Send + Sync>,
        unlock: Arc<dyn Fn() + Send + Sync>,
    },
}

impl Default for LockAdapter {
    fn default() -> Self {
        LockAdapter::Owned(Arc::new(RwLock::new(())))
    }
}

impl LockAdapter {
    pub fn owned() -> Self {
        Self::default()
    }

    /// Adopts a caller-supplied `RwLock` instead of creating a private one.
    pub fn shared(lock: Arc<RwLock<()>>) -> Self {
        LockAdapter::Shared(lock)
    }

    pub fn external(
        rlock: impl Fn() + Send + Sync + 'static,
        wlock: impl Fn() + Send + Sync + 'static,
        unlock: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        LockAdapter::External {
            rlock: Arc::new(rlock),
            wlock: Arc::new(wlock),
            unlock: Arc::new(unlock),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn default_adapter_is_owned() {
        assert!(matches!(LockAdapter::default(), LockAdapter::Owned(_)));
    }

    #[test]
    fn shared_adapter_wraps_the_supplied_lock() {
        let lock = Arc::new(RwLock::new(()));
        let adapter = LockAdapter::shared(lock.clone());
        match adapter {
            LockAdapter::Shared(l) => assert!(Arc::ptr_eq(&l, &lock)),
            _ => panic!("expected shared adapter"),
        }
    }

    #[test]
    fn external_adapter_invokes_supplied_closures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c1 = calls.clone();
        let c2 = calls.clone();
        let c3 = calls.clone();
        let adapter = LockAdapter::external(
            move || { c1.fetch_add(1, Ordering::SeqCst); },
            move || { c2.fetch_add(1, Ordering::SeqCst); },
            move || { c3.fetch_add(1, Ordering::SeqCst); },
        );
        if let LockAdapter::External { rlock, wlock, unlock } = adapter {
            rlock();
            wlock();
            unlock();
        } else {
            panic!("expected external adapter");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
