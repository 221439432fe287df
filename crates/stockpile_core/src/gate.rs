//! Exclusive access to the local store during restores.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::atomic::{AtomicBool, Ordering};

/// Coordinates restores with every other store user.
///
/// A restore or rollback holds the gate exclusively. Backups, sync cycles
/// and change logging hold it shared, so they may run alongside each other
/// but never alongside a restore. Sync cycles use
/// [`try_shared`](Self::try_shared) and skip rather than wait.
#[derive(Debug, Default)]
pub struct StoreGate {
    lock: RwLock<()>,
    restoring: AtomicBool,
}

/// Shared access; dropped to release.
#[derive(Debug)]
pub struct SharedGuard<'a> {
    _guard: RwLockReadGuard<'a, ()>,
}

/// Exclusive access; dropped to release.
#[derive(Debug)]
pub struct ExclusiveGuard<'a> {
    _guard: RwLockWriteGuard<'a, ()>,
    restoring: &'a AtomicBool,
}

impl Drop for ExclusiveGuard<'_> {
    fn drop(&mut self) {
        self.restoring.store(false, Ordering::SeqCst);
    }
}

impl StoreGate {
    /// Creates an open gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access.
    pub fn exclusive(&self) -> ExclusiveGuard<'_> {
        let guard = self.lock.write();
        self.restoring.store(true, Ordering::SeqCst);
        ExclusiveGuard {
            _guard: guard,
            restoring: &self.restoring,
        }
    }

    /// Waits for shared access.
    pub fn shared(&self) -> SharedGuard<'_> {
        SharedGuard {
            _guard: self.lock.read(),
        }
    }

    /// Takes shared access only if no restore holds or awaits the gate.
    #[must_use]
    pub fn try_shared(&self) -> Option<SharedGuard<'_>> {
        self.lock.try_read().map(|guard| SharedGuard { _guard: guard })
    }

    /// Returns true while a restore holds the gate.
    #[must_use]
    pub fn is_restoring(&self) -> bool {
        self.restoring.load(Ordering::SeqCst)
    }
}
