//! Per-file mutual exclusion for read/transform/write cycles.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Registry of one lock per configuration file.
///
/// Cloning shares the registry. Two writers targeting the same path
/// serialize; writers on different paths never contend.
#[derive(Debug, Clone, Default)]
pub struct FileLocks {
    locks: Arc<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>>,
}

impl FileLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock guarding `path`. Callers hold it for the whole cycle.
    pub fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let mut locks = lock_ignoring_poison(&self.locks);
        Arc::clone(locks.entry(key).or_default())
    }

    /// Number of distinct files seen so far.
    pub fn tracked(&self) -> usize {
        lock_ignoring_poison(&self.locks).len()
    }
}

/// A panicked writer leaves the file as it was; the lock stays usable.
pub(crate) fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
