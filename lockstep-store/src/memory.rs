//! In-memory state store.
//!
//! Used by tests and by hosts without a writable filesystem. Writes can be
//! switched to fail so callers can exercise their persistence-failure paths.

use crate::error::{StorageError, StorageResult};
use crate::value::{StoredValue, WriteBatch, WriteOp};
use crate::DurableStateStore;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

#[derive(Default)]
pub struct MemoryStateStore {
    entries: Mutex<BTreeMap<String, StoredValue>>,
    fail_writes: AtomicBool,
    batches_applied: AtomicUsize,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `apply` fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of batches successfully applied so far.
    pub fn batches_applied(&self) -> usize {
        self.batches_applied.load(Ordering::SeqCst)
    }

    /// Copy of every entry, for assertions.
    pub fn snapshot(&self) -> BTreeMap<String, StoredValue> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl DurableStateStore for MemoryStateStore {
    fn get(&self, key: &str) -> StorageResult<Option<StoredValue>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn apply(&self, batch: WriteBatch) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::WriteRejected("memory store is read-only".into()));
        }
        if batch.is_empty() {
            return Ok(());
        }
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        for op in batch.into_ops() {
            match op {
                WriteOp::Put(key, value) => {
                    entries.insert(key, value);
                }
                WriteOp::Delete(key) => {
                    entries.remove(&key);
                }
            }
        }
        self.batches_applied.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
