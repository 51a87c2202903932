//! Durable key-value state for the lockstep agent.
//!
//! The store is a flat mapping from string keys to scalar values that
//! survives process restart. Two writers use it and never share keys:
//! the enrollment workflow (`device.*`, `enrollment.*`) and the
//! reconciliation engine (`lock.*`, `compliance.*`, `display.*`,
//! `connectivity.*`).
//!
//! # Atomicity
//!
//! Every mutation goes through [`WriteBatch`]. A batch is applied in a single
//! transaction, so a lock transition and its display-cache refresh either
//! both land or neither does.

mod error;
pub mod layout;
mod memory;
mod sqlite;
mod value;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryStateStore;
pub use sqlite::SqliteStateStore;
pub use value::{StoredValue, WriteBatch, WriteOp};

/// A persistent mapping from string keys to scalar values.
pub trait DurableStateStore: Send + Sync {
    /// Reads a single key.
    fn get(&self, key: &str) -> StorageResult<Option<StoredValue>>;

    /// Applies every operation in the batch atomically.
    fn apply(&self, batch: WriteBatch) -> StorageResult<()>;

    /// Returns every key starting with `prefix`, sorted.
    fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Reads a string value. A boolean stored under the key is a type error.
    fn get_str(&self, key: &str) -> StorageResult<Option<String>> {
        match self.get(key)? {
            None => Ok(None),
            Some(StoredValue::Str(s)) => Ok(Some(s)),
            Some(StoredValue::Bool(_)) => Err(StorageError::TypeMismatch {
                key: key.to_string(),
                expected: "string",
            }),
        }
    }

    /// Reads a boolean value.
    fn get_bool(&self, key: &str) -> StorageResult<Option<bool>> {
        match self.get(key)? {
            None => Ok(None),
            Some(StoredValue::Bool(b)) => Ok(Some(b)),
            Some(StoredValue::Str(_)) => Err(StorageError::TypeMismatch {
                key: key.to_string(),
                expected: "bool",
            }),
        }
    }

    /// Writes a single key.
    fn set(&self, key: &str, value: StoredValue) -> StorageResult<()> {
        let mut batch = WriteBatch::new();
        batch.put(key, value);
        self.apply(batch)
    }
}
