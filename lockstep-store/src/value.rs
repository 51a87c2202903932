use serde::{Deserialize, Serialize};

/// A scalar value held by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredValue {
    Str(String),
    Bool(bool),
}

impl StoredValue {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Str(_) => "str",
            Self::Bool(_) => "bool",
        }
    }

    pub(crate) fn encode(&self) -> String {
        match self {
            Self::Str(s) => s.clone(),
            Self::Bool(b) => b.to_string(),
        }
    }

    pub(crate) fn decode(kind: &str, raw: String) -> Option<Self> {
        match kind {
            "str" => Some(Self::Str(raw)),
            "bool" => raw.parse().ok().map(Self::Bool),
            _ => None,
        }
    }
}

impl From<String> for StoredValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<&str> for StoredValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<bool> for StoredValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// A single mutation inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put(String, StoredValue),
    Delete(String),
}

impl WriteOp {
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Put(k, _) | Self::Delete(k) => k,
        }
    }
}

/// An ordered set of mutations applied atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`.
    pub fn put(&mut self, key: &str, value: impl Into<StoredValue>) -> &mut Self {
        self.ops.push(WriteOp::Put(key.to_string(), value.into()));
        self
    }

    /// Sets `key` to `value`, or deletes it when `value` is `None`.
    pub fn put_opt(&mut self, key: &str, value: Option<impl Into<StoredValue>>) -> &mut Self {
        match value {
            Some(v) => self.put(key, v),
            None => self.delete(key),
        }
    }

    /// Removes `key`.
    pub fn delete(&mut self, key: &str) -> &mut Self {
        self.ops.push(WriteOp::Delete(key.to_string()));
        self
    }

    /// Appends all of `other`'s operations.
    pub fn extend(&mut self, other: WriteBatch) -> &mut Self {
        self.ops.extend(other.ops);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[must_use]
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub(crate) fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}
