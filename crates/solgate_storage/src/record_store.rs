#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;
use solgate_contracts::ContractViolation;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported profile document schema_version={found}")]
    SchemaMismatch { found: u8 },
    #[error("profile store lock poisoned")]
    LockPoisoned,
    #[error("contract violation: {0}")]
    Contract(#[from] ContractViolation),
}

/// Keys owned by the demo gate. Nothing else writes under this namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StoreKey {
    TakeoverRecord,
    QuotaByLink,
    DeadlineByBrand,
}

impl StoreKey {
    pub const ALL: [StoreKey; 3] = [
        StoreKey::TakeoverRecord,
        StoreKey::QuotaByLink,
        StoreKey::DeadlineByBrand,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StoreKey::TakeoverRecord => "solgate:brand_takeover",
            StoreKey::QuotaByLink => "solgate:runs_by_link",
            StoreKey::DeadlineByBrand => "solgate:deadline_by_brand",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == raw)
    }
}

/// Key/value persistence scoped to one visitor profile. Values are JSON text.
/// No transactions and no locking across writers.
pub trait RecordStore: Send {
    fn get_raw(&self, key: &str) -> Option<String>;
    fn set_raw(&mut self, key: &str, raw: String) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;

    /// Malformed content reads as absent.
    fn get(&self, key: &str) -> Option<serde_json::Value> {
        read_typed(self, key)
    }

    fn set(&mut self, key: &str, value: &serde_json::Value) -> Result<(), StoreError> {
        self.set_raw(key, serde_json::to_string(value)?)
    }
}

pub fn read_typed<T, S>(store: &S, key: &str) -> Option<T>
where
    T: DeserializeOwned,
    S: RecordStore + ?Sized,
{
    let raw = store.get_raw(key)?;
    match serde_json::from_str::<T>(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(key, error = %err, "malformed persisted value treated as absent");
            None
        }
    }
}

pub fn write_typed<T, S>(store: &mut S, key: &str, value: &T) -> Result<(), StoreError>
where
    T: Serialize,
    S: RecordStore + ?Sized,
{
    let raw = serde_json::to_string(value)?;
    store.set_raw(key, raw)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryRecordStore {
    entries: BTreeMap<String, String>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl RecordStore for MemoryRecordStore {
    fn get_raw(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set_raw(&mut self, key: &str, raw: String) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), raw);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}
