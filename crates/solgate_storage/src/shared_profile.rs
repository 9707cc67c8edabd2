#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use crate::record_store::{MemoryRecordStore, RecordStore, StoreError};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// One execution context (tab/window) attached to a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub key: String,
    /// `None` when the key was removed.
    pub new_raw: Option<String>,
    pub origin: ContextId,
}

/// A persistence backend shared by every context of one visitor profile.
/// Writes through a context are announced to every other context; the writer
/// itself is never notified, and unchanged values are not announced.
#[derive(Clone)]
pub struct SharedProfile {
    backend: Arc<Mutex<Box<dyn RecordStore>>>,
    changes: broadcast::Sender<StoreChange>,
    next_context: Arc<AtomicU64>,
}

impl SharedProfile {
    pub fn new(backend: Box<dyn RecordStore>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            backend: Arc::new(Mutex::new(backend)),
            changes,
            next_context: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryRecordStore::new()))
    }

    pub fn open_context(&self) -> ProfileContext {
        let id = ContextId(self.next_context.fetch_add(1, Ordering::Relaxed) + 1);
        ProfileContext {
            id,
            backend: self.backend.clone(),
            changes: self.changes.clone(),
        }
    }
}

impl std::fmt::Debug for SharedProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedProfile")
            .field("contexts_opened", &self.next_context.load(Ordering::Relaxed))
            .finish()
    }
}

#[derive(Clone)]
pub struct ProfileContext {
    id: ContextId,
    backend: Arc<Mutex<Box<dyn RecordStore>>>,
    changes: broadcast::Sender<StoreChange>,
}

impl ProfileContext {
    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn subscribe(&self) -> ChangeFeed {
        ChangeFeed {
            owner: self.id,
            rx: self.changes.subscribe(),
        }
    }

    fn announce(&self, key: &str, new_raw: Option<String>) {
        // No live subscribers is not an error.
        let _ = self.changes.send(StoreChange {
            key: key.to_string(),
            new_raw,
            origin: self.id,
        });
    }
}

impl std::fmt::Debug for ProfileContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileContext").field("id", &self.id).finish()
    }
}

impl RecordStore for ProfileContext {
    fn get_raw(&self, key: &str) -> Option<String> {
        match self.backend.lock() {
            Ok(backend) => backend.get_raw(key),
            Err(_) => {
                tracing::warn!(context = self.id.0, key, "profile store lock poisoned on read");
                None
            }
        }
    }

    fn set_raw(&mut self, key: &str, raw: String) -> Result<(), StoreError> {
        let changed = {
            let mut backend = self.backend.lock().map_err(|_| StoreError::LockPoisoned)?;
            let changed = backend.get_raw(key).as_deref() != Some(raw.as_str());
            backend.set_raw(key, raw.clone())?;
            changed
        };
        if changed {
            self.announce(key, Some(raw));
        }
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        let existed = {
            let mut backend = self.backend.lock().map_err(|_| StoreError::LockPoisoned)?;
            let existed = backend.get_raw(key).is_some();
            backend.remove(key)?;
            existed
        };
        if existed {
            self.announce(key, None);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DrainedChanges {
    pub changes: Vec<StoreChange>,
    /// Notifications were dropped; the receiver must resync by reading the store.
    pub lagged: bool,
    pub closed: bool,
}

/// One wake-up from [`ChangeFeed::recv`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    Change(StoreChange),
    /// This many notifications were dropped; resync by reading the store.
    Lagged(u64),
    Closed,
}

/// Change notifications for one context, excluding its own writes.
#[derive(Debug)]
pub struct ChangeFeed {
    owner: ContextId,
    rx: broadcast::Receiver<StoreChange>,
}

impl ChangeFeed {
    pub fn owner(&self) -> ContextId {
        self.owner
    }

    pub fn drain(&mut self) -> DrainedChanges {
        let mut out = DrainedChanges::default();
        loop {
            match self.rx.try_recv() {
                Ok(change) => {
                    if change.origin != self.owner {
                        out.changes.push(change);
                    }
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::debug!(
                        context = self.owner.0,
                        skipped,
                        "change feed lagged; resync required"
                    );
                    out.lagged = true;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Closed) => {
                    out.closed = true;
                    break;
                }
            }
        }
        out
    }

    /// Wait for the next sibling write. Cancel-safe, so it can sit in a
    /// `select!` next to a ticker without losing notifications.
    pub async fn recv(&mut self) -> FeedEvent {
        loop {
            match self.rx.recv().await {
                Ok(change) if change.origin == self.owner => continue,
                Ok(change) => return FeedEvent::Change(change),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(
                        context = self.owner.0,
                        skipped,
                        "change feed lagged; resync required"
                    );
                    return FeedEvent::Lagged(skipped);
                }
                Err(RecvError::Closed) => return FeedEvent::Closed,
            }
        }
    }
}
