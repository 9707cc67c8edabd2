#![forbid(unsafe_code)]

use solgate_contracts::takeover::LinkId;
use solgate_engines::quota::QuotaConfig;
use solgate_storage::repo::TakeoverRepo;
use solgate_storage::{RecordStore, StoreError};

/// Per-link run counter persisted under the quota key. Every call re-reads the
/// store; nothing is cached between calls.
#[derive(Debug, Clone)]
pub struct QuotaLedger {
    config: QuotaConfig,
}

impl QuotaLedger {
    pub fn new(config: QuotaConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QuotaConfig {
        &self.config
    }

    /// Stored counter for `link_id`, or the default quota when the link has
    /// never been seen or the map is unreadable.
    pub fn remaining(&self, store: &dyn RecordStore, link_id: &LinkId) -> i64 {
        store
            .load_quota_map()
            .get(link_id)
            .map(|stored| self.config.sanitize(stored))
            .unwrap_or(self.config.default_runs)
    }

    pub fn decrement(
        &self,
        store: &mut dyn RecordStore,
        link_id: &LinkId,
    ) -> Result<i64, StoreError> {
        let observed = self.remaining(store, link_id);
        self.commit_decrement(store, link_id, observed)
    }

    /// Write `observed - 1` without re-reading the counter. Two contexts that
    /// commit against the same observed value persist a single decrement.
    pub fn commit_decrement(
        &self,
        store: &mut dyn RecordStore,
        link_id: &LinkId,
        observed: i64,
    ) -> Result<i64, StoreError> {
        let next = self.config.after_decrement(observed);
        self.write_remaining(store, link_id, next)?;
        tracing::debug!(link_id = link_id.as_str(), observed, next, "quota decremented");
        Ok(next)
    }

    pub fn is_locked(&self, store: &dyn RecordStore, link_id: &LinkId) -> bool {
        self.config.is_locked(self.remaining(store, link_id))
    }

    /// Restore the default quota for a freshly observed link.
    pub fn reset(&self, store: &mut dyn RecordStore, link_id: &LinkId) -> Result<(), StoreError> {
        self.write_remaining(store, link_id, self.config.default_runs)
    }

    fn write_remaining(
        &self,
        store: &mut dyn RecordStore,
        link_id: &LinkId,
        remaining: i64,
    ) -> Result<(), StoreError> {
        let mut map = store.load_quota_map();
        map.set(link_id, remaining);
        store.save_quota_map(&map)
    }
}
