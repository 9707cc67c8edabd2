#![forbid(unsafe_code)]

use solgate_contracts::takeover::BrandTakeoverRecord;
use solgate_contracts::EpochMs;
use solgate_engines::expiry::ExpiryClock;
use solgate_storage::repo::{parse_takeover_payload, TakeoverRepo};
use solgate_storage::shared_profile::ChangeFeed;
use solgate_storage::{RecordStore, StoreError, StoreKey};

pub const DEFAULT_HEARTBEAT_MS: u64 = 5_000;
pub const MIN_HEARTBEAT_MS: u64 = 100;
pub const MAX_HEARTBEAT_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    pub heartbeat_ms: u64,
}

impl SyncConfig {
    pub fn mvp_v1() -> Self {
        Self {
            heartbeat_ms: DEFAULT_HEARTBEAT_MS,
        }
    }

    pub fn with_heartbeat_ms(heartbeat_ms: u64) -> Self {
        Self {
            heartbeat_ms: heartbeat_ms.clamp(MIN_HEARTBEAT_MS, MAX_HEARTBEAT_MS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// What a change source observed for the takeover key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedChange {
    Payload(String),
    Removed,
    /// Notifications were lost; read the store directly.
    ResyncRequired,
}

/// "Subscribe to changes of the takeover key" capability. Push sources deliver
/// immediate notifications; poll sources compare against the store.
pub trait RecordChangeSource: Send {
    fn name(&self) -> &'static str;
    fn poll_changes(&mut self, store: &dyn RecordStore) -> Vec<ObservedChange>;
}

/// Notifications pushed by sibling contexts of the same profile.
#[derive(Debug)]
pub struct PushChangeSource {
    feed: ChangeFeed,
}

impl PushChangeSource {
    pub fn new(feed: ChangeFeed) -> Self {
        Self { feed }
    }
}

impl RecordChangeSource for PushChangeSource {
    fn name(&self) -> &'static str {
        "push"
    }

    fn poll_changes(&mut self, _store: &dyn RecordStore) -> Vec<ObservedChange> {
        let drained = self.feed.drain();
        let mut out: Vec<ObservedChange> = drained
            .changes
            .into_iter()
            .filter(|change| change.key == StoreKey::TakeoverRecord.as_str())
            .map(|change| match change.new_raw {
                Some(raw) => ObservedChange::Payload(raw),
                None => ObservedChange::Removed,
            })
            .collect();
        if drained.lagged {
            out.push(ObservedChange::ResyncRequired);
        }
        out
    }
}

/// Fallback for stores that cannot push: reports the persisted payload
/// whenever it differs from the last one seen.
#[derive(Debug, Default)]
pub struct PollChangeSource {
    last_seen: Option<String>,
}

impl PollChangeSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordChangeSource for PollChangeSource {
    fn name(&self) -> &'static str {
        "poll"
    }

    fn poll_changes(&mut self, store: &dyn RecordStore) -> Vec<ObservedChange> {
        let current = store.get_raw(StoreKey::TakeoverRecord.as_str());
        if current == self.last_seen {
            return Vec::new();
        }
        self.last_seen = current.clone();
        match current {
            Some(raw) => vec![ObservedChange::Payload(raw)],
            None => vec![ObservedChange::Removed],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Accepted,
    Unchanged,
    KeptLocal,
    Dropped,
}

/// Last-write-wins on `createdAtMs`; ties go to the incoming record. An
/// accepted live preview without a pinned deadline gets one here, reusing the
/// local deadline when both describe the same brand.
pub fn merge_records(
    local: Option<&BrandTakeoverRecord>,
    mut incoming: BrandTakeoverRecord,
) -> (BrandTakeoverRecord, MergeOutcome) {
    if let Some(local) = local {
        if incoming.created_at_ms < local.created_at_ms {
            return (local.clone(), MergeOutcome::KeptLocal);
        }
    }
    if incoming.is_active_takeover() && incoming.expires_at_ms.is_none() {
        let inherited = local
            .filter(|l| l.brand_id == incoming.brand_id)
            .and_then(|l| l.expires_at_ms);
        incoming.expires_at_ms = Some(inherited.unwrap_or_else(|| {
            ExpiryClock::deadline(incoming.created_at_ms, incoming.expire_days)
        }));
    }
    if local == Some(&incoming) {
        return (incoming, MergeOutcome::Unchanged);
    }
    (incoming, MergeOutcome::Accepted)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncCounters {
    pub accepted: u64,
    pub kept_local: u64,
    pub dropped_malformed: u64,
    pub heartbeats: u64,
    pub publishes: u64,
    pub forced_resyncs: u64,
}

/// Keeps one context's in-memory view of the takeover record convergent with
/// its siblings. Inputs: change notifications, a periodic heartbeat and
/// visibility changes. The synchronizer never sleeps; callers drive it with
/// the current time.
pub struct CrossTabSynchronizer {
    config: SyncConfig,
    sources: Vec<Box<dyn RecordChangeSource>>,
    local: Option<BrandTakeoverRecord>,
    visibility: Visibility,
    running: bool,
    last_heartbeat_at: Option<EpochMs>,
    counters: SyncCounters,
}

impl std::fmt::Debug for CrossTabSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sources: Vec<&'static str> = self.sources.iter().map(|s| s.name()).collect();
        f.debug_struct("CrossTabSynchronizer")
            .field("config", &self.config)
            .field("sources", &sources)
            .field("local", &self.local)
            .field("visibility", &self.visibility)
            .field("running", &self.running)
            .field("counters", &self.counters)
            .finish()
    }
}

impl CrossTabSynchronizer {
    pub fn new(config: SyncConfig, sources: Vec<Box<dyn RecordChangeSource>>) -> Self {
        Self {
            config,
            sources,
            local: None,
            visibility: Visibility::Visible,
            running: false,
            last_heartbeat_at: None,
            counters: SyncCounters::default(),
        }
    }

    /// Load the persisted record and start the heartbeat schedule.
    pub fn init(&mut self, store: &dyn RecordStore, now: EpochMs) {
        self.running = true;
        self.last_heartbeat_at = Some(now);
        self.pull(store);
        tracing::debug!(
            has_record = self.local.is_some(),
            heartbeat_ms = self.config.heartbeat_ms,
            "cross-tab sync started"
        );
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn local_record(&self) -> Option<&BrandTakeoverRecord> {
        self.local.as_ref()
    }

    pub fn counters(&self) -> SyncCounters {
        self.counters
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// Handle one serialized record carried by a change notification.
    /// Unparseable or invalid payloads are dropped.
    pub fn on_change_notification(&mut self, payload: &str) -> MergeOutcome {
        match parse_takeover_payload(payload) {
            Ok(incoming) => self.merge(incoming),
            Err(err) => {
                self.counters.dropped_malformed += 1;
                tracing::warn!(error = %err, "malformed takeover notification dropped");
                MergeOutcome::Dropped
            }
        }
    }

    pub fn merge(&mut self, incoming: BrandTakeoverRecord) -> MergeOutcome {
        let (merged, outcome) = merge_records(self.local.as_ref(), incoming);
        match outcome {
            MergeOutcome::Accepted => {
                self.counters.accepted += 1;
                tracing::debug!(
                    brand_id = merged.brand_id.as_str(),
                    created_at_ms = merged.created_at_ms.0,
                    "takeover record accepted"
                );
                self.local = Some(merged);
            }
            MergeOutcome::KeptLocal => self.counters.kept_local += 1,
            MergeOutcome::Unchanged | MergeOutcome::Dropped => {}
        }
        outcome
    }

    /// Drain every change source. Returns how many changes were accepted.
    pub fn pump(&mut self, store: &dyn RecordStore) -> usize {
        if !self.running {
            return 0;
        }
        let mut observed = Vec::new();
        for source in &mut self.sources {
            observed.extend(source.poll_changes(store));
        }
        let mut accepted = 0;
        let mut resync = false;
        for change in observed {
            match change {
                ObservedChange::Payload(raw) => {
                    if self.on_change_notification(&raw) == MergeOutcome::Accepted {
                        accepted += 1;
                    }
                }
                // A reset clears the key and republishes right after; keep
                // the local view until that record arrives.
                ObservedChange::Removed => {}
                ObservedChange::ResyncRequired => resync = true,
            }
        }
        if resync {
            self.counters.forced_resyncs += 1;
            if self.pull(store) == Some(MergeOutcome::Accepted) {
                accepted += 1;
            }
        }
        accepted
    }

    pub fn heartbeat_due(&self, now: EpochMs) -> bool {
        self.running
            && self
                .last_heartbeat_at
                .map_or(true, |last| now.0 >= last.0.saturating_add(self.config.heartbeat_ms))
    }

    /// Periodic pull-merge-publish. Returns false when no heartbeat was due.
    pub fn heartbeat(&mut self, store: &mut dyn RecordStore, now: EpochMs) -> bool {
        if !self.heartbeat_due(now) {
            return false;
        }
        self.last_heartbeat_at = Some(now);
        self.counters.heartbeats += 1;
        if let Err(err) = self.resync_and_publish(store) {
            tracing::warn!(error = %err, "heartbeat publish failed");
        }
        true
    }

    /// Regaining visibility forces an immediate resync.
    pub fn on_visibility_change(
        &mut self,
        visibility: Visibility,
        store: &mut dyn RecordStore,
        now: EpochMs,
    ) {
        let regained = self.visibility == Visibility::Hidden && visibility == Visibility::Visible;
        self.visibility = visibility;
        if regained && self.running {
            self.counters.forced_resyncs += 1;
            self.last_heartbeat_at = Some(now);
            if let Err(err) = self.resync_and_publish(store) {
                tracing::warn!(error = %err, "resync on visibility failed");
            }
        }
    }

    pub fn force_sync(&mut self, store: &mut dyn RecordStore) -> Result<(), StoreError> {
        self.counters.forced_resyncs += 1;
        self.resync_and_publish(store)
    }

    /// Clear every gate-owned key and publish the escape-hatch record, which
    /// wins over any record currently held by a sibling.
    pub fn reset_all(
        &mut self,
        store: &mut dyn RecordStore,
        now: EpochMs,
    ) -> Result<BrandTakeoverRecord, StoreError> {
        store.clear_owned_keys()?;
        let floor = self
            .local
            .as_ref()
            .map(|r| r.created_at_ms)
            .unwrap_or_default();
        let hatch = BrandTakeoverRecord::escape_hatch(now.max(floor));
        store.save_takeover_record(&hatch)?;
        self.local = Some(hatch.clone());
        self.counters.publishes += 1;
        tracing::info!("demo gate reset; escape-hatch record published");
        Ok(hatch)
    }

    /// Cancel the heartbeat. Further pumps and heartbeats are no-ops.
    pub fn stop(&mut self) {
        if self.running {
            tracing::debug!("cross-tab sync stopped");
        }
        self.running = false;
    }

    /// Merge whatever the store currently holds.
    pub fn pull(&mut self, store: &dyn RecordStore) -> Option<MergeOutcome> {
        let persisted = store.load_takeover_record()?;
        Some(self.merge(persisted))
    }

    fn resync_and_publish(&mut self, store: &mut dyn RecordStore) -> Result<(), StoreError> {
        self.pump(store);
        self.pull(store);
        self.publish(store)
    }

    /// Re-write the local snapshot when the store lacks it or holds an older one.
    fn publish(&mut self, store: &mut dyn RecordStore) -> Result<(), StoreError> {
        let Some(local) = self.local.as_ref() else {
            return Ok(());
        };
        let persisted = store.load_takeover_record();
        let stale = match &persisted {
            None => true,
            Some(persisted) => {
                persisted != local && persisted.created_at_ms <= local.created_at_ms
            }
        };
        if stale {
            store.save_takeover_record(local)?;
            self.counters.publishes += 1;
        }
        Ok(())
    }
}
