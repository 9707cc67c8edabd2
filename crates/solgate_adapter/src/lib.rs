#![forbid(unsafe_code)]

pub mod host;

use std::env;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use solgate_contracts::EpochMs;
use solgate_os::gate::GateConfig;
use solgate_os::session::TabSession;
use solgate_os::sync::{SyncConfig, DEFAULT_HEARTBEAT_MS, MAX_HEARTBEAT_MS, MIN_HEARTBEAT_MS};
use solgate_storage::file_store::FileRecordStore;
use solgate_storage::shared_profile::{ChangeFeed, FeedEvent, SharedProfile};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing_subscriber::EnvFilter;

pub use solgate_storage::clock::system_time_now_ms;

const MIN_DEFAULT_RUNS: i64 = 1;
const MAX_DEFAULT_RUNS: i64 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    pub store_path: Option<PathBuf>,
    pub heartbeat_ms: u64,
    pub default_runs: i64,
}

impl AdapterConfig {
    pub fn mvp_v1() -> Self {
        Self {
            store_path: None,
            heartbeat_ms: DEFAULT_HEARTBEAT_MS,
            default_runs: GateConfig::mvp_v1().quota.default_runs,
        }
    }

    pub fn from_env() -> Self {
        Self::from_env_var_map(|key| env::var(key).ok())
    }

    /// Out-of-range or unparseable values fall back to defaults.
    pub fn from_env_var_map(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::mvp_v1();
        let store_path = lookup("SOLGATE_STORE_PATH")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        let heartbeat_ms = lookup("SOLGATE_HEARTBEAT_MS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|v| (MIN_HEARTBEAT_MS..=MAX_HEARTBEAT_MS).contains(v))
            .unwrap_or(defaults.heartbeat_ms);
        let default_runs = lookup("SOLGATE_DEFAULT_RUNS")
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|v| (MIN_DEFAULT_RUNS..=MAX_DEFAULT_RUNS).contains(v))
            .unwrap_or(defaults.default_runs);
        Self {
            store_path,
            heartbeat_ms,
            default_runs,
        }
    }

    pub fn gate_config(&self) -> GateConfig {
        GateConfig::with_default_runs(self.default_runs)
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig::with_heartbeat_ms(self.heartbeat_ms)
    }

    pub fn file_store(&self) -> FileRecordStore {
        match &self.store_path {
            Some(path) => FileRecordStore::for_path(path.clone()),
            None => FileRecordStore::default_local(),
        }
    }

    pub fn open_profile(&self) -> SharedProfile {
        SharedProfile::new(Box::new(self.file_store()))
    }
}

/// Install the process-wide subscriber. Filter comes from `SOLGATE_LOG`;
/// output goes to stderr so stdout stays machine-readable.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("SOLGATE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub type SharedSession = Arc<Mutex<TabSession>>;

/// Running heartbeat task for one tab session.
#[derive(Debug)]
pub struct HeartbeatHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl HeartbeatHandle {
    /// Cancel the task and stop the session's synchronizer.
    pub async fn stop(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Err(err) = self.join.await {
            tracing::warn!(error = %err, "heartbeat task ended abnormally");
        }
    }
}

/// Drives one session: sibling writes are merged as soon as they are
/// announced, and each tick runs a heartbeat when one is due.
pub fn spawn_heartbeat(
    session: SharedSession,
    interval_ms: u64,
    clock: fn() -> EpochMs,
) -> HeartbeatHandle {
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let mut feed = session.lock().ok().and_then(|s| s.change_feed());
    let join = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                event = next_feed_event(&mut feed) => {
                    if matches!(event, FeedEvent::Closed) {
                        tracing::debug!("change feed closed; falling back to ticks");
                        feed = None;
                        continue;
                    }
                    let Ok(mut session) = session.lock() else {
                        tracing::warn!("tab session lock poisoned; heartbeat task exiting");
                        return;
                    };
                    session.pump_notifications();
                }
                _ = ticker.tick() => {
                    let Ok(mut session) = session.lock() else {
                        tracing::warn!("tab session lock poisoned; heartbeat task exiting");
                        return;
                    };
                    session.pump_notifications();
                    session.heartbeat(clock());
                }
            }
        }
        if let Ok(mut session) = session.lock() {
            session.stop();
        }
    });
    HeartbeatHandle {
        stop_tx: Some(stop_tx),
        join,
    }
}

async fn next_feed_event(feed: &mut Option<ChangeFeed>) -> FeedEvent {
    match feed.as_mut() {
        Some(feed) => feed.recv().await,
        None => std::future::pending().await,
    }
}
