#![forbid(unsafe_code)]

use solgate_contracts::takeover::{DEFAULT_RUNS, LOCKED_RUNS_SENTINEL, UNLIMITED_RUNS};

pub const MIN_DEFAULT_RUNS: i64 = 1;
pub const MAX_DEFAULT_RUNS: i64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaConfig {
    pub default_runs: i64,
}

impl QuotaConfig {
    pub fn mvp_v1() -> Self {
        Self {
            default_runs: DEFAULT_RUNS,
        }
    }

    pub fn with_default_runs(default_runs: i64) -> Self {
        Self {
            default_runs: default_runs.clamp(MIN_DEFAULT_RUNS, MAX_DEFAULT_RUNS),
        }
    }

    /// Counter value after one counted view. Never drops below the locked sentinel.
    pub fn after_decrement(&self, current: i64) -> i64 {
        current.saturating_sub(1).max(LOCKED_RUNS_SENTINEL)
    }

    pub fn is_locked(&self, remaining: i64) -> bool {
        remaining <= LOCKED_RUNS_SENTINEL
    }

    /// Clamp a stored value into the range this ledger ever writes.
    pub fn sanitize(&self, stored: i64) -> i64 {
        stored.clamp(LOCKED_RUNS_SENTINEL, UNLIMITED_RUNS)
    }
}
