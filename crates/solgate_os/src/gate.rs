#![forbid(unsafe_code)]

use solgate_contracts::gate::{GateDecision, GateMode, RenderKind};
use solgate_contracts::takeover::{BrandTakeoverRecord, LinkId, DEFAULT_EXPIRE_DAYS};
use solgate_contracts::EpochMs;
use solgate_engines::expiry::ExpiryClock;
use solgate_engines::gate::{reason_codes, GateInput, GateRuntime};
use solgate_engines::quota::QuotaConfig;
use solgate_storage::repo::TakeoverRepo;
use solgate_storage::RecordStore;

use crate::ledger::QuotaLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateConfig {
    pub quota: QuotaConfig,
    pub default_expire_days: u32,
}

impl GateConfig {
    pub fn mvp_v1() -> Self {
        Self {
            quota: QuotaConfig::mvp_v1(),
            default_expire_days: DEFAULT_EXPIRE_DAYS,
        }
    }

    pub fn with_default_runs(default_runs: i64) -> Self {
        Self {
            quota: QuotaConfig::with_default_runs(default_runs),
            ..Self::mvp_v1()
        }
    }
}

/// The deadline the gate enforces for a record: the pinned deadline when
/// present, otherwise one derived from the record's own creation time.
pub fn takeover_deadline(record: &BrandTakeoverRecord) -> EpochMs {
    record
        .expires_at_ms
        .unwrap_or_else(|| ExpiryClock::deadline(record.created_at_ms, record.expire_days))
}

/// Composes quota and expiry into a single ACTIVE/LOCKED decision per render.
#[derive(Debug, Clone)]
pub struct DemoGate {
    config: GateConfig,
    runtime: GateRuntime,
    ledger: QuotaLedger,
}

impl DemoGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            runtime: GateRuntime::new(config.quota),
            ledger: QuotaLedger::new(config.quota),
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn ledger(&self) -> &QuotaLedger {
        &self.ledger
    }

    /// Never fails: a store that cannot be read behaves as a fresh profile and
    /// a failed write is logged while the computed decision is still returned.
    pub fn evaluate(
        &self,
        store: &mut dyn RecordStore,
        link_id: &LinkId,
        render: RenderKind,
        now: EpochMs,
    ) -> GateDecision {
        let persisted = store.load_takeover_record();
        let unlimited = persisted
            .as_ref()
            .is_some_and(BrandTakeoverRecord::is_unlimited);
        let takeover = persisted.filter(BrandTakeoverRecord::is_active_takeover);
        let deadline = takeover.as_ref().map(takeover_deadline);
        let remaining_before = self.ledger.remaining(store, link_id);

        let verdict = self.runtime.decide(GateInput {
            render,
            remaining_before,
            deadline,
            now,
            unlimited,
        });
        let mut reason_code = verdict.reason_code;

        if verdict.consume {
            match self
                .ledger
                .commit_decrement(store, link_id, remaining_before)
            {
                Ok(_) => {
                    if let (Some(record), Some(deadline)) = (takeover, deadline) {
                        project_runs(store, record, verdict.remaining_after, deadline, now);
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        link_id = link_id.as_str(),
                        error = %err,
                        "quota write failed; decision returned without persisting"
                    );
                    if verdict.mode == GateMode::Active {
                        reason_code = reason_codes::GATE_DEGRADED_STORE_UNAVAILABLE;
                    }
                }
            }
        }

        tracing::debug!(
            link_id = link_id.as_str(),
            mode = verdict.mode.as_str(),
            remaining = verdict.remaining_after,
            reason_code = reason_code.0,
            "gate evaluated"
        );
        GateDecision {
            link_id: link_id.clone(),
            mode: verdict.mode,
            remaining: verdict.remaining_after.max(0),
            remaining_time_ms: verdict.remaining_time_ms,
            reason_code,
        }
    }
}

/// Mirror the counter of the link just touched into the takeover record so
/// other contexts see it through sync. The write bumps `createdAtMs` so it wins
/// last-write-wins merges, and pins the deadline so the bump cannot extend it.
fn project_runs(
    store: &mut dyn RecordStore,
    mut record: BrandTakeoverRecord,
    runs_remaining: i64,
    deadline: EpochMs,
    now: EpochMs,
) {
    record.runs_remaining = runs_remaining;
    record.created_at_ms = record.created_at_ms.max(now);
    record.expires_at_ms = Some(deadline);
    if let Err(err) = store.save_takeover_record(&record) {
        tracing::warn!(error = %err, "takeover record projection not persisted");
    }
}
