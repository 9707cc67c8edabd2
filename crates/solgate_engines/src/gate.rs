#![forbid(unsafe_code)]

use solgate_contracts::gate::{GateMode, RenderKind};
use solgate_contracts::takeover::UNLIMITED_RUNS;
use solgate_contracts::{EpochMs, ReasonCodeId};

use crate::expiry::ExpiryClock;
use crate::quota::QuotaConfig;

pub mod reason_codes {
    use solgate_contracts::ReasonCodeId;

    // Demo gate reason-code namespace ("DG").
    pub const GATE_OK_NEW_VIEW: ReasonCodeId = ReasonCodeId(0x4447_0001);
    pub const GATE_OK_RERENDER: ReasonCodeId = ReasonCodeId(0x4447_0002);
    pub const GATE_OK_UNLIMITED_OVERRIDE: ReasonCodeId = ReasonCodeId(0x4447_0003);

    pub const GATE_LOCKED_QUOTA_EXHAUSTED: ReasonCodeId = ReasonCodeId(0x4447_0010);
    pub const GATE_LOCKED_PREVIEW_EXPIRED: ReasonCodeId = ReasonCodeId(0x4447_0011);

    pub const GATE_DEGRADED_STORE_UNAVAILABLE: ReasonCodeId = ReasonCodeId(0x4447_00F1);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateInput {
    pub render: RenderKind,
    pub remaining_before: i64,
    pub deadline: Option<EpochMs>,
    pub now: EpochMs,
    /// The profile holds the operator escape-hatch record.
    pub unlimited: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateVerdict {
    pub mode: GateMode,
    /// True when this render must be written back as one counted view.
    pub consume: bool,
    pub remaining_after: i64,
    pub remaining_time_ms: Option<u64>,
    pub reason_code: ReasonCodeId,
}

#[derive(Debug, Clone)]
pub struct GateRuntime {
    quota: QuotaConfig,
}

impl GateRuntime {
    pub fn new(quota: QuotaConfig) -> Self {
        Self { quota }
    }

    pub fn quota(&self) -> &QuotaConfig {
        &self.quota
    }

    pub fn decide(&self, input: GateInput) -> GateVerdict {
        if input.unlimited {
            return GateVerdict {
                mode: GateMode::Active,
                consume: false,
                remaining_after: UNLIMITED_RUNS,
                remaining_time_ms: None,
                reason_code: reason_codes::GATE_OK_UNLIMITED_OVERRIDE,
            };
        }
        let remaining_time_ms = input
            .deadline
            .map(|deadline| ExpiryClock::remaining_ms(input.now, deadline));
        let locked = |remaining_after: i64, reason_code: ReasonCodeId| GateVerdict {
            mode: GateMode::Locked,
            consume: false,
            remaining_after,
            remaining_time_ms,
            reason_code,
        };

        // Expiry wins over quota; an expired preview never spends a run.
        if let Some(deadline) = input.deadline {
            if ExpiryClock::is_expired(input.now, deadline) {
                return locked(
                    input.remaining_before,
                    reason_codes::GATE_LOCKED_PREVIEW_EXPIRED,
                );
            }
        }
        if self.quota.is_locked(input.remaining_before) {
            return locked(
                input.remaining_before,
                reason_codes::GATE_LOCKED_QUOTA_EXHAUSTED,
            );
        }

        match input.render {
            RenderKind::ReRender => GateVerdict {
                mode: GateMode::Active,
                consume: false,
                remaining_after: input.remaining_before,
                remaining_time_ms,
                reason_code: reason_codes::GATE_OK_RERENDER,
            },
            RenderKind::NewView => {
                let remaining_after = self.quota.after_decrement(input.remaining_before);
                if self.quota.is_locked(remaining_after) {
                    GateVerdict {
                        mode: GateMode::Locked,
                        consume: true,
                        remaining_after,
                        remaining_time_ms,
                        reason_code: reason_codes::GATE_LOCKED_QUOTA_EXHAUSTED,
                    }
                } else {
                    GateVerdict {
                        mode: GateMode::Active,
                        consume: true,
                        remaining_after,
                        remaining_time_ms,
                        reason_code: reason_codes::GATE_OK_NEW_VIEW,
                    }
                }
            }
        }
    }
}
