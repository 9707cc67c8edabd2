#![forbid(unsafe_code)]

use solgate_contracts::takeover::DAY_MS;
use solgate_contracts::EpochMs;

/// Pure expiry arithmetic. The deadline is derived once from the creation
/// timestamp; every later read compares it against the current wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExpiryClock;

impl ExpiryClock {
    pub fn deadline(created_at: EpochMs, expire_days: u32) -> EpochMs {
        created_at.saturating_add_ms(u64::from(expire_days).saturating_mul(DAY_MS))
    }

    /// Backward clock jumps widen this temporarily; it never underflows.
    pub fn remaining_ms(now: EpochMs, deadline: EpochMs) -> u64 {
        deadline.0.saturating_sub(now.0)
    }

    pub fn is_expired(now: EpochMs, deadline: EpochMs) -> bool {
        now >= deadline
    }
}
