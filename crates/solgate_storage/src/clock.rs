#![forbid(unsafe_code)]

use std::time::{SystemTime, UNIX_EPOCH};

use solgate_contracts::EpochMs;

/// Wall-clock milliseconds since the Unix epoch. Never zero; saturates
/// instead of truncating.
pub fn system_time_now_ms() -> EpochMs {
    let ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(1);
    EpochMs(ms.max(1))
}
