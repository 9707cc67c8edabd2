#![forbid(unsafe_code)]

use solgate_contracts::takeover::{BrandTakeoverRecord, DeadlineMap, QuotaMap};
use solgate_contracts::Validate;

use crate::record_store::{read_typed, write_typed, RecordStore, StoreError, StoreKey};

/// Parse and validate a takeover payload, as persisted or as carried by a
/// change notification.
pub fn parse_takeover_payload(raw: &str) -> Result<BrandTakeoverRecord, StoreError> {
    let record = serde_json::from_str::<BrandTakeoverRecord>(raw)?;
    record.validate()?;
    Ok(record)
}

/// Typed repository interface over the gate's owned keys.
pub trait TakeoverRepo {
    /// Absent, malformed and invalid records all read as `None`.
    fn load_takeover_record(&self) -> Option<BrandTakeoverRecord>;
    fn save_takeover_record(&mut self, record: &BrandTakeoverRecord) -> Result<(), StoreError>;
    /// Absent, malformed and invalid maps all read as empty.
    fn load_quota_map(&self) -> QuotaMap;
    fn save_quota_map(&mut self, map: &QuotaMap) -> Result<(), StoreError>;
    /// Absent, malformed and invalid maps all read as empty.
    fn load_deadline_map(&self) -> DeadlineMap;
    fn save_deadline_map(&mut self, map: &DeadlineMap) -> Result<(), StoreError>;
    fn clear_owned_keys(&mut self) -> Result<(), StoreError>;
}

impl<S: RecordStore + ?Sized> TakeoverRepo for S {
    fn load_takeover_record(&self) -> Option<BrandTakeoverRecord> {
        let raw = self.get_raw(StoreKey::TakeoverRecord.as_str())?;
        match parse_takeover_payload(&raw) {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::warn!(error = %err, "persisted takeover record rejected; treated as absent");
                None
            }
        }
    }

    fn save_takeover_record(&mut self, record: &BrandTakeoverRecord) -> Result<(), StoreError> {
        record.validate()?;
        write_typed(self, StoreKey::TakeoverRecord.as_str(), record)
    }

    fn load_quota_map(&self) -> QuotaMap {
        let Some(map) = read_typed::<QuotaMap, _>(self, StoreKey::QuotaByLink.as_str()) else {
            return QuotaMap::new();
        };
        match map.validate() {
            Ok(()) => map,
            Err(err) => {
                tracing::warn!(error = %err, "persisted quota map rejected; treated as empty");
                QuotaMap::new()
            }
        }
    }

    fn save_quota_map(&mut self, map: &QuotaMap) -> Result<(), StoreError> {
        map.validate()?;
        write_typed(self, StoreKey::QuotaByLink.as_str(), map)
    }

    fn load_deadline_map(&self) -> DeadlineMap {
        let Some(map) = read_typed::<DeadlineMap, _>(self, StoreKey::DeadlineByBrand.as_str())
        else {
            return DeadlineMap::new();
        };
        match map.validate() {
            Ok(()) => map,
            Err(err) => {
                tracing::warn!(error = %err, "persisted deadline map rejected; treated as empty");
                DeadlineMap::new()
            }
        }
    }

    fn save_deadline_map(&mut self, map: &DeadlineMap) -> Result<(), StoreError> {
        map.validate()?;
        write_typed(self, StoreKey::DeadlineByBrand.as_str(), map)
    }

    fn clear_owned_keys(&mut self) -> Result<(), StoreError> {
        for key in StoreKey::ALL {
            self.remove(key.as_str())?;
        }
        Ok(())
    }
}
