#![forbid(unsafe_code)]

pub mod clock;
pub mod file_store;
pub mod record_store;
pub mod repo;
pub mod shared_profile;

pub use record_store::{MemoryRecordStore, RecordStore, StoreError, StoreKey};
