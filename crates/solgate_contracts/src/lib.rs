#![forbid(unsafe_code)]

pub mod common;
pub mod gate;
pub mod takeover;

pub use common::{ContractViolation, EpochMs, ReasonCodeId, SchemaVersion, Validate};
