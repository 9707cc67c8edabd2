#![forbid(unsafe_code)]

pub mod expiry;
pub mod gate;
pub mod quota;
