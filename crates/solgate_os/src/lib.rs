#![forbid(unsafe_code)]

pub mod bootstrap;
pub mod gate;
pub mod ledger;
pub mod link;
pub mod session;
pub mod sync;
