#![forbid(unsafe_code)]

pub mod gate_cli;
