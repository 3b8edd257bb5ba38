//! vbsp-rs library
//!
//! Command definitions and output helpers behind the `vbsp-rs` binary.

pub mod cli;
pub mod commands;
pub mod utils;
