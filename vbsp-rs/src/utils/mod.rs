//! Shared utilities for the vbsp-rs CLI

pub mod format;
pub mod table;

pub use format::*;
pub use table::*;
