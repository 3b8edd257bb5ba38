//! Command implementations

pub mod bsp;
