//! Command handlers for the `tether` binary.

pub mod cache;
pub mod calculate;
