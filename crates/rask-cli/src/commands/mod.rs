//! Command implementations for the `rask` CLI.

pub mod dev;
pub mod version;
