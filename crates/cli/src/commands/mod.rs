//! Subcommand implementations

pub mod cluster;
pub mod scheduling;
