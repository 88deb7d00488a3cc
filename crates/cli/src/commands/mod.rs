//! Subcommand implementations

pub mod history;
pub mod replay;
pub mod status;
