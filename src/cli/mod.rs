//! Command-line handlers

pub mod commands;

pub use commands::{cmd_files, cmd_hash, cmd_hosts, cmd_serve, cmd_share, CliResult};
