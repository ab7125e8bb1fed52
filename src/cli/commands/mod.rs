//! Command implementations for the CLI.
//!
//! Each command is implemented in its own module.

pub mod build;
pub mod init;
pub mod manifest;
pub mod watch;
