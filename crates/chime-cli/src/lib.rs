//! Chime CLI library
//!
//! Argument parsing, layered configuration and the command handlers behind
//! the `chime` binary.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::{Cli, Commands};
pub use commands::CommandDispatcher;
pub use config::CliAppConfig;
pub use error::{CliError, Result};
