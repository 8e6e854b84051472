//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the credentials file
    #[arg(short, long, global = true)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Store an account and provision a device token for it
    Login {
        /// Account email
        email: String,
    },
    /// Clear every stored credential
    Logout,
    /// Show the stored credential state
    Status {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a session against a scripted transport
    Replay {
        /// Transport script (TOML)
        script: PathBuf,
        /// Username submitted when credentials are requested
        #[arg(short, long)]
        username: Option<String>,
        /// Password submitted when credentials are requested
        #[arg(short, long, env = "CHIME_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
}
