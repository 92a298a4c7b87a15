use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Operator tooling for floorline module execution agents.
#[derive(Parser, Debug)]
#[command(name = "floorline", about = "Operator tooling for module execution agents")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load, override and validate an agent config file, then print it
    CheckConfig {
        /// Path to the agent TOML file
        #[arg(env = "FLOORLINE_CONFIG")]
        path: PathBuf,
    },

    /// Follow a module's action-queue broadcasts
    WatchQueue {
        /// Publisher endpoint to connect to (tcp://host:port or ipc name)
        #[arg(long, env = "FLOORLINE_BUS_SUBSCRIBE", default_value = "tcp://127.0.0.1:5556")]
        endpoint: String,

        /// Module id whose queue to watch
        #[arg(long, env = "FLOORLINE_MODULE_ID")]
        module: String,

        /// Topic namespace, may be nested (Factory/_PHUKET)
        #[arg(long, env = "FLOORLINE_NAMESPACE", default_value = "")]
        namespace: String,

        /// Sub-agent role in the topic path
        #[arg(long, env = "FLOORLINE_ROLE", default_value = "ExecutionHolon")]
        role: String,
    },
}
