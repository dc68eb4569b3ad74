//! Command-line interface definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// TaskForce - specialist-pack agent orchestration runtime
#[derive(Debug, Parser)]
#[command(name = "tf", version, about)]
pub struct Cli {
    /// Path to a config file (default: .taskforce.yml, then user config)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Submit a task and wait for its result
    Submit {
        /// The task prompt
        prompt: String,

        /// Pin a specific specialist instead of planning
        #[arg(short, long)]
        specialist: Option<String>,

        /// Model tier key (e.g. fast, quality)
        #[arg(short, long, default_value = "fast")]
        tier: String,

        /// Allow network-using tools
        #[arg(long)]
        network: bool,
    },

    /// Resume an interrupted run
    Resume {
        /// Run id to resume
        run_id: String,
    },

    /// List resumable runs
    Runs,

    /// Show a run's status
    Status {
        /// Run id to inspect
        run_id: String,
    },
}
