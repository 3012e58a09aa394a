use std::path::PathBuf;

use agent_runner::LOCAL_RUNTIME;
use clap::Subcommand;

use crate::args::*;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run an agent from its definition file or directory
    Run {
        agent_path: PathBuf,
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, short, default_value = LOCAL_RUNTIME)]
        runtime: String,
        #[command(flatten)]
        output: OutputArgs,
        #[command(flatten)]
        data: DataArgs,
    },
    /// Approve or reject a run waiting at a review checkpoint
    Review {
        run_id: String,
        agent_path: PathBuf,
        #[command(flatten)]
        decision: DecisionArgs,
        #[arg(long, short, default_value = LOCAL_RUNTIME)]
        runtime: String,
        #[command(flatten)]
        output: OutputArgs,
        #[command(flatten)]
        data: DataArgs,
    },
    /// Print a run's event log
    Events {
        run_id: String,
        #[command(flatten)]
        output: OutputArgs,
        #[command(flatten)]
        data: DataArgs,
    },
    /// Show the state of a run
    Status {
        run_id: String,
        #[command(flatten)]
        output: OutputArgs,
        #[command(flatten)]
        data: DataArgs,
    },
    /// List recorded runs, newest first
    Runs {
        #[command(flatten)]
        output: OutputArgs,
        #[command(flatten)]
        data: DataArgs,
    },
    /// List available runtimes
    Runtimes {
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Check an agent definition and the tools and policies beside it
    Validate {
        agent_path: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
    },
}
