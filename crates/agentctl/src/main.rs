//! agentctl - run agent workflows locally and inspect their event logs
//!
//! Run records are written under the data directory (`AOS_DATA_DIR`, default
//! `.aos-data`), one directory per run.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod args;
mod cmd;
mod commands;
mod exit_codes;
mod loader;
mod output;

pub use args::*;
use commands::Command;

#[derive(Debug, Parser)]
#[command(name = "agentctl", version, about = "Run agent workflows and inspect their runs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agentctl=info,agent_runner=info,aos_core=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to create tokio runtime: {e}");
            std::process::exit(exit_codes::RUNTIME_ERROR);
        }
    };

    let exit_code = rt.block_on(run_command(cli.command));
    std::process::exit(exit_code);
}

async fn run_command(command: Command) -> i32 {
    match command {
        Command::Run {
            agent_path,
            input,
            runtime,
            output,
            data,
        } => cmd::run::run_cmd(&agent_path, input, &runtime, output, data).await,
        Command::Review {
            run_id,
            agent_path,
            decision,
            runtime,
            output,
            data,
        } => cmd::review::review_cmd(&run_id, &agent_path, decision, &runtime, output, data).await,
        Command::Events { run_id, output, data } => cmd::events::events_cmd(&run_id, output, data),
        Command::Status { run_id, output, data } => cmd::status::status_cmd(&run_id, output, data),
        Command::Runs { output, data } => cmd::runs::runs_cmd(output, data),
        Command::Runtimes { output } => cmd::runtimes::runtimes_cmd(output),
        Command::Validate { agent_path, output } => cmd::validate::validate_cmd(&agent_path, output),
    }
}
