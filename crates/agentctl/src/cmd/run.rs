use std::path::Path;

use agent_runner::{CancelHandle, CancelSignal, RunRequest};
use aos_core::run::RunStore;
use tracing::{info, warn};

use super::{failure_code, RunReport};
use crate::loader::AgentBundle;
use crate::output::print_error;
use crate::{DataArgs, InputArgs, OutputArgs};

pub async fn run_cmd(
    agent_path: &Path,
    input: InputArgs,
    runtime: &str,
    output: OutputArgs,
    data: DataArgs,
) -> i32 {
    match execute(agent_path, &input, runtime, &data).await {
        Ok(report) => {
            report.print(&output);
            report.exit_code()
        }
        Err(e) => {
            print_error(output.format, output.quiet, &format!("{e:#}"));
            failure_code(&e)
        }
    }
}

async fn execute(
    agent_path: &Path,
    input: &InputArgs,
    runtime: &str,
    data: &DataArgs,
) -> anyhow::Result<RunReport> {
    let bundle = AgentBundle::load(agent_path)?;
    let input = input.load()?;
    let config = data.config();
    let store = RunStore::new(&config.data_dir);

    let runtimes = bundle.runtimes(config);
    let runtime = runtimes.get(runtime)?;
    info!(
        "Running agent {} from {} on {} runtime",
        bundle.workflow.name(),
        bundle.agent_file.display(),
        runtime.info().name
    );

    let (signal, watcher) = interrupt_signal();
    let request = RunRequest::new(bundle.workflow, input).with_cancel(signal);
    let result = runtime.run(request).await;
    watcher.abort();

    Ok(RunReport::new(result?, &store, &agent_path.display().to_string()))
}

/// Cancel signal tripped by Ctrl-C
pub fn interrupt_signal() -> (CancelSignal, tokio::task::JoinHandle<()>) {
    let handle = CancelHandle::new();
    let signal = handle.signal();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            handle.cancel();
        }
    });
    (signal, watcher)
}
