use std::path::Path;

use agent_runner::ResumeRequest;
use aos_core::run::RunStore;
use tracing::info;

use super::run::interrupt_signal;
use super::{failure_code, RunReport};
use crate::loader::AgentBundle;
use crate::output::print_error;
use crate::{DataArgs, DecisionArgs, OutputArgs};

pub async fn review_cmd(
    run_id: &str,
    agent_path: &Path,
    decision: DecisionArgs,
    runtime: &str,
    output: OutputArgs,
    data: DataArgs,
) -> i32 {
    match execute(run_id, agent_path, decision.as_str(), runtime, &data).await {
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
    run_id: &str,
    agent_path: &Path,
    decision: &str,
    runtime: &str,
    data: &DataArgs,
) -> anyhow::Result<RunReport> {
    let bundle = AgentBundle::load(agent_path)?;
    let config = data.config();
    let store = RunStore::new(&config.data_dir);

    let runtimes = bundle.runtimes(config);
    let runtime = runtimes.get(runtime)?;
    info!("Review of run {}: {}", run_id, decision);

    let (signal, watcher) = interrupt_signal();
    let request = ResumeRequest::new(bundle.workflow, run_id, decision).with_cancel(signal);
    let result = runtime.resume(request).await;
    watcher.abort();

    Ok(RunReport::new(result?, &store, &agent_path.display().to_string()))
}
