use aos_core::run::RunStore;

use crate::exit_codes;
use crate::output::{print_error, print_result, OutputFormat};
use crate::{DataArgs, OutputArgs};

pub fn runs_cmd(output: OutputArgs, data: DataArgs) -> i32 {
    let store = RunStore::new(data.config().data_dir);
    let runs = match store.list_runs() {
        Ok(runs) => runs,
        Err(e) => {
            print_error(output.format, output.quiet, &format!("failed to list runs: {e}"));
            return exit_codes::RUNTIME_ERROR;
        }
    };

    if output.format == OutputFormat::Text && !output.quiet {
        if runs.is_empty() {
            println!("No runs recorded");
            return exit_codes::SUCCESS;
        }
        println!("{:<22} {:<24} {:<16} {:>6}  STARTED", "RUN", "AGENT", "STATE", "EVENTS");
        for run in &runs {
            println!(
                "{:<22} {:<24} {:<16} {:>6}  {}",
                run.run_id,
                run.agent_name.as_deref().unwrap_or("-"),
                run.state.as_str(),
                run.event_count,
                run.started_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string())
            );
        }
    } else {
        print_result(output.format, output.quiet, &runs);
    }
    exit_codes::SUCCESS
}
