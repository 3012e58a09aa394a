use aos_core::run::{RunEvent, RunJournal, RunStore};
use serde_json::Value;

use super::failure_code;
use crate::exit_codes;
use crate::output::{print_error, OutputFormat};
use crate::{DataArgs, OutputArgs};

pub fn events_cmd(run_id: &str, output: OutputArgs, data: DataArgs) -> i32 {
    let store = RunStore::new(data.config().data_dir);
    let events = match load(&store, run_id) {
        Ok(events) => events,
        Err(e) => {
            print_error(output.format, output.quiet, &format!("{e:#}"));
            return failure_code(&e);
        }
    };
    if output.quiet {
        return exit_codes::SUCCESS;
    }

    for event in &events {
        match output.format {
            OutputFormat::Json => match serde_json::to_string(event) {
                Ok(line) => println!("{line}"),
                Err(e) => {
                    print_error(output.format, false, &format!("failed to encode event: {e}"));
                    return exit_codes::RUNTIME_ERROR;
                }
            },
            OutputFormat::Text => println!("{}", text_line(event)),
        }
    }
    exit_codes::SUCCESS
}

fn load(store: &RunStore, run_id: &str) -> anyhow::Result<Vec<RunEvent>> {
    let events = store.load_events(run_id)?;
    if events.is_empty() {
        return Err(aos_core::Error::RunNotFound(run_id.to_string()).into());
    }
    Ok(events)
}

fn text_line(event: &RunEvent) -> String {
    let mut line = format!(
        "{:>4}  {}  {:<22}",
        event.sequence_number.value(),
        event.timestamp.format("%H:%M:%S%.3f"),
        event.event_type.as_str()
    );
    if let Some(step) = event.data_str("step_id") {
        line.push_str(&format!("  [{}]", step));
    }
    if let Some(detail) = summary(event) {
        line.push_str("  ");
        line.push_str(&detail);
    }
    if let Some(error) = &event.error {
        line.push_str(&format!("  {}: {}", error.code, error.message));
    }
    line
}

fn summary(event: &RunEvent) -> Option<String> {
    let keys = ["tool_name", "resource_name", "decision", "status", "stage", "content"];
    keys.iter().find_map(|key| match event.data.get(*key) {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    })
}
