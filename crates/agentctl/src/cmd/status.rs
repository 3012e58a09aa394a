use aos_core::run::{RunJournal, RunLog, RunState, RunStore};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::failure_code;
use crate::exit_codes;
use crate::output::{print_error, print_result, OutputFormat};
use crate::{DataArgs, OutputArgs};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResult {
    run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    agent_name: Option<String>,
    state: RunState,
    event_count: usize,
    segments: usize,
    next_sequence: u64,
    sequence_intact: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    sequence_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pending_checkpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    artifact_path: Option<String>,
}

pub fn status_cmd(run_id: &str, output: OutputArgs, data: DataArgs) -> i32 {
    let store = RunStore::new(data.config().data_dir);
    let result = match inspect(&store, run_id) {
        Ok(result) => result,
        Err(e) => {
            print_error(output.format, output.quiet, &format!("{e:#}"));
            return failure_code(&e);
        }
    };

    if output.format == OutputFormat::Text && !output.quiet {
        println!("Run: {}", result.run_id);
        if let Some(agent) = &result.agent_name {
            println!("Agent: {}", agent);
        }
        println!("State: {}", result.state);
        if let Some(started) = &result.started_at {
            println!("Started: {}", started.to_rfc3339());
        }
        println!(
            "Events: {} in {} segment(s), next sequence {}",
            result.event_count, result.segments, result.next_sequence
        );
        match &result.sequence_error {
            None => println!("Sequence: intact"),
            Some(e) => println!("Sequence: broken ({})", e),
        }
        if let Some(step) = &result.pending_checkpoint {
            println!("Waiting for review at step: {}", step);
        }
        if let Some(path) = &result.artifact_path {
            println!("Artifact: {}", path);
        }
    } else {
        print_result(output.format, output.quiet, &result);
    }

    if result.sequence_intact {
        exit_codes::SUCCESS
    } else {
        exit_codes::RUNTIME_ERROR
    }
}

fn inspect(store: &RunStore, run_id: &str) -> anyhow::Result<StatusResult> {
    let log = RunLog::new(store.load_events(run_id)?);
    if log.is_empty() {
        return Err(aos_core::Error::RunNotFound(run_id.to_string()).into());
    }
    let sequence_error = log.verify_sequence().err().map(|e| e.to_string());

    Ok(StatusResult {
        run_id: run_id.to_string(),
        agent_name: log.agent_name().map(str::to_string),
        state: log.state(),
        event_count: log.len(),
        segments: store.segment_paths(run_id)?.len(),
        next_sequence: log.next_sequence().value(),
        sequence_intact: sequence_error.is_none(),
        sequence_error,
        pending_checkpoint: log.pending_checkpoint().map(str::to_string),
        started_at: log.started_at(),
        artifact_path: log.artifact_path().map(str::to_string),
    })
}
