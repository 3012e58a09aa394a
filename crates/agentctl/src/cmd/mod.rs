pub mod events;
pub mod review;
pub mod run;
pub mod runs;
pub mod runtimes;
pub mod status;
pub mod validate;

use agent_runner::{RunFailure, RunMetrics, RunResult, RunStatus, RunnerError};
use aos_core::run::RunStore;
use serde::Serialize;
use serde_json::Value;

use crate::exit_codes;
use crate::output::{print_result, OutputFormat};
use crate::OutputArgs;

/// Exit code for an error that stopped a command before or outside a run
pub fn failure_code(err: &anyhow::Error) -> i32 {
    if let Some(e) = err.downcast_ref::<RunnerError>() {
        return match e {
            RunnerError::Core(core) => core_failure_code(core),
            RunnerError::InvalidDecision { .. }
            | RunnerError::NotResumable { .. }
            | RunnerError::WorkflowMismatch { .. }
            | RunnerError::RuntimeNotFound { .. } => exit_codes::USAGE_ERROR,
            _ => exit_codes::RUNTIME_ERROR,
        };
    }
    if let Some(e) = err.downcast_ref::<aos_core::Error>() {
        return core_failure_code(e);
    }
    exit_codes::USAGE_ERROR
}

fn core_failure_code(err: &aos_core::Error) -> i32 {
    match err {
        aos_core::Error::Definition(_)
        | aos_core::Error::RunNotFound(_)
        | aos_core::Error::Expression(_) => exit_codes::USAGE_ERROR,
        _ => exit_codes::RUNTIME_ERROR,
    }
}

/// What `run` and `review` print
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events_path: Option<String>,
    pub output: Value,
    pub metrics: RunMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RunFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_command: Option<String>,
}

impl RunReport {
    pub fn new(result: RunResult, store: &RunStore, agent_path: &str) -> Self {
        let events_path = store
            .segment_paths(&result.run_id)
            .ok()
            .and_then(|paths| paths.last().map(|p| p.display().to_string()));
        let review_command = match result.status {
            RunStatus::PendingReview => Some(format!(
                "agentctl review {} {} --approve | --reject",
                result.run_id, agent_path
            )),
            _ => None,
        };
        Self {
            run_id: result.run_id,
            status: result.status,
            events_path,
            output: result.output,
            metrics: result.metrics,
            error: result.error,
            review_command,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self.status {
            RunStatus::Success | RunStatus::PendingReview => exit_codes::SUCCESS,
            RunStatus::Error => exit_codes::RUN_FAILED,
        }
    }

    pub fn print(&self, output: &OutputArgs) {
        if output.format != OutputFormat::Text || output.quiet {
            print_result(output.format, output.quiet, self);
            return;
        }

        match self.status {
            RunStatus::Success => println!("Run completed"),
            RunStatus::PendingReview => println!("Run waiting for review"),
            RunStatus::Error => println!("Run failed"),
        }
        println!("  Run ID:   {}", self.run_id);
        if let Some(path) = &self.events_path {
            println!("  Events:   {}", path);
        }
        println!("  Duration: {}ms", self.metrics.duration_ms);
        println!("  Tokens:   {}", self.metrics.tokens_used);
        if let Some(path) = &self.metrics.artifact_path {
            println!("  Artifact: {}", path);
        }
        if let Some(error) = &self.error {
            println!();
            println!("Error: {} {}", error.code, error.message);
        }
        if !self.output.is_null() {
            println!();
            println!("Output:");
            match &self.output {
                Value::String(text) => println!("{}", text),
                other => println!(
                    "{}",
                    serde_json::to_string_pretty(other).unwrap_or_default()
                ),
            }
        }
        if let Some(command) = &self.review_command {
            println!();
            println!("Review with: {}", command);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aos_core::run::ErrorCode;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_failure_codes() {
        let definition = anyhow::Error::from(aos_core::Error::Definition("bad".into()));
        assert_eq!(failure_code(&definition), exit_codes::USAGE_ERROR);

        let io = anyhow::Error::from(RunnerError::Core(aos_core::Error::Io(
            std::io::Error::other("disk full"),
        )));
        assert_eq!(failure_code(&io), exit_codes::RUNTIME_ERROR);

        let decision = anyhow::Error::from(RunnerError::InvalidDecision {
            decision: "maybe".into(),
        });
        assert_eq!(failure_code(&decision), exit_codes::USAGE_ERROR);

        let failed = anyhow::Error::from(RunnerError::execution_failed("boom"))
            .context("while running");
        assert_eq!(failure_code(&failed), exit_codes::RUNTIME_ERROR);
    }

    #[test]
    fn test_report_for_pending_run() {
        let temp = TempDir::new().unwrap();
        let store = RunStore::new(temp.path());
        let result = RunResult::pending_review("run-abc", json!({"step_id": "review"}), RunMetrics::default());
        let report = RunReport::new(result, &store, "agents/testcase");

        assert_eq!(report.exit_code(), exit_codes::SUCCESS);
        assert_eq!(
            report.review_command.as_deref(),
            Some("agentctl review run-abc agents/testcase --approve | --reject")
        );
        assert!(report.events_path.is_none());

        let failed = RunResult::failed("run-def", ErrorCode::Timeout, "slow", RunMetrics::default());
        let report = RunReport::new(failed, &store, "agents/testcase");
        assert_eq!(report.exit_code(), exit_codes::RUN_FAILED);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["error"]["code"], "TIMEOUT");
        assert!(value.get("reviewCommand").is_none());
    }
}
