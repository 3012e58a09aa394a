//! Runtime adapter and runtime registry
//!
//! A runtime owns everything one run needs: it mints the run id, builds the
//! policy engine from the workflow's policies, opens the run's sink and hands
//! the orchestrator a recorder over it. The registry is a plain value built
//! at process start; callers look runtimes up by name.

use std::collections::BTreeMap;
use std::sync::Arc;

use aos_core::run::{
    EventRecorder, EventSink, RunJournal, RunLog, RunState, RunStore, ScopedSink,
};
use aos_core::spec::WorkflowSpec;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};
use uuid::Uuid;

use crate::action::ActionRegistry;
use crate::cancel::CancelSignal;
use crate::config::RunnerConfig;
use crate::error::{Result, RunnerError};
use crate::orchestrator::{Orchestrator, ReviewDecision};
use crate::policy::{
    ruleset_for, NoOpPolicyEngine, PolicyEngine, PolicyProvider, RulesetPolicyEngine,
};
use crate::result::{RunResult, RunStatus};
use crate::tool::ToolExecutor;

/// Name the local runtime registers under
pub const LOCAL_RUNTIME: &str = "local";

/// Identity and capabilities of a runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeInfo {
    pub name: String,
    pub version: String,
    pub capabilities: Vec<String>,
}

/// Request to start a run
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub workflow: WorkflowSpec,
    pub input: Value,
    pub cancel: CancelSignal,
}

impl RunRequest {
    pub fn new(workflow: WorkflowSpec, input: Value) -> Self {
        Self {
            workflow,
            input,
            cancel: CancelSignal::never(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Request to continue a run suspended at a checkpoint
#[derive(Debug, Clone)]
pub struct ResumeRequest {
    pub workflow: WorkflowSpec,
    pub run_id: String,
    pub decision: String,
    pub cancel: CancelSignal,
}

impl ResumeRequest {
    pub fn new(workflow: WorkflowSpec, run_id: impl Into<String>, decision: impl Into<String>) -> Self {
        Self {
            workflow,
            run_id: run_id.into(),
            decision: decision.into(),
            cancel: CancelSignal::never(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Executes workflows
///
/// `Err` is returned only when nothing could be recorded; every run that
/// started yields a [`RunResult`], errored runs included.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    fn info(&self) -> RuntimeInfo;

    async fn run(&self, request: RunRequest) -> Result<RunResult>;

    async fn resume(&self, request: ResumeRequest) -> Result<RunResult>;
}

/// In-process runtime
pub struct LocalRuntime {
    journal: Arc<dyn RunJournal>,
    policies: Arc<dyn PolicyProvider>,
    tools: ToolExecutor,
}

impl LocalRuntime {
    pub fn new(
        journal: Arc<dyn RunJournal>,
        actions: ActionRegistry,
        policies: Arc<dyn PolicyProvider>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            journal,
            policies,
            tools: ToolExecutor::new(Arc::new(actions), config),
        }
    }

    /// Runtime journaling to files under `config.data_dir`
    pub fn with_file_journal(
        actions: ActionRegistry,
        policies: Arc<dyn PolicyProvider>,
        config: RunnerConfig,
    ) -> Self {
        let journal = Arc::new(RunStore::new(&config.data_dir));
        Self::new(journal, actions, policies, config)
    }

    fn policy_engine(&self, workflow: &WorkflowSpec) -> Box<dyn PolicyEngine> {
        match ruleset_for(workflow, self.policies.as_ref()) {
            Some(ruleset) => Box::new(RulesetPolicyEngine::new(ruleset)),
            None => Box::new(NoOpPolicyEngine),
        }
    }

    fn open_sink(&self, run_id: &str) -> Result<ScopedSink<Box<dyn EventSink>>> {
        let sink = self.journal.open_segment(run_id)?;
        Ok(ScopedSink::new(sink))
    }
}

/// Mint a run id: `run-` followed by 16 lowercase hex characters
pub fn new_run_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("run-{}", &hex[..16])
}

fn close_sink(sink: ScopedSink<Box<dyn EventSink>>, result: RunResult) -> RunResult {
    match sink.finish() {
        Ok(()) => result,
        Err(e) => {
            error!("Failed to close event sink for run {}: {}", result.run_id, e);
            if result.status == RunStatus::Error {
                return result;
            }
            RunResult::failed(
                result.run_id,
                aos_core::run::ErrorCode::RuntimeError,
                format!("Event sink failure: {}", e),
                result.metrics,
            )
        }
    }
}

#[async_trait]
impl AgentRuntime for LocalRuntime {
    fn info(&self) -> RuntimeInfo {
        RuntimeInfo {
            name: LOCAL_RUNTIME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            capabilities: [
                "agent_execution",
                "tool_calling",
                "event_streaming",
                "policy_enforcement",
                "tool_timeout",
                "tool_retry",
                "human_review",
                "resume",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
        }
    }

    async fn run(&self, request: RunRequest) -> Result<RunResult> {
        let RunRequest {
            workflow,
            input,
            cancel,
        } = request;
        let run_id = new_run_id();
        let policy = self.policy_engine(&workflow);
        let mut sink = self.open_sink(&run_id)?;
        info!("Executing agent {} as run {}", workflow.name(), run_id);

        let result = {
            let mut recorder = EventRecorder::new(&mut *sink, &run_id, workflow.name());
            let mut orchestrator = Orchestrator::new(&workflow, policy.as_ref(), &self.tools, cancel)
                .with_artifacts_dir(self.journal.artifact_location(&run_id));
            orchestrator.start(&mut recorder, input).await
        };

        Ok(close_sink(sink, result))
    }

    async fn resume(&self, request: ResumeRequest) -> Result<RunResult> {
        let ResumeRequest {
            workflow,
            run_id,
            decision,
            cancel,
        } = request;
        let decision: ReviewDecision = decision.parse()?;

        let log = RunLog::new(self.journal.load_events(&run_id)?);
        if log.is_empty() {
            return Err(aos_core::Error::RunNotFound(run_id).into());
        }
        let state = log.state();
        if state != RunState::AwaitingReview {
            return Err(RunnerError::not_resumable(
                run_id,
                format!("run is {}, not awaiting review", state),
            ));
        }
        log.verify_sequence()?;

        if log.agent_name() != Some(workflow.name()) {
            return Err(RunnerError::WorkflowMismatch {
                run_id,
                message: format!(
                    "run belongs to agent {}, not {}",
                    log.agent_name().unwrap_or("unknown"),
                    workflow.name()
                ),
            });
        }
        let checkpoint = log.pending_checkpoint().unwrap_or_default();
        if workflow.step_index(checkpoint).is_none() {
            return Err(RunnerError::WorkflowMismatch {
                run_id,
                message: format!("checkpoint step '{}' is not in the workflow", checkpoint),
            });
        }

        let policy = self.policy_engine(&workflow);
        let mut sink = self.open_sink(&run_id)?;
        info!(
            "Resuming run {} at sequence {} with decision {}",
            run_id,
            log.next_sequence(),
            decision
        );

        let result = {
            let mut recorder = EventRecorder::new(&mut *sink, &run_id, workflow.name());
            let mut orchestrator = Orchestrator::new(&workflow, policy.as_ref(), &self.tools, cancel)
                .with_artifacts_dir(self.journal.artifact_location(&run_id));
            orchestrator.resume(&mut recorder, &log, decision).await
        };

        Ok(close_sink(sink, result))
    }
}

/// Runtimes by name
#[derive(Clone, Default)]
pub struct RuntimeRegistry {
    runtimes: BTreeMap<String, Arc<dyn AgentRuntime>>,
}

impl RuntimeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, runtime: Arc<dyn AgentRuntime>) {
        self.runtimes.insert(name.into(), runtime);
    }

    pub fn with(mut self, name: impl Into<String>, runtime: Arc<dyn AgentRuntime>) -> Self {
        self.register(name, runtime);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn AgentRuntime>> {
        self.runtimes
            .get(name)
            .cloned()
            .ok_or_else(|| RunnerError::RuntimeNotFound {
                name: name.to_string(),
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.runtimes.keys().map(String::as_str)
    }

    pub fn infos(&self) -> Vec<RuntimeInfo> {
        self.runtimes.values().map(|r| r.info()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyCatalog;
    use aos_core::run::MemoryJournal;

    fn runtime(journal: MemoryJournal) -> LocalRuntime {
        LocalRuntime::new(
            Arc::new(journal),
            ActionRegistry::new(),
            Arc::new(PolicyCatalog::new()),
            RunnerConfig::default(),
        )
    }

    #[test]
    fn test_run_id_shape() {
        let id = new_run_id();
        assert_eq!(id.len(), 20);
        assert!(id.starts_with("run-"));
        assert!(id[4..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(id, new_run_id());
    }

    #[test]
    fn test_registry_lookup() {
        let registry = RuntimeRegistry::new().with(
            LOCAL_RUNTIME,
            Arc::new(runtime(MemoryJournal::new())) as Arc<dyn AgentRuntime>,
        );

        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["local"]);
        assert_eq!(registry.get("local").unwrap().info().name, "local");
        assert!(registry.infos()[0].capabilities.contains(&"tool_retry".to_string()));
        assert!(matches!(
            registry.get("agno"),
            Err(RunnerError::RuntimeNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_resume_rejects_unknown_run_and_decision() {
        let runtime = runtime(MemoryJournal::new());
        let workflow: WorkflowSpec = serde_json::from_value(serde_json::json!({
            "apiVersion": "agent-os.dev/v1alpha1",
            "kind": "Agent",
            "metadata": {"name": "sample-agent"}
        }))
        .unwrap();

        let err = runtime
            .resume(ResumeRequest::new(workflow.clone(), "run-missing", "approved"))
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Core(aos_core::Error::RunNotFound(_))));

        let err = runtime
            .resume(ResumeRequest::new(workflow, "run-missing", "maybe"))
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::InvalidDecision { .. }));
    }
}
