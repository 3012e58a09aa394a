//! Workflow orchestrator
//!
//! Drives one run through its steps:
//!
//! ```text
//! NotStarted -> Running -> Completed
//!                       -> Errored
//!                       -> AwaitingReview -> Running      (approved)
//!                                         -> Completed    (rejected)
//! ```
//!
//! The sequence number is threaded through every emitting call. A resume
//! rebuilds step outputs from the recorded log and never re-invokes tools
//! that completed before the checkpoint.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

use aos_core::run::{
    ErrorCode, EventDraft, EventError, EventRecorder, EventType, RunLog, Sequence,
};
use aos_core::spec::{
    render, resolve_value, CheckpointStep, OnDeny, RespondStep, Scope, StepKind, ToolStep,
    WorkflowSpec,
};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::cancel::CancelSignal;
use crate::error::RunnerError;
use crate::policy::{ActionRequest, PolicyEngine};
use crate::result::{RunMetrics, RunResult};
use crate::tool::{ToolCall, ToolExecutor, ToolOutcome};

/// Input key carrying a review decision
pub const REVIEW_DECISION_KEY: &str = "reviewDecision";

/// Outcome of a human review
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Approved,
    Rejected,
}

impl ReviewDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Decision carried by run input; absent or `pending` means none yet
    pub fn from_input(input: &Value) -> Option<Self> {
        let raw = input.get(REVIEW_DECISION_KEY)?.as_str()?;
        match raw.parse() {
            Ok(decision) => Some(decision),
            Err(_) => {
                if raw != "pending" {
                    warn!("Unknown review decision '{}', treating as pending", raw);
                }
                None
            }
        }
    }
}

impl FromStr for ReviewDecision {
    type Err = RunnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approved" | "approve" => Ok(Self::Approved),
            "rejected" | "reject" => Ok(Self::Rejected),
            _ => Err(RunnerError::InvalidDecision {
                decision: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for ReviewDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a stretch of execution ended
enum Ending {
    Completed(Value),
    Suspended(Value),
    Blocked(String),
    Failed(RunnerError),
}

enum StepFlow {
    Next,
    End(Ending),
}

type Emitted<T> = aos_core::Result<(T, Sequence)>;

/// Executes one workflow for one run
pub struct Orchestrator<'a> {
    workflow: &'a WorkflowSpec,
    policy: &'a dyn PolicyEngine,
    tools: &'a ToolExecutor,
    cancel: CancelSignal,
    artifacts_dir: Option<PathBuf>,
    started: Instant,
    input: Value,
    steps: HashMap<String, Value>,
    last_output: Value,
    tokens_used: u64,
    artifact_path: Option<String>,
    /// Actions refused by policy in the current segment
    denied: HashSet<String>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        workflow: &'a WorkflowSpec,
        policy: &'a dyn PolicyEngine,
        tools: &'a ToolExecutor,
        cancel: CancelSignal,
    ) -> Self {
        Self {
            workflow,
            policy,
            tools,
            cancel,
            artifacts_dir: None,
            started: Instant::now(),
            input: Value::Null,
            steps: HashMap::new(),
            last_output: Value::Null,
            tokens_used: 0,
            artifact_path: None,
            denied: HashSet::new(),
        }
    }

    /// Directory handed to action bodies for the files they produce
    pub fn with_artifacts_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.artifacts_dir = dir;
        self
    }

    /// Run the workflow from its first step
    pub async fn start(&mut self, recorder: &mut EventRecorder<'_>, input: Value) -> RunResult {
        self.input = input;
        let outcome = self.start_inner(recorder, Sequence::ZERO).await;
        self.finish(recorder, outcome)
    }

    /// Continue a run suspended at a checkpoint
    ///
    /// `log` is the run's recorded stream; the caller has checked that it
    /// ends with a review request.
    pub async fn resume(
        &mut self,
        recorder: &mut EventRecorder<'_>,
        log: &RunLog,
        decision: ReviewDecision,
    ) -> RunResult {
        self.input = log.input().cloned().unwrap_or_else(|| json!({}));
        self.steps = log.step_outputs();
        self.tokens_used = log.tokens_used();
        self.artifact_path = log.artifact_path().map(str::to_string);

        let outcome = self.resume_inner(recorder, log, decision).await;
        self.finish(recorder, outcome)
    }

    async fn start_inner(&mut self, recorder: &mut EventRecorder<'_>, seq: Sequence) -> Emitted<Ending> {
        let agent_name = self.workflow.name();
        info!("Run {} started for agent {}", recorder.run_id(), agent_name);

        let seq = recorder.record(
            seq,
            EventDraft::new(
                EventType::RunStart,
                json!({
                    "agent_name": agent_name,
                    "input": self.input,
                    "agent_spec_version": self.workflow.api_version,
                }),
            ),
        )?;

        if !self.policy.validate_run(self.workflow, &self.input) {
            let reason = format!("Agent '{}' is not permitted to run by policy", agent_name);
            warn!("Run {} blocked: {}", recorder.run_id(), reason);
            let seq = recorder.record(
                seq,
                EventDraft::new(
                    EventType::Error,
                    json!({ "code": ErrorCode::PolicyViolation, "message": reason }),
                )
                .with_error(EventError::new(ErrorCode::PolicyViolation, reason.clone())),
            )?;
            return Ok((Ending::Blocked(reason), seq));
        }

        let seq = recorder.record(
            seq,
            EventDraft::new(
                EventType::AgentStart,
                json!({
                    "agent_name": agent_name,
                    "system_prompt": self.workflow.spec.behavior.system_prompt,
                }),
            ),
        )?;

        self.run_steps(recorder, seq, 0).await
    }

    async fn resume_inner(
        &mut self,
        recorder: &mut EventRecorder<'_>,
        log: &RunLog,
        decision: ReviewDecision,
    ) -> Emitted<Ending> {
        let seq = log.next_sequence();
        let checkpoint = log
            .pending_checkpoint()
            .and_then(|id| self.workflow.step_index(id).map(|index| (id, index)));
        let Some((step_id, index)) = checkpoint else {
            return Ok((
                Ending::Failed(RunnerError::WorkflowMismatch {
                    run_id: recorder.run_id().to_string(),
                    message: "checkpoint step not found in workflow".to_string(),
                }),
                seq,
            ));
        };

        self.last_output = self.workflow.steps()[..index]
            .iter()
            .rev()
            .find_map(|step| self.steps.get(&step.id).cloned())
            .unwrap_or(Value::Null);

        info!(
            "Run {} resumed at {} with decision {}",
            recorder.run_id(),
            step_id,
            decision
        );
        match self.apply_decision(recorder, seq, step_id, decision)? {
            (StepFlow::Next, seq) => self.run_steps(recorder, seq, index + 1).await,
            (StepFlow::End(ending), seq) => Ok((ending, seq)),
        }
    }

    async fn run_steps(
        &mut self,
        recorder: &mut EventRecorder<'_>,
        mut seq: Sequence,
        from: usize,
    ) -> Emitted<Ending> {
        let workflow = self.workflow;
        for step in workflow.steps().iter().skip(from) {
            if self.cancel.is_cancelled() {
                return Ok((Ending::Failed(RunnerError::cancelled("run cancelled")), seq));
            }

            let (flow, next) = match &step.kind {
                StepKind::Tool(tool) => self.tool_step(recorder, seq, &step.id, tool).await?,
                StepKind::Respond(respond) => self.respond_step(recorder, seq, &step.id, respond)?,
                StepKind::Checkpoint(checkpoint) => {
                    self.checkpoint_step(recorder, seq, &step.id, checkpoint)?
                }
            };
            seq = next;

            if let StepFlow::End(ending) = flow {
                return Ok((ending, seq));
            }
        }
        Ok((Ending::Completed(self.last_output.clone()), seq))
    }

    fn resolve(&self, run_id: &str, value: &Value) -> aos_core::Result<Value> {
        let scope = Scope {
            input: &self.input,
            steps: &self.steps,
            run_id,
            agent_name: self.workflow.name(),
        };
        resolve_value(value, &scope)
    }

    fn record_output(&mut self, step_id: &str, output: Value) {
        self.steps.insert(step_id.to_string(), output.clone());
        self.last_output = output;
    }

    async fn tool_step(
        &mut self,
        recorder: &mut EventRecorder<'_>,
        mut seq: Sequence,
        step_id: &str,
        step: &ToolStep,
    ) -> Emitted<StepFlow> {
        let parameters = match self.resolve(recorder.run_id(), &Value::Object(step.parameters.clone())) {
            Ok(parameters) => parameters,
            Err(e) => return Ok((failed(step_id, ErrorCode::ExecutionError, e), seq)),
        };

        // An ungated step still goes through policy for an action denied
        // earlier in this segment.
        if step.gated || self.denied.contains(&step.action) {
            let request = ActionRequest {
                step_id: Some(step_id),
                action: &step.action,
                parameters: &parameters,
            };
            let (allowed, next) = self.policy.check_action(recorder, seq, &request)?;
            seq = next;

            if !allowed {
                self.denied.insert(step.action.clone());
                return Ok(match step.on_deny {
                    OnDeny::Halt => {
                        info!(
                            "Run {} halted: action {} denied at step {}",
                            recorder.run_id(),
                            step.action,
                            step_id
                        );
                        let output = json!({
                            "blocked": true,
                            "step_id": step_id,
                            "action": step.action,
                            "message": format!(
                                "I cannot use the {} tool because it is blocked by policy.",
                                step.action
                            ),
                        });
                        (StepFlow::End(Ending::Completed(output)), seq)
                    }
                    OnDeny::Continue => {
                        self.record_output(step_id, Value::Null);
                        (StepFlow::Next, seq)
                    }
                });
            }
        }

        let tools = self.tools;
        let call = ToolCall {
            step_id,
            action: &step.action,
            parameters,
            artifacts_dir: self.artifacts_dir.clone(),
        };
        let (outcome, seq) = tools.execute(recorder, seq, call, &mut self.cancel).await?;

        match outcome {
            ToolOutcome::Succeeded { result, .. } => {
                if let Some(path) = result.get("artifactPath").and_then(Value::as_str) {
                    self.artifact_path = Some(path.to_string());
                }
                self.record_output(step_id, result);

                if let Some(require) = &step.require {
                    let satisfied = self.resolve(recorder.run_id(), &Value::String(require.clone()));
                    match satisfied {
                        Ok(Value::Bool(true)) => {}
                        Ok(other) => {
                            let message = format!("requirement {} not met (got {})", require, other);
                            return Ok((failed(step_id, ErrorCode::ExecutionError, message), seq));
                        }
                        Err(e) => return Ok((failed(step_id, ErrorCode::ExecutionError, e), seq)),
                    }
                }
                Ok((StepFlow::Next, seq))
            }
            ToolOutcome::Failed { error, .. } => {
                Ok((failed(step_id, error.code, error.message), seq))
            }
            ToolOutcome::Cancelled { .. } => Ok((
                StepFlow::End(Ending::Failed(RunnerError::cancelled(format!(
                    "step '{}' cancelled",
                    step_id
                )))),
                seq,
            )),
        }
    }

    fn respond_step(
        &mut self,
        recorder: &mut EventRecorder<'_>,
        seq: Sequence,
        step_id: &str,
        step: &RespondStep,
    ) -> Emitted<StepFlow> {
        let scope = Scope {
            input: &self.input,
            steps: &self.steps,
            run_id: recorder.run_id(),
            agent_name: self.workflow.name(),
        };
        let content = match render(&step.template, &scope) {
            Ok(content) => content,
            Err(e) => return Ok((failed(step_id, ErrorCode::ExecutionError, e), seq)),
        };

        let behavior = &self.workflow.spec.behavior;
        let query = self
            .input
            .get("query")
            .or_else(|| self.input.get("message"))
            .and_then(Value::as_str)
            .unwrap_or_default();

        let seq = recorder.record(
            seq,
            EventDraft::new(
                EventType::LlmRequest,
                json!({
                    "step_id": step_id,
                    "model": behavior.model,
                    "messages": [
                        {"role": "system", "content": behavior.system_prompt},
                        {"role": "user", "content": query},
                    ],
                    "temperature": behavior.temperature,
                }),
            ),
        )?;

        let tokens = content.split_whitespace().count() as u64;
        let seq = recorder.record(
            seq,
            EventDraft::new(
                EventType::LlmResponse,
                json!({
                    "step_id": step_id,
                    "content": content,
                    "finish_reason": "stop",
                }),
            )
            .with_metrics(json!({ "tokensUsed": tokens })),
        )?;

        self.tokens_used += tokens;
        self.record_output(step_id, Value::String(content));
        Ok((StepFlow::Next, seq))
    }

    fn checkpoint_step(
        &mut self,
        recorder: &mut EventRecorder<'_>,
        seq: Sequence,
        step_id: &str,
        step: &CheckpointStep,
    ) -> Emitted<StepFlow> {
        let items = match &step.items {
            Some(expr) => match self.resolve(recorder.run_id(), &Value::String(expr.clone())) {
                Ok(items) => items,
                Err(e) => return Ok((failed(step_id, ErrorCode::ExecutionError, e), seq)),
            },
            None => json!([]),
        };
        let item_count = match &items {
            Value::Array(list) => list.len(),
            Value::Null => 0,
            _ => 1,
        };
        let message = step.message.clone().unwrap_or_else(|| {
            format!("Please review {} item(s) before the run continues", item_count)
        });
        let review_command = format!(
            "agentctl review {} <agent-path> --approve | --reject",
            recorder.run_id()
        );

        let seq = recorder.record(
            seq,
            EventDraft::new(
                EventType::HumanReviewRequest,
                json!({
                    "step_id": step_id,
                    "stage": step.stage,
                    "itemCount": item_count,
                    "items": items,
                    "message": message,
                    "reviewCommand": review_command,
                }),
            ),
        )?;

        match ReviewDecision::from_input(&self.input) {
            Some(decision) => self.apply_decision(recorder, seq, step_id, decision),
            None => {
                info!(
                    "Run {} suspended at {} awaiting review",
                    recorder.run_id(),
                    step_id
                );
                let output = json!({
                    "step_id": step_id,
                    "stage": step.stage,
                    "itemCount": item_count,
                    "message": message,
                    "reviewCommand": review_command,
                });
                Ok((StepFlow::End(Ending::Suspended(output)), seq))
            }
        }
    }

    fn apply_decision(
        &mut self,
        recorder: &mut EventRecorder<'_>,
        seq: Sequence,
        step_id: &str,
        decision: ReviewDecision,
    ) -> Emitted<StepFlow> {
        let message = match decision {
            ReviewDecision::Approved => format!("Review approved at step '{}'", step_id),
            ReviewDecision::Rejected => format!("Review rejected at step '{}'", step_id),
        };
        let seq = recorder.record(
            seq,
            EventDraft::new(
                EventType::HumanReviewResponse,
                json!({
                    "step_id": step_id,
                    "decision": decision.as_str(),
                    "message": message,
                }),
            ),
        )?;

        match decision {
            ReviewDecision::Approved => Ok((StepFlow::Next, seq)),
            ReviewDecision::Rejected => {
                info!("Run {} rejected at {}", recorder.run_id(), step_id);
                let output = json!({
                    "rejected": true,
                    "step_id": step_id,
                    "message": message,
                });
                Ok((StepFlow::End(Ending::Completed(output)), seq))
            }
        }
    }

    fn metrics(&self) -> RunMetrics {
        RunMetrics {
            duration_ms: self.started.elapsed().as_millis() as u64,
            tokens_used: self.tokens_used,
            artifact_path: self.artifact_path.clone(),
        }
    }

    fn finish(&mut self, recorder: &mut EventRecorder<'_>, outcome: Emitted<Ending>) -> RunResult {
        let closed = outcome.and_then(|(ending, seq)| self.close_out(recorder, ending, seq));
        match closed {
            Ok(result) => result,
            Err(e) => {
                error!("Event sink failed for run {}: {}", recorder.run_id(), e);
                RunResult::failed(
                    recorder.run_id(),
                    ErrorCode::RuntimeError,
                    format!("Event sink failure: {}", e),
                    self.metrics(),
                )
            }
        }
    }

    fn close_out(
        &mut self,
        recorder: &mut EventRecorder<'_>,
        ending: Ending,
        seq: Sequence,
    ) -> aos_core::Result<RunResult> {
        let run_id = recorder.run_id().to_string();
        let agent_name = self.workflow.name();

        match ending {
            Ending::Completed(output) => {
                let metrics = self.metrics();
                let seq = recorder.record(
                    seq,
                    EventDraft::new(
                        EventType::AgentEnd,
                        json!({ "agent_name": agent_name, "output": output }),
                    ),
                )?;
                recorder.record(
                    seq,
                    EventDraft::new(
                        EventType::RunEnd,
                        json!({ "status": "success", "output": output }),
                    )
                    .with_metrics(metrics_json(&metrics)),
                )?;
                recorder.flush()?;
                info!("Run {} completed in {}ms", run_id, metrics.duration_ms);
                Ok(RunResult::success(run_id, output, metrics))
            }
            Ending::Suspended(output) => {
                recorder.flush()?;
                Ok(RunResult::pending_review(run_id, output, self.metrics()))
            }
            Ending::Blocked(reason) => {
                recorder.flush()?;
                let err = RunnerError::PolicyBlocked { reason };
                Ok(RunResult::failed(
                    run_id,
                    err.code(),
                    err.to_string(),
                    self.metrics(),
                ))
            }
            Ending::Failed(err) => {
                let code = err.code();
                let message = err.to_string();
                let metrics = self.metrics();
                warn!("Run {} failed: {}", run_id, message);

                let mut data = json!({ "code": code, "message": message });
                if let RunnerError::StepFailed { step_id, .. } = &err {
                    data["step_id"] = json!(step_id);
                }
                let seq = recorder.record(
                    seq,
                    EventDraft::new(EventType::Error, data)
                        .with_error(EventError::new(code, message.clone())),
                )?;
                recorder.record(
                    seq,
                    EventDraft::new(
                        EventType::RunEnd,
                        json!({ "status": "error", "output": Value::Null }),
                    )
                    .with_metrics(metrics_json(&metrics)),
                )?;
                recorder.flush()?;
                Ok(RunResult::failed(run_id, code, message, metrics))
            }
        }
    }
}

fn failed(step_id: &str, code: ErrorCode, message: impl ToString) -> StepFlow {
    StepFlow::End(Ending::Failed(RunnerError::step_failed(
        step_id,
        code,
        message.to_string(),
    )))
}

fn metrics_json(metrics: &RunMetrics) -> Value {
    let mut value = json!({
        "durationMs": metrics.duration_ms,
        "tokensUsed": metrics.tokens_used,
    });
    if let Some(path) = &metrics.artifact_path {
        value["artifactPath"] = json!(path);
    }
    value
}
