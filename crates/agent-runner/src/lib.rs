//! Agent Runner - run engine for agent workflows
//!
//! This crate executes workflows step by step and records every state
//! transition through an event sink: policy-gated tool calls with timeout
//! and retry, simulated model turns, and human review checkpoints that
//! suspend a run until it is resumed with a decision.

mod action;
mod cancel;
mod config;
mod error;
mod orchestrator;
mod policy;
mod result;
mod runtime;
mod tool;

pub use action::{ActionBody, ActionContext, ActionRegistry, RegisteredAction};
pub use cancel::{CancelHandle, CancelSignal};
pub use config::RunnerConfig;
pub use error::{Result, RunnerError};
pub use orchestrator::{Orchestrator, ReviewDecision, REVIEW_DECISION_KEY};
pub use policy::{
    ruleset_for, ActionRequest, Decision, NoOpPolicyEngine, PolicyCatalog, PolicyEngine,
    PolicyProvider, PolicyRuleset, RulesetPolicyEngine,
};
pub use result::{RunFailure, RunMetrics, RunResult, RunStatus};
pub use runtime::{
    new_run_id, AgentRuntime, LocalRuntime, ResumeRequest, RunRequest, RuntimeInfo,
    RuntimeRegistry, LOCAL_RUNTIME,
};
pub use tool::{ToolCall, ToolExecutor, ToolOutcome};
