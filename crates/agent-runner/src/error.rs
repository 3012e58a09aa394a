//! Error types for agent-runner

use aos_core::run::ErrorCode;
use thiserror::Error;

/// Result type alias for runner operations
pub type Result<T> = std::result::Result<T, RunnerError>;

/// Errors that can occur while running or resuming a workflow
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Event model, sink or journal failure
    #[error(transparent)]
    Core(#[from] aos_core::Error),

    /// The run was cancelled
    #[error("Run cancelled: {message}")]
    Cancelled { message: String },

    /// A step could not complete
    #[error("Step '{step_id}' failed: {message}")]
    StepFailed {
        step_id: String,
        code: ErrorCode,
        message: String,
    },

    /// The run gate refused the run
    #[error("Run blocked by policy: {reason}")]
    PolicyBlocked { reason: String },

    /// The run is not suspended at a checkpoint
    #[error("Run {run_id} cannot be resumed: {reason}")]
    NotResumable { run_id: String, reason: String },

    /// Resume decision is not `approved` or `rejected`
    #[error("Invalid review decision: {decision}")]
    InvalidDecision { decision: String },

    /// The workflow given on resume does not match the recorded run
    #[error("Workflow mismatch for run {run_id}: {message}")]
    WorkflowMismatch { run_id: String, message: String },

    /// No runtime registered under the name
    #[error("Runtime not found: {name}")]
    RuntimeNotFound { name: String },

    /// Execution failed
    #[error("Execution failed: {message}")]
    ExecutionFailed { message: String },
}

impl RunnerError {
    /// Create a Cancelled error
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    /// Create a StepFailed error
    pub fn step_failed(step_id: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::StepFailed {
            step_id: step_id.into(),
            code,
            message: message.into(),
        }
    }

    /// Create a NotResumable error
    pub fn not_resumable(run_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NotResumable {
            run_id: run_id.into(),
            reason: reason.into(),
        }
    }

    /// Create an ExecutionFailed error
    pub fn execution_failed(message: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            message: message.into(),
        }
    }

    /// Event error code this failure is recorded under
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Cancelled { .. } => ErrorCode::Cancelled,
            Self::StepFailed { code, .. } => *code,
            Self::PolicyBlocked { .. } => ErrorCode::PolicyViolation,
            Self::ExecutionFailed { .. } => ErrorCode::ExecutionError,
            Self::Core(_)
            | Self::NotResumable { .. }
            | Self::InvalidDecision { .. }
            | Self::WorkflowMismatch { .. }
            | Self::RuntimeNotFound { .. } => ErrorCode::RuntimeError,
        }
    }
}
