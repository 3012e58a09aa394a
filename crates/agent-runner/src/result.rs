//! Run results returned to callers

use aos_core::run::ErrorCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Error,
    PendingReview,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::PendingReview => "pending_review",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetrics {
    /// Wall time of this invocation only; a resumed run does not include
    /// the time spent before it was suspended
    pub duration_ms: u64,
    /// Model tokens across the whole run, including replayed segments
    pub tokens_used: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    pub code: ErrorCode,
    pub message: String,
}

/// What a run or resume invocation produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub run_id: String,
    pub status: RunStatus,
    pub output: Value,
    pub metrics: RunMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunFailure>,
}

impl RunResult {
    pub fn success(run_id: impl Into<String>, output: Value, metrics: RunMetrics) -> Self {
        Self {
            run_id: run_id.into(),
            status: RunStatus::Success,
            output,
            metrics,
            error: None,
        }
    }

    pub fn pending_review(run_id: impl Into<String>, output: Value, metrics: RunMetrics) -> Self {
        Self {
            run_id: run_id.into(),
            status: RunStatus::PendingReview,
            output,
            metrics,
            error: None,
        }
    }

    pub fn failed(
        run_id: impl Into<String>,
        code: ErrorCode,
        message: impl Into<String>,
        metrics: RunMetrics,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            status: RunStatus::Error,
            output: Value::Null,
            metrics,
            error: Some(RunFailure {
                code,
                message: message.into(),
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serializes_camel_case() {
        let result = RunResult::success(
            "run-1",
            json!("done"),
            RunMetrics {
                duration_ms: 12,
                tokens_used: 3,
                artifact_path: None,
            },
        );
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["runId"], "run-1");
        assert_eq!(value["status"], "success");
        assert_eq!(value["metrics"]["durationMs"], 12);
        assert_eq!(value["metrics"]["tokensUsed"], 3);
        assert!(value["metrics"].get("artifactPath").is_none());
        assert!(value.get("error").is_none());

        let failed = RunResult::failed("run-2", ErrorCode::Timeout, "slow", RunMetrics::default());
        let value = serde_json::to_value(&failed).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["error"]["code"], "TIMEOUT");
        assert_eq!(value["output"], Value::Null);
        assert_eq!(RunStatus::PendingReview.as_str(), "pending_review");
    }
}
