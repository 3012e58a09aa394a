//! Tool executor
//!
//! One invocation records exactly one `tool.call` and one `tool.result`,
//! however many attempts it takes. Attempts are bounded by a timeout and
//! separated by exponential backoff; both race the run's cancel signal.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use aos_core::run::{ErrorCode, EventDraft, EventError, EventRecorder, EventType, Sequence};
use futures::FutureExt;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::action::{ActionContext, ActionRegistry, RegisteredAction};
use crate::cancel::CancelSignal;
use crate::config::RunnerConfig;

/// One requested invocation
#[derive(Debug, Clone)]
pub struct ToolCall<'a> {
    pub step_id: &'a str,
    pub action: &'a str,
    pub parameters: Value,
    pub artifacts_dir: Option<PathBuf>,
}

/// How an invocation ended
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Succeeded { result: Value, attempt: u32 },
    Failed { error: EventError, attempt: u32 },
    Cancelled { attempt: u32 },
}

impl ToolOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn attempt(&self) -> u32 {
        match self {
            Self::Succeeded { attempt, .. }
            | Self::Failed { attempt, .. }
            | Self::Cancelled { attempt } => *attempt,
        }
    }
}

/// Runs registered actions with timeout and retry
#[derive(Debug, Clone)]
pub struct ToolExecutor {
    registry: Arc<ActionRegistry>,
    config: RunnerConfig,
}

struct Limits {
    timeout_ms: u64,
    max_retries: u32,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ActionRegistry>, config: RunnerConfig) -> Self {
        Self { registry, config }
    }

    fn limits(&self, action: Option<&RegisteredAction>) -> Limits {
        let spec = action.map(|a| &a.spec);
        Limits {
            timeout_ms: spec
                .and_then(|s| s.timeout_ms)
                .unwrap_or(self.config.tool_timeout_ms),
            max_retries: spec
                .and_then(|s| s.max_retries)
                .unwrap_or(self.config.tool_retries),
        }
    }

    /// Invoke `call.action`, recording its call and result
    ///
    /// Takes the current sequence and returns the outcome with the next one.
    /// Only sink failures are returned as errors.
    pub async fn execute(
        &self,
        recorder: &mut EventRecorder<'_>,
        seq: Sequence,
        call: ToolCall<'_>,
        cancel: &mut CancelSignal,
    ) -> aos_core::Result<(ToolOutcome, Sequence)> {
        let registered = self.registry.get(call.action);
        let limits = self.limits(registered);

        let mut seq = recorder.record(
            seq,
            EventDraft::new(
                EventType::ToolCall,
                json!({
                    "tool_name": call.action,
                    "step_id": call.step_id,
                    "parameters": call.parameters,
                    "config": {
                        "timeoutMs": limits.timeout_ms,
                        "maxRetries": limits.max_retries,
                    },
                }),
            ),
        )?;

        let mut last_error = None;
        for attempt in 0..=limits.max_retries {
            let ctx = ActionContext {
                run_id: recorder.run_id().to_string(),
                step_id: call.step_id.to_string(),
                attempt,
                artifacts_dir: call.artifacts_dir.clone(),
            };
            let started = Instant::now();

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                r = invoke(registered, call.action, ctx, call.parameters.clone(), limits.timeout_ms) => Some(r),
            };

            match result {
                None => {
                    return self.record_cancelled(recorder, seq, &call, attempt);
                }
                Some(Ok(value)) => {
                    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
                    debug!(
                        "Tool {} succeeded on attempt {} in {:.1}ms",
                        call.action, attempt, elapsed_ms
                    );
                    seq = recorder.record(
                        seq,
                        EventDraft::new(
                            EventType::ToolResult,
                            json!({
                                "tool_name": call.action,
                                "step_id": call.step_id,
                                "success": true,
                                "attempt": attempt,
                                "result": value,
                            }),
                        )
                        .with_metrics(json!({ "durationMs": elapsed_ms })),
                    )?;
                    return Ok((
                        ToolOutcome::Succeeded {
                            result: value,
                            attempt,
                        },
                        seq,
                    ));
                }
                Some(Err(error)) => {
                    warn!(
                        "Tool {} attempt {}/{} failed: {}",
                        call.action,
                        attempt + 1,
                        limits.max_retries + 1,
                        error.message
                    );
                    last_error = Some(error);

                    if attempt < limits.max_retries {
                        let delay = self.config.backoff(attempt);
                        debug!("Retrying {} in {:?}", call.action, delay);
                        let slept = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => false,
                            _ = tokio::time::sleep(delay) => true,
                        };
                        if !slept {
                            return self.record_cancelled(recorder, seq, &call, attempt);
                        }
                    }
                }
            }
        }

        let error = last_error.unwrap_or_else(|| {
            EventError::new(ErrorCode::ExecutionError, "Tool execution failed")
        });
        info!(
            "Tool {} failed after {} attempts: {}",
            call.action,
            limits.max_retries + 1,
            error.message
        );
        seq = recorder.record(
            seq,
            EventDraft::new(
                EventType::ToolResult,
                json!({
                    "tool_name": call.action,
                    "step_id": call.step_id,
                    "success": false,
                    "attempt": limits.max_retries,
                    "error": error,
                }),
            )
            .with_error(error.clone()),
        )?;
        Ok((
            ToolOutcome::Failed {
                error,
                attempt: limits.max_retries,
            },
            seq,
        ))
    }

    fn record_cancelled(
        &self,
        recorder: &mut EventRecorder<'_>,
        seq: Sequence,
        call: &ToolCall<'_>,
        attempt: u32,
    ) -> aos_core::Result<(ToolOutcome, Sequence)> {
        info!("Tool {} cancelled on attempt {}", call.action, attempt);
        let error = EventError::new(ErrorCode::Cancelled, "Tool execution cancelled");
        let seq = recorder.record(
            seq,
            EventDraft::new(
                EventType::ToolResult,
                json!({
                    "tool_name": call.action,
                    "step_id": call.step_id,
                    "success": false,
                    "attempt": attempt,
                    "error": error,
                }),
            )
            .with_error(error),
        )?;
        Ok((ToolOutcome::Cancelled { attempt }, seq))
    }
}

async fn invoke(
    registered: Option<&RegisteredAction>,
    name: &str,
    ctx: ActionContext,
    parameters: Value,
    timeout_ms: u64,
) -> Result<Value, EventError> {
    let Some(action) = registered else {
        let reason = format!("action '{}' is not registered", name);
        return Err(EventError::new(
            ErrorCode::ExecutionError,
            format!("Tool execution failed: {}", reason),
        )
        .with_details(reason));
    };

    let call = AssertUnwindSafe(action.body.invoke(ctx, parameters)).catch_unwind();
    match tokio::time::timeout(Duration::from_millis(timeout_ms), call).await {
        Err(elapsed) => Err(EventError::new(
            ErrorCode::Timeout,
            format!("Tool execution timed out after {}ms", timeout_ms),
        )
        .with_details(elapsed.to_string())),
        Ok(Err(panic)) => {
            let reason = panic_message(panic.as_ref());
            Err(EventError::new(
                ErrorCode::ExecutionError,
                format!("Tool execution failed: {}", reason),
            )
            .with_details(format!("panic: {}", reason)))
        }
        Ok(Ok(Err(err))) => Err(EventError::new(
            ErrorCode::ExecutionError,
            format!("Tool execution failed: {}", err),
        )
        .with_details(format!("{:#}", err))),
        Ok(Ok(Ok(value))) => Ok(value),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "action panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelHandle;
    use aos_core::run::{MemoryEventSink, RunEvent};
    use aos_core::spec::ActionSpec;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config() -> RunnerConfig {
        RunnerConfig::default()
    }

    fn call(action: &str) -> ToolCall<'_> {
        ToolCall {
            step_id: "step",
            action,
            parameters: json!({"q": 1}),
            artifacts_dir: None,
        }
    }

    async fn run_tool(
        registry: ActionRegistry,
        action: &str,
        cancel: &mut CancelSignal,
    ) -> (ToolOutcome, Sequence, Vec<RunEvent>) {
        let executor = ToolExecutor::new(Arc::new(registry), fast_config());
        let mut sink = MemoryEventSink::new();
        let observer = sink.clone();
        let mut recorder = EventRecorder::new(&mut sink, "run-t", "agent");
        let (outcome, seq) = executor
            .execute(&mut recorder, Sequence::new(10), call(action), cancel)
            .await
            .unwrap();
        (outcome, seq, observer.events())
    }

    fn flaky(failures: u32, calls: Arc<AtomicU32>) -> impl Fn(ActionContext, Value) -> futures::future::BoxFuture<'static, anyhow::Result<Value>> + Send + Sync {
        move |ctx: ActionContext, _params: Value| {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < failures {
                    anyhow::bail!("transient failure {}", n);
                }
                Ok(json!({"attempt": ctx.attempt}))
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_success_records_call_and_result() {
        let mut registry = ActionRegistry::new();
        registry.register_fn("calculator", |_ctx, params: Value| async move {
            Ok::<_, anyhow::Error>(json!({"echo": params}))
        });

        let (outcome, seq, events) =
            run_tool(registry, "calculator", &mut CancelSignal::never()).await;

        assert!(outcome.is_success());
        assert_eq!(seq, Sequence::new(12));
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::ToolCall);
        assert_eq!(events[0].data["config"]["timeoutMs"], 30_000);
        assert_eq!(events[0].data["config"]["maxRetries"], 0);
        assert_eq!(events[1].event_type, EventType::ToolResult);
        assert_eq!(events[1].data["success"], true);
        assert_eq!(events[1].data["attempt"], 0);
        assert_eq!(events[1].data["result"]["echo"]["q"], 1);
        assert!(events[1].metrics.as_ref().unwrap().contains_key("durationMs"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_with_backoff_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let registry = ActionRegistry::new().with(
            ActionSpec::new("flaky").with_retries(3),
            Arc::new(flaky(2, calls.clone())),
        );

        let started = tokio::time::Instant::now();
        let (outcome, _, events) = run_tool(registry, "flaky", &mut CancelSignal::never()).await;

        assert_eq!(outcome, ToolOutcome::Succeeded { result: json!({"attempt": 2}), attempt: 2 });
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s after the first failure, 2s after the second
        assert!(started.elapsed() >= Duration::from_millis(3_000));

        let types: Vec<_> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(types, vec![EventType::ToolCall, EventType::ToolResult]);
        assert_eq!(events[1].data["attempt"], 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_record_one_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let registry = ActionRegistry::new().with(
            ActionSpec::new("broken").with_retries(2),
            Arc::new(flaky(u32::MAX, calls.clone())),
        );

        let (outcome, seq, events) = run_tool(registry, "broken", &mut CancelSignal::never()).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.attempt(), 2);
        assert_eq!(seq, Sequence::new(12));
        assert_eq!(events.len(), 2);

        let result = &events[1];
        assert_eq!(result.data["success"], false);
        assert_eq!(result.data["attempt"], 2);
        let error = result.error.as_ref().unwrap();
        assert_eq!(error.code, ErrorCode::ExecutionError);
        assert_eq!(error.message, "Tool execution failed: transient failure 2");
        assert_eq!(error.details.as_deref(), Some("transient failure 2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_recorded() {
        let registry = ActionRegistry::new().with(
            ActionSpec::new("slow").with_timeout_ms(50),
            Arc::new(|_ctx: ActionContext, _params: Value| async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, anyhow::Error>(json!(null))
            }),
        );

        let (outcome, _, events) = run_tool(registry, "slow", &mut CancelSignal::never()).await;

        let ToolOutcome::Failed { error, attempt } = outcome else {
            panic!("expected failure");
        };
        assert_eq!(attempt, 0);
        assert_eq!(error.code, ErrorCode::Timeout);
        assert_eq!(error.message, "Tool execution timed out after 50ms");
        assert_eq!(events[0].data["config"]["timeoutMs"], 50);
    }

    #[tokio::test]
    async fn test_unregistered_action_fails_like_any_error() {
        let (outcome, _, events) =
            run_tool(ActionRegistry::new(), "ghost", &mut CancelSignal::never()).await;

        let ToolOutcome::Failed { error, .. } = outcome else {
            panic!("expected failure");
        };
        assert_eq!(error.code, ErrorCode::ExecutionError);
        assert!(error.message.contains("not registered"));
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_panicking_body_is_an_execution_error() {
        let mut registry = ActionRegistry::new();
        registry.register_fn("boom", |_ctx, _params| async move {
            if true {
                panic!("kaboom");
            }
            Ok::<_, anyhow::Error>(json!(null))
        });

        let (outcome, _, _) = run_tool(registry, "boom", &mut CancelSignal::never()).await;

        let ToolOutcome::Failed { error, .. } = outcome else {
            panic!("expected failure");
        };
        assert_eq!(error.message, "Tool execution failed: kaboom");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let calls = Arc::new(AtomicU32::new(0));
        let registry = ActionRegistry::new().with(
            ActionSpec::new("flaky").with_retries(5),
            Arc::new(flaky(u32::MAX, calls.clone())),
        );
        let handle = CancelHandle::new();
        let mut signal = handle.signal();

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            handle.cancel();
        });
        let (outcome, _, events) = run_tool(registry, "flaky", &mut signal).await;
        canceller.await.unwrap();

        assert_eq!(outcome, ToolOutcome::Cancelled { attempt: 0 });
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let results: Vec<_> = events
            .iter()
            .filter(|e| e.event_type == EventType::ToolResult)
            .collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].error.as_ref().unwrap().code, ErrorCode::Cancelled);
    }
}
