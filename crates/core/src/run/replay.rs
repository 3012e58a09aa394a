//! Run-log replay
//!
//! The event stream is the run's state. [`RunLog`] derives everything a
//! resume needs from it: the lifecycle state, the next sequence number, the
//! original input and the outputs of steps that already completed.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::event::{EventType, RunEvent, Sequence};
use crate::{Error, Result};

/// Lifecycle state derived from a run's event stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    Running,
    Completed,
    Errored,
    AwaitingReview,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Errored => "errored",
            Self::AwaitingReview => "awaiting_review",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Errored)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A loaded event stream, segments already concatenated
#[derive(Debug, Clone, Default)]
pub struct RunLog {
    events: Vec<RunEvent>,
}

impl RunLog {
    pub fn new(events: Vec<RunEvent>) -> Self {
        Self { events }
    }

    pub fn events(&self) -> &[RunEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn agent_name(&self) -> Option<&str> {
        self.events.first().map(|e| e.agent_name.as_str())
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.first_of(EventType::RunStart).map(|e| e.timestamp)
    }

    pub fn state(&self) -> RunState {
        let Some(last) = self.events.last() else {
            return RunState::NotStarted;
        };
        match last.event_type {
            EventType::RunEnd => match last.data_str("status") {
                Some("success") => RunState::Completed,
                _ => RunState::Errored,
            },
            EventType::Error => RunState::Errored,
            EventType::HumanReviewRequest => RunState::AwaitingReview,
            _ => RunState::Running,
        }
    }

    /// Sequence number the next emitted event must carry
    pub fn next_sequence(&self) -> Sequence {
        self.events
            .last()
            .map_or(Sequence::ZERO, |e| e.sequence_number.next())
    }

    /// Check that sequence numbers are exactly `0..n-1`
    pub fn verify_sequence(&self) -> Result<()> {
        for (index, event) in self.events.iter().enumerate() {
            let expected = index as u64;
            if event.sequence_number.value() != expected {
                return Err(Error::SequenceGap {
                    run_id: event.run_id.clone(),
                    expected,
                    found: event.sequence_number.value(),
                });
            }
        }
        Ok(())
    }

    /// Input the run was started with
    pub fn input(&self) -> Option<&Value> {
        self.first_of(EventType::RunStart)
            .and_then(|e| e.data.get("input"))
    }

    /// Step id of the checkpoint the run is suspended at
    pub fn pending_checkpoint(&self) -> Option<&str> {
        match self.events.last() {
            Some(last) if last.event_type == EventType::HumanReviewRequest => {
                last.data_str("step_id")
            }
            _ => None,
        }
    }

    /// Outputs of steps that completed, keyed by step id
    ///
    /// Successful tool results and model responses carry outputs. Steps
    /// skipped after a policy denial are recorded with a null output.
    pub fn step_outputs(&self) -> HashMap<String, Value> {
        let mut outputs = HashMap::new();
        for event in &self.events {
            let Some(step_id) = event.data_str("step_id") else {
                continue;
            };
            let output = match event.event_type {
                EventType::ToolResult
                    if event.data.get("success").and_then(Value::as_bool) == Some(true) =>
                {
                    event.data.get("result").cloned().unwrap_or(Value::Null)
                }
                EventType::LlmResponse => {
                    event.data.get("content").cloned().unwrap_or(Value::Null)
                }
                EventType::PolicyDeny => Value::Null,
                _ => continue,
            };
            outputs.insert(step_id.to_string(), output);
        }
        outputs
    }

    /// Tokens consumed by recorded model responses
    pub fn tokens_used(&self) -> u64 {
        self.events
            .iter()
            .filter(|e| e.event_type == EventType::LlmResponse)
            .filter_map(|e| e.metrics.as_ref()?.get("tokensUsed")?.as_u64())
            .sum()
    }

    /// Most recent artifact path reported by a successful tool result
    pub fn artifact_path(&self) -> Option<&str> {
        self.events
            .iter()
            .rev()
            .filter(|e| e.event_type == EventType::ToolResult)
            .find_map(|e| {
                e.data
                    .get("result")
                    .and_then(|r| r.get("artifactPath"))
                    .and_then(Value::as_str)
            })
    }

    fn first_of(&self, event_type: EventType) -> Option<&RunEvent> {
        self.events.iter().find(|e| e.event_type == event_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::event::EventDraft;
    use serde_json::json;

    fn log(drafts: Vec<EventDraft>) -> RunLog {
        let events = drafts
            .into_iter()
            .enumerate()
            .map(|(i, d)| RunEvent::from_draft("run-x", "agent", Sequence::new(i as u64), d))
            .collect();
        RunLog::new(events)
    }

    fn suspended() -> RunLog {
        log(vec![
            EventDraft::new(EventType::RunStart, json!({"input": {"query": "q"}})),
            EventDraft::new(EventType::AgentStart, json!({})),
            EventDraft::new(EventType::ToolCall, json!({"step_id": "search"})),
            EventDraft::new(
                EventType::ToolResult,
                json!({"step_id": "search", "success": true, "result": {"hits": 2}}),
            ),
            EventDraft::new(EventType::PolicyDeny, json!({"step_id": "scrape"})),
            EventDraft::new(EventType::LlmResponse, json!({"step_id": "summary", "content": "ok"}))
                .with_metrics(json!({"tokensUsed": 4})),
            EventDraft::new(EventType::HumanReviewRequest, json!({"step_id": "review"})),
        ])
    }

    #[test]
    fn test_derives_state() {
        assert_eq!(RunLog::default().state(), RunState::NotStarted);
        assert_eq!(suspended().state(), RunState::AwaitingReview);

        let done = log(vec![
            EventDraft::new(EventType::RunStart, json!({})),
            EventDraft::new(EventType::RunEnd, json!({"status": "success"})),
        ]);
        assert_eq!(done.state(), RunState::Completed);

        let failed = log(vec![
            EventDraft::new(EventType::RunStart, json!({})),
            EventDraft::new(EventType::RunEnd, json!({"status": "error"})),
        ]);
        assert_eq!(failed.state(), RunState::Errored);

        let blocked = log(vec![
            EventDraft::new(EventType::RunStart, json!({})),
            EventDraft::new(EventType::Error, json!({})),
        ]);
        assert_eq!(blocked.state(), RunState::Errored);
    }

    #[test]
    fn test_replays_completed_work() {
        let log = suspended();
        assert_eq!(log.next_sequence(), Sequence::new(7));
        assert_eq!(log.input(), Some(&json!({"query": "q"})));
        assert_eq!(log.pending_checkpoint(), Some("review"));
        assert_eq!(log.tokens_used(), 4);

        let outputs = log.step_outputs();
        assert_eq!(outputs["search"], json!({"hits": 2}));
        assert_eq!(outputs["scrape"], Value::Null);
        assert_eq!(outputs["summary"], json!("ok"));
        assert!(!outputs.contains_key("review"));
    }

    #[test]
    fn test_verify_sequence_reports_gap() {
        let mut events = suspended().events().to_vec();
        assert!(RunLog::new(events.clone()).verify_sequence().is_ok());

        events.remove(3);
        let err = RunLog::new(events).verify_sequence().unwrap_err();
        assert!(matches!(err, Error::SequenceGap { expected: 3, found: 4, .. }));
    }

    #[test]
    fn test_artifact_path_from_tool_result() {
        let log = log(vec![EventDraft::new(
            EventType::ToolResult,
            json!({"success": true, "result": {"artifactPath": "out/report.md"}}),
        )]);
        assert_eq!(log.artifact_path(), Some("out/report.md"));
    }
}
