//! Run event model
//!
//! A [`RunEvent`] records one state transition of a run. On the wire every
//! event is wrapped in a Kubernetes-style envelope:
//!
//! ```text
//! { "apiVersion": "agent-os.dev/v1alpha1", "kind": "RunEvent",
//!   "metadata": { "runId", "timestamp", "agentName", "sequenceNumber" },
//!   "spec": { "eventType", "data", "error"?, "metrics"? } }
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Error;

/// API version stamped on every event envelope
pub const API_VERSION: &str = "agent-os.dev/v1alpha1";

/// Kind tag of the event envelope
pub const EVENT_KIND: &str = "RunEvent";

/// Payload map carried by `data` and `metrics`
pub type EventData = Map<String, Value>;

/// Position of an event within its run
///
/// Sequence numbers start at zero and grow by exactly one per emitted event.
/// The value is threaded between emitters: every emitting call takes the
/// current sequence and hands back the next one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sequence(u64);

impl Sequence {
    pub const ZERO: Sequence = Sequence(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fixed vocabulary of event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "run.start")]
    RunStart,
    #[serde(rename = "run.end")]
    RunEnd,
    #[serde(rename = "agent.start")]
    AgentStart,
    #[serde(rename = "agent.end")]
    AgentEnd,
    #[serde(rename = "tool.call")]
    ToolCall,
    #[serde(rename = "tool.result")]
    ToolResult,
    #[serde(rename = "policy.allow")]
    PolicyAllow,
    #[serde(rename = "policy.deny")]
    PolicyDeny,
    #[serde(rename = "llm.request")]
    LlmRequest,
    #[serde(rename = "llm.response")]
    LlmResponse,
    #[serde(rename = "human_review_request")]
    HumanReviewRequest,
    #[serde(rename = "human_review_response")]
    HumanReviewResponse,
    #[serde(rename = "error")]
    Error,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RunStart => "run.start",
            Self::RunEnd => "run.end",
            Self::AgentStart => "agent.start",
            Self::AgentEnd => "agent.end",
            Self::ToolCall => "tool.call",
            Self::ToolResult => "tool.result",
            Self::PolicyAllow => "policy.allow",
            Self::PolicyDeny => "policy.deny",
            Self::LlmRequest => "llm.request",
            Self::LlmResponse => "llm.response",
            Self::HumanReviewRequest => "human_review_request",
            Self::HumanReviewResponse => "human_review_response",
            Self::Error => "error",
        }
    }

    /// Whether a stream segment may legally end with this event
    pub fn ends_segment(&self) -> bool {
        matches!(self, Self::RunEnd | Self::Error | Self::HumanReviewRequest)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error taxonomy recorded on events and run results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    PolicyViolation,
    Timeout,
    ExecutionError,
    RuntimeError,
    Cancelled,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PolicyViolation => "POLICY_VIOLATION",
            Self::Timeout => "TIMEOUT",
            Self::ExecutionError => "EXECUTION_ERROR",
            Self::RuntimeError => "RUNTIME_ERROR",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error block of an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl EventError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// An immutable record of one run state transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireEvent", try_from = "WireEvent")]
pub struct RunEvent {
    pub run_id: String,
    pub sequence_number: Sequence,
    pub timestamp: DateTime<Utc>,
    pub agent_name: String,
    pub event_type: EventType,
    pub data: EventData,
    pub error: Option<EventError>,
    pub metrics: Option<EventData>,
}

impl RunEvent {
    /// Stamp a draft with its run identity and sequence number
    pub fn from_draft(
        run_id: impl Into<String>,
        agent_name: impl Into<String>,
        sequence_number: Sequence,
        draft: EventDraft,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            sequence_number,
            timestamp: Utc::now(),
            agent_name: agent_name.into(),
            event_type: draft.event_type,
            data: draft.data,
            error: draft.error,
            metrics: draft.metrics,
        }
    }

    /// Look up a string field in `data`
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

/// An event that has not been numbered yet
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub event_type: EventType,
    pub data: EventData,
    pub error: Option<EventError>,
    pub metrics: Option<EventData>,
}

impl EventDraft {
    /// Create a draft; non-object payloads are wrapped under `value`
    pub fn new(event_type: EventType, data: Value) -> Self {
        Self {
            event_type,
            data: into_map(data),
            error: None,
            metrics: None,
        }
    }

    pub fn with_error(mut self, error: EventError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_metrics(mut self, metrics: Value) -> Self {
        let metrics = into_map(metrics);
        self.metrics = if metrics.is_empty() { None } else { Some(metrics) };
        self
    }
}

fn into_map(value: Value) -> EventData {
    match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEvent {
    api_version: String,
    kind: String,
    metadata: WireMetadata,
    spec: WireSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMetadata {
    run_id: String,
    timestamp: DateTime<Utc>,
    agent_name: String,
    sequence_number: Sequence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSpec {
    event_type: EventType,
    #[serde(default)]
    data: EventData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<EventError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metrics: Option<EventData>,
}

impl From<RunEvent> for WireEvent {
    fn from(event: RunEvent) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: EVENT_KIND.to_string(),
            metadata: WireMetadata {
                run_id: event.run_id,
                timestamp: event.timestamp,
                agent_name: event.agent_name,
                sequence_number: event.sequence_number,
            },
            spec: WireSpec {
                event_type: event.event_type,
                data: event.data,
                error: event.error,
                metrics: event.metrics,
            },
        }
    }
}

impl TryFrom<WireEvent> for RunEvent {
    type Error = Error;

    fn try_from(wire: WireEvent) -> Result<Self, Self::Error> {
        if wire.kind != EVENT_KIND {
            return Err(Error::InvalidEvent(format!(
                "expected kind {}, got {}",
                EVENT_KIND, wire.kind
            )));
        }

        Ok(Self {
            run_id: wire.metadata.run_id,
            sequence_number: wire.metadata.sequence_number,
            timestamp: wire.metadata.timestamp,
            agent_name: wire.metadata.agent_name,
            event_type: wire.spec.event_type,
            data: wire.spec.data,
            error: wire.spec.error,
            metrics: wire.spec.metrics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> RunEvent {
        RunEvent::from_draft(
            "run-0123456789abcdef",
            "sample-agent",
            Sequence::new(3),
            EventDraft::new(EventType::ToolResult, json!({"tool_name": "calculator"}))
                .with_error(
                    EventError::new(ErrorCode::Timeout, "Tool execution timed out after 5ms")
                        .with_details("deadline elapsed"),
                )
                .with_metrics(json!({"durationMs": 12.5})),
        )
    }

    #[test]
    fn test_envelope_shape() {
        let value = serde_json::to_value(sample()).unwrap();

        assert_eq!(value["apiVersion"], API_VERSION);
        assert_eq!(value["kind"], "RunEvent");
        assert_eq!(value["metadata"]["runId"], "run-0123456789abcdef");
        assert_eq!(value["metadata"]["agentName"], "sample-agent");
        assert_eq!(value["metadata"]["sequenceNumber"], 3);
        assert!(value["metadata"]["timestamp"].as_str().unwrap().ends_with('Z'));
        assert_eq!(value["spec"]["eventType"], "tool.result");
        assert_eq!(value["spec"]["data"]["tool_name"], "calculator");
        assert_eq!(value["spec"]["error"]["code"], "TIMEOUT");
        assert_eq!(value["spec"]["metrics"]["durationMs"], 12.5);
    }

    #[test]
    fn test_optional_blocks_are_omitted() {
        let event = RunEvent::from_draft(
            "run-1",
            "agent",
            Sequence::ZERO,
            EventDraft::new(EventType::RunStart, json!({})),
        );
        let value = serde_json::to_value(&event).unwrap();

        assert!(value["spec"].get("error").is_none());
        assert!(value["spec"].get("metrics").is_none());
    }

    #[test]
    fn test_parse_back_from_line() {
        let event = sample();
        let line = serde_json::to_string(&event).unwrap();
        let parsed: RunEvent = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_rejects_foreign_kind() {
        let line = r#"{"apiVersion":"agent-os.dev/v1alpha1","kind":"TraceSpan",
            "metadata":{"runId":"r","timestamp":"2024-01-01T00:00:00Z","agentName":"a","sequenceNumber":0},
            "spec":{"eventType":"run.start","data":{}}}"#;
        assert!(serde_json::from_str::<RunEvent>(line).is_err());
    }

    #[test]
    fn test_non_object_payload_is_wrapped() {
        let draft = EventDraft::new(EventType::AgentEnd, json!("done"));
        assert_eq!(draft.data.get("value"), Some(&json!("done")));
    }

    #[test]
    fn test_segment_terminators() {
        assert!(EventType::RunEnd.ends_segment());
        assert!(EventType::Error.ends_segment());
        assert!(EventType::HumanReviewRequest.ends_segment());
        assert!(!EventType::ToolResult.ends_segment());
        assert_eq!(Sequence::new(4).next(), Sequence::new(5));
    }
}
