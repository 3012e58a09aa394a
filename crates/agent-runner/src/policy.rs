//! Policy engine
//!
//! Every gated action goes through [`PolicyEngine::check_action`], which
//! records its decision as a `policy.allow` or `policy.deny` event before
//! returning it.

use std::collections::{BTreeSet, HashMap};

use aos_core::run::{EventDraft, EventRecorder, EventType, Sequence};
use aos_core::spec::{PolicyDocument, PolicyKind, WorkflowSpec};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

/// Decision point for runs and actions
pub trait PolicyEngine: Send + Sync {
    /// Whether the run may start at all
    fn validate_run(&self, workflow: &WorkflowSpec, input: &Value) -> bool;

    /// Decide on one action and record the decision
    ///
    /// Takes the current sequence and returns the decision with the next one.
    fn check_action(
        &self,
        recorder: &mut EventRecorder<'_>,
        seq: Sequence,
        request: &ActionRequest<'_>,
    ) -> aos_core::Result<(bool, Sequence)>;
}

/// Action about to be invoked
#[derive(Debug, Clone, Copy)]
pub struct ActionRequest<'a> {
    pub step_id: Option<&'a str>,
    pub action: &'a str,
    pub parameters: &'a Value,
}

/// Outcome of evaluating a ruleset for one action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub reason: String,
}

/// Deny and allow sets derived from policy documents
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyRuleset {
    pub deny: BTreeSet<String>,
    pub allow: BTreeSet<String>,
    pub denied_agents: BTreeSet<String>,
}

impl PolicyRuleset {
    pub fn from_documents<'a>(documents: impl IntoIterator<Item = &'a PolicyDocument>) -> Self {
        let mut ruleset = Self::default();
        for doc in documents {
            let config = &doc.spec.config;
            match doc.policy_kind() {
                PolicyKind::AccessControl => {
                    let access = &config.access_control;
                    ruleset.deny.extend(access.denied_tools.iter().cloned());
                    if !access.allowed_tools.is_empty() {
                        ruleset.allow.extend(access.allowed_tools.iter().cloned());
                    }
                    ruleset
                        .denied_agents
                        .extend(access.denied_agents.iter().cloned());
                }
                PolicyKind::ContentFilter => {
                    ruleset
                        .deny
                        .extend(config.content_filter.blocked_tools.iter().cloned());
                }
                PolicyKind::Other => {
                    debug!(
                        "Policy {} has unsupported type '{}', ignoring",
                        doc.name(),
                        doc.spec.policy_type
                    );
                }
            }
        }
        ruleset
    }

    /// Explicit deny wins; a non-empty allow list denies everything else
    pub fn decide(&self, action: &str) -> Decision {
        if self.deny.contains(action) {
            return Decision {
                allowed: false,
                reason: format!("Tool '{}' is in deny list", action),
            };
        }
        if !self.allow.is_empty() && !self.allow.contains(action) {
            return Decision {
                allowed: false,
                reason: format!("Tool '{}' is not in allow list", action),
            };
        }
        Decision {
            allowed: true,
            reason: "No policy restrictions".to_string(),
        }
    }
}

/// Policy engine backed by a [`PolicyRuleset`]
#[derive(Debug, Clone, Default)]
pub struct RulesetPolicyEngine {
    ruleset: PolicyRuleset,
}

impl RulesetPolicyEngine {
    pub fn new(ruleset: PolicyRuleset) -> Self {
        Self { ruleset }
    }
}

impl PolicyEngine for RulesetPolicyEngine {
    fn validate_run(&self, workflow: &WorkflowSpec, _input: &Value) -> bool {
        !self.ruleset.denied_agents.contains(workflow.name())
    }

    fn check_action(
        &self,
        recorder: &mut EventRecorder<'_>,
        seq: Sequence,
        request: &ActionRequest<'_>,
    ) -> aos_core::Result<(bool, Sequence)> {
        let decision = self.ruleset.decide(request.action);
        let (event_type, label) = if decision.allowed {
            (EventType::PolicyAllow, "allow")
        } else {
            (EventType::PolicyDeny, "deny")
        };

        let mut data = json!({
            "decision": label,
            "resource_type": "tool",
            "resource_name": request.action,
            "reason": decision.reason,
            "parameters": request.parameters,
        });
        if let Some(step_id) = request.step_id {
            data["step_id"] = json!(step_id);
        }

        if decision.allowed {
            debug!("Policy allowed {} in run {}", request.action, recorder.run_id());
        } else {
            info!(
                "Policy denied {} in run {}: {}",
                request.action,
                recorder.run_id(),
                decision.reason
            );
        }

        let next = recorder.record(seq, EventDraft::new(event_type, data))?;
        Ok((decision.allowed, next))
    }
}

/// Allows everything and records nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpPolicyEngine;

impl PolicyEngine for NoOpPolicyEngine {
    fn validate_run(&self, _workflow: &WorkflowSpec, _input: &Value) -> bool {
        true
    }

    fn check_action(
        &self,
        _recorder: &mut EventRecorder<'_>,
        seq: Sequence,
        _request: &ActionRequest<'_>,
    ) -> aos_core::Result<(bool, Sequence)> {
        Ok((true, seq))
    }
}

/// Source of policy documents by name
pub trait PolicyProvider: Send + Sync {
    fn resolve(&self, name: &str) -> Option<PolicyDocument>;
}

/// In-memory policy documents keyed by name
#[derive(Debug, Clone, Default)]
pub struct PolicyCatalog {
    policies: HashMap<String, PolicyDocument>,
}

impl PolicyCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, doc: PolicyDocument) {
        self.policies.insert(doc.name().to_string(), doc);
    }

    pub fn with(mut self, doc: PolicyDocument) -> Self {
        self.insert(doc);
        self
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl PolicyProvider for PolicyCatalog {
    fn resolve(&self, name: &str) -> Option<PolicyDocument> {
        self.policies.get(name).cloned()
    }
}

/// Build the ruleset for a workflow's referenced policies
///
/// Returns `None` when none of the references resolve.
pub fn ruleset_for(workflow: &WorkflowSpec, provider: &dyn PolicyProvider) -> Option<PolicyRuleset> {
    let mut documents = Vec::new();
    for name in workflow.policy_names() {
        match provider.resolve(name) {
            Some(doc) => documents.push(doc),
            None => warn!(
                "Policy {} referenced by agent {} not found",
                name,
                workflow.name()
            ),
        }
    }
    if documents.is_empty() {
        return None;
    }
    Some(PolicyRuleset::from_documents(&documents))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aos_core::run::MemoryEventSink;
    use aos_core::spec::{DocumentFormat, WorkflowSpec};

    fn policy(text: &str) -> PolicyDocument {
        PolicyDocument::parse(text, DocumentFormat::Yaml).unwrap()
    }

    fn access_control() -> PolicyDocument {
        policy(
            r#"
apiVersion: agent-os.dev/v1alpha1
kind: Policy
metadata: { name: default-policy }
spec:
  type: access-control
  config:
    accessControl:
      deniedTools: [web-search]
      allowedTools: [calculator, web-search]
      deniedAgents: [rogue-agent]
"#,
        )
    }

    fn content_filter() -> PolicyDocument {
        policy(
            r#"
apiVersion: agent-os.dev/v1alpha1
kind: Policy
metadata: { name: filter }
spec:
  type: content-filter
  config:
    contentFilter:
      blockedTools: [shell]
"#,
        )
    }

    fn agent(name: &str, policies: &[&str]) -> WorkflowSpec {
        let refs: Vec<Value> = policies.iter().map(|p| json!({"name": p})).collect();
        serde_json::from_value(json!({
            "apiVersion": "agent-os.dev/v1alpha1",
            "kind": "Agent",
            "metadata": {"name": name},
            "spec": {"policies": refs}
        }))
        .unwrap()
    }

    #[test]
    fn test_deny_list_wins_over_allow_list() {
        let ruleset = PolicyRuleset::from_documents(&[access_control(), content_filter()]);

        let denied = ruleset.decide("web-search");
        assert!(!denied.allowed);
        assert_eq!(denied.reason, "Tool 'web-search' is in deny list");

        let outside = ruleset.decide("file-writer");
        assert!(!outside.allowed);
        assert_eq!(outside.reason, "Tool 'file-writer' is not in allow list");

        assert!(!ruleset.decide("shell").allowed);
        assert!(ruleset.decide("calculator").allowed);
    }

    #[test]
    fn test_empty_allow_list_allows_by_default() {
        let ruleset = PolicyRuleset::from_documents(&[content_filter()]);
        let decision = ruleset.decide("calculator");
        assert!(decision.allowed);
        assert_eq!(decision.reason, "No policy restrictions");
    }

    #[test]
    fn test_check_action_records_one_decision() {
        let engine = RulesetPolicyEngine::new(PolicyRuleset::from_documents(&[access_control()]));
        let mut sink = MemoryEventSink::new();
        let observer = sink.clone();
        let mut recorder = EventRecorder::new(&mut sink, "run-p", "agent");
        let params = json!({"query": "rust"});

        let (allowed, seq) = engine
            .check_action(
                &mut recorder,
                Sequence::new(2),
                &ActionRequest {
                    step_id: Some("search"),
                    action: "web-search",
                    parameters: &params,
                },
            )
            .unwrap();

        assert!(!allowed);
        assert_eq!(seq, Sequence::new(3));

        let events = observer.events();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.event_type, EventType::PolicyDeny);
        assert_eq!(event.sequence_number, Sequence::new(2));
        assert_eq!(event.data_str("decision"), Some("deny"));
        assert_eq!(event.data_str("resource_type"), Some("tool"));
        assert_eq!(event.data_str("resource_name"), Some("web-search"));
        assert_eq!(event.data_str("step_id"), Some("search"));
        assert_eq!(event.data["parameters"], params);
    }

    #[test]
    fn test_noop_engine_is_silent() {
        let mut sink = MemoryEventSink::new();
        let observer = sink.clone();
        let mut recorder = EventRecorder::new(&mut sink, "run-n", "agent");

        let (allowed, seq) = NoOpPolicyEngine
            .check_action(
                &mut recorder,
                Sequence::new(5),
                &ActionRequest {
                    step_id: None,
                    action: "anything",
                    parameters: &Value::Null,
                },
            )
            .unwrap();

        assert!(allowed);
        assert_eq!(seq, Sequence::new(5));
        assert!(observer.events().is_empty());
    }

    #[test]
    fn test_run_gate_and_provider_resolution() {
        let catalog = PolicyCatalog::new().with(access_control());

        let rogue = agent("rogue-agent", &["default-policy"]);
        let ruleset = ruleset_for(&rogue, &catalog).unwrap();
        let engine = RulesetPolicyEngine::new(ruleset);
        assert!(!engine.validate_run(&rogue, &json!({})));
        assert!(engine.validate_run(&agent("sample-agent", &[]), &json!({})));

        assert!(ruleset_for(&agent("sample-agent", &["missing"]), &catalog).is_none());
        assert!(ruleset_for(&agent("sample-agent", &[]), &catalog).is_none());
    }
}
