//! Agent / workflow documents

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{expect_kind, load_document, parse_document, DocumentFormat, Metadata};
use crate::{Error, Result};

/// Template used by a `respond` step that does not set one
pub const DEFAULT_RESPONSE_TEMPLATE: &str = "Echo: ${input.query}";

/// An agent definition: behavior, references and ordered steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSpec {
    pub api_version: String,
    #[serde(default = "default_agent_kind")]
    pub kind: String,
    pub metadata: Metadata,
    #[serde(default)]
    pub spec: AgentBody,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentBody {
    #[serde(default)]
    pub behavior: Behavior,
    #[serde(default)]
    pub policies: Vec<NamedRef>,
    #[serde(default)]
    pub tools: Vec<NamedRef>,
    #[serde(default)]
    pub workflow: Workflow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Behavior {
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            system_prompt: String::new(),
            model: default_model(),
            temperature: default_temperature(),
        }
    }
}

/// Reference to another document by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRef {
    pub name: String,
}

/// Ordered steps of an agent
///
/// An agent without a `workflow` block answers with a single model turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default)]
    pub steps: Vec<StepSpec>,
}

impl Default for Workflow {
    fn default() -> Self {
        Self {
            steps: vec![StepSpec {
                id: "respond".to_string(),
                kind: StepKind::Respond(RespondStep::default()),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    pub id: String,
    #[serde(flatten)]
    pub kind: StepKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepKind {
    Tool(ToolStep),
    Respond(RespondStep),
    Checkpoint(CheckpointStep),
}

/// Invoke a registered action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolStep {
    pub action: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default = "default_true")]
    pub gated: bool,
    #[serde(default)]
    pub on_deny: OnDeny,
    /// Expression that must resolve to `true` against the step output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnDeny {
    #[default]
    Halt,
    Continue,
}

/// Simulated model turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RespondStep {
    #[serde(default = "default_template")]
    pub template: String,
}

impl Default for RespondStep {
    fn default() -> Self {
        Self {
            template: default_template(),
        }
    }
}

/// Human review gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointStep {
    #[serde(default = "default_stage")]
    pub stage: String,
    /// Expression selecting the items put up for review
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn default_agent_kind() -> String {
    "Agent".to_string()
}

fn default_model() -> String {
    "gpt-4".to_string()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_true() -> bool {
    true
}

fn default_template() -> String {
    DEFAULT_RESPONSE_TEMPLATE.to_string()
}

fn default_stage() -> String {
    "review".to_string()
}

impl WorkflowSpec {
    /// Parse an agent document and check its step ids
    pub fn parse(text: &str, format: DocumentFormat) -> Result<Self> {
        let spec: Self = parse_document(text, format)?;
        spec.check()?;
        Ok(spec)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let spec: Self = load_document(path)?;
        spec.check()?;
        Ok(spec)
    }

    fn check(&self) -> Result<()> {
        expect_kind(&self.kind, "Agent")?;
        let mut seen = HashSet::new();
        for step in &self.spec.workflow.steps {
            if !seen.insert(step.id.as_str()) {
                return Err(Error::Definition(format!(
                    "duplicate step id '{}' in agent {}",
                    step.id, self.metadata.name
                )));
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn steps(&self) -> &[StepSpec] {
        &self.spec.workflow.steps
    }

    /// Position of the step with `id`
    pub fn step_index(&self, id: &str) -> Option<usize> {
        self.steps().iter().position(|s| s.id == id)
    }

    pub fn policy_names(&self) -> impl Iterator<Item = &str> {
        self.spec.policies.iter().map(|p| p.name.as_str())
    }

    pub fn tool_names(&self) -> impl Iterator<Item = &str> {
        self.spec.tools.iter().map(|t| t.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PIPELINE: &str = r#"
apiVersion: agent-os.dev/v1alpha1
kind: Agent
metadata:
  name: testcase-generator
spec:
  behavior:
    systemPrompt: You write test cases.
  policies:
    - name: default-policy
  tools:
    - name: requirements-reader
  workflow:
    steps:
      - id: read
        tool:
          action: requirements-reader
          parameters:
            path: ${input.requirementsPath}
      - id: review
        checkpoint:
          items: ${steps.read.requirements}
          message: Please review
      - id: write
        tool:
          action: testcase-writer
          gated: false
          onDeny: continue
          require: ${steps.write.ok}
      - id: summary
        respond: {}
"#;

    #[test]
    fn test_parses_yaml_agent() {
        let spec = WorkflowSpec::parse(PIPELINE, DocumentFormat::Yaml).unwrap();

        assert_eq!(spec.name(), "testcase-generator");
        assert_eq!(spec.spec.behavior.model, "gpt-4");
        assert_eq!(spec.spec.behavior.temperature, 0.7);
        assert_eq!(spec.policy_names().collect::<Vec<_>>(), vec!["default-policy"]);
        assert_eq!(spec.steps().len(), 4);
        assert_eq!(spec.step_index("write"), Some(2));

        let StepKind::Tool(read) = &spec.steps()[0].kind else {
            panic!("expected tool step");
        };
        assert!(read.gated);
        assert_eq!(read.on_deny, OnDeny::Halt);
        assert_eq!(read.parameters["path"], json!("${input.requirementsPath}"));

        let StepKind::Tool(write) = &spec.steps()[2].kind else {
            panic!("expected tool step");
        };
        assert!(!write.gated);
        assert_eq!(write.on_deny, OnDeny::Continue);

        let StepKind::Checkpoint(review) = &spec.steps()[1].kind else {
            panic!("expected checkpoint step");
        };
        assert_eq!(review.stage, "review");

        let StepKind::Respond(summary) = &spec.steps()[3].kind else {
            panic!("expected respond step");
        };
        assert_eq!(summary.template, DEFAULT_RESPONSE_TEMPLATE);
    }

    #[test]
    fn test_missing_workflow_defaults_to_single_response() {
        let spec = WorkflowSpec::parse(
            r#"{"apiVersion":"agent-os.dev/v1alpha1","kind":"Agent","metadata":{"name":"echo"}}"#,
            DocumentFormat::Json,
        )
        .unwrap();
        assert_eq!(spec.steps().len(), 1);
        assert!(matches!(spec.steps()[0].kind, StepKind::Respond(_)));
    }

    #[test]
    fn test_rejects_duplicate_step_ids() {
        let text = r#"
apiVersion: agent-os.dev/v1alpha1
kind: Agent
metadata: { name: dup }
spec:
  workflow:
    steps:
      - { id: a, respond: {} }
      - { id: a, respond: {} }
"#;
        let err = WorkflowSpec::parse(text, DocumentFormat::Yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate step id"));
    }

    #[test]
    fn test_rejects_wrong_kind() {
        let text = "apiVersion: v1\nkind: Tool\nmetadata: { name: x }\n";
        assert!(WorkflowSpec::parse(text, DocumentFormat::Yaml).is_err());
    }
}
