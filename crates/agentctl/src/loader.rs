//! Loads an agent definition and the tool and policy documents beside it

use std::path::{Path, PathBuf};
use std::sync::Arc;

use agent_runner::{
    ActionBody, ActionContext, ActionRegistry, LocalRuntime, PolicyCatalog, RunnerConfig,
    RuntimeRegistry, LOCAL_RUNTIME,
};
use anyhow::{bail, Context};
use aos_core::spec::{ActionSpec, PolicyDocument, ToolDocument, WorkflowSpec};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

const AGENT_FILES: [&str; 3] = ["agent.yaml", "agent.yml", "agent.json"];
const TOOL_SUFFIXES: [&str; 3] = [".tool.yaml", ".tool.yml", ".tool.json"];
const POLICY_SUFFIXES: [&str; 3] = [".policy.yaml", ".policy.yml", ".policy.json"];

/// An agent with everything found next to its definition
#[derive(Debug)]
pub struct AgentBundle {
    pub agent_file: PathBuf,
    pub workflow: WorkflowSpec,
    pub tools: Vec<ToolDocument>,
    pub policies: Vec<PolicyDocument>,
}

impl AgentBundle {
    /// Load from an agent file, or a directory holding `agent.yaml`
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let agent_file = resolve_agent_file(path)?;
        let workflow = WorkflowSpec::load(&agent_file)?;
        let dir = match agent_file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tools = Vec::new();
        let mut policies = Vec::new();
        for file in sibling_files(dir)? {
            let Some(name) = file.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if TOOL_SUFFIXES.iter().any(|s| name.ends_with(s)) {
                tools.push(ToolDocument::load(&file)?);
            } else if POLICY_SUFFIXES.iter().any(|s| name.ends_with(s)) {
                policies.push(PolicyDocument::load(&file)?);
            }
        }
        debug!(
            "Loaded agent {} with {} tool(s) and {} policy document(s)",
            workflow.name(),
            tools.len(),
            policies.len()
        );

        Ok(Self {
            agent_file,
            workflow,
            tools,
            policies,
        })
    }

    /// Declared tools bound to the simulated echo body
    ///
    /// Limits come from the tool document when there is one; tools the
    /// agent names without a document get the engine defaults.
    pub fn actions(&self) -> ActionRegistry {
        let mut registry = ActionRegistry::new();
        for doc in &self.tools {
            registry.register(ActionSpec::from(doc.clone()), Arc::new(EchoAction));
        }
        for name in self.workflow.tool_names() {
            if !registry.contains(name) {
                warn!("Tool {} has no definition beside the agent, using defaults", name);
                registry.register(ActionSpec::new(name), Arc::new(EchoAction));
            }
        }
        registry
    }

    pub fn policy_catalog(&self) -> PolicyCatalog {
        self.policies
            .iter()
            .cloned()
            .fold(PolicyCatalog::new(), PolicyCatalog::with)
    }

    /// Runtime registry for this agent's tools and policies
    pub fn runtimes(&self, config: RunnerConfig) -> RuntimeRegistry {
        let runtime =
            LocalRuntime::with_file_journal(self.actions(), Arc::new(self.policy_catalog()), config);
        RuntimeRegistry::new().with(LOCAL_RUNTIME, Arc::new(runtime))
    }
}

fn resolve_agent_file(path: &Path) -> anyhow::Result<PathBuf> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }
    if path.is_dir() {
        return AGENT_FILES
            .iter()
            .map(|name| path.join(name))
            .find(|candidate| candidate.is_file())
            .with_context(|| format!("agent.yaml not found in {}", path.display()));
    }
    bail!("agent path not found: {}", path.display())
}

fn sibling_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory {}", dir.display()))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Stand-in tool body: reports what it was asked to do
struct EchoAction;

#[async_trait]
impl ActionBody for EchoAction {
    async fn invoke(&self, ctx: ActionContext, parameters: Value) -> anyhow::Result<Value> {
        Ok(json!({
            "step_id": ctx.step_id,
            "attempt": ctx.attempt,
            "parameters": parameters,
            "simulated": true,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const AGENT: &str = r#"
apiVersion: agent-os.dev/v1alpha1
kind: Agent
metadata:
  name: sample-agent
spec:
  policies:
    - name: default-policy
  tools:
    - name: web-search
    - name: calculator
"#;

    const TOOL: &str = r#"
apiVersion: agent-os.dev/v1alpha1
kind: Tool
metadata:
  name: web-search
spec:
  type: api
  config:
    timeoutMs: 5000
    retries: 2
"#;

    const POLICY: &str = r#"
apiVersion: agent-os.dev/v1alpha1
kind: Policy
metadata:
  name: default-policy
spec:
  type: access-control
  config:
    accessControl:
      deniedTools: [shell]
"#;

    fn agent_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("agent.yaml"), AGENT).unwrap();
        fs::write(dir.path().join("web-search.tool.yaml"), TOOL).unwrap();
        fs::write(dir.path().join("default.policy.yaml"), POLICY).unwrap();
        fs::write(dir.path().join("README.md"), "notes").unwrap();
        dir
    }

    #[test]
    fn test_load_directory_bundle() {
        let dir = agent_dir();
        let bundle = AgentBundle::load(dir.path()).unwrap();

        assert_eq!(bundle.workflow.name(), "sample-agent");
        assert!(bundle.agent_file.ends_with("agent.yaml"));
        assert_eq!(bundle.tools.len(), 1);
        assert_eq!(bundle.policies.len(), 1);

        let actions = bundle.actions();
        assert_eq!(actions.names().collect::<Vec<_>>(), vec!["calculator", "web-search"]);
        assert_eq!(actions.get("web-search").unwrap().spec.max_retries, Some(2));
        assert_eq!(actions.get("calculator").unwrap().spec.timeout_ms, None);
        assert_eq!(bundle.policy_catalog().len(), 1);
    }

    #[test]
    fn test_load_agent_file_directly() {
        let dir = agent_dir();
        let bundle = AgentBundle::load(&dir.path().join("agent.yaml")).unwrap();
        assert_eq!(bundle.tools.len(), 1);
    }

    #[test]
    fn test_missing_agent_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = AgentBundle::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("agent.yaml not found"));

        let err = AgentBundle::load(&dir.path().join("nope")).unwrap_err();
        assert!(err.to_string().contains("agent path not found"));
    }

    #[test]
    fn test_invalid_sibling_document_fails_the_load() {
        let dir = agent_dir();
        fs::write(dir.path().join("broken.tool.yaml"), "kind: Policy\n").unwrap();
        assert!(AgentBundle::load(dir.path()).is_err());
    }
}
