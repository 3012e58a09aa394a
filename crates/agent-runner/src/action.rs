//! Action bodies and the registry that maps action names to them

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use aos_core::spec::ActionSpec;
use async_trait::async_trait;
use serde_json::Value;

/// What an action body knows about the invocation
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub run_id: String,
    pub step_id: String,
    pub attempt: u32,
    /// Where the body may write files it produces, if the journal has one
    pub artifacts_dir: Option<PathBuf>,
}

/// Pluggable unit of work invoked by the tool executor
#[async_trait]
pub trait ActionBody: Send + Sync {
    async fn invoke(&self, ctx: ActionContext, parameters: Value) -> anyhow::Result<Value>;
}

#[async_trait]
impl<F, Fut> ActionBody for F
where
    F: Fn(ActionContext, Value) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    async fn invoke(&self, ctx: ActionContext, parameters: Value) -> anyhow::Result<Value> {
        (self)(ctx, parameters).await
    }
}

/// A registered action: its limits and its body
#[derive(Clone)]
pub struct RegisteredAction {
    pub spec: ActionSpec,
    pub body: Arc<dyn ActionBody>,
}

impl fmt::Debug for RegisteredAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredAction")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

/// Capability table from action name to body
#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    actions: BTreeMap<String, RegisteredAction>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `body` under `spec.name`, replacing any previous entry
    pub fn register(&mut self, spec: ActionSpec, body: Arc<dyn ActionBody>) {
        self.actions
            .insert(spec.name.clone(), RegisteredAction { spec, body });
    }

    /// Register a closure with default limits
    pub fn register_fn<F, Fut>(&mut self, name: impl Into<String>, body: F)
    where
        F: Fn(ActionContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.register(ActionSpec::new(name), Arc::new(body));
    }

    pub fn with(mut self, spec: ActionSpec, body: Arc<dyn ActionBody>) -> Self {
        self.register(spec, body);
        self
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredAction> {
        self.actions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> ActionContext {
        ActionContext {
            run_id: "run-1".to_string(),
            step_id: "calc".to_string(),
            attempt: 0,
            artifacts_dir: None,
        }
    }

    struct Doubler;

    #[async_trait]
    impl ActionBody for Doubler {
        async fn invoke(&self, _ctx: ActionContext, parameters: Value) -> anyhow::Result<Value> {
            let n = parameters["n"]
                .as_i64()
                .ok_or_else(|| anyhow::anyhow!("n must be an integer"))?;
            Ok(json!(n * 2))
        }
    }

    #[tokio::test]
    async fn test_registry_invokes_bodies() {
        let mut registry = ActionRegistry::new();
        registry.register(ActionSpec::new("double").with_retries(2), Arc::new(Doubler));
        registry.register_fn("echo", |ctx: ActionContext, params: Value| async move {
            Ok::<_, anyhow::Error>(json!({"step": ctx.step_id, "params": params}))
        });

        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["double", "echo"]);
        assert_eq!(registry.get("double").unwrap().spec.max_retries, Some(2));
        assert!(!registry.contains("missing"));

        let doubled = registry
            .get("double")
            .unwrap()
            .body
            .invoke(ctx(), json!({"n": 21}))
            .await
            .unwrap();
        assert_eq!(doubled, json!(42));

        let echoed = registry
            .get("echo")
            .unwrap()
            .body
            .invoke(ctx(), json!({"q": 1}))
            .await
            .unwrap();
        assert_eq!(echoed["step"], "calc");

        let failed = registry
            .get("double")
            .unwrap()
            .body
            .invoke(ctx(), json!({}))
            .await;
        tokio_test::assert_err!(failed);
    }
}
