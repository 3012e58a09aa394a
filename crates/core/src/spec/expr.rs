//! `${path}` parameter expressions
//!
//! Roots: `input`, `steps.<stepId>`, `run.id`, `run.agent`. Numeric path
//! segments index arrays.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::{Error, Result};

/// Values visible to expressions while a step runs
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub input: &'a Value,
    pub steps: &'a HashMap<String, Value>,
    pub run_id: &'a str,
    pub agent_name: &'a str,
}

/// Resolve a bare path such as `steps.read.requirements`
pub fn resolve(path: &str, scope: &Scope<'_>) -> Result<Value> {
    let path = path.trim();
    let mut segments = path.split('.');
    let unresolved = || Error::Expression(format!("cannot resolve '${{{}}}'", path));

    let (root, rest): (Value, Vec<&str>) = match segments.next() {
        Some("input") => (scope.input.clone(), segments.collect()),
        Some("steps") => {
            let step_id = segments.next().ok_or_else(unresolved)?;
            let output = scope.steps.get(step_id).ok_or_else(unresolved)?;
            (output.clone(), segments.collect())
        }
        Some("run") => {
            let value = match segments.next() {
                Some("id") => scope.run_id,
                Some("agent") => scope.agent_name,
                _ => return Err(unresolved()),
            };
            (Value::String(value.to_string()), segments.collect())
        }
        _ => return Err(unresolved()),
    };

    let mut current = &root;
    for segment in rest {
        current = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
        .ok_or_else(unresolved)?;
    }
    Ok(current.clone())
}

/// Substitute every `${...}` placeholder in `template` with its textual form
pub fn render(template: &str, scope: &Scope<'_>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| {
            Error::Expression(format!("unterminated placeholder in '{}'", template))
        })?;
        match resolve(&after[..end], scope)? {
            Value::String(s) => out.push_str(&s),
            Value::Null => {}
            other => out.push_str(&other.to_string()),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Resolve expressions anywhere inside a JSON value
///
/// A string that is exactly one placeholder becomes the referenced value
/// itself; other strings with placeholders are rendered as text.
pub fn resolve_value(value: &Value, scope: &Scope<'_>) -> Result<Value> {
    match value {
        Value::String(s) => match exact_placeholder(s) {
            Some(path) => resolve(path, scope),
            None if s.contains("${") => Ok(Value::String(render(s, scope)?)),
            None => Ok(value.clone()),
        },
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_value(item, scope))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| Ok((k.clone(), resolve_value(v, scope)?)))
            .collect::<Result<Map<_, _>>>()
            .map(Value::Object),
        _ => Ok(value.clone()),
    }
}

fn exact_placeholder(s: &str) -> Option<&str> {
    let inner = s.trim().strip_prefix("${")?.strip_suffix('}')?;
    if inner.contains("${") || inner.contains('}') {
        return None;
    }
    Some(inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn with_scope<R>(f: impl FnOnce(&Scope<'_>) -> R) -> R {
        let input = json!({"query": "Hello", "limits": [3, 5]});
        let mut steps = HashMap::new();
        steps.insert("read".to_string(), json!({"requirements": ["a", "b"], "count": 2}));
        let scope = Scope {
            input: &input,
            steps: &steps,
            run_id: "run-0011223344556677",
            agent_name: "sample-agent",
        };
        f(&scope)
    }

    #[test]
    fn test_resolves_paths() {
        with_scope(|scope| {
            assert_eq!(resolve("input.query", scope).unwrap(), json!("Hello"));
            assert_eq!(resolve("input.limits.1", scope).unwrap(), json!(5));
            assert_eq!(resolve("steps.read.requirements", scope).unwrap(), json!(["a", "b"]));
            assert_eq!(resolve("run.id", scope).unwrap(), json!("run-0011223344556677"));
            assert_eq!(resolve("run.agent", scope).unwrap(), json!("sample-agent"));
        });
    }

    #[test]
    fn test_unresolvable_paths_fail() {
        with_scope(|scope| {
            assert!(resolve("input.missing", scope).is_err());
            assert!(resolve("steps.unknown.x", scope).is_err());
            assert!(resolve("env.HOME", scope).is_err());
            assert!(render("${input.query", scope).is_err());
        });
    }

    #[test]
    fn test_exact_placeholder_keeps_type() {
        with_scope(|scope| {
            let params = json!({
                "items": "${steps.read.requirements}",
                "label": "found ${steps.read.count} for ${input.query}",
                "fixed": 7,
                "nested": ["${input.limits.0}"]
            });
            let resolved = resolve_value(&params, scope).unwrap();
            assert_eq!(resolved["items"], json!(["a", "b"]));
            assert_eq!(resolved["label"], json!("found 2 for Hello"));
            assert_eq!(resolved["fixed"], json!(7));
            assert_eq!(resolved["nested"], json!([3]));
        });
    }

    #[test]
    fn test_render_default_template() {
        with_scope(|scope| {
            assert_eq!(render("Echo: ${input.query}", scope).unwrap(), "Echo: Hello");
        });
    }
}
