//! Definition documents
//!
//! Agents, tools and policies are Kubernetes-style documents
//! (`apiVersion`, `kind`, `metadata`, `spec`) read from JSON or YAML.
//! Only deserialization happens here; schema validation belongs to the
//! definition registry.

mod expr;
mod policy;
mod tool;
mod workflow;

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub use expr::{render, resolve, resolve_value, Scope};
pub use policy::{
    AccessControl, ContentFilter, PolicyBody, PolicyConfig, PolicyDocument, PolicyKind,
};
pub use tool::{ActionSpec, ToolBody, ToolConfig, ToolDocument, ToolKind};
pub use workflow::{
    AgentBody, Behavior, CheckpointStep, NamedRef, OnDeny, RespondStep, StepKind, StepSpec, ToolStep,
    Workflow, WorkflowSpec, DEFAULT_RESPONSE_TEMPLATE,
};

use crate::{Error, Result};

/// Shared `metadata` block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Text encoding of a definition document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
}

impl DocumentFormat {
    /// Pick the format from a file extension; anything but `.json` is YAML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

/// Parse a document from text
pub fn parse_document<T: DeserializeOwned>(text: &str, format: DocumentFormat) -> Result<T> {
    match format {
        DocumentFormat::Json => {
            serde_json::from_str(text).map_err(|e| Error::Definition(e.to_string()))
        }
        DocumentFormat::Yaml => Ok(serde_yaml::from_str(text)?),
    }
}

/// Read and parse a document file
pub fn load_document<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .map_err(|e| Error::Definition(format!("{}: {}", path.display(), e)))?;
    parse_document(&text, DocumentFormat::from_path(path)).map_err(|e| match e {
        Error::Definition(msg) => Error::Definition(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}

fn expect_kind(found: &str, expected: &str) -> Result<()> {
    if found != expected {
        return Err(Error::Definition(format!(
            "expected kind {}, got {}",
            expected, found
        )));
    }
    Ok(())
}
