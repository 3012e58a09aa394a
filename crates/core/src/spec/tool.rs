//! Tool documents

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{expect_kind, load_document, parse_document, DocumentFormat, Metadata};
use crate::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDocument {
    pub api_version: String,
    pub kind: String,
    pub metadata: Metadata,
    #[serde(default)]
    pub spec: ToolBody,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolBody {
    #[serde(rename = "type", default)]
    pub kind: ToolKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub config: ToolConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    #[default]
    Function,
    Api,
    Mcp,
}

/// Execution limits declared by a tool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
}

impl ToolDocument {
    pub fn parse(text: &str, format: DocumentFormat) -> Result<Self> {
        let doc: Self = parse_document(text, format)?;
        expect_kind(&doc.kind, "Tool")?;
        Ok(doc)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let doc: Self = load_document(path)?;
        expect_kind(&doc.kind, "Tool")?;
        Ok(doc)
    }
}

/// What the executor needs to know about an action
///
/// Unset limits fall back to the executor's defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSpec {
    pub name: String,
    pub kind: ToolKind,
    pub description: Option<String>,
    pub timeout_ms: Option<u64>,
    pub max_retries: Option<u32>,
}

impl ActionSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ToolKind::Function,
            description: None,
            timeout_ms: None,
            max_retries: None,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }
}

impl From<ToolDocument> for ActionSpec {
    fn from(doc: ToolDocument) -> Self {
        Self {
            name: doc.metadata.name,
            kind: doc.spec.kind,
            description: doc.spec.description,
            timeout_ms: doc.spec.config.timeout_ms,
            max_retries: doc.spec.config.retries,
        }
    }
}
