//! Policy documents

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{expect_kind, load_document, parse_document, DocumentFormat, Metadata};
use crate::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDocument {
    pub api_version: String,
    pub kind: String,
    pub metadata: Metadata,
    #[serde(default)]
    pub spec: PolicyBody,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyBody {
    #[serde(rename = "type", default)]
    pub policy_type: String,
    #[serde(default)]
    pub config: PolicyConfig,
}

/// Recognized policy types; anything else contributes no rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    AccessControl,
    ContentFilter,
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyConfig {
    #[serde(default)]
    pub access_control: AccessControl,
    #[serde(default)]
    pub content_filter: ContentFilter,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessControl {
    #[serde(default)]
    pub denied_tools: Vec<String>,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub denied_agents: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentFilter {
    #[serde(default)]
    pub blocked_tools: Vec<String>,
}

impl PolicyDocument {
    pub fn parse(text: &str, format: DocumentFormat) -> Result<Self> {
        let doc: Self = parse_document(text, format)?;
        expect_kind(&doc.kind, "Policy")?;
        Ok(doc)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let doc: Self = load_document(path)?;
        expect_kind(&doc.kind, "Policy")?;
        Ok(doc)
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn policy_kind(&self) -> PolicyKind {
        match self.spec.policy_type.as_str() {
            "access-control" => PolicyKind::AccessControl,
            "content-filter" => PolicyKind::ContentFilter,
            _ => PolicyKind::Other,
        }
    }
}
