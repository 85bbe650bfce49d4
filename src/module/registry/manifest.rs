//! Block metadata and registry entry types
//!
//! Wire shapes of the block server API. Field names are camelCase on the
//! wire.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Build state of a block bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Pending,
    Building,
    Success,
    Failed,
    /// Any status string this client does not know
    #[serde(other)]
    Unknown,
}

impl BuildStatus {
    /// Only successful builds may be loaded
    pub fn is_ready(&self) -> bool {
        matches!(self, BuildStatus::Success)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Pending => "pending",
            BuildStatus::Building => "building",
            BuildStatus::Success => "success",
            BuildStatus::Failed => "failed",
            BuildStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-provided description of a loadable block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockMetadata {
    /// Opaque stable identifier
    pub block_id: String,
    /// Absolute or server-relative URL of the executable bundle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub federation_url: Option<String>,
    /// Gates whether loading may proceed
    pub build_status: BuildStatus,
    /// JSON-Schema-like description of accepted props, passed through for
    /// the rendering layer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props_schema: Option<serde_json::Value>,
}

impl BlockMetadata {
    /// The bundle URL, if present and non-empty
    pub fn federation_url(&self) -> Option<&str> {
        self.federation_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

/// Registry entry describing a named component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    pub block_id: String,
    pub component_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub last_updated: String,
}

impl RegistryEntry {
    /// Minimal entry, mostly for local registration
    pub fn new(block_id: impl Into<String>, component_name: impl Into<String>) -> Self {
        let component_name = component_name.into();
        Self {
            block_id: block_id.into(),
            title: component_name.clone(),
            component_name,
            author: None,
            description: String::new(),
            version: None,
            tags: None,
            last_updated: String::new(),
        }
    }
}

/// Body of `GET /api/blocks/registry`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryDocument {
    /// Global mapping keyed by component name
    #[serde(default)]
    pub registry: HashMap<String, RegistryEntry>,
    /// Author-scoped mapping: author -> component name -> entry
    #[serde(default)]
    pub author_registry: HashMap<String, HashMap<String, RegistryEntry>>,
}
