//! Resource catalog: tools, data items and software the model may use.
//!
//! The catalog only feeds the system prompt and tool-reference tracking;
//! nothing here is ever invoked directly. Code the model writes imports or
//! calls these resources itself.
//!
//! A catalog is shared as `Arc<ResourceCatalog>` and never mutated while a
//! session reads it. Registration goes through the `with_*` builders, which
//! return a new catalog for the caller to install before the next session.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};

/// Description of one callable tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required_parameters: Vec<ParameterSpec>,
    #[serde(default)]
    pub optional_parameters: Vec<ParameterSpec>,
    /// Registered at runtime rather than shipped with the catalog.
    #[serde(default)]
    pub custom: bool,
}

/// A tool parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

/// A data item or software library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub custom: bool,
}

impl ResourceEntry {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            custom: false,
        }
    }
}

/// Read-only mapping of everything the system prompt advertises.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceCatalog {
    /// Namespace (module path) → tools
    #[serde(default)]
    pub tools: BTreeMap<String, Vec<ToolSpec>>,

    /// Data-lake items
    #[serde(default)]
    pub data: Vec<ResourceEntry>,

    /// Software libraries available to executed code
    #[serde(default)]
    pub software: Vec<ResourceEntry>,
}

/// Namespace custom tools are registered under.
pub const CUSTOM_NAMESPACE: &str = "custom";

impl ResourceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a catalog from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read catalog {}: {e}", path.display()),
        })?;
        let catalog: Self = serde_json::from_str(&raw)?;
        tracing::debug!(
            path = %path.display(),
            tools = catalog.tool_count(),
            data = catalog.data.len(),
            software = catalog.software.len(),
            "Loaded resource catalog"
        );
        Ok(catalog)
    }

    pub fn is_empty(&self) -> bool {
        self.tool_count() == 0 && self.data.is_empty() && self.software.is_empty()
    }

    pub fn tool_count(&self) -> usize {
        self.tools.values().map(Vec::len).sum()
    }

    /// All tool names, in namespace order.
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools
            .values()
            .flatten()
            .map(|t| t.name.as_str())
            .collect()
    }

    /// Register a custom tool. A custom tool with the same name is replaced.
    pub fn with_custom_tool(mut self, mut tool: ToolSpec) -> Self {
        tool.custom = true;
        let entries = self.tools.entry(CUSTOM_NAMESPACE.to_string()).or_default();
        entries.retain(|t| t.name != tool.name);
        entries.push(tool);
        self
    }

    pub fn with_custom_data(mut self, name: &str, description: &str) -> Self {
        upsert_custom(&mut self.data, name, description);
        self
    }

    pub fn with_custom_software(mut self, name: &str, description: &str) -> Self {
        upsert_custom(&mut self.software, name, description);
        self
    }

    /// Remove a custom resource of any kind by name. Returns whether
    /// anything was removed. Default entries are never removed.
    pub fn without_custom(mut self, name: &str) -> (Self, bool) {
        let before = self.custom_names().len();
        if let Some(tools) = self.tools.get_mut(CUSTOM_NAMESPACE) {
            tools.retain(|t| !(t.custom && t.name == name));
            if tools.is_empty() {
                self.tools.remove(CUSTOM_NAMESPACE);
            }
        }
        self.data.retain(|d| !(d.custom && d.name == name));
        self.software.retain(|s| !(s.custom && s.name == name));
        let removed = self.custom_names().len() < before;
        (self, removed)
    }

    /// Names of all custom resources.
    pub fn custom_names(&self) -> Vec<&str> {
        let tools = self.tools.values().flatten().filter(|t| t.custom).map(|t| t.name.as_str());
        let data = self.data.iter().filter(|d| d.custom).map(|d| d.name.as_str());
        let software = self.software.iter().filter(|s| s.custom).map(|s| s.name.as_str());
        tools.chain(data).chain(software).collect()
    }

    pub fn custom_tools(&self) -> impl Iterator<Item = &ToolSpec> {
        self.tools.values().flatten().filter(|t| t.custom)
    }
}

fn upsert_custom(entries: &mut Vec<ResourceEntry>, name: &str, description: &str) {
    entries.retain(|e| e.name != name);
    entries.push(ResourceEntry {
        name: name.to_string(),
        description: description.to_string(),
        custom: true,
    });
}
