use modhost_core::{ModuleDescriptor, Result};
use serde::{Deserialize, Serialize};

/// The document an app hands the kernel describing what it needs loaded
/// (spec.md §3, §4.6). Providers and utilities marked `global` on their own
/// descriptor are loaded once in phase one and shared across every app;
/// everything else, plus each service's own nested providers/utilities, is
/// loaded in phase two and scoped to this app's dependency set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleDefinition {
    #[serde(default)]
    pub providers: Vec<ModuleDescriptor>,
    #[serde(default)]
    pub utilities: Vec<ModuleDescriptor>,
    #[serde(default)]
    pub services: Vec<ModuleDescriptor>,
    /// If true, any single module failing to load aborts the whole
    /// definition; if false, the orchestrator logs and continues with the
    /// rest (spec.md §4.6).
    #[serde(default)]
    pub fail_on_error: bool,
}

impl ModuleDefinition {
    pub fn from_json_str(json: &str) -> Result<ModuleDefinition> {
        Ok(serde_json::from_str(json)?)
    }

    pub async fn from_file(path: impl AsRef<std::path::Path>) -> Result<ModuleDefinition> {
        let contents = tokio::fs::read_to_string(path).await?;
        Self::from_json_str(&contents)
    }
}
