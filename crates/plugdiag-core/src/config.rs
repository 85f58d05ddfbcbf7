//! Per-plugin configuration handed to the composition root.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{DiagError, DiagResult};
use crate::level::Threshold;

/// Everything the logging facility needs to know about one plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Stable identifier, also the log filename prefix (e.g. "acme-forms")
    pub plugin_id: String,

    /// Human-readable name for viewers ("Acme Forms")
    pub display_name: String,

    /// Root of the plugin's installation directory
    pub install_path: PathBuf,

    /// Minimum severity, or `None` to disable logging
    pub threshold: Threshold,

    /// Optional CLI command namespace; registration itself is external
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cli_namespace: Option<String>,
}

impl PluginConfig {
    pub fn new(
        plugin_id: impl Into<String>,
        display_name: impl Into<String>,
        install_path: impl Into<PathBuf>,
        threshold: Threshold,
    ) -> DiagResult<Self> {
        let plugin_id = plugin_id.into();
        if plugin_id.is_empty() {
            return Err(DiagError::InvalidConfig("plugin_id must not be empty".into()));
        }
        // The id lands in filenames; keep path separators out of it.
        if plugin_id.contains(['/', '\\']) {
            return Err(DiagError::InvalidConfig(format!(
                "plugin_id must not contain path separators: {}",
                plugin_id
            )));
        }
        Ok(Self {
            plugin_id,
            display_name: display_name.into(),
            install_path: install_path.into(),
            threshold,
            cli_namespace: None,
        })
    }

    pub fn with_cli_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.cli_namespace = Some(namespace.into());
        self
    }
}
