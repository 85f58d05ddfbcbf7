//! Deciding whether a diagnostic event belongs to the owning plugin.
//!
//! Evaluation is a short-circuit chain: faulting file under the owner's
//! directory, owner identifier in the message text, then any filtered
//! backtrace frame under the owner's directory. Anything else is not this
//! plugin's problem.

use std::path::{Path, PathBuf};

use crate::backtrace::StackFrame;
use crate::config::PluginConfig;

/// Resolves event ownership for one plugin.
pub struct AttributionResolver {
    owner_id: String,
    owner_dir: PathBuf,
    /// Subtrees under `owner_dir` that belong to other plugins (e.g. a
    /// vendor-bundled plugin). The most specific prefix wins, so faults in
    /// these are never attributed to the host plugin.
    nested_foreign: Vec<PathBuf>,
}

impl AttributionResolver {
    pub fn new(config: &PluginConfig) -> Self {
        Self {
            owner_id: config.plugin_id.clone(),
            owner_dir: canonical(&config.install_path),
            nested_foreign: Vec::new(),
        }
    }

    /// Register a nested directory owned by a different plugin.
    pub fn with_nested_foreign(mut self, dir: impl Into<PathBuf>) -> Self {
        self.nested_foreign.push(canonical(&dir.into()));
        self
    }

    /// The short-circuit relevance chain.
    pub fn is_relevant(
        &self,
        file: Option<&Path>,
        message: &str,
        frames: &[StackFrame],
    ) -> bool {
        if let Some(file) = file {
            if self.owns_path(file) {
                return true;
            }
        }
        // Third-party code erroring on the plugin's behalf often names it.
        if message.contains(&self.owner_id) {
            return true;
        }
        frames
            .iter()
            .filter_map(|frame| frame.file.as_deref())
            .any(|file| self.owns_path(file))
    }

    /// True when `path` lies under the owner's directory and not under a
    /// more specific foreign subtree.
    fn owns_path(&self, path: &Path) -> bool {
        let path = canonical(path);
        if !path.starts_with(&self.owner_dir) {
            return false;
        }
        !self.nested_foreign.iter().any(|dir| path.starts_with(dir))
    }
}

/// Resolve symlinks when the path exists, fall back to the raw path.
fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
