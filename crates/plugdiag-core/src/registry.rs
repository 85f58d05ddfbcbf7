//! Explicit registry mapping plugin id to logger instance.
//!
//! Owned by the composition root; collaborators receive the instance they
//! need instead of reaching for hidden static state.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::logger::Logger;

#[derive(Default)]
pub struct LoggerRegistry {
    loggers: RwLock<HashMap<String, Arc<Logger>>>,
}

impl LoggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a logger under its plugin id, returning the handle. A
    /// re-registration replaces the old instance.
    pub fn register(&self, logger: Logger) -> Arc<Logger> {
        let logger = Arc::new(logger);
        self.loggers
            .write()
            .insert(logger.plugin_id().to_string(), logger.clone());
        logger
    }

    pub fn get(&self, plugin_id: &str) -> Option<Arc<Logger>> {
        self.loggers.read().get(plugin_id).cloned()
    }

    pub fn remove(&self, plugin_id: &str) -> Option<Arc<Logger>> {
        self.loggers.write().remove(plugin_id)
    }

    pub fn plugin_ids(&self) -> Vec<String> {
        self.loggers.read().keys().cloned().collect()
    }
}
