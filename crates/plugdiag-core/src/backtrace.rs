//! Backtrace capture, filtering, and per-fault caching.
//!
//! Frames arrive innermost-first from an injected [`FrameSource`], since
//! only the host platform can walk its own stack. Filtering prunes this
//! library's own frames and generic dispatch wrappers from the head only,
//! so the first surviving frame is real caller code.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One call-stack entry as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    /// Source file, absent for internal/eval'd frames
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    /// Line number within `file`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,

    /// Function or method name
    pub function: String,

    /// Owning class for method frames
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,

    /// Stringified call arguments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

impl StackFrame {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            file: None,
            line: None,
            function: function.into(),
            class: None,
            args: Vec::new(),
        }
    }

    pub fn at(mut self, file: impl Into<PathBuf>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    pub fn in_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

/// Host-side stack walker. Tests inject canned frames.
pub trait FrameSource: Send + Sync {
    /// Capture the current stack, innermost frame first.
    fn capture(&self) -> Vec<StackFrame>;
}

/// Fixed frames, for tests and for hosts without stack access.
pub struct StaticFrames(pub Vec<StackFrame>);

impl FrameSource for StaticFrames {
    fn capture(&self) -> Vec<StackFrame> {
        self.0.clone()
    }
}

/// Dispatch wrapper names pruned from the head alongside library frames.
const DEFAULT_DISPATCH_WRAPPERS: &[&str] = &[
    "call_user_func",
    "call_user_func_array",
    "invoke_hook",
    "apply_filters",
    "do_action",
];

/// Captures, filters, and memoizes backtraces for the process lifetime.
pub struct BacktraceProvider {
    source: Box<dyn FrameSource>,
    library_root: PathBuf,
    dispatch_wrappers: Vec<String>,
    cache: Mutex<HashMap<String, Arc<Vec<StackFrame>>>>,
}

impl BacktraceProvider {
    /// `library_root` is this facility's own source tree; frames under it
    /// are never real caller code.
    pub fn new(source: Box<dyn FrameSource>, library_root: impl Into<PathBuf>) -> Self {
        Self {
            source,
            library_root: library_root.into(),
            dispatch_wrappers: DEFAULT_DISPATCH_WRAPPERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Extend the dispatch-wrapper exclusion list.
    pub fn with_dispatch_wrappers(mut self, wrappers: impl IntoIterator<Item = String>) -> Self {
        self.dispatch_wrappers.extend(wrappers);
        self
    }

    /// Raw capture, innermost first, no filtering.
    pub fn capture(&self) -> Vec<StackFrame> {
        self.source.capture()
    }

    /// Capture and filter in one step.
    pub fn filtered(&self) -> Vec<StackFrame> {
        self.filter(self.capture())
    }

    /// Drop leading frames that belong to the library or to generic
    /// dispatch wrappers, stopping at the first frame matching neither.
    pub fn filter(&self, frames: Vec<StackFrame>) -> Vec<StackFrame> {
        let skip = frames
            .iter()
            .take_while(|frame| self.is_internal(frame))
            .count();
        frames.into_iter().skip(skip).collect()
    }

    /// Memoized filtered capture, keyed by a caller-supplied stable hash of
    /// the fault. A warning handler and the shutdown handler firing for
    /// the same root cause share one stack walk.
    pub fn cached(&self, key: &str) -> Arc<Vec<StackFrame>> {
        if let Some(frames) = self.cache.lock().get(key) {
            return frames.clone();
        }
        let frames = Arc::new(self.filtered());
        self.cache.lock().insert(key.to_string(), frames.clone());
        frames
    }

    fn is_internal(&self, frame: &StackFrame) -> bool {
        if let Some(file) = &frame.file {
            if file.starts_with(&self.library_root) {
                return true;
            }
        }
        self.dispatch_wrappers
            .iter()
            .any(|w| frame.function == *w)
    }
}

/// Stable cache key for one fault occurrence.
pub fn fault_key(code: u32, file: Option<&Path>, line: Option<u32>, message: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(code.to_le_bytes());
    if let Some(file) = file {
        hasher.update(file.to_string_lossy().as_bytes());
    }
    hasher.update(line.unwrap_or(0).to_le_bytes());
    hasher.update(message.as_bytes());
    hex::encode(hasher.finalize())
}
