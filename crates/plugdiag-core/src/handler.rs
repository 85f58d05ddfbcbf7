//! Chained process error handler and the one-shot shutdown handler.
//!
//! The process-wide error handler is a singleton resource; independently
//! bundled copies of this library must compose, never clobber. Each
//! registered handler wraps the previously-installed one, built into an
//! explicit decorator chain at registration time by [`HandlerSlot`].
//!
//! Per occurrence: RECEIVED -> ATTRIBUTED|NOT_ATTRIBUTED ->
//! SUPPRESSED|EMITTED -> DELEGATED -> RESULT. Delegation always happens;
//! suppression only skips this handler's own emission. The final handled
//! flag is the OR of this handler's flag and the delegate's, and a true
//! result suppresses the platform's own default handling.

use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::attribution::AttributionResolver;
use crate::backtrace::{fault_key, BacktraceProvider, StackFrame};
use crate::dedup::{dedup_key, DedupGate, DEFAULT_DEDUP_TTL};
use crate::host::{HostHooks, PlatformError};
use crate::level::Severity;
use crate::logger::{Logger, CONTEXT_BACKTRACE};

/// Classic platform error codes, a bitmask vocabulary.
pub mod codes {
    pub const FATAL: u32 = 1;
    pub const WARNING: u32 = 2;
    pub const PARSE: u32 = 4;
    pub const NOTICE: u32 = 8;
    pub const CORE_FATAL: u32 = 16;
    pub const CORE_WARNING: u32 = 32;
    pub const COMPILE_FATAL: u32 = 64;
    pub const COMPILE_WARNING: u32 = 128;
    pub const USER_FATAL: u32 = 256;
    pub const USER_WARNING: u32 = 512;
    pub const USER_NOTICE: u32 = 1024;
    pub const STRICT: u32 = 2048;
    pub const RECOVERABLE: u32 = 4096;
    pub const DEPRECATED: u32 = 8192;
    pub const USER_DEPRECATED: u32 = 16384;
}

/// Fixed code-to-severity table. Unknown codes land on `Error`: an
/// unrecognized fault must fail loud, not silent.
pub fn severity_for_code(code: u32) -> Severity {
    use codes::*;
    match code {
        FATAL | PARSE | CORE_FATAL | COMPILE_FATAL | USER_FATAL | RECOVERABLE => {
            Severity::Critical
        }
        WARNING | CORE_WARNING | COMPILE_WARNING | USER_WARNING => Severity::Warning,
        NOTICE | USER_NOTICE => Severity::Notice,
        STRICT | DEPRECATED | USER_DEPRECATED => Severity::Info,
        _ => Severity::Error,
    }
}

/// Codes that terminate the process; the only ones the shutdown handler
/// acts on.
fn is_fatal_class(code: u32) -> bool {
    use codes::*;
    matches!(
        code,
        FATAL | PARSE | CORE_FATAL | COMPILE_FATAL | USER_FATAL | RECOVERABLE
    )
}

/// A link in the process error-handler chain.
pub trait ErrorHandler: Send + Sync {
    /// Returns true when the error was handled, which suppresses the
    /// platform's own default handling.
    fn handle(&self, error: &PlatformError) -> bool;
}

/// The single process-wide registration slot, modelling the host's
/// `register_error_handler(cb) -> previous_cb` primitive.
#[derive(Default)]
pub struct HandlerSlot {
    current: Mutex<Option<Arc<dyn ErrorHandler>>>,
}

impl HandlerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new handler built around whatever was installed before.
    /// The builder receives the previous handler so the chain composes.
    pub fn install<F>(&self, build: F)
    where
        F: FnOnce(Option<Arc<dyn ErrorHandler>>) -> Arc<dyn ErrorHandler>,
    {
        let mut current = self.current.lock();
        let previous = current.take();
        *current = Some(build(previous));
    }

    /// Route one raw error through the chain. No handler installed means
    /// not handled.
    pub fn dispatch(&self, error: &PlatformError) -> bool {
        let handler = self.current.lock().clone();
        match handler {
            Some(handler) => handler.handle(error),
            None => false,
        }
    }
}

/// This plugin's link in the chain.
pub struct PluginErrorHandler {
    logger: Arc<Logger>,
    resolver: AttributionResolver,
    gate: DedupGate,
    provider: Arc<BacktraceProvider>,
    dedup_ttl: Duration,
    previous: Option<Arc<dyn ErrorHandler>>,
}

impl PluginErrorHandler {
    /// Build this plugin's handler into the slot, wrapping the previous one.
    pub fn register(
        slot: &HandlerSlot,
        logger: Arc<Logger>,
        resolver: AttributionResolver,
        gate: DedupGate,
        provider: Arc<BacktraceProvider>,
    ) {
        slot.install(|previous| {
            Arc::new(Self {
                logger,
                resolver,
                gate,
                provider,
                dedup_ttl: DEFAULT_DEDUP_TTL,
                previous,
            })
        });
    }
}

impl ErrorHandler for PluginErrorHandler {
    fn handle(&self, error: &PlatformError) -> bool {
        let key = fault_key(
            error.code,
            error.file.as_deref(),
            error.line,
            &error.message,
        );
        let frames = self.provider.cached(&key);

        let attributed =
            self.resolver
                .is_relevant(error.file.as_deref(), &error.message, &frames);

        if attributed {
            let severity = severity_for_code(error.code);
            let suppress_key = dedup_key(self.logger.plugin_id(), severity, &error.message);
            if self.gate.should_emit(&suppress_key, self.dedup_ttl) {
                // Own emission completes before delegation, so a throwing
                // delegate cannot lose this occurrence.
                self.logger
                    .log(severity, error.message.clone(), error_context(error, &frames));
            }
        }

        let delegated = match &self.previous {
            Some(previous) => previous.handle(error),
            None => false,
        };
        attributed || delegated
    }
}

/// Raw fields plus the filtered backtrace, as the emitted context.
fn error_context(error: &PlatformError, frames: &[StackFrame]) -> Map<String, Value> {
    let mut ctx = Map::new();
    ctx.insert("code".to_string(), Value::from(error.code));
    if let Some(file) = &error.file {
        ctx.insert(
            "file".to_string(),
            Value::String(file.to_string_lossy().into_owned()),
        );
    }
    if let Some(line) = error.line {
        ctx.insert("line".to_string(), Value::from(line));
    }
    if let Ok(frames) = serde_json::to_value(frames) {
        ctx.insert(CONTEXT_BACKTRACE.to_string(), frames);
    }
    ctx
}

/// One-shot inspector of the host's single last-fatal-error slot,
/// invoked by the composition root at process end.
pub struct ShutdownHandler {
    logger: Arc<Logger>,
    resolver: AttributionResolver,
    gate: DedupGate,
    provider: Arc<BacktraceProvider>,
    hooks: Arc<dyn HostHooks>,
    dedup_ttl: Duration,
    fired: AtomicBool,
}

impl ShutdownHandler {
    pub fn new(
        logger: Arc<Logger>,
        resolver: AttributionResolver,
        gate: DedupGate,
        provider: Arc<BacktraceProvider>,
        hooks: Arc<dyn HostHooks>,
    ) -> Self {
        Self {
            logger,
            resolver,
            gate,
            provider,
            hooks,
            dedup_ttl: DEFAULT_DEDUP_TTL,
            fired: AtomicBool::new(false),
        }
    }

    /// Emit the last fatal error once if it belongs to this plugin, then
    /// clear the slot so the platform's shutdown reporting cannot
    /// duplicate it.
    pub fn on_shutdown(&self) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        let error = match self.hooks.last_fatal_error() {
            Some(error) => error,
            None => return,
        };
        if !is_fatal_class(error.code) {
            return;
        }

        let key = fault_key(
            error.code,
            error.file.as_deref(),
            error.line,
            &error.message,
        );
        let frames = self.provider.cached(&key);
        if !self
            .resolver
            .is_relevant(error.file.as_deref(), &error.message, &frames)
        {
            return;
        }

        let severity = severity_for_code(error.code);
        let suppress_key = dedup_key(self.logger.plugin_id(), severity, &error.message);
        if self.gate.should_emit(&suppress_key, self.dedup_ttl) {
            self.logger
                .log(severity, error.message.clone(), error_context(&error, &frames));
        }
        self.hooks.clear_last_fatal_error();
    }
}
