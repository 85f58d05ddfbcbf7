//! plugdiag - shared-host plugin diagnostics.
//!
//! A diagnostic-logging facility for plugins that share one host process:
//! attribute runtime errors to the plugin they belong to, suppress
//! repeated identical faults, buffer events until the storage backend
//! exists, and read the append-only text log back into structured
//! entries.
//!
//! ## Pipeline
//!
//! ```text
//! platform error ──> HandlerSlot chain ──┐
//!                                        ├──> Logger (facade)
//! explicit log call ─────────────────────┘        │
//!          BacktraceProvider ── frames ───────────┤
//!          AttributionResolver ── ownership ──────┤
//!          DedupGate ── suppression ──────────────┤
//!                                                 ▼
//!                                  Sink (shared facility or per-day file)
//!                                                 │
//!                                  parser ◄───────┘  (viewer, "new logs")
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use plugdiag_core::{Logger, PluginConfig, Severity, Threshold};
//!
//! let config = PluginConfig::new(
//!     "acme-forms",
//!     "Acme Forms",
//!     "/srv/plugins/acme-forms",
//!     Threshold::Minimum(Severity::Notice),
//! )?;
//! let logger = registry.register(Logger::new(config, provider, settings));
//!
//! // Calls made before the sink exists are buffered and flushed FIFO.
//! logger.error("Disk full", context);
//! logger.attach_sink(plugdiag_core::select_sink(probe, logs_dir, "acme-forms")?);
//! ```
//!
//! Losing a diagnostic event is always preferable to crashing or
//! misbehaving the host process: delivery and parse failures are local
//! dead ends, never surfaced to callers.

pub mod attribution;
pub mod backtrace;
pub mod config;
pub mod dedup;
pub mod error;
pub mod handler;
pub mod host;
pub mod level;
pub mod logger;
pub mod parser;
pub mod registry;
pub mod sink;

// Re-exports
pub use attribution::AttributionResolver;
pub use backtrace::{fault_key, BacktraceProvider, FrameSource, StackFrame, StaticFrames};
pub use config::PluginConfig;
pub use dedup::{dedup_key, DedupGate, DEFAULT_DEDUP_TTL};
pub use error::{DiagError, DiagResult};
pub use handler::{
    severity_for_code, ErrorHandler, HandlerSlot, PluginErrorHandler, ShutdownHandler,
};
pub use host::{
    ExpiringCache, HostHooks, MemoryCache, MemoryHooks, MemorySettings, PlatformError,
    SettingsStore,
};
pub use level::{Severity, Threshold};
pub use logger::{LogEvent, Logger, VetoHook, CONTEXT_BACKTRACE, CONTEXT_HOOK};
pub use parser::{parse_file, parse_str, ParsedEntry};
pub use registry::LoggerRegistry;
pub use sink::{
    list_log_files, select_sink, FileSink, LogFileInfo, SharedLogger, Sink, ATTRIBUTION_FIELD,
    LOG_EXT,
};
