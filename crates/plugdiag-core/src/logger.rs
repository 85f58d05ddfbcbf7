//! The delivery facade: the single `log(level, message, context)` entry
//! point for one plugin.
//!
//! Every call merges the ambient common context, conditionally attaches a
//! filtered backtrace, and either forwards to the sink or buffers until
//! the composition root attaches one. Sink failures are dropped, never
//! propagated; losing a diagnostic beats destabilizing the host.

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::backtrace::BacktraceProvider;
use crate::config::PluginConfig;
use crate::host::SettingsStore;
use crate::level::Severity;
use crate::sink::Sink;

/// Context key holding the serialized backtrace frames.
pub const CONTEXT_BACKTRACE: &str = "backtrace";

/// Context key holding the currently executing extension point.
pub const CONTEXT_HOOK: &str = "hook";

/// One diagnostic event, immutable once constructed.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub severity: Severity,
    pub message: String,
    pub context: Map<String, Value>,
    pub attribution: Option<String>,
}

/// A call retained in memory until the sink exists.
#[derive(Debug, Clone)]
struct BufferedCall {
    severity: Severity,
    message: String,
    context: Map<String, Value>,
}

/// Delivery is a two-state machine with one transition, driven by the
/// composition root when the backend becomes available.
enum Delivery {
    Buffering(Vec<BufferedCall>),
    Ready(Sink),
}

/// Returns true to veto the write entirely (known-benign noise).
pub type VetoHook = Box<dyn Fn(&LogEvent) -> bool + Send + Sync>;

/// Per-plugin logger instance. Owned by the registry, passed explicitly
/// to collaborators.
pub struct Logger {
    config: PluginConfig,
    provider: Arc<BacktraceProvider>,
    settings: Arc<dyn SettingsStore>,
    delivery: Mutex<Delivery>,
    common_context: RwLock<Map<String, Value>>,
    current_hook: RwLock<Option<String>>,
    veto: RwLock<Option<VetoHook>>,
}

impl Logger {
    /// Starts in the buffering state; call [`Logger::attach_sink`] once
    /// the backend exists.
    pub fn new(
        config: PluginConfig,
        provider: Arc<BacktraceProvider>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        Self {
            config,
            provider,
            settings,
            delivery: Mutex::new(Delivery::Buffering(Vec::new())),
            common_context: RwLock::new(Map::new()),
            current_hook: RwLock::new(None),
            veto: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub fn plugin_id(&self) -> &str {
        &self.config.plugin_id
    }

    /// Accumulate ambient context merged into every event. Last writer
    /// wins per key.
    pub fn add_common_context(&self, key: impl Into<String>, value: Value) {
        self.common_context.write().insert(key.into(), value);
    }

    /// Record the extension point currently executing; attached to
    /// backtrace-bearing events as diagnostic state.
    pub fn enter_hook(&self, name: impl Into<String>) {
        *self.current_hook.write() = Some(name.into());
    }

    pub fn leave_hook(&self) {
        *self.current_hook.write() = None;
    }

    /// Install the veto hook. A vetoed event is not written and does not
    /// advance the last-write time.
    pub fn set_veto_hook(&self, hook: VetoHook) {
        *self.veto.write() = Some(hook);
    }

    /// The single entry point.
    pub fn log(&self, severity: Severity, message: impl Into<String>, context: Map<String, Value>) {
        if !self.config.threshold.enabled() {
            return;
        }
        let message = message.into();

        // Common context first, so per-call keys overwrite it.
        let mut merged = self.common_context.read().clone();
        merged.extend(context);

        // Stack walking must not run on every low-severity call. The
        // handler chain may already have attached cached frames.
        if severity.at_least(Severity::Error) || self.config.threshold.is_most_verbose() {
            if !merged.contains_key(CONTEXT_BACKTRACE) {
                let frames = self.provider.filtered();
                if let Ok(frames) = serde_json::to_value(&frames) {
                    merged.insert(CONTEXT_BACKTRACE.to_string(), frames);
                }
            }
            if let Some(hook) = self.current_hook.read().clone() {
                merged.insert(CONTEXT_HOOK.to_string(), Value::String(hook));
            }
        }

        let mut state = self.delivery.lock();
        match &mut *state {
            Delivery::Buffering(calls) => calls.push(BufferedCall {
                severity,
                message,
                context: merged,
            }),
            Delivery::Ready(sink) => self.deliver(
                sink,
                &LogEvent {
                    severity,
                    message,
                    context: merged,
                    attribution: Some(self.config.plugin_id.clone()),
                },
            ),
        }
    }

    /// The transition: flushes anything buffered, FIFO, exactly once.
    /// Attaching while already ready just swaps the sink.
    pub fn attach_sink(&self, sink: Sink) {
        let mut state = self.delivery.lock();
        let prior = std::mem::replace(&mut *state, Delivery::Ready(sink));
        if let (Delivery::Buffering(calls), Delivery::Ready(sink)) = (prior, &*state) {
            for call in calls {
                self.deliver(
                    sink,
                    &LogEvent {
                        severity: call.severity,
                        message: call.message,
                        context: call.context,
                        attribution: Some(self.config.plugin_id.clone()),
                    },
                );
            }
        }
    }

    fn deliver(&self, sink: &Sink, event: &LogEvent) {
        if let Some(veto) = &*self.veto.read() {
            if veto(event) {
                tracing::trace!(plugin = %self.config.plugin_id, "event vetoed");
                return;
            }
        }
        if let Err(err) = sink.write(event.severity, &event.message, &event.context) {
            tracing::warn!(plugin = %self.config.plugin_id, %err, "dropped diagnostic event");
            return;
        }
        self.settings.set(
            &self.last_log_time_key(),
            &Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        );
    }

    // Convenience wrappers, one per tier.

    pub fn emergency(&self, message: impl Into<String>, context: Map<String, Value>) {
        self.log(Severity::Emergency, message, context)
    }

    pub fn alert(&self, message: impl Into<String>, context: Map<String, Value>) {
        self.log(Severity::Alert, message, context)
    }

    pub fn critical(&self, message: impl Into<String>, context: Map<String, Value>) {
        self.log(Severity::Critical, message, context)
    }

    pub fn error(&self, message: impl Into<String>, context: Map<String, Value>) {
        self.log(Severity::Error, message, context)
    }

    pub fn warning(&self, message: impl Into<String>, context: Map<String, Value>) {
        self.log(Severity::Warning, message, context)
    }

    pub fn notice(&self, message: impl Into<String>, context: Map<String, Value>) {
        self.log(Severity::Notice, message, context)
    }

    pub fn info(&self, message: impl Into<String>, context: Map<String, Value>) {
        self.log(Severity::Info, message, context)
    }

    pub fn debug(&self, message: impl Into<String>, context: Map<String, Value>) {
        self.log(Severity::Debug, message, context)
    }

    // "New logs" bookkeeping for the external viewer badge.

    /// Record that the viewer has been opened now.
    pub fn mark_viewed(&self) {
        self.settings.set(
            &self.last_viewed_key(),
            &Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        );
    }

    /// True when something was written since the viewer was last opened.
    pub fn has_new_logs(&self) -> bool {
        let written = match self.timestamp(&self.last_log_time_key()) {
            Some(ts) => ts,
            None => return false,
        };
        match self.timestamp(&self.last_viewed_key()) {
            Some(viewed) => written > viewed,
            None => true,
        }
    }

    fn timestamp(&self, key: &str) -> Option<DateTime<Utc>> {
        let raw = self.settings.get(key)?;
        DateTime::parse_from_rfc3339(&raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    fn last_log_time_key(&self) -> String {
        format!("plugdiag:{}:last_log_time", self.config.plugin_id)
    }

    fn last_viewed_key(&self) -> String {
        format!("plugdiag:{}:last_viewed", self.config.plugin_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtrace::{StackFrame, StaticFrames};
    use crate::host::MemorySettings;
    use crate::level::Threshold;
    use crate::sink::SharedLogger;

    const LIB_ROOT: &str = "/srv/plugins/plugdiag";

    fn provider() -> Arc<BacktraceProvider> {
        let frames = vec![StackFrame::new("submit").at("/srv/plugins/acme-forms/form.rs", 42)];
        Arc::new(BacktraceProvider::new(
            Box::new(StaticFrames(frames)),
            LIB_ROOT,
        ))
    }

    fn logger(threshold: Threshold) -> (Logger, Arc<MemorySettings>) {
        let settings = Arc::new(MemorySettings::new());
        let config =
            PluginConfig::new("acme-forms", "Acme Forms", "/srv/plugins/acme-forms", threshold)
                .unwrap();
        (Logger::new(config, provider(), settings.clone()), settings)
    }

    /// Sink that records (severity, message, context) in call order.
    #[derive(Default)]
    struct Recording(Mutex<Vec<(Severity, String, Map<String, Value>)>>);

    impl SharedLogger for Recording {
        fn log(&self, severity: Severity, message: &str, context: &Map<String, Value>) {
            self.0
                .lock()
                .push((severity, message.to_string(), context.clone()));
        }
    }

    fn recording_sink() -> (Sink, Arc<Recording>) {
        let recording = Arc::new(Recording::default());
        struct Handle(Arc<Recording>);
        impl SharedLogger for Handle {
            fn log(&self, s: Severity, m: &str, c: &Map<String, Value>) {
                self.0.log(s, m, c)
            }
        }
        (Sink::Shared(Box::new(Handle(recording.clone()))), recording)
    }

    #[test]
    fn test_buffered_calls_flush_fifo_exactly_once() {
        let (logger, _) = logger(Threshold::Minimum(Severity::Notice));
        logger.info("one", Map::new());
        logger.info("two", Map::new());
        logger.info("three", Map::new());

        let (sink, recording) = recording_sink();
        logger.attach_sink(sink);

        let messages: Vec<_> = recording.0.lock().iter().map(|e| e.1.clone()).collect();
        assert_eq!(messages, ["one", "two", "three"]);

        // A second attach must not replay.
        let (sink2, recording2) = recording_sink();
        logger.attach_sink(sink2);
        assert!(recording2.0.lock().is_empty());
    }

    #[test]
    fn test_threshold_none_disables_delivery() {
        let (logger, _) = logger(Threshold::None);
        let (sink, recording) = recording_sink();
        logger.attach_sink(sink);

        logger.emergency("ignored", Map::new());
        assert!(recording.0.lock().is_empty());
    }

    #[test]
    fn test_backtrace_only_for_severe_events() {
        let (logger, _) = logger(Threshold::Minimum(Severity::Notice));
        let (sink, recording) = recording_sink();
        logger.attach_sink(sink);

        logger.error("boom", Map::new());
        logger.debug("tick", Map::new());

        let events = recording.0.lock();
        assert_eq!(events.len(), 2);
        let frames = events[0].2.get(CONTEXT_BACKTRACE).unwrap();
        assert!(!frames.as_array().unwrap().is_empty());
        assert!(!events[1].2.contains_key(CONTEXT_BACKTRACE));
    }

    #[test]
    fn test_debug_threshold_forces_backtraces() {
        let (logger, _) = logger(Threshold::Minimum(Severity::Debug));
        let (sink, recording) = recording_sink();
        logger.attach_sink(sink);

        logger.debug("tick", Map::new());
        assert!(recording.0.lock()[0].2.contains_key(CONTEXT_BACKTRACE));
    }

    #[test]
    fn test_common_context_last_writer_wins() {
        let (logger, _) = logger(Threshold::Minimum(Severity::Notice));
        let (sink, recording) = recording_sink();
        logger.attach_sink(sink);

        logger.add_common_context("request_id", Value::String("r1".into()));
        logger.add_common_context("user", Value::String("u1".into()));
        logger.add_common_context("request_id", Value::String("r2".into()));

        let mut ctx = Map::new();
        ctx.insert("user".into(), Value::String("override".into()));
        logger.info("msg", ctx);

        let events = recording.0.lock();
        assert_eq!(events[0].2["request_id"], Value::String("r2".into()));
        assert_eq!(events[0].2["user"], Value::String("override".into()));
    }

    #[test]
    fn test_hook_name_attached_with_backtrace() {
        let (logger, _) = logger(Threshold::Minimum(Severity::Notice));
        let (sink, recording) = recording_sink();
        logger.attach_sink(sink);

        logger.enter_hook("form_submit");
        logger.error("boom", Map::new());
        logger.leave_hook();
        logger.error("boom again", Map::new());

        let events = recording.0.lock();
        assert_eq!(events[0].2[CONTEXT_HOOK], Value::String("form_submit".into()));
        assert!(!events[1].2.contains_key(CONTEXT_HOOK));
    }

    #[test]
    fn test_veto_skips_write_and_bookkeeping() {
        let (logger, settings) = logger(Threshold::Minimum(Severity::Notice));
        let (sink, recording) = recording_sink();
        logger.attach_sink(sink);

        logger.set_veto_hook(Box::new(|event| event.message.contains("benign")));

        logger.warning("known benign noise", Map::new());
        assert!(recording.0.lock().is_empty());
        assert!(settings.get("plugdiag:acme-forms:last_log_time").is_none());

        logger.warning("real problem", Map::new());
        assert_eq!(recording.0.lock().len(), 1);
        assert!(settings.get("plugdiag:acme-forms:last_log_time").is_some());
    }

    #[test]
    fn test_new_logs_bookkeeping() {
        let (logger, _) = logger(Threshold::Minimum(Severity::Notice));
        let (sink, _recording) = recording_sink();
        logger.attach_sink(sink);

        assert!(!logger.has_new_logs());

        logger.info("first", Map::new());
        assert!(logger.has_new_logs());

        logger.mark_viewed();
        assert!(!logger.has_new_logs());

        std::thread::sleep(std::time::Duration::from_millis(5));
        logger.info("second", Map::new());
        assert!(logger.has_new_logs());
    }
}
