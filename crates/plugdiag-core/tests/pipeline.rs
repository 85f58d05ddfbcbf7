//! End-to-end pipeline tests over the real file sink.
//!
//! These exercise the whole path: facade (buffering, backtrace rule) and
//! handler chain on the way in, per-day file format on disk, parser on
//! the way back out.

use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};
use tempfile::tempdir;

use plugdiag_core::{
    dedup::DedupGate,
    handler::{codes, HandlerSlot, PluginErrorHandler},
    parse_file, AttributionResolver, BacktraceProvider, FileSink, Logger, MemoryCache,
    MemorySettings, PlatformError, PluginConfig, Severity, Sink, StackFrame, StaticFrames,
    Threshold, CONTEXT_BACKTRACE,
};

const LIB_ROOT: &str = "/srv/plugins/plugdiag";

/// Surface the library's own tracing output in test failures.
fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn provider_for(plugin_dir: &str) -> Arc<BacktraceProvider> {
    let frames = vec![
        StackFrame::new("emit").at(format!("{}/logger.rs", LIB_ROOT), 10),
        StackFrame::new("handle_submit").at(format!("{}/src/form.rs", plugin_dir), 42),
    ];
    Arc::new(BacktraceProvider::new(
        Box::new(StaticFrames(frames)),
        LIB_ROOT,
    ))
}

fn logger_for(plugin_id: &str, threshold: Threshold) -> Logger {
    let plugin_dir = format!("/srv/plugins/{}", plugin_id);
    let config = PluginConfig::new(plugin_id, plugin_id, &plugin_dir, threshold).unwrap();
    Logger::new(
        config,
        provider_for(&plugin_dir),
        Arc::new(MemorySettings::new()),
    )
}

fn file_sink(dir: &Path, plugin_id: &str) -> (Sink, std::path::PathBuf) {
    let sink = FileSink::new(dir, plugin_id).unwrap();
    let path = sink.current_path();
    (Sink::File(sink), path)
}

/// The end-to-end example: at threshold=notice, an error carries a
/// non-empty backtrace while a debug event is stored without one.
#[test]
fn test_backtrace_attachment_round_trips() {
    init_tracing();
    let temp = tempdir().unwrap();
    let logger = logger_for("acme-forms", Threshold::Minimum(Severity::Notice));
    let (sink, path) = file_sink(temp.path(), "acme-forms");
    logger.attach_sink(sink);

    let mut ctx = Map::new();
    ctx.insert("path".into(), Value::String("/tmp".into()));
    logger.error("Disk full", ctx);
    logger.debug("tick", Map::new());

    let entries = parse_file(&path);
    assert_eq!(entries.len(), 2);

    let error = &entries[0];
    assert_eq!(error.severity, Severity::Error);
    assert_eq!(error.message, "Disk full");
    let ctx = error.context.as_ref().unwrap();
    assert_eq!(ctx["path"], Value::String("/tmp".into()));
    let frames = ctx[CONTEXT_BACKTRACE].as_array().unwrap();
    assert!(!frames.is_empty());
    // The library's own frame was pruned; the first frame is caller code.
    assert!(frames[0]["file"]
        .as_str()
        .unwrap()
        .starts_with("/srv/plugins/acme-forms"));

    let debug = &entries[1];
    assert_eq!(debug.severity, Severity::Debug);
    assert_eq!(debug.message, "tick");
    assert!(!debug.context.as_ref().unwrap().contains_key(CONTEXT_BACKTRACE));
}

/// Three calls before sink construction flush FIFO exactly once.
#[test]
fn test_buffered_calls_round_trip_in_order() {
    init_tracing();
    let temp = tempdir().unwrap();
    let logger = logger_for("acme-forms", Threshold::Minimum(Severity::Notice));

    logger.info("one", Map::new());
    logger.info("two", Map::new());
    logger.info("three", Map::new());

    let (sink, path) = file_sink(temp.path(), "acme-forms");
    logger.attach_sink(sink);

    let messages: Vec<_> = parse_file(&path).into_iter().map(|e| e.message).collect();
    assert_eq!(messages, ["one", "two", "three"]);
}

/// Two plugins register handlers; one error relevant to both makes each
/// emit exactly once into its own file, and the chain reports handled.
#[test]
fn test_handler_chain_over_file_sinks() {
    init_tracing();
    let temp = tempdir().unwrap();
    let slot = HandlerSlot::new();
    let mut paths = Vec::new();

    for plugin_id in ["plugin-a", "plugin-b"] {
        let logger = Arc::new(logger_for(plugin_id, Threshold::Minimum(Severity::Notice)));
        let (sink, path) = file_sink(temp.path(), plugin_id);
        logger.attach_sink(sink);
        paths.push(path);

        let config = logger.config().clone();
        PluginErrorHandler::register(
            &slot,
            logger,
            AttributionResolver::new(&config),
            DedupGate::new(Arc::new(MemoryCache::new())),
            provider_for(&format!("/srv/plugins/{}", plugin_id)),
        );
    }

    let error = PlatformError {
        code: codes::WARNING,
        message: "plugin-a and plugin-b disagree".to_string(),
        file: Some("/srv/host/glue.rs".into()),
        line: Some(3),
    };

    assert!(slot.dispatch(&error));
    // Repeat occurrence is suppressed by both gates but still handled.
    assert!(slot.dispatch(&error));

    for path in paths {
        let entries = parse_file(&path);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].severity, Severity::Warning);
        assert_eq!(entries[0].message, "plugin-a and plugin-b disagree");
    }
}
