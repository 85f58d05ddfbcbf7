//! Sink selection and the on-disk text format.
//!
//! One decision per process: delegate to a shared host logging facility
//! when the injected capability probe offers one, otherwise append to a
//! private per-day file. Each write is one head line followed by the
//! JSON-encoded context:
//!
//! ```text
//! 2026-08-30T14:30:45.123Z ERROR Disk full
//! {"_plugin":"acme-forms","path":"/tmp"}
//! ```
//!
//! Files rotate purely by calendar date, never by size, and are never
//! rewritten in place.

use serde_json::{Map, Value};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::DiagResult;
use crate::level::Severity;

/// File extension for private per-day log files.
pub const LOG_EXT: &str = "log";

/// Context key carrying the owning plugin id inside each written entry.
/// The parser strips it before handing entries back.
pub const ATTRIBUTION_FIELD: &str = "_plugin";

/// A shared logging facility provided by the host, when one exists.
pub trait SharedLogger: Send + Sync {
    fn log(&self, severity: Severity, message: &str, context: &Map<String, Value>);
}

/// Backend destination, decided once per process.
pub enum Sink {
    File(FileSink),
    Shared(Box<dyn SharedLogger>),
}

impl Sink {
    pub fn write(
        &self,
        severity: Severity,
        message: &str,
        context: &Map<String, Value>,
    ) -> DiagResult<()> {
        match self {
            Sink::File(file) => file.append(severity, message, context),
            Sink::Shared(shared) => {
                shared.log(severity, message, context);
                Ok(())
            }
        }
    }
}

/// Pick the backend: the probe returns a shared facility only when it is
/// available, opted into, and its activation precondition holds.
pub fn select_sink<F>(
    probe: F,
    logs_dir: impl AsRef<Path>,
    plugin_id: impl Into<String>,
) -> DiagResult<Sink>
where
    F: FnOnce() -> Option<Box<dyn SharedLogger>>,
{
    match probe() {
        Some(shared) => Ok(Sink::Shared(shared)),
        None => Ok(Sink::File(FileSink::new(logs_dir, plugin_id)?)),
    }
}

/// Append-only per-day file sink: `<plugin-id>-<ISO date>.log`.
pub struct FileSink {
    logs_dir: PathBuf,
    plugin_id: String,
}

impl FileSink {
    pub fn new(logs_dir: impl AsRef<Path>, plugin_id: impl Into<String>) -> DiagResult<Self> {
        let logs_dir = logs_dir.as_ref().to_path_buf();
        fs::create_dir_all(&logs_dir)?;
        Ok(Self {
            logs_dir,
            plugin_id: plugin_id.into(),
        })
    }

    /// Path of the file written to right now; changes at midnight.
    pub fn current_path(&self) -> PathBuf {
        let date = chrono::Local::now().format("%Y-%m-%d");
        self.logs_dir
            .join(format!("{}-{}.{}", self.plugin_id, date, LOG_EXT))
    }

    /// Append one entry: head line, then the context as one JSON line.
    /// The attribution field is injected into the written context.
    pub fn append(
        &self,
        severity: Severity,
        message: &str,
        context: &Map<String, Value>,
    ) -> DiagResult<()> {
        let ts = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);

        // Newlines in the message would fork the head line.
        let message: String = message
            .chars()
            .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
            .collect();

        let mut written = context.clone();
        written.insert(
            ATTRIBUTION_FIELD.to_string(),
            Value::String(self.plugin_id.clone()),
        );
        let json = serde_json::to_string(&Value::Object(written))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.current_path())?;
        writeln!(file, "{} {} {}", ts, severity.token(), message)?;
        writeln!(file, "{}", json)?;

        Ok(())
    }
}

/// One per-day log file, for the viewer and the external retention job.
#[derive(Debug, Clone)]
pub struct LogFileInfo {
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// List a plugin's per-day files, newest modification first.
pub fn list_log_files(
    logs_dir: impl AsRef<Path>,
    plugin_id: &str,
) -> DiagResult<Vec<LogFileInfo>> {
    let logs_dir = logs_dir.as_ref();
    if !logs_dir.exists() {
        return Ok(Vec::new());
    }

    let prefix = format!("{}-", plugin_id);
    let mut files = Vec::new();

    for entry in fs::read_dir(logs_dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => continue,
        };
        if !name.starts_with(&prefix) || !name.ends_with(&format!(".{}", LOG_EXT)) {
            continue;
        }
        let meta = entry.metadata()?;
        files.push(LogFileInfo {
            path,
            size: meta.len(),
            modified: meta.modified().ok(),
        });
    }

    files.sort_by(|a, b| b.modified.cmp(&a.modified));
    Ok(files)
}
