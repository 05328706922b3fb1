//! Console tracing setup and the session log.
//!
//! The session log is a `tracing` layer that keeps formatted entries in
//! memory while the app runs. On shutdown the entries are written to a file
//! named after the current date, but only when logging is enabled in the
//! settings.

use std::fmt::{self, Write as _};
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{Local, NaiveDate};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt as tracing_fmt};

use crate::error::{Error, Result};
use crate::settings::{LogLevel, LoggingSettings};

const LOG_FILE_PREFIX: &str = "capture_";

/// Install the console subscriber (filtered by `RUST_LOG`, or by `verbosity`)
/// together with the session log layer.
pub fn init_tracing(verbosity: u8, session: &SessionLog) -> anyhow::Result<()> {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("spotlight_capture={default_level},warn")));
    tracing_subscriber::registry()
        .with(
            tracing_fmt::layer()
                .with_target(false)
                .compact()
                .with_filter(filter),
        )
        .with(session.clone())
        .try_init()?;
    Ok(())
}

#[derive(Clone)]
pub struct SessionLog {
    inner: Arc<SessionLogInner>,
}

struct SessionLogInner {
    enabled: AtomicBool,
    min_level: Mutex<LogLevel>,
    directory: Mutex<PathBuf>,
    entries: Mutex<Vec<String>>,
}

impl SessionLog {
    pub fn new(settings: &LoggingSettings) -> Self {
        Self {
            inner: Arc::new(SessionLogInner {
                enabled: AtomicBool::new(settings.enabled),
                min_level: Mutex::new(settings.level),
                directory: Mutex::new(settings.directory.clone()),
                entries: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn min_level(&self) -> LogLevel {
        self.inner
            .min_level
            .lock()
            .map(|level| *level)
            .unwrap_or_default()
    }

    pub fn set_min_level(&self, level: LogLevel) {
        if let Ok(mut current) = self.inner.min_level.lock() {
            *current = level;
        }
    }

    pub fn set_directory(&self, dir: &Path) {
        if let Ok(mut current) = self.inner.directory.lock() {
            *current = dir.to_path_buf();
        }
    }

    /// Re-read enabled flag, level and directory from settings.
    pub fn apply(&self, settings: &LoggingSettings) {
        self.set_enabled(settings.enabled);
        self.set_min_level(settings.level);
        self.set_directory(&settings.directory);
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record an entry directly, bypassing `tracing`.
    pub fn write(&self, message: &str, level: LogLevel, source: &str, error: Option<&str>) {
        if !self.is_enabled() || level < self.min_level() {
            return;
        }
        let line = format_entry(&Local::now().format("%Y-%m-%d %H:%M:%S"), source, error, message);
        if let Ok(mut entries) = self.inner.entries.lock() {
            entries.push(line);
        }
    }

    pub fn file_name_for(date: NaiveDate) -> String {
        format!("{LOG_FILE_PREFIX}{}.log", date.format("%Y%m%d"))
    }

    /// Write buffered entries to today's file. Returns the file written, or
    /// `None` when logging is disabled.
    pub fn flush(&self) -> Result<Option<PathBuf>> {
        self.flush_for(Local::now().date_naive())
    }

    pub fn flush_for(&self, date: NaiveDate) -> Result<Option<PathBuf>> {
        if !self.is_enabled() {
            return Ok(None);
        }
        let dir = self
            .inner
            .directory
            .lock()
            .map(|d| d.clone())
            .map_err(|_| Error::Settings("log directory lock poisoned".into()))?;
        if dir.as_os_str().is_empty() {
            return Err(Error::Settings("no log directory configured".into()));
        }
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(Self::file_name_for(date));
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        let drained: Vec<String> = match self.inner.entries.lock() {
            Ok(mut entries) => std::mem::take(&mut *entries),
            Err(_) => return Err(Error::Settings("session log lock poisoned".into())),
        };
        for line in &drained {
            writeln!(file, "{line}")?;
        }
        file.flush()?;
        Ok(Some(path))
    }
}

fn format_entry(
    timestamp: &dyn fmt::Display,
    source: &str,
    error: Option<&str>,
    message: &str,
) -> String {
    let mut line = format!("{timestamp} --- {source} --- ");
    if let Some(error) = error {
        let _ = write!(line, "{error} --- ");
    }
    line.push_str(message);
    line
}

fn severity(level: &Level, critical: bool) -> LogLevel {
    match *level {
        Level::ERROR if critical => LogLevel::Critical,
        Level::ERROR => LogLevel::Error,
        Level::WARN => LogLevel::Warning,
        Level::INFO => LogLevel::Information,
        _ => LogLevel::Verbose,
    }
}

#[derive(Default)]
struct EntryVisitor {
    message: String,
    error: Option<String>,
    critical: bool,
    fields: String,
}

impl Visit for EntryVisitor {
    fn record_bool(&mut self, field: &Field, value: bool) {
        if field.name() == "critical" {
            self.critical = value;
        } else {
            let _ = write!(self.fields, " {}={value}", field.name());
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message.push_str(value),
            "error" => self.error = Some(value.to_string()),
            name => {
                let _ = write!(self.fields, " {name}={value}");
            }
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        if field.name() == "error" {
            self.error = Some(value.to_string());
        } else {
            let _ = write!(self.fields, " {}={value}", field.name());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => {
                let _ = write!(self.message, "{value:?}");
            }
            "error" => self.error = Some(format!("{value:?}")),
            name => {
                let _ = write!(self.fields, " {name}={value:?}");
            }
        }
    }
}

impl<S: Subscriber> Layer<S> for SessionLog {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if !self.is_enabled() {
            return;
        }
        let mut visitor = EntryVisitor::default();
        event.record(&mut visitor);
        let meta = event.metadata();
        if severity(meta.level(), visitor.critical) < self.min_level() {
            return;
        }
        let message = format!("{}{}", visitor.message, visitor.fields);
        let line = format_entry(
            &Local::now().format("%Y-%m-%d %H:%M:%S"),
            meta.target(),
            visitor.error.as_deref(),
            &message,
        );
        if let Ok(mut entries) = self.inner.entries.lock() {
            entries.push(line);
        }
    }
}
