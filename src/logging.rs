//! Logging handle passed explicitly to the parser, providers and manager
//!
//! Components never reach for a process-wide logger on their own. They hold a
//! [`Logger`] handed to them at construction; the binary builds one with
//! [`Logger::global`] after installing `env_logger`, tests build one around a
//! capturing sink.

use log::{Level, Log, Metadata, Record};
use std::fmt;
use std::sync::Arc;

/// Default log target for library components
pub const DEFAULT_TARGET: &str = "rvpnmux";

/// Cheaply clonable logging handle
#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn Log>,
    target: &'static str,
}

impl Logger {
    /// Create a logger writing to the given sink
    pub fn new(sink: Arc<dyn Log>) -> Self {
        Self {
            sink,
            target: DEFAULT_TARGET,
        }
    }

    /// Logger forwarding to whatever backend is installed in the `log` facade
    pub fn global() -> Self {
        Self::new(Arc::new(FacadeSink))
    }

    /// Logger that drops every record
    pub fn discard() -> Self {
        Self::new(Arc::new(NullSink))
    }

    /// Same sink, different target
    pub fn with_target(&self, target: &'static str) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            target,
        }
    }

    pub fn target(&self) -> &'static str {
        self.target
    }

    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        let metadata = Metadata::builder().level(level).target(self.target).build();
        if !self.sink.enabled(&metadata) {
            return;
        }
        self.sink.log(
            &Record::builder()
                .metadata(metadata)
                .args(args)
                .module_path_static(Some(module_path!()))
                .build(),
        );
    }

    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Error, args);
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args);
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args);
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args);
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").field("target", &self.target).finish()
    }
}

/// Install `env_logger` with `level` as the default filter
///
/// `RUST_LOG` still takes precedence when set.
pub fn init(level: &str) {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .try_init();
}

struct FacadeSink;

impl Log for FacadeSink {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level() && log::logger().enabled(metadata)
    }

    fn log(&self, record: &Record) {
        log::logger().log(record);
    }

    fn flush(&self) {
        log::logger().flush();
    }
}

struct NullSink;

impl Log for NullSink {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        false
    }

    fn log(&self, _record: &Record) {}

    fn flush(&self) {}
}

/// Sink keeping every record in memory
#[cfg(test)]
#[derive(Default)]
pub(crate) struct CaptureSink {
    records: std::sync::Mutex<Vec<(Level, String)>>,
}

#[cfg(test)]
impl CaptureSink {
    pub(crate) fn records(&self) -> Vec<(Level, String)> {
        self.records.lock().unwrap().clone()
    }

    pub(crate) fn contains(&self, level: Level, needle: &str) -> bool {
        self.records()
            .iter()
            .any(|(l, msg)| *l == level && msg.contains(needle))
    }
}

#[cfg(test)]
impl Log for CaptureSink {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        self.records
            .lock()
            .unwrap()
            .push((record.level(), record.args().to_string()));
    }

    fn flush(&self) {}
}
