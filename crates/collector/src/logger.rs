//! Explicit logging entry points.

use flog_protocol::{Level, LogRecord};
use serde_json::Value;

use crate::interceptor::CaptureFn;

/// Logs straight into the collector without going through `tracing`.
///
/// Records take the same path as intercepted events.
#[derive(Clone)]
pub struct Logger {
    capture: CaptureFn,
}

impl Logger {
    pub fn new(capture: CaptureFn) -> Self {
        Self { capture }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(Level::Info, message, None);
    }

    /// Alias for [`Logger::info`].
    pub fn log(&self, message: impl Into<String>) {
        self.emit(Level::Info, message, None);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(Level::Warn, message, None);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(Level::Error, message, None);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.emit(Level::Debug, message, None);
    }

    /// Captures a record with optional structured arguments.
    pub fn emit(&self, level: Level, message: impl Into<String>, args: Option<Value>) {
        let mut record = LogRecord::new(level, message);
        record.args = args;
        (self.capture)(record);
    }
}
