//! Error and notification reporting toward the interface layer.

use parking_lot::Mutex;

/// How serious a report is.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Informational.
    Info,
    /// Something degraded but the session is usable.
    Warning,
    /// Something failed.
    Error,
}

/// Receives connection and protocol errors that have no caller to return to.
pub trait ErrorSink: Send + Sync {
    /// Surface a message to the user.
    fn report(&self, severity: Severity, message: &str);
}

/// Forwards reports to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn report(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Info => tracing::info!("{message}"),
            Severity::Warning => tracing::warn!("{message}"),
            Severity::Error => tracing::error!("{message}"),
        }
    }
}

/// Buffers reports until the interface drains them.
#[derive(Debug, Default)]
pub struct CollectingSink {
    reports: Mutex<Vec<(Severity, String)>>,
}

impl CollectingSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return every buffered report.
    pub fn take(&self) -> Vec<(Severity, String)> {
        std::mem::take(&mut *self.reports.lock())
    }

    /// Copy of every buffered report.
    pub fn reports(&self) -> Vec<(Severity, String)> {
        self.reports.lock().clone()
    }
}

impl ErrorSink for CollectingSink {
    fn report(&self, severity: Severity, message: &str) {
        self.reports.lock().push((severity, message.to_string()));
    }
}
