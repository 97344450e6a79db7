//! Protocol-level log notifications.
//!
//! The transport and connection surface their diagnostics both through the
//! `tracing` macros and through a [`LogEntry`] observer channel, so embedders
//! can route protocol logs without installing a global subscriber.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// LogLevel
// ============================================================================

/// Severity of a protocol log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Finest-grained diagnostic detail.
    Trace,
    /// Diagnostic detail useful during development.
    Debug,
    /// Normal operational messages.
    Info,
    /// Unexpected but recoverable conditions.
    Warn,
    /// Failures that drop or degrade protocol traffic.
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

// ============================================================================
// LogEntry
// ============================================================================

/// A single log notification raised by the protocol layer.
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Human-readable log message.
    pub message: String,

    /// Severity of the entry.
    pub level: LogLevel,

    /// Component that produced the entry (`"Transport"`, `"Connection"`).
    pub component: String,
}

impl LogEntry {
    /// Creates a new log entry.
    #[inline]
    #[must_use]
    pub fn new(message: impl Into<String>, level: LogLevel, component: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level,
            component: component.into(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
