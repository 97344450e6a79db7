//! Error types for the WebDriver BiDi transport.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use webdriver_bidi::{Result, Transport};
//!
//! async fn example(transport: &Transport) -> Result<()> {
//!     transport.connect("ws://localhost:9222/session").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Transport state | [`Error::AlreadyConnected`], [`Error::NotConnected`], [`Error::RegistryClosed`], [`Error::DuplicateCommandId`] |
//! | Command | [`Error::CommandFailed`], [`Error::CommandTimeout`], [`Error::CommandCancelled`], [`Error::ResponseDecode`] |
//! | Driver | [`Error::ModuleNotRegistered`], [`Error::ModuleTypeMismatch`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`] |
//! | External | [`Error::Json`], [`Error::WebSocket`], [`Error::ChannelClosed`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Transport State Errors
    // ========================================================================
    /// Transport is already connected to a remote end.
    ///
    /// Returned by `connect` when a connection is already open.
    #[error(
        "The transport is already connected to {url}; you must disconnect before connecting to another URL"
    )]
    AlreadyConnected {
        /// URL of the currently open connection.
        url: String,
    },

    /// Operation requires an open connection.
    ///
    /// Returned when sending data without a prior `connect`.
    #[error("Not connected to a remote end")]
    NotConnected,

    /// Pending-command registry is closed to new commands.
    ///
    /// Returned when a command is added during or after disconnect.
    #[error("Cannot add command {command_id}; the pending command registry is closed")]
    RegistryClosed {
        /// ID of the rejected command.
        command_id: i64,
    },

    /// A command with this ID is already pending.
    #[error("Command with ID {command_id} is already pending")]
    DuplicateCommandId {
        /// The duplicated command ID.
        command_id: i64,
    },

    /// Protocol violation or unexpected message shape.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Command Errors
    // ========================================================================
    /// Remote end answered a command with an error response.
    ///
    /// Carries the protocol error code and message verbatim.
    #[error("Received '{error_type}' error executing command {method}: {error_message}")]
    CommandFailed {
        /// Method name of the failed command.
        method: String,
        /// Protocol error code.
        error_type: String,
        /// Protocol error message.
        error_message: String,
    },

    /// A command response could not be decoded into the expected result shape.
    ///
    /// Captured onto the command as a fault; never thrown across the
    /// dispatch path.
    #[error("{message}")]
    ResponseDecode {
        /// Full diagnostic, including the offending JSON.
        message: String,
        /// Underlying decode failure.
        #[source]
        source: serde_json::Error,
    },

    /// Waiting for a command response timed out.
    ///
    /// The command stays pending; a late response may still resolve it.
    #[error("Command {command_id} timed out after {timeout_ms}ms waiting for a response")]
    CommandTimeout {
        /// The command ID that timed out.
        command_id: i64,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Command was abandoned at connection teardown.
    #[error("Command {command_id} was cancelled before a response was received")]
    CommandCancelled {
        /// The cancelled command ID.
        command_id: i64,
    },

    // ========================================================================
    // Driver Errors
    // ========================================================================
    /// Requested module is not registered with the driver.
    #[error("Module '{module}' is not registered with this driver")]
    ModuleNotRegistered {
        /// The missing module name.
        module: String,
    },

    /// Registered module is not of the requested type.
    #[error(
        "Module '{module}' is registered with this driver, but the module object is not of the requested type"
    )]
    ModuleTypeMismatch {
        /// The mismatched module name.
        module: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// WebSocket connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates an already-connected error.
    #[inline]
    pub fn already_connected(url: impl Into<String>) -> Self {
        Self::AlreadyConnected { url: url.into() }
    }

    /// Creates a registry-closed error.
    #[inline]
    #[must_use]
    pub fn registry_closed(command_id: i64) -> Self {
        Self::RegistryClosed { command_id }
    }

    /// Creates a duplicate-command-ID error.
    #[inline]
    #[must_use]
    pub fn duplicate_command_id(command_id: i64) -> Self {
        Self::DuplicateCommandId { command_id }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a command-failed error from a protocol error response.
    #[inline]
    pub fn command_failed(
        method: impl Into<String>,
        error_type: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self::CommandFailed {
            method: method.into(),
            error_type: error_type.into(),
            error_message: error_message.into(),
        }
    }

    /// Creates a response-decode fault.
    #[inline]
    pub fn response_decode(message: impl Into<String>, source: serde_json::Error) -> Self {
        Self::ResponseDecode {
            message: message.into(),
            source,
        }
    }

    /// Creates a command timeout error.
    #[inline]
    #[must_use]
    pub fn command_timeout(command_id: i64, timeout_ms: u64) -> Self {
        Self::CommandTimeout {
            command_id,
            timeout_ms,
        }
    }

    /// Creates a command cancelled error.
    #[inline]
    #[must_use]
    pub fn command_cancelled(command_id: i64) -> Self {
        Self::CommandCancelled { command_id }
    }

    /// Creates a module-not-registered error.
    #[inline]
    pub fn module_not_registered(module: impl Into<String>) -> Self {
        Self::ModuleNotRegistered {
            module: module.into(),
        }
    }

    /// Creates a module-type-mismatch error.
    #[inline]
    pub fn module_type_mismatch(module: impl Into<String>) -> Self {
        Self::ModuleTypeMismatch {
            module: module.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::CommandTimeout { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::ConnectionClosed | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error is attributed to a specific command.
    #[inline]
    #[must_use]
    pub fn is_command_error(&self) -> bool {
        matches!(
            self,
            Self::CommandFailed { .. }
                | Self::CommandTimeout { .. }
                | Self::CommandCancelled { .. }
                | Self::ResponseDecode { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_connected_display() {
        let err = Error::already_connected("ws://localhost:9222/session");
        assert_eq!(
            err.to_string(),
            "The transport is already connected to ws://localhost:9222/session; \
             you must disconnect before connecting to another URL"
        );
    }

    #[test]
    fn test_command_failed_display() {
        let err = Error::command_failed("module.command", "unknown command", "no such method");
        assert_eq!(
            err.to_string(),
            "Received 'unknown command' error executing command module.command: no such method"
        );
    }

    #[test]
    fn test_is_timeout() {
        let timeout_err = Error::command_timeout(1, 5000);
        let other_err = Error::connection("test");

        assert!(timeout_err.is_timeout());
        assert!(!other_err.is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        let conn_err = Error::connection("test");
        let closed_err = Error::ConnectionClosed;
        let other_err = Error::protocol("test");

        assert!(conn_err.is_connection_error());
        assert!(closed_err.is_connection_error());
        assert!(!other_err.is_connection_error());
    }

    #[test]
    fn test_is_command_error() {
        assert!(Error::command_cancelled(3).is_command_error());
        assert!(Error::command_timeout(3, 100).is_command_error());
        assert!(!Error::NotConnected.is_command_error());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
