//! WebDriver BiDi protocol transport and dispatch engine.
//!
//! This library implements the client side of a bidirectional,
//! JSON-message, command/response/event protocol layered over a persistent
//! WebSocket connection: it turns a raw, unordered frame stream into
//! correlated command responses, typed event notifications and classified
//! errors.
//!
//! # Architecture
//!
//! The transport follows a strict ordering model:
//!
//! - **Outbound**: a caller builds command parameters → the transport
//!   assigns the next wire ID, records the command in the pending-command
//!   registry, serializes `{id, method, params}` and hands the frame to the
//!   connection.
//! - **Inbound**: the connection's read loop enqueues each raw frame on the
//!   incoming dispatcher → its single worker classifies the frame → command
//!   responses resolve their pending command's result slot synchronously;
//!   events are decoded and re-queued on the event dispatcher, whose own
//!   worker raises the public notification.
//!
//! Two single-consumer queues keep the byte-reading path free of caller
//! code: event subscribers can never stall frame classification.
//!
//! # Quick Start
//!
//! ```no_run
//! use serde_json::json;
//! use webdriver_bidi::{Driver, RawCommand, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let driver = Driver::builder().build();
//!     driver.start("ws://127.0.0.1:9222/session").await?;
//!
//!     let status: serde_json::Value = driver
//!         .execute_command(RawCommand::new("session.status", json!({})))
//!         .await?;
//!     println!("remote end status: {status}");
//!
//!     driver.stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`driver`] | Command execution wrapper and module registry |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`log`] | Protocol-level log notifications |
//! | [`protocol`] | Wire envelopes and command correlation |
//! | [`transport`] | Dispatchers, registry, router, connection |

// ============================================================================
// Modules
// ============================================================================

/// Protocol driver and module registry.
///
/// Use [`Driver::builder()`] to create a configured driver instance.
pub mod driver;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Protocol-level log notifications.
pub mod log;

/// Protocol message types.
///
/// Generic command/response/event envelopes and the correlation
/// [`Command`] handle.
pub mod protocol;

/// Protocol transport layer.
///
/// Ordered dispatch, pending-command registry, message classification and
/// the WebSocket connection.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Driver types
pub use driver::{DEFAULT_COMMAND_TIMEOUT, Driver, DriverBuilder, DriverHandle, ProtocolModule};

// Error types
pub use error::{Error, Result};

// Log types
pub use log::{LogEntry, LogLevel};

// Protocol types
pub use protocol::{
    Command, CommandParameters, CommandResult, ErrorResult, ProtocolEvent, RawCommand,
    SuccessResult,
};

// Transport types
pub use transport::{
    Connection, Dispatcher, ObserverList, PendingCommandRegistry, SubscriptionToken, Transport,
    TransportObservers, WebSocketConnection,
};
