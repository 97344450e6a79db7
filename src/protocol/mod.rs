//! Protocol message types.
//!
//! This module defines the generic message format exchanged with the remote
//! end: the outbound command envelope, the inbound success/error/event
//! envelopes, and the correlation [`Command`] handle.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | Command | Local → Remote | `{id, method, params}` request |
//! | Success | Remote → Local | `{type, id, result}` response |
//! | Error | Remote → Local | `{type, id, error, message}` response |
//! | Event | Remote → Local | `{type, method, params}` notification |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Command correlation and parameter types |
//! | `message` | Generic wire envelopes and classification |

// ============================================================================
// Submodules
// ============================================================================

/// Command correlation and parameter types.
pub mod command;

/// Generic wire envelope types.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{Command, CommandParameters, CommandResult, RawCommand, SuccessResult};
pub use message::{
    CommandSuccessMessage, ErrorResponseMessage, ErrorResult, EventMessage, ProtocolEvent,
};
