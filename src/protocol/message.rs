//! Generic wire envelope types.
//!
//! Defines the message shapes exchanged with the remote end and the
//! classification rules that sort an incoming frame into one of them.
//!
//! # Inbound Envelopes
//!
//! | Shape | Discriminator | Type |
//! |-------|---------------|------|
//! | Command success | `"type": "success"` | [`CommandSuccessMessage`] |
//! | Command error | `"type": "error"` | [`ErrorResponseMessage`] |
//! | Event | `"type": "event"` | [`EventMessage`] |
//!
//! Remote ends that predate the `type` discriminator are classified by field
//! presence instead; see [`classify`].

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::fmt;

use serde::Deserialize;
use serde_json::{Map, Value};

// ============================================================================
// MessageKind
// ============================================================================

/// Classification of one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MessageKind {
    /// Command success response.
    Success,
    /// Error response.
    Error,
    /// Event notification.
    Event,
    /// No recognizable shape.
    Unknown,
}

/// Classifies a parsed envelope by its `type` discriminator.
///
/// A `type` field that is present but unusable (non-string, or an
/// unrecognized string) classifies as [`MessageKind::Unknown`] without
/// falling through to the legacy heuristics.
///
/// Envelopes with no `type` field are probed in legacy order: a string
/// `error` field marks an error response, then a numeric `id` marks a
/// success response, then a string `method` marks an event. This order is
/// compatibility behavior for older remote ends, not a guarantee of
/// unambiguous classification; an event that also carries a numeric `id`
/// and no `type` will classify as a success response.
pub(crate) fn classify(message: &Value) -> MessageKind {
    if let Some(kind) = message.get("type") {
        return match kind.as_str() {
            Some("success") => MessageKind::Success,
            Some("error") => MessageKind::Error,
            Some("event") => MessageKind::Event,
            _ => MessageKind::Unknown,
        };
    }

    if message.get("error").is_some_and(Value::is_string) {
        MessageKind::Error
    } else if message
        .get("id")
        .is_some_and(|id| id.as_i64().is_some())
    {
        MessageKind::Success
    } else if message.get("method").is_some_and(Value::is_string) {
        MessageKind::Event
    } else {
        MessageKind::Unknown
    }
}

// ============================================================================
// CommandSuccessMessage
// ============================================================================

/// A command success response from the remote end.
///
/// # Format
///
/// ```json
/// {
///   "type": "success",
///   "id": 1,
///   "result": { ... }
/// }
/// ```
///
/// Top-level fields beyond the envelope are captured in `additional_data`.
#[derive(Debug, Deserialize)]
pub struct CommandSuccessMessage<T> {
    /// Discriminator field, when the remote end sends one.
    #[serde(rename = "type", default)]
    pub message_type: Option<String>,

    /// Matches the command `id`.
    pub id: i64,

    /// Decoded result payload.
    pub result: T,

    /// Extra top-level fields not part of the envelope.
    #[serde(flatten)]
    pub additional_data: Map<String, Value>,
}

// ============================================================================
// ErrorResponseMessage
// ============================================================================

/// An error response from the remote end.
///
/// # Format
///
/// ```json
/// {
///   "type": "error",
///   "id": 1,
///   "error": "unknown command",
///   "message": "text",
///   "stacktrace": "optional text"
/// }
/// ```
///
/// The `id` may be `null` or absent when the error does not correlate to a
/// command.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponseMessage {
    /// Discriminator field, when the remote end sends one.
    #[serde(rename = "type", default)]
    pub message_type: Option<String>,

    /// ID of the command this error responds to, if any.
    #[serde(default)]
    pub id: Option<i64>,

    /// Protocol error code.
    pub error: String,

    /// Human-readable error message.
    pub message: String,

    /// Remote-end stack trace, if provided.
    #[serde(default)]
    pub stacktrace: Option<String>,

    /// Extra top-level fields not part of the envelope.
    #[serde(flatten)]
    pub additional_data: Map<String, Value>,
}

impl ErrorResponseMessage {
    /// Converts the wire message into the owned error payload.
    #[must_use]
    pub fn into_error_result(self) -> ErrorResult {
        ErrorResult {
            command_id: self.id,
            error_type: self.error,
            error_message: self.message,
            stacktrace: self.stacktrace,
            additional_data: self.additional_data,
        }
    }
}

// ============================================================================
// ErrorResult
// ============================================================================

/// Owned error payload resolved onto a command or raised as an unexpected
/// error observation.
#[derive(Debug, Clone)]
pub struct ErrorResult {
    /// ID of the command this error correlates to, if any.
    pub command_id: Option<i64>,

    /// Protocol error code.
    pub error_type: String,

    /// Human-readable error message.
    pub error_message: String,

    /// Remote-end stack trace, if provided.
    pub stacktrace: Option<String>,

    /// Extra top-level fields from the wire envelope.
    pub additional_data: Map<String, Value>,
}

// ============================================================================
// EventMessage
// ============================================================================

/// An event notification from the remote end.
///
/// # Format
///
/// ```json
/// {
///   "type": "event",
///   "method": "module.eventName",
///   "params": { ... }
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct EventMessage<T> {
    /// Discriminator field, when the remote end sends one.
    #[serde(rename = "type", default)]
    pub message_type: Option<String>,

    /// Event name in `module.eventName` format.
    pub method: String,

    /// Decoded event payload.
    pub params: T,

    /// Extra top-level fields not part of the envelope.
    #[serde(flatten)]
    pub additional_data: Map<String, Value>,
}

// ============================================================================
// ProtocolEvent
// ============================================================================

/// A decoded event notification, queued for ordered delivery.
///
/// The payload is type-erased; subscribers recover the registered payload
/// type with [`ProtocolEvent::payload`]. Instances are only ever constructed
/// by the decoder registered for the event name, so a payload value always
/// originated from the protocol layer.
pub struct ProtocolEvent {
    method: String,
    payload: Box<dyn Any + Send + Sync>,
}

impl ProtocolEvent {
    /// Creates a decoded event. Crate-internal: only registered event
    /// decoders produce these.
    pub(crate) fn new(method: impl Into<String>, payload: Box<dyn Any + Send + Sync>) -> Self {
        Self {
            method: method.into(),
            payload,
        }
    }

    /// Returns the event name in `module.eventName` format.
    #[inline]
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the module name from the method.
    #[inline]
    #[must_use]
    pub fn module(&self) -> &str {
        self.method.split('.').next().unwrap_or_default()
    }

    /// Returns the payload as the registered type, if it matches.
    #[inline]
    #[must_use]
    pub fn payload<T: 'static>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }
}

impl fmt::Debug for ProtocolEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolEvent")
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
