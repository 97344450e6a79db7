//! Command correlation types.
//!
//! A [`Command`] is one in-flight request: it carries the wire ID, the
//! method name, the decoder for the expected result shape, and a result
//! slot that is resolved exactly once: by a success response, an error
//! response, a decode fault, or cancellation at teardown.
//!
//! Callers hold a [`Command`] handle returned by `send_command` and wait on
//! it with their own timeout; the transport holds a clone in the
//! pending-command registry until a response correlates.

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::protocol::message::{CommandSuccessMessage, ErrorResult};

// ============================================================================
// CommandParameters
// ============================================================================

/// Parameters for one protocol command.
///
/// Implementors serialize to the wire `params` object and name the expected
/// result payload shape, which the transport uses to decode the eventual
/// response.
///
/// # Example
///
/// ```ignore
/// #[derive(Serialize)]
/// struct StatusParameters {}
///
/// impl CommandParameters for StatusParameters {
///     type Result = StatusResult;
///
///     fn method_name(&self) -> &str {
///         "session.status"
///     }
/// }
/// ```
pub trait CommandParameters: Serialize + Send + Sync {
    /// Expected result payload shape for this command's response.
    type Result: DeserializeOwned + Send + Sync + 'static;

    /// Protocol method name in `module.command` format.
    fn method_name(&self) -> &str;
}

// ============================================================================
// RawCommand
// ============================================================================

/// Untyped command parameters for callers without a typed parameter set.
///
/// Serializes the provided JSON value as the `params` object and decodes the
/// response result as plain JSON.
#[derive(Debug, Clone)]
pub struct RawCommand {
    method: String,
    params: Value,
}

impl RawCommand {
    /// Creates raw command parameters from a method name and params value.
    #[inline]
    #[must_use]
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

impl Serialize for RawCommand {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.params.serialize(serializer)
    }
}

impl CommandParameters for RawCommand {
    type Result = Value;

    fn method_name(&self) -> &str {
        &self.method
    }
}

// ============================================================================
// OutgoingCommand
// ============================================================================

/// Wire envelope for an outbound command.
///
/// Field order matches the protocol: `{"id":N,"method":"...","params":{...}}`.
#[derive(Debug, Serialize)]
pub(crate) struct OutgoingCommand<'a, P: Serialize> {
    pub id: i64,
    pub method: &'a str,
    pub params: &'a P,
}

// ============================================================================
// SuccessResult
// ============================================================================

/// Decoded success payload of a completed command.
///
/// The payload is type-erased at the result slot; callers recover the
/// expected type declared by their [`CommandParameters`].
pub struct SuccessResult {
    payload: Box<dyn Any + Send + Sync>,
    additional_data: Map<String, Value>,
}

impl SuccessResult {
    /// Extra top-level fields the response carried beyond the envelope.
    #[inline]
    #[must_use]
    pub fn additional_data(&self) -> &Map<String, Value> {
        &self.additional_data
    }

    /// Returns the payload as the expected type, if it matches.
    #[inline]
    #[must_use]
    pub fn payload_ref<T: 'static>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// Consumes the result, returning the typed payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the payload is not of type `T`.
    pub fn into_payload<T: 'static>(self) -> Result<T> {
        self.payload
            .downcast::<T>()
            .map(|payload| *payload)
            .map_err(|_| Error::protocol("Command result payload is not of the requested type"))
    }
}

impl fmt::Debug for SuccessResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuccessResult")
            .field("additional_data", &self.additional_data)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// CommandResult
// ============================================================================

/// Outcome of a completed command.
#[derive(Debug)]
pub enum CommandResult {
    /// The remote end answered with a success response.
    Success(SuccessResult),

    /// The remote end answered with an error response.
    Error(ErrorResult),
}

impl CommandResult {
    /// Returns `true` if this is an error result.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

// ============================================================================
// Command
// ============================================================================

/// Decoder from the full response envelope to the typed success payload.
type ResponseDecoder =
    Box<dyn Fn(&Value) -> std::result::Result<DecodedSuccess, serde_json::Error> + Send + Sync>;

/// Intermediate decode output, before it lands in the result slot.
struct DecodedSuccess {
    payload: Box<dyn Any + Send + Sync>,
    additional_data: Map<String, Value>,
}

/// Result slot state, resolved exactly once.
#[derive(Default)]
struct CommandState {
    result: Option<CommandResult>,
    fault: Option<Error>,
    resolved: bool,
}

struct CommandInner {
    id: i64,
    method: String,
    decoder: ResponseDecoder,
    state: Mutex<CommandState>,
    completed_tx: watch::Sender<bool>,
    completed_rx: watch::Receiver<bool>,
}

/// One in-flight protocol command.
///
/// Cheaply cloneable; the caller and the pending-command registry share the
/// same result slot. The slot resolves exactly once, after which the outcome
/// stays claimable even if every waiter has already timed out.
#[derive(Clone)]
pub struct Command {
    inner: Arc<CommandInner>,
}

impl Command {
    /// Creates a pending command expecting a result payload of type `R`.
    pub(crate) fn new<R>(id: i64, method: impl Into<String>) -> Self
    where
        R: DeserializeOwned + Send + Sync + 'static,
    {
        let decoder: ResponseDecoder = Box::new(|message: &Value| {
            let response: CommandSuccessMessage<R> = serde_json::from_value(message.clone())?;
            Ok(DecodedSuccess {
                payload: Box::new(response.result),
                additional_data: response.additional_data,
            })
        });

        let (completed_tx, completed_rx) = watch::channel(false);
        Self {
            inner: Arc::new(CommandInner {
                id,
                method: method.into(),
                decoder,
                state: Mutex::new(CommandState::default()),
                completed_tx,
                completed_rx,
            }),
        }
    }

    /// Returns the wire ID assigned to this command.
    #[inline]
    #[must_use]
    pub fn id(&self) -> i64 {
        self.inner.id
    }

    /// Returns the protocol method name.
    #[inline]
    #[must_use]
    pub fn method(&self) -> &str {
        &self.inner.method
    }

    /// Returns `true` once the result slot has been resolved.
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        *self.inner.completed_rx.borrow()
    }

    /// Waits until the result slot resolves, up to the caller's timeout.
    ///
    /// A timeout mutates nothing: the command stays pending, a late
    /// response may still resolve it, and the caller may wait again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandTimeout`] if the slot does not resolve in
    /// time.
    pub async fn wait_for_completion(&self, timeout: Duration) -> Result<()> {
        let mut completed = self.inner.completed_rx.clone();
        match tokio::time::timeout(timeout, completed.wait_for(|done| *done)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(Error::protocol("Command completion channel closed")),
            Err(_) => Err(Error::command_timeout(
                self.inner.id,
                timeout.as_millis() as u64,
            )),
        }
    }

    /// Takes the resolved outcome out of the result slot, if any.
    ///
    /// The outcome is handed out once; subsequent calls return `None`.
    #[must_use]
    pub fn take_result(&self) -> Option<CommandResult> {
        self.inner.state.lock().result.take()
    }

    /// Takes the captured fault out of the result slot, if any.
    #[must_use]
    pub fn take_fault(&self) -> Option<Error> {
        self.inner.state.lock().fault.take()
    }

    /// Returns the captured fault's message without consuming it.
    #[must_use]
    pub fn fault_message(&self) -> Option<String> {
        self.inner
            .state
            .lock()
            .fault
            .as_ref()
            .map(ToString::to_string)
    }

    /// Decodes a success envelope into the result slot.
    ///
    /// A decode failure is captured as a fault on this command; it never
    /// propagates to the dispatch path.
    pub(crate) fn resolve_success_from(&self, message: &Value) {
        match (self.inner.decoder)(message) {
            Ok(decoded) => self.complete(CommandState {
                result: Some(CommandResult::Success(SuccessResult {
                    payload: decoded.payload,
                    additional_data: decoded.additional_data,
                })),
                fault: None,
                resolved: true,
            }),
            Err(source) => {
                let diagnostic = format!(
                    "Response did not contain properly formed JSON for response type (response JSON:{message})"
                );
                self.complete(CommandState {
                    result: None,
                    fault: Some(Error::response_decode(diagnostic, source)),
                    resolved: true,
                });
            }
        }
    }

    /// Resolves the command with a protocol error response.
    pub(crate) fn resolve_error(&self, error: ErrorResult) {
        self.complete(CommandState {
            result: Some(CommandResult::Error(error)),
            fault: None,
            resolved: true,
        });
    }

    /// Resolves the command with a cancellation fault at teardown.
    pub(crate) fn cancel(&self) {
        self.complete(CommandState {
            result: None,
            fault: Some(Error::command_cancelled(self.inner.id)),
            resolved: true,
        });
    }

    /// Installs the outcome if the slot is still unresolved, then wakes
    /// every waiter. At most one outcome ever lands.
    fn complete(&self, outcome: CommandState) {
        {
            let mut state = self.inner.state.lock();
            if state.resolved {
                return;
            }
            *state = outcome;
        }
        self.inner.completed_tx.send_replace(true);
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("id", &self.inner.id)
            .field("method", &self.inner.method)
            .field("complete", &self.is_complete())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct TestCommandResult {
        value: String,
    }

    #[test]
    fn test_raw_command_wire_format_is_exact() {
        let params = RawCommand::new(
            "module.command",
            json!({ "parameterName": "parameterValue" }),
        );
        let envelope = OutgoingCommand {
            id: 1,
            method: params.method_name(),
            params: &params,
        };

        let wire = serde_json::to_string(&envelope).expect("serialize");
        assert_eq!(
            wire,
            r#"{"id":1,"method":"module.command","params":{"parameterName":"parameterValue"}}"#
        );
    }

    #[test]
    fn test_new_command_is_pending() {
        let command = Command::new::<TestCommandResult>(1, "module.command");
        assert!(!command.is_complete());
        assert!(command.take_result().is_none());
        assert!(command.take_fault().is_none());
        assert_eq!(command.id(), 1);
        assert_eq!(command.method(), "module.command");
    }

    #[test]
    fn test_resolve_success_decodes_payload() {
        let command = Command::new::<TestCommandResult>(1, "module.command");
        let message = json!({
            "type": "success",
            "id": 1,
            "result": { "value": "response value" }
        });

        command.resolve_success_from(&message);

        assert!(command.is_complete());
        assert!(command.fault_message().is_none());
        let Some(CommandResult::Success(success)) = command.take_result() else {
            panic!("expected success result");
        };
        let payload = success
            .into_payload::<TestCommandResult>()
            .expect("typed payload");
        assert_eq!(payload.value, "response value");
    }

    #[test]
    fn test_resolve_success_captures_additional_data() {
        let command = Command::new::<TestCommandResult>(1, "module.command");
        let message = json!({
            "type": "success",
            "id": 1,
            "result": { "value": "response value" },
            "extraDataName": "extraDataValue"
        });

        command.resolve_success_from(&message);

        let Some(CommandResult::Success(success)) = command.take_result() else {
            panic!("expected success result");
        };
        assert_eq!(success.additional_data().len(), 1);
        assert_eq!(
            success
                .additional_data()
                .get("extraDataName")
                .and_then(Value::as_str),
            Some("extraDataValue")
        );
    }

    #[test]
    fn test_malformed_response_sets_fault() {
        let command = Command::new::<TestCommandResult>(1, "module.command");
        let message = json!({
            "type": "success",
            "id": 1,
            "noResult": { "invalid": "unknown command" }
        });

        command.resolve_success_from(&message);

        assert!(command.is_complete());
        assert!(command.take_result().is_none());
        let fault = command.take_fault().expect("fault captured");
        assert!(
            fault
                .to_string()
                .contains("Response did not contain properly formed JSON for response type")
        );
    }

    #[test]
    fn test_resolve_error_carries_error_result() {
        let command = Command::new::<TestCommandResult>(1, "module.command");
        command.resolve_error(ErrorResult {
            command_id: Some(1),
            error_type: "unknown command".to_string(),
            error_message: "This is a test error message".to_string(),
            stacktrace: None,
            additional_data: Map::new(),
        });

        let Some(CommandResult::Error(error)) = command.take_result() else {
            panic!("expected error result");
        };
        assert_eq!(error.error_type, "unknown command");
        assert_eq!(error.error_message, "This is a test error message");
        assert_eq!(error.stacktrace, None);
    }

    #[test]
    fn test_result_slot_resolves_exactly_once() {
        let command = Command::new::<TestCommandResult>(1, "module.command");
        let message = json!({
            "type": "success",
            "id": 1,
            "result": { "value": "first" }
        });

        command.resolve_success_from(&message);
        command.resolve_error(ErrorResult {
            command_id: Some(1),
            error_type: "late".to_string(),
            error_message: "must be ignored".to_string(),
            stacktrace: None,
            additional_data: Map::new(),
        });

        let Some(CommandResult::Success(success)) = command.take_result() else {
            panic!("first resolution must win");
        };
        let payload = success
            .into_payload::<TestCommandResult>()
            .expect("typed payload");
        assert_eq!(payload.value, "first");
    }

    #[tokio::test]
    async fn test_wait_timeout_leaves_command_pending() {
        let command = Command::new::<TestCommandResult>(7, "module.command");

        let err = command
            .wait_for_completion(Duration::from_millis(20))
            .await
            .expect_err("must time out");
        assert!(err.is_timeout());
        assert!(!command.is_complete());

        // A late response still resolves the slot, and re-polling claims it.
        let message = json!({
            "type": "success",
            "id": 7,
            "result": { "value": "late" }
        });
        command.resolve_success_from(&message);

        command
            .wait_for_completion(Duration::from_millis(20))
            .await
            .expect("resolved");
        assert!(command.take_result().is_some());
    }

    #[tokio::test]
    async fn test_cancel_wakes_waiter() {
        let command = Command::new::<TestCommandResult>(3, "module.command");
        let waiter = {
            let command = command.clone();
            tokio::spawn(async move { command.wait_for_completion(Duration::from_secs(5)).await })
        };

        command.cancel();

        waiter
            .await
            .expect("join")
            .expect("cancellation resolves the slot");
        let fault = command.take_fault().expect("cancellation fault");
        assert!(matches!(fault, Error::CommandCancelled { command_id: 3 }));
    }
}
