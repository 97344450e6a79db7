//! Protocol driver: typed command execution over the transport.
//!
//! The [`Driver`] wraps a [`Transport`] with the surface domain modules
//! build on: awaited command execution with a configured timeout, typed
//! event registration, a module registry, and a forwarded observation
//! surface.

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{Error, Result};
use crate::log::LogEntry;
use crate::protocol::command::{CommandParameters, CommandResult};
use crate::protocol::message::{ErrorResult, ProtocolEvent};
use crate::transport::Transport;
use crate::transport::observers::ObserverList;

use super::builder::DriverBuilder;
use super::module::{DriverHandle, ProtocolModule};

// ============================================================================
// DriverObservers
// ============================================================================

/// Observation surface of a [`Driver`], forwarded from its transport.
pub struct DriverObservers {
    /// Decoded event notifications, in receipt order.
    pub event_received: ObserverList<ProtocolEvent>,

    /// Error responses with no correlating pending command.
    pub unexpected_error: ObserverList<ErrorResult>,

    /// Frames that matched no known shape, verbatim.
    pub unknown_message: ObserverList<str>,

    /// Protocol-level log entries.
    pub log_message: ObserverList<LogEntry>,
}

impl DriverObservers {
    fn new() -> Self {
        Self {
            event_received: ObserverList::new(),
            unexpected_error: ObserverList::new(),
            unknown_message: ObserverList::new(),
            log_message: ObserverList::new(),
        }
    }
}

// ============================================================================
// Driver
// ============================================================================

pub(crate) struct DriverInner {
    /// Underlying protocol transport.
    pub(crate) transport: Transport,

    /// How long `execute_command` waits for a response.
    pub(crate) command_timeout: Duration,

    /// Registered modules keyed by protocol module name.
    pub(crate) modules: Mutex<FxHashMap<String, Arc<dyn Any + Send + Sync>>>,

    /// Observation surface.
    pub(crate) observers: DriverObservers,
}

/// Driver over the WebDriver BiDi protocol transport.
///
/// Cheaply cloneable; clones share the same transport and module registry.
#[derive(Clone)]
pub struct Driver {
    pub(crate) inner: Arc<DriverInner>,
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("connected", &self.inner.transport.is_connected())
            .field("command_timeout", &self.inner.command_timeout)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Driver - Public API
// ============================================================================

impl Driver {
    /// Creates a configuration builder for the driver.
    #[inline]
    #[must_use]
    pub fn builder() -> DriverBuilder {
        DriverBuilder::new()
    }

    /// Starts communication with the remote end.
    ///
    /// # Errors
    ///
    /// See [`Transport::connect`].
    pub async fn start(&self, url: &str) -> Result<()> {
        self.inner.transport.connect(url).await
    }

    /// Stops communication with the remote end.
    ///
    /// # Errors
    ///
    /// See [`Transport::disconnect`].
    pub async fn stop(&self) -> Result<()> {
        self.inner.transport.disconnect().await
    }

    /// Sends a command and waits for its typed result.
    ///
    /// # Errors
    ///
    /// - [`Error::CommandTimeout`] if no response arrives within the
    ///   configured command timeout.
    /// - [`Error::CommandFailed`] if the remote end answered with an error
    ///   response.
    /// - [`Error::ResponseDecode`] if the response did not match the
    ///   expected result shape.
    /// - Any send error from the transport.
    pub async fn execute_command<P: CommandParameters>(&self, params: P) -> Result<P::Result> {
        let command = self.inner.transport.send_command(params).await?;
        command
            .wait_for_completion(self.inner.command_timeout)
            .await?;

        if let Some(fault) = command.take_fault() {
            return Err(fault);
        }

        match command.take_result() {
            Some(CommandResult::Success(success)) => success.into_payload::<P::Result>(),
            Some(CommandResult::Error(error)) => Err(Error::command_failed(
                command.method(),
                error.error_type,
                error.error_message,
            )),
            None => Err(Error::protocol("Command completed without a result")),
        }
    }

    /// Registers an event to be decoded with the payload shape `T`.
    pub fn register_event<T>(&self, event_name: &str)
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.inner.transport.register_event_message::<T>(event_name);
    }

    /// Registers a module under its protocol module name.
    pub fn register_module<M: ProtocolModule>(&self, module: M) {
        let name = module.module_name().to_string();
        debug!(module = %name, "Module registered");
        self.inner.modules.lock().insert(name, Arc::new(module));
    }

    /// Returns the registered module of type `M` under `name`.
    ///
    /// # Errors
    ///
    /// - [`Error::ModuleNotRegistered`] if no module is registered under
    ///   the name.
    /// - [`Error::ModuleTypeMismatch`] if the registered module is not of
    ///   type `M`.
    pub fn get_module<M: ProtocolModule>(&self, name: &str) -> Result<Arc<M>> {
        let module = self
            .inner
            .modules
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::module_not_registered(name))?;

        module
            .downcast::<M>()
            .map_err(|_| Error::module_type_mismatch(name))
    }

    /// Returns a weak capability for modules to call back into the driver.
    #[must_use]
    pub fn handle(&self) -> DriverHandle {
        DriverHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Returns the observation surface for subscribing to driver
    /// notifications.
    #[inline]
    #[must_use]
    pub fn observers(&self) -> &DriverObservers {
        &self.inner.observers
    }

    /// Returns the underlying transport.
    #[inline]
    #[must_use]
    pub fn transport(&self) -> &Transport {
        &self.inner.transport
    }

    /// Returns the configured command timeout.
    #[inline]
    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        self.inner.command_timeout
    }
}

// ============================================================================
// Driver - Construction
// ============================================================================

impl Driver {
    /// Creates a driver over the given transport.
    ///
    /// Subscribes to the transport's observations and re-raises them
    /// through the driver's own observer lists.
    pub(crate) fn new(transport: Transport, command_timeout: Duration) -> Self {
        let inner = Arc::new(DriverInner {
            transport,
            command_timeout,
            modules: Mutex::new(FxHashMap::default()),
            observers: DriverObservers::new(),
        });

        // Weak forwarding: subscriptions must not keep the driver alive.
        let weak = Arc::downgrade(&inner);
        inner
            .transport
            .observers()
            .event_received
            .subscribe(move |event: &ProtocolEvent| {
                if let Some(inner) = weak.upgrade() {
                    inner.observers.event_received.emit(event);
                }
            });

        let weak = Arc::downgrade(&inner);
        inner
            .transport
            .observers()
            .error_received
            .subscribe(move |error: &ErrorResult| {
                if let Some(inner) = weak.upgrade() {
                    inner.observers.unexpected_error.emit(error);
                }
            });

        let weak = Arc::downgrade(&inner);
        inner
            .transport
            .observers()
            .unknown_message
            .subscribe(move |raw: &str| {
                if let Some(inner) = weak.upgrade() {
                    inner.observers.unknown_message.emit(raw);
                }
            });

        let weak = Arc::downgrade(&inner);
        inner
            .transport
            .observers()
            .log_message
            .subscribe(move |entry: &LogEntry| {
                if let Some(inner) = weak.upgrade() {
                    inner.observers.log_message.emit(entry);
                }
            });

        Self { inner }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde::{Deserialize, Serialize};
    use serde_json::{Value, json};
    use tokio::sync::mpsc;

    use crate::protocol::command::RawCommand;
    use crate::transport::connection::Connection;
    use crate::transport::testing::TestConnection;

    #[derive(Debug, Serialize)]
    struct TestParams;

    #[derive(Debug, Deserialize, PartialEq)]
    struct TestResult {
        value: String,
    }

    impl CommandParameters for TestParams {
        type Result = TestResult;

        fn method_name(&self) -> &str {
            "module.command"
        }
    }

    struct TestModule {
        driver: DriverHandle,
    }

    impl std::fmt::Debug for TestModule {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("TestModule").finish_non_exhaustive()
        }
    }

    impl ProtocolModule for TestModule {
        fn module_name(&self) -> &str {
            "test"
        }
    }

    struct OtherModule;

    impl ProtocolModule for OtherModule {
        fn module_name(&self) -> &str {
            "other"
        }
    }

    fn driver_over_test_connection(timeout: Duration) -> (Driver, Arc<TestConnection>) {
        let connection = Arc::new(TestConnection::new());
        let driver = Driver::builder()
            .connection(Arc::clone(&connection) as Arc<dyn Connection>)
            .command_timeout(timeout)
            .build();
        (driver, connection)
    }

    #[tokio::test]
    async fn test_execute_command_returns_typed_result() {
        let (driver, connection) = driver_over_test_connection(Duration::from_secs(1));

        let responder = {
            let connection = Arc::clone(&connection);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                connection.receive(
                    r#"{ "type": "success", "id": 1, "result": { "value": "response value" } }"#,
                );
            })
        };

        let result = driver.execute_command(TestParams).await.expect("result");
        assert_eq!(result.value, "response value");
        responder.await.expect("responder");
    }

    #[tokio::test]
    async fn test_execute_command_converts_error_response() {
        let (driver, connection) = driver_over_test_connection(Duration::from_secs(1));

        let responder = {
            let connection = Arc::clone(&connection);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                connection.receive(
                    r#"{ "type": "error", "id": 1, "error": "unknown command", "message": "This is a test error message" }"#,
                );
            })
        };

        let err = driver
            .execute_command(TestParams)
            .await
            .expect_err("error response");
        assert_eq!(
            err.to_string(),
            "Received 'unknown command' error executing command module.command: \
             This is a test error message"
        );
        responder.await.expect("responder");
    }

    #[tokio::test]
    async fn test_execute_command_times_out_without_response() {
        let (driver, _connection) = driver_over_test_connection(Duration::from_millis(30));

        let err = driver
            .execute_command(TestParams)
            .await
            .expect_err("timeout");
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_module_registry() {
        let (driver, _connection) = driver_over_test_connection(Duration::from_secs(1));

        driver.register_module(TestModule {
            driver: driver.handle(),
        });
        driver.register_module(OtherModule);

        let module = driver.get_module::<TestModule>("test").expect("module");
        assert!(module.driver.upgrade().is_some());

        let err = driver
            .get_module::<TestModule>("missing")
            .expect_err("not registered");
        assert!(matches!(err, Error::ModuleNotRegistered { .. }));
        assert_eq!(
            err.to_string(),
            "Module 'missing' is not registered with this driver"
        );

        let err = driver
            .get_module::<TestModule>("other")
            .expect_err("wrong type");
        assert!(matches!(err, Error::ModuleTypeMismatch { .. }));
    }

    #[tokio::test]
    async fn test_driver_forwards_event_notifications() {
        let (driver, connection) = driver_over_test_connection(Duration::from_secs(1));

        #[derive(Debug, Deserialize)]
        struct Params {
            #[serde(rename = "paramName")]
            param_name: String,
        }

        driver.register_event::<Params>("protocol.event");

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        driver
            .observers()
            .event_received
            .subscribe(move |event: &ProtocolEvent| {
                let param = event
                    .payload::<Params>()
                    .map(|params| params.param_name.clone());
                let _ = event_tx.send((event.method().to_string(), param));
            });

        connection.receive(
            r#"{ "type": "event", "method": "protocol.event", "params": { "paramName": "paramValue" } }"#,
        );

        let (method, param) = tokio::time::timeout(Duration::from_millis(250), event_rx.recv())
            .await
            .expect("notification within timeout")
            .expect("notification");
        assert_eq!(method, "protocol.event");
        assert_eq!(param.as_deref(), Some("paramValue"));
    }

    #[tokio::test]
    async fn test_driver_forwards_unknown_messages() {
        let (driver, connection) = driver_over_test_connection(Duration::from_secs(1));

        let (unknown_tx, mut unknown_rx) = mpsc::unbounded_channel();
        driver
            .observers()
            .unknown_message
            .subscribe(move |raw: &str| {
                let _ = unknown_tx.send(raw.to_string());
            });

        connection.receive(r#"{ "unrecognizable": true }"#);

        let raw = tokio::time::timeout(Duration::from_millis(250), unknown_rx.recv())
            .await
            .expect("observation within timeout")
            .expect("observation");
        assert_eq!(raw, r#"{ "unrecognizable": true }"#);
    }

    #[tokio::test]
    async fn test_lifecycle_via_driver() {
        let (driver, connection) = driver_over_test_connection(Duration::from_secs(1));

        driver.start("ws://127.0.0.1:9222/session").await.expect("start");
        assert!(driver.transport().is_connected());
        assert_eq!(
            connection.connected_url().as_deref(),
            Some("ws://127.0.0.1:9222/session")
        );

        driver.stop().await.expect("stop");
        assert!(!driver.transport().is_connected());
    }

    #[tokio::test]
    async fn test_execute_raw_command() {
        let (driver, connection) = driver_over_test_connection(Duration::from_secs(1));

        let responder = {
            let connection = Arc::clone(&connection);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                connection.receive(r#"{ "type": "success", "id": 1, "result": { "ready": true } }"#);
            })
        };

        let result: Value = driver
            .execute_command(RawCommand::new("session.status", json!({})))
            .await
            .expect("raw result");
        assert_eq!(result.get("ready").and_then(Value::as_bool), Some(true));
        responder.await.expect("responder");
    }
}
