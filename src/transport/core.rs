//! Protocol transport: correlation, classification and routing.
//!
//! [`Transport`] turns the connection's raw frame stream into correlated
//! command responses, typed event notifications and classified errors. Two
//! [`Dispatcher`] instances keep that work off the byte-reading path: one
//! routes raw incoming frames, one delivers decoded events, each with a
//! single worker preserving arrival order.
//!
//! # Data Flow
//!
//! ```text
//!  send_command ──► registry ──► connection ══► remote end
//!                                                   ║
//!  caller ◄── result slot ◄── router ◄── incoming ◄═╝
//!                               │        dispatcher
//!                               └──► event dispatcher ──► subscribers
//! ```
//!
//! The router resolves command responses synchronously within its pass;
//! events are only enqueued and delivered from the second queue, so
//! subscriber code can never stall frame classification.

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::log::{LogEntry, LogLevel};
use crate::protocol::command::{Command, CommandParameters, OutgoingCommand};
use crate::protocol::message::{
    ErrorResponseMessage, ErrorResult, EventMessage, MessageKind, ProtocolEvent, classify,
};
use crate::transport::connection::{Connection, WebSocketConnection};
use crate::transport::dispatcher::Dispatcher;
use crate::transport::observers::ObserverList;
use crate::transport::pending::PendingCommandRegistry;

// ============================================================================
// Types
// ============================================================================

/// Decoder from a full event envelope to a typed [`ProtocolEvent`].
type EventDecoder = Arc<dyn Fn(&Value) -> serde_json::Result<ProtocolEvent> + Send + Sync>;

// ============================================================================
// TransportObservers
// ============================================================================

/// Observation surface of a [`Transport`].
///
/// Observers run on a defined delivery context: `data_received`,
/// `log_message`, `error_received` and `unknown_message` fire on the
/// incoming dispatcher's worker (log entries may also originate from the
/// connection's read context); `event_received` fires on the event
/// dispatcher's worker.
pub struct TransportObservers {
    /// Every raw frame, before classification.
    pub data_received: ObserverList<str>,

    /// Protocol-level log entries from the transport and the connection.
    pub log_message: ObserverList<LogEntry>,

    /// Decoded event notifications, in receipt order.
    pub event_received: ObserverList<ProtocolEvent>,

    /// Error responses with no correlating pending command.
    pub error_received: ObserverList<ErrorResult>,

    /// Frames that matched no known shape, verbatim.
    pub unknown_message: ObserverList<str>,
}

impl TransportObservers {
    fn new() -> Self {
        Self {
            data_received: ObserverList::new(),
            log_message: ObserverList::new(),
            event_received: ObserverList::new(),
            error_received: ObserverList::new(),
            unknown_message: ObserverList::new(),
        }
    }
}

// ============================================================================
// Transport
// ============================================================================

struct TransportInner {
    /// Self-reference for rebuilding dispatcher closures on reconnect.
    weak_self: Weak<TransportInner>,

    /// Underlying duplex connection.
    connection: Arc<dyn Connection>,

    /// In-flight commands keyed by wire ID.
    pending: PendingCommandRegistry,

    /// Ordered queue of raw inbound frames; its worker runs the router.
    incoming: Mutex<Dispatcher<String>>,

    /// Ordered queue of decoded events; its worker notifies subscribers.
    events: Mutex<Dispatcher<ProtocolEvent>>,

    /// Registered event name → payload decoder.
    event_decoders: Mutex<FxHashMap<String, EventDecoder>>,

    /// Last assigned command ID; reset per connection lifetime.
    next_command_id: AtomicI64,

    /// Whether the transport believes the connection is open.
    connected: AtomicBool,

    /// Observation surface.
    observers: TransportObservers,
}

/// Protocol transport over a duplex text-frame connection.
///
/// Cheaply cloneable; clones share the same connection, registry and
/// dispatchers.
///
/// # Lifecycle
///
/// `Disconnected → connect() → Connected → disconnect() → Disconnected`.
/// A full disconnect/connect cycle behaves like a first-time connection:
/// fresh command ID space, fresh registry acceptance, fresh dispatchers;
/// reconnecting to a different address leaks nothing from the previous
/// session.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<TransportInner>,
}

impl Transport {
    /// Creates a transport over a new [`WebSocketConnection`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_connection(Arc::new(WebSocketConnection::new()))
    }

    /// Creates a transport over the given connection.
    #[must_use]
    pub fn with_connection(connection: Arc<dyn Connection>) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<TransportInner>| TransportInner {
            weak_self: weak.clone(),
            connection: Arc::clone(&connection),
            pending: PendingCommandRegistry::new(),
            incoming: Mutex::new(TransportInner::new_incoming_dispatcher(weak.clone())),
            events: Mutex::new(TransportInner::new_event_dispatcher(weak.clone())),
            event_decoders: Mutex::new(FxHashMap::default()),
            next_command_id: AtomicI64::new(0),
            connected: AtomicBool::new(false),
            observers: TransportObservers::new(),
        });

        // Wire the connection's notifications into the transport. Weak
        // references keep a dangling connection callback from holding the
        // transport alive.
        let weak = Arc::downgrade(&inner);
        connection.set_data_handler(Box::new(move |data| {
            if let Some(inner) = weak.upgrade() {
                inner.incoming.lock().dispatch(data);
            }
        }));

        let weak = Arc::downgrade(&inner);
        connection.set_log_handler(Box::new(move |entry| {
            if let Some(inner) = weak.upgrade() {
                inner.observers.log_message.emit(&entry);
            }
        }));

        Self { inner }
    }

    /// Opens the connection to the remote end.
    ///
    /// Resets the command ID counter and revives the registry and both
    /// dispatchers if a previous session shut them down.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyConnected`] naming the current address if a
    ///   connection is already open.
    /// - Any connection error from the underlying [`Connection`].
    pub async fn connect(&self, url: &str) -> Result<()> {
        if self.inner.connected.load(Ordering::Acquire) {
            let current = self
                .inner
                .connection
                .connected_url()
                .unwrap_or_else(|| "<unknown>".to_string());
            return Err(Error::already_connected(current));
        }

        if !self.inner.pending.is_accepting() {
            self.inner.pending.reopen();
        }

        {
            let mut incoming = self.inner.incoming.lock();
            if !incoming.is_dispatching() {
                *incoming =
                    TransportInner::new_incoming_dispatcher(self.inner.weak_self.clone());
            }
        }
        {
            let mut events = self.inner.events.lock();
            if !events.is_dispatching() {
                *events = TransportInner::new_event_dispatcher(self.inner.weak_self.clone());
            }
        }

        // Fresh ID space for each connection lifetime.
        self.inner.next_command_id.store(0, Ordering::Release);

        self.inner.connection.connect(url).await?;
        self.inner.connected.store(true, Ordering::Release);
        debug!(url, "Transport connected");
        Ok(())
    }

    /// Closes the connection and tears the session down in order.
    ///
    /// Teardown order: (1) close the registry so no new command can be
    /// added, (2) stop the connection so no new frames arrive, (3) drain
    /// the incoming dispatcher so frames received just before the stop are
    /// still classified and resolve their pending commands, (4) drain the
    /// event dispatcher the same way, (5) cancel whatever is still
    /// pending.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying connection close fails;
    /// local teardown still completes in that case.
    pub async fn disconnect(&self) -> Result<()> {
        self.inner.pending.close();
        let connection_result = self.inner.connection.disconnect().await;

        let incoming = self.inner.incoming.lock().clone();
        incoming.shutdown().await;

        let events = self.inner.events.lock().clone();
        events.shutdown().await;

        self.inner.pending.clear();
        self.inner.connected.store(false, Ordering::Release);
        debug!("Transport disconnected");
        connection_result
    }

    /// Sends a command to the remote end.
    ///
    /// Assigns the next wire ID, registers the command *before* the bytes
    /// go out (a response racing the send path always finds it) and
    /// returns the command handle immediately. Callers wait on the handle
    /// with their own timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::RegistryClosed`] if the transport is tearing down.
    /// - [`Error::Json`] if the parameters fail to serialize.
    /// - Any send error from the underlying [`Connection`].
    pub async fn send_command<P: CommandParameters>(&self, params: P) -> Result<Command> {
        let id = self.inner.next_command_id.fetch_add(1, Ordering::SeqCst) + 1;
        let command = Command::new::<P::Result>(id, params.method_name());

        let envelope = OutgoingCommand {
            id,
            method: params.method_name(),
            params: &params,
        };
        let json = serde_json::to_string(&envelope)?;

        self.inner.pending.add(command.clone())?;
        self.inner.connection.send(json).await?;

        trace!(id, method = params.method_name(), "Command sent");
        Ok(command)
    }

    /// Registers an event name with the payload shape used to decode it.
    ///
    /// Safe to call at any time, including before connecting. Inbound
    /// events with an unregistered method name surface as unknown
    /// messages.
    pub fn register_event_message<T>(&self, event_name: &str)
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let decoder: EventDecoder = Arc::new(|message: &Value| {
            let event: EventMessage<T> = serde_json::from_value(message.clone())?;
            Ok(ProtocolEvent::new(event.method, Box::new(event.params)))
        });

        self.inner
            .event_decoders
            .lock()
            .insert(event_name.to_string(), decoder);
    }

    /// Returns the observation surface for subscribing to transport
    /// notifications.
    #[inline]
    #[must_use]
    pub fn observers(&self) -> &TransportObservers {
        &self.inner.observers
    }

    /// Returns `true` while the transport holds an open connection.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// Returns the number of commands awaiting a response.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Transport - Router
// ============================================================================

impl TransportInner {
    fn new_incoming_dispatcher(weak: Weak<Self>) -> Dispatcher<String> {
        Dispatcher::new(Box::new(move |raw: String| {
            if let Some(inner) = weak.upgrade() {
                inner.process_message(&raw);
            }
        }))
    }

    fn new_event_dispatcher(weak: Weak<Self>) -> Dispatcher<ProtocolEvent> {
        Dispatcher::new(Box::new(move |event: ProtocolEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.observers.event_received.emit(&event);
            }
        }))
    }

    /// Classifies and routes one raw frame.
    ///
    /// Runs only on the incoming dispatcher's worker; no failure here may
    /// prevent handling of subsequent frames.
    fn process_message(&self, raw: &str) {
        self.observers.data_received.emit(raw);

        let message: Value = match serde_json::from_str(raw) {
            Ok(message) => message,
            Err(e) => {
                // A parse failure is logged and dropped; it is not an
                // unknown message.
                self.log(
                    LogLevel::Error,
                    format!("Unexpected error parsing JSON message: {e}"),
                );
                return;
            }
        };

        let processed = match classify(&message) {
            MessageKind::Success => self.process_command_response(&message),
            MessageKind::Error => self.process_error_response(&message, raw),
            MessageKind::Event => self.process_event(&message, raw),
            MessageKind::Unknown => false,
        };

        if !processed {
            self.observers.unknown_message.emit(raw);
        }
    }

    /// Correlates a success response to its pending command.
    ///
    /// Returns `false`, surfacing the frame as unknown, when the ID is
    /// missing, non-numeric, or matches no pending command.
    fn process_command_response(&self, message: &Value) -> bool {
        let Some(id) = message.get("id").and_then(Value::as_i64) else {
            return false;
        };
        let Some(command) = self.pending.remove(id) else {
            return false;
        };

        // Decode failures land on the command as a fault, never here.
        command.resolve_success_from(message);
        trace!(id, "Command response resolved");
        true
    }

    /// Routes an error response to its pending command, or raises the
    /// unexpected-error observation when nothing correlates.
    fn process_error_response(&self, message: &Value, raw: &str) -> bool {
        let parsed: ErrorResponseMessage = match serde_json::from_value(message.clone()) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.log(
                    LogLevel::Error,
                    format!("Unexpected error parsing error JSON: {e} (JSON: {raw})"),
                );
                return false;
            }
        };

        let error = parsed.into_error_result();
        match error.command_id.and_then(|id| self.pending.remove(id)) {
            Some(command) => {
                command.resolve_error(error);
            }
            None => {
                warn!(
                    error_type = %error.error_type,
                    "Unexpected error received"
                );
                self.observers.error_received.emit(&error);
            }
        }
        true
    }

    /// Decodes a registered event and queues it for ordered delivery.
    ///
    /// Returns `false` for unregistered names (unknown to this client, not
    /// an error) and for payloads that do not match the registered shape.
    fn process_event(&self, message: &Value, raw: &str) -> bool {
        let Some(method) = message.get("method").and_then(Value::as_str) else {
            return false;
        };

        let decoder = self.event_decoders.lock().get(method).cloned();
        let Some(decoder) = decoder else {
            return false;
        };

        match decoder(message) {
            Ok(event) => {
                self.events.lock().dispatch(event);
                true
            }
            Err(e) => {
                self.log(
                    LogLevel::Error,
                    format!("Unexpected error parsing event JSON: {e} (JSON: {raw})"),
                );
                false
            }
        }
    }

    /// Emits a transport log entry and mirrors it to tracing.
    fn log(&self, level: LogLevel, message: String) {
        match level {
            LogLevel::Error => error!(target: "webdriver_bidi::transport", "{message}"),
            LogLevel::Warn => warn!(target: "webdriver_bidi::transport", "{message}"),
            _ => debug!(target: "webdriver_bidi::transport", "{message}"),
        }

        let entry = LogEntry::new(message, level, "Transport");
        self.observers.log_message.emit(&entry);
    }
}

// ============================================================================
// Tests
// ============================================================================
