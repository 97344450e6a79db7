//! WebSocket connection to the remote end.
//!
//! [`Connection`] is the seam between the transport and the wire: it moves
//! raw text frames in both directions and reports connection-level log
//! events, nothing more. The transport consumes it as a trait object so
//! tests can substitute an in-memory double.
//!
//! [`WebSocketConnection`] is the production implementation. It spawns a
//! read loop task per connection that delivers inbound text frames to the
//! registered data handler and serves outbound writes through an internal
//! command channel.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, trace};
use url::Url;

use crate::error::{Error, Result};
use crate::log::{LogEntry, LogLevel};

// ============================================================================
// Types
// ============================================================================

/// Handler invoked for each inbound text frame.
pub type DataHandler = Box<dyn Fn(String) + Send + Sync>;

/// Handler invoked for each connection-level log event.
pub type ConnectionLogHandler = Box<dyn Fn(LogEntry) + Send + Sync>;

type SharedDataHandler = Arc<Mutex<Option<DataHandler>>>;
type SharedLogHandler = Arc<Mutex<Option<ConnectionLogHandler>>>;

// ============================================================================
// Connection
// ============================================================================

/// Duplex text-frame connection to the protocol remote end.
///
/// Implementations deliver inbound frames through the registered data
/// handler, in arrival order, from their own read context, never from a
/// caller's task.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Opens the connection to the given address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the address is invalid or the
    /// connection cannot be established, or if already connected.
    async fn connect(&self, url: &str) -> Result<()>;

    /// Closes the connection. A no-op when not connected.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails.
    async fn disconnect(&self) -> Result<()>;

    /// Sends one text frame to the remote end.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if no connection is open.
    /// - [`Error::ConnectionClosed`] if the connection died mid-send.
    /// - [`Error::WebSocket`] if the write fails.
    async fn send(&self, data: String) -> Result<()>;

    /// Returns the address of the open connection, if any.
    fn connected_url(&self) -> Option<String>;

    /// Registers the handler for inbound text frames.
    fn set_data_handler(&self, handler: DataHandler);

    /// Registers the handler for connection-level log events.
    fn set_log_handler(&self, handler: ConnectionLogHandler);
}

// ============================================================================
// WebSocketConnection
// ============================================================================

/// Internal commands for the read-loop task.
enum ConnectionCommand {
    /// Write a text frame, acknowledging the outcome.
    Send {
        data: String,
        ack: oneshot::Sender<Result<()>>,
    },
    /// Close the socket and stop the loop.
    Shutdown,
}

struct ActiveConnection {
    url: String,
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
}

/// WebSocket client connection built on `tokio-tungstenite`.
///
/// Binary, ping and pong frames are ignored; a close frame, a read error
/// or the end of the stream terminates the read loop.
pub struct WebSocketConnection {
    active: Mutex<Option<ActiveConnection>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    data_handler: SharedDataHandler,
    log_handler: SharedLogHandler,
}

impl WebSocketConnection {
    /// Creates a disconnected WebSocket connection.
    #[must_use]
    pub fn new() -> Self {
        Self {
            active: Mutex::new(None),
            worker: Mutex::new(None),
            data_handler: Arc::new(Mutex::new(None)),
            log_handler: Arc::new(Mutex::new(None)),
        }
    }

    /// Validates that the address is a `ws://` or `wss://` URL.
    fn validate_url(url: &str) -> Result<()> {
        let parsed = Url::parse(url)
            .map_err(|e| Error::connection(format!("Invalid WebSocket URL '{url}': {e}")))?;
        match parsed.scheme() {
            "ws" | "wss" => Ok(()),
            scheme => Err(Error::connection(format!(
                "Unsupported WebSocket URL scheme '{scheme}' in '{url}'"
            ))),
        }
    }

    /// Read loop: delivers inbound frames and serves outbound writes.
    async fn run_event_loop(
        ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        data_handler: SharedDataHandler,
        log_handler: SharedLogHandler,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            trace!(len = text.len(), "Frame received");
                            let handler = data_handler.lock();
                            if let Some(handler) = handler.as_ref() {
                                handler(text.to_string());
                            }
                        }

                        Some(Ok(Message::Close(_))) => {
                            Self::emit_log(
                                &log_handler,
                                LogLevel::Debug,
                                "WebSocket closed by remote end".to_string(),
                            );
                            break;
                        }

                        Some(Err(e)) => {
                            Self::emit_log(
                                &log_handler,
                                LogLevel::Error,
                                format!("WebSocket error: {e}"),
                            );
                            break;
                        }

                        None => {
                            Self::emit_log(
                                &log_handler,
                                LogLevel::Debug,
                                "WebSocket stream ended".to_string(),
                            );
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send { data, ack }) => {
                            let outcome = ws_write
                                .send(Message::Text(data.into()))
                                .await
                                .map_err(Error::from);
                            let _ = ack.send(outcome);
                        }

                        Some(ConnectionCommand::Shutdown) => {
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => break,
                    }
                }
            }
        }

        debug!("Connection read loop terminated");
    }

    /// Raises a connection log event and mirrors it to tracing.
    fn emit_log(log_handler: &SharedLogHandler, level: LogLevel, message: String) {
        match level {
            LogLevel::Error => error!(target: "webdriver_bidi::connection", "{message}"),
            _ => debug!(target: "webdriver_bidi::connection", "{message}"),
        }

        let handler = log_handler.lock();
        if let Some(handler) = handler.as_ref() {
            handler(LogEntry::new(message, level, "Connection"));
        }
    }
}

impl Default for WebSocketConnection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connection for WebSocketConnection {
    async fn connect(&self, url: &str) -> Result<()> {
        if let Some(active) = self.active.lock().as_ref() {
            return Err(Error::connection(format!(
                "Already connected to {}",
                active.url
            )));
        }
        Self::validate_url(url)?;

        let (ws_stream, _) = connect_async(url).await?;
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let worker = tokio::spawn(Self::run_event_loop(
            ws_stream,
            command_rx,
            Arc::clone(&self.data_handler),
            Arc::clone(&self.log_handler),
        ));

        {
            let mut active = self.active.lock();
            if let Some(existing) = active.as_ref() {
                // Lost a connect race; stop the loop we just started.
                let _ = command_tx.send(ConnectionCommand::Shutdown);
                return Err(Error::connection(format!(
                    "Already connected to {}",
                    existing.url
                )));
            }
            *active = Some(ActiveConnection {
                url: url.to_string(),
                command_tx,
            });
        }
        *self.worker.lock() = Some(worker);

        Self::emit_log(
            &self.log_handler,
            LogLevel::Info,
            format!("WebSocket connection established to {url}"),
        );
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let Some(active) = self.active.lock().take() else {
            return Ok(());
        };

        let _ = active.command_tx.send(ConnectionCommand::Shutdown);
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }

        Self::emit_log(
            &self.log_handler,
            LogLevel::Info,
            format!("WebSocket connection to {} closed", active.url),
        );
        Ok(())
    }

    async fn send(&self, data: String) -> Result<()> {
        let command_tx = self
            .active
            .lock()
            .as_ref()
            .map(|active| active.command_tx.clone())
            .ok_or(Error::NotConnected)?;

        let (ack_tx, ack_rx) = oneshot::channel();
        command_tx
            .send(ConnectionCommand::Send {
                data,
                ack: ack_tx,
            })
            .map_err(|_| Error::ConnectionClosed)?;

        ack_rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    fn connected_url(&self) -> Option<String> {
        self.active.lock().as_ref().map(|active| active.url.clone())
    }

    fn set_data_handler(&self, handler: DataHandler) {
        *self.data_handler.lock() = Some(handler);
    }

    fn set_log_handler(&self, handler: ConnectionLogHandler) {
        *self.log_handler.lock() = Some(handler);
    }
}

// ============================================================================
// Tests
// ============================================================================
