//! In-memory connection double for transport and driver tests.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::Result;
use crate::log::{LogEntry, LogLevel};
use crate::transport::connection::{Connection, ConnectionLogHandler, DataHandler};

// ============================================================================
// TestConnection
// ============================================================================

/// Connection double: records outbound frames and lets tests inject
/// inbound frames and log events.
pub(crate) struct TestConnection {
    sent: Mutex<Vec<String>>,
    url: Mutex<Option<String>>,
    data_handler: Mutex<Option<DataHandler>>,
    log_handler: Mutex<Option<ConnectionLogHandler>>,
}

impl TestConnection {
    pub(crate) fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            url: Mutex::new(None),
            data_handler: Mutex::new(None),
            log_handler: Mutex::new(None),
        }
    }

    /// Frames the transport has written, in send order.
    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Delivers a raw inbound frame, as the read loop would.
    pub(crate) fn receive(&self, raw: &str) {
        let handler = self.data_handler.lock();
        if let Some(handler) = handler.as_ref() {
            handler(raw.to_string());
        }
    }

    /// Raises a connection-level log event.
    pub(crate) fn raise_log(&self, message: &str, level: LogLevel) {
        let handler = self.log_handler.lock();
        if let Some(handler) = handler.as_ref() {
            handler(LogEntry::new(message, level, "Connection"));
        }
    }
}

#[async_trait]
impl Connection for TestConnection {
    async fn connect(&self, url: &str) -> Result<()> {
        *self.url.lock() = Some(url.to_string());
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        *self.url.lock() = None;
        Ok(())
    }

    async fn send(&self, data: String) -> Result<()> {
        self.sent.lock().push(data);
        Ok(())
    }

    fn connected_url(&self) -> Option<String> {
        self.url.lock().clone()
    }

    fn set_data_handler(&self, handler: DataHandler) {
        *self.data_handler.lock() = Some(handler);
    }

    fn set_log_handler(&self, handler: ConnectionLogHandler) {
        *self.log_handler.lock() = Some(handler);
    }
}
