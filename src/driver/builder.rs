//! Driver configuration builder.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use crate::transport::Transport;
use crate::transport::connection::Connection;

use super::core::Driver;

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for awaited command execution.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// DriverBuilder
// ============================================================================

/// Builder for a configured [`Driver`].
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use webdriver_bidi::Driver;
///
/// # async fn example() -> webdriver_bidi::Result<()> {
/// let driver = Driver::builder()
///     .command_timeout(Duration::from_secs(10))
///     .build();
///
/// driver.start("ws://127.0.0.1:9222/session").await?;
/// # Ok(())
/// # }
/// ```
pub struct DriverBuilder {
    command_timeout: Duration,
    connection: Option<Arc<dyn Connection>>,
}

impl DriverBuilder {
    /// Creates a builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            connection: None,
        }
    }

    /// Sets how long awaited command execution waits for a response.
    #[must_use]
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Uses a custom connection instead of the default WebSocket client.
    #[must_use]
    pub fn connection(mut self, connection: Arc<dyn Connection>) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Builds the driver.
    #[must_use]
    pub fn build(self) -> Driver {
        let transport = match self.connection {
            Some(connection) => Transport::with_connection(connection),
            None => Transport::new(),
        };
        Driver::new(transport, self.command_timeout)
    }
}

impl Default for DriverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_builder_defaults() {
        let driver = DriverBuilder::new().build();
        assert_eq!(driver.command_timeout(), DEFAULT_COMMAND_TIMEOUT);
        assert!(!driver.transport().is_connected());
    }

    #[tokio::test]
    async fn test_builder_custom_timeout() {
        let driver = DriverBuilder::new()
            .command_timeout(Duration::from_millis(500))
            .build();
        assert_eq!(driver.command_timeout(), Duration::from_millis(500));
    }
}
