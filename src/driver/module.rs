//! Protocol module registration.
//!
//! Domain modules (session, browsing context, script, ...) are thin typed
//! facades over the driver's command surface. The driver stores them in a
//! registry keyed by protocol module name; modules themselves hold a
//! [`DriverHandle`], a weak capability to issue commands and subscribe to
//! events, rather than owning the driver, so registration creates no
//! reference cycle.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Weak;

use crate::driver::core::{Driver, DriverInner};

// ============================================================================
// ProtocolModule
// ============================================================================

/// A named protocol module registrable with a [`Driver`].
///
/// # Example
///
/// ```ignore
/// struct SessionModule {
///     driver: DriverHandle,
/// }
///
/// impl ProtocolModule for SessionModule {
///     fn module_name(&self) -> &str {
///         "session"
///     }
/// }
/// ```
pub trait ProtocolModule: Send + Sync + 'static {
    /// Protocol module name, e.g. `"session"`.
    fn module_name(&self) -> &str;
}

// ============================================================================
// DriverHandle
// ============================================================================

/// Weak capability to call back into a [`Driver`].
///
/// Handed to modules at construction. Upgrading fails once the driver has
/// been dropped, so a module can never keep a dead driver alive.
#[derive(Clone)]
pub struct DriverHandle {
    pub(crate) inner: Weak<DriverInner>,
}

impl DriverHandle {
    /// Returns the driver, if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Driver> {
        self.inner.upgrade().map(|inner| Driver { inner })
    }
}

// ============================================================================
// Tests
// ============================================================================
