//! Pending-command registry.
//!
//! Tracks in-flight commands by wire ID between send and response. The
//! registry has an explicit accept state: while closed, new registrations
//! fail loudly but existing entries can still be removed, so responses that
//! were already in flight at disconnect are matched and resolved instead of
//! silently dropped.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::Command;

// ============================================================================
// PendingCommandRegistry
// ============================================================================

struct RegistryState {
    /// In-flight commands keyed by wire ID.
    commands: FxHashMap<i64, Command>,

    /// Whether new registrations are accepted.
    accepting: bool,
}

/// Keyed store of in-flight commands with a closeable accept state.
///
/// Between [`close`](Self::close) and [`clear`](Self::clear) there is a
/// window where in-flight responses still match and resolve normally; only
/// after `clear` is a command truly gone.
pub struct PendingCommandRegistry {
    state: Mutex<RegistryState>,
}

impl PendingCommandRegistry {
    /// Creates an empty, accepting registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                commands: FxHashMap::default(),
                accepting: true,
            }),
        }
    }

    /// Registers a pending command under its wire ID.
    ///
    /// # Errors
    ///
    /// - [`Error::RegistryClosed`] if the registry no longer accepts
    ///   commands.
    /// - [`Error::DuplicateCommandId`] if the ID is already pending.
    pub fn add(&self, command: Command) -> Result<()> {
        let mut state = self.state.lock();
        if !state.accepting {
            return Err(Error::registry_closed(command.id()));
        }
        if state.commands.contains_key(&command.id()) {
            return Err(Error::duplicate_command_id(command.id()));
        }
        state.commands.insert(command.id(), command);
        Ok(())
    }

    /// Atomically looks up and removes the command with the given ID.
    ///
    /// Removal is atomic with retrieval: an ID can be matched at most once.
    /// Works while closed, so already-in-flight responses still correlate
    /// during teardown.
    #[must_use]
    pub fn remove(&self, id: i64) -> Option<Command> {
        self.state.lock().commands.remove(&id)
    }

    /// Stops accepting new commands. Existing entries stay removable.
    pub fn close(&self) {
        self.state.lock().accepting = false;
    }

    /// Restores the accept state for a fresh connection lifetime.
    pub fn reopen(&self) {
        self.state.lock().accepting = true;
    }

    /// Cancels and removes every remaining command.
    ///
    /// Any command still resident is abandoned: it is resolved with a
    /// cancellation fault so no waiter blocks forever, then removed.
    pub fn clear(&self) {
        let abandoned: Vec<Command> = {
            let mut state = self.state.lock();
            state.commands.drain().map(|(_, command)| command).collect()
        };

        let count = abandoned.len();
        for command in abandoned {
            command.cancel();
        }
        if count > 0 {
            debug!(count, "Cancelled abandoned commands");
        }
    }

    /// Returns `true` while new commands are accepted.
    #[inline]
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        self.state.lock().accepting
    }

    /// Returns the number of in-flight commands.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().commands.len()
    }

    /// Returns `true` if no commands are in flight.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().commands.is_empty()
    }
}

impl Default for PendingCommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
