// ABOUTME: Diagnostic stream shared by a connection factory and its sessions.
// ABOUTME: Holds the debug toggle and collects warnings that shouldn't fail an operation.

use parking_lot::Mutex;
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};

/// Debug toggle plus a log of non-fatal warnings.
///
/// Debug output only reaches `tracing` while the toggle is on. Audit and
/// informational messages are always emitted.
pub struct Diagnostics {
    owner: u64,
    debug: AtomicBool,
    warnings: Mutex<Vec<Warning>>,
}

impl Diagnostics {
    pub fn new(owner: u64) -> Self {
        Self {
            owner,
            debug: AtomicBool::new(false),
            warnings: Mutex::new(Vec::new()),
        }
    }

    pub fn set_debug(&self, enabled: bool) {
        self.debug.store(enabled, Ordering::Relaxed);
    }

    pub fn is_debug(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    /// Emit a debug message if the toggle is on.
    pub fn debug(&self, message: impl Display) {
        if self.is_debug() {
            tracing::debug!(factory = self.owner, "{message}");
        }
    }

    /// Emit a message that must stay visible, such as a trust decision.
    pub fn audit(&self, message: impl Display) {
        tracing::warn!(factory = self.owner, "{message}");
    }

    /// Surface an informational message from the remote side.
    pub fn info(&self, message: impl Display) {
        tracing::info!(factory = self.owner, "{message}");
    }

    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&self, warning: Warning) {
        tracing::warn!(factory = self.owner, "{}", warning.message);
        self.warnings.lock().push(warning);
    }

    /// Snapshot of all collected warnings.
    pub fn warnings(&self) -> Vec<Warning> {
        self.warnings.lock().clone()
    }

    /// Drain collected warnings, leaving the log empty.
    pub fn take_warnings(&self) -> Vec<Warning> {
        std::mem::take(&mut *self.warnings.lock())
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.lock().is_empty()
    }
}

/// A non-fatal warning.
#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn missing_identity(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::MissingIdentity,
            message: message.into(),
        }
    }

    pub fn known_hosts_update(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::KnownHostsUpdate,
            message: message.into(),
        }
    }

    pub fn channel_release(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::ChannelRelease,
            message: message.into(),
        }
    }

    pub fn ssh_disconnect(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::SshDisconnect,
            message: message.into(),
        }
    }
}

/// Categories of warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Identity file did not exist when it was loaded.
    MissingIdentity,
    /// An accepted host key could not be written to known_hosts.
    KnownHostsUpdate,
    /// Tearing down a command channel failed.
    ChannelRelease,
    /// Failed to cleanly disconnect SSH session.
    SshDisconnect,
}
