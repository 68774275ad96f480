//! Control-session connection state machine.
//!
//! Provides a `ConnectionPhase` enum that models the lifecycle of one
//! device's TCP control channel, with validated transitions that return
//! `Result` instead of panicking.

use crate::error::TivoError;

// ── ConnectionPhase ──────────────────────────────────────────────

/// The current phase of a device control connection.
///
/// ```text
///  Disconnected ──► Connecting ──► Connected
///       ▲               │              │
///       └───────────────┴──────────────┘
///          (any error or explicit reset)
/// ```
///
/// There is no automatic reconnect: the session reconnects lazily on the
/// next operation that needs a connection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    /// No live connection. Initial state.
    #[default]
    Disconnected,

    /// TCP connect in flight.
    Connecting,

    /// Connected; commands may be sent.
    Connected,
}

impl std::fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

impl ConnectionPhase {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Connecting`.
    ///
    /// Valid from: `Disconnected`.
    pub fn begin_connect(&mut self) -> Result<(), TivoError> {
        match self {
            Self::Disconnected => {
                *self = Self::Connecting;
                Ok(())
            }
            _ => Err(TivoError::Other(format!(
                "cannot connect: already {self}"
            ))),
        }
    }

    /// Transition to `Connected`.
    ///
    /// Valid from: `Connecting`.
    pub fn complete_connect(&mut self) -> Result<(), TivoError> {
        match self {
            Self::Connecting => {
                *self = Self::Connected;
                Ok(())
            }
            _ => Err(TivoError::Other(format!(
                "cannot complete connect: {self}"
            ))),
        }
    }

    /// Force-reset to `Disconnected` regardless of current state.
    ///
    /// Used on connect failure, on any read/write error, and on explicit
    /// reset before a fresh status query.
    pub fn force_disconnect(&mut self) {
        *self = Self::Disconnected;
    }
}

// ── Tests ────────────────────────────────────────────────────────
