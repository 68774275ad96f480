//! Domain-specific error types for the TiVo remote protocol.
//!
//! Per-operation failures on a device session never surface here; they
//! are recorded on the device record instead. `TivoError` covers what a
//! caller genuinely has to handle: lookups that miss, ports that cannot
//! be bound, and malformed input at the edges.

use thiserror::Error;

/// The canonical error type for the TiVo remote protocol.
#[derive(Debug, Error)]
pub enum TivoError {
    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/UDP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// A listening port could not be bound.
    #[error("can't bind port {port}: {source}")]
    Bind {
        port: u16,
        source: std::io::Error,
    },

    // ── Naming Errors ────────────────────────────────────────────
    /// No registry record matches the given name.
    #[error("can't find device `{0}`")]
    DeviceNotFound(String),

    // ── Protocol Errors ──────────────────────────────────────────
    /// A discovery datagram lacked a required key.
    #[error("malformed beacon: {0}")]
    MalformedBeacon(String),

    /// A command string could not be parsed.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TivoError>;

// ── Convenient From implementations ──────────────────────────────

impl From<String> for TivoError {
    fn from(s: String) -> Self {
        TivoError::Other(s)
    }
}

impl From<&str> for TivoError {
    fn from(s: &str) -> Self {
        TivoError::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = TivoError::DeviceNotFound("den".into());
        assert_eq!(e.to_string(), "can't find device `den`");

        let e = TivoError::Bind {
            port: 31339,
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(e.to_string().contains("31339"));
    }

    #[test]
    fn from_string() {
        let e: TivoError = "something broke".into();
        assert!(matches!(e, TivoError::Other(_)));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let e: TivoError = io_err.into();
        assert!(matches!(e, TivoError::Connection(_)));
    }
}
