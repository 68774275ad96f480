//! Device → client responses and the status vocabulary recorded per device.
//!
//! Parsing is total: every input maps to some [`Response`], with
//! [`Response::Unrecognized`] as the floor. Reason tokens outside the
//! documented sets are kept verbatim in an `Other` variant so callers can
//! flag them without losing them.

use std::fmt;

use crate::protocol::command::Screen;

// ── StatusReason ─────────────────────────────────────────────────

/// Why the channel is what it is, from `CH_STATUS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusReason {
    Remote,
    Local,
    Recording,
    Other(String),
}

impl StatusReason {
    pub fn from_token(token: &str) -> Self {
        match token {
            "REMOTE" => Self::Remote,
            "LOCAL" => Self::Local,
            "RECORDING" => Self::Recording,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl fmt::Display for StatusReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote => f.write_str("REMOTE"),
            Self::Local => f.write_str("LOCAL"),
            Self::Recording => f.write_str("RECORDING"),
            Self::Other(token) => f.write_str(token),
        }
    }
}

// ── FailureReason ────────────────────────────────────────────────

/// Why a channel change was refused, from `CH_FAILED`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    NoLive,
    Recording,
    MissingChannel,
    MalformedChannel,
    InvalidChannel,
    Other(String),
}

impl FailureReason {
    pub fn from_token(token: &str) -> Self {
        match token {
            "NO_LIVE" => Self::NoLive,
            "RECORDING" => Self::Recording,
            "MISSING_CHANNEL" => Self::MissingChannel,
            "MALFORMED_CHANNEL" => Self::MalformedChannel,
            "INVALID_CHANNEL" => Self::InvalidChannel,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoLive => f.write_str("NO_LIVE"),
            Self::Recording => f.write_str("RECORDING"),
            Self::MissingChannel => f.write_str("MISSING_CHANNEL"),
            Self::MalformedChannel => f.write_str("MALFORMED_CHANNEL"),
            Self::InvalidChannel => f.write_str("INVALID_CHANNEL"),
            Self::Other(token) => f.write_str(token),
        }
    }
}

// ── Reason ───────────────────────────────────────────────────────

/// The `reason` field of a device record. Which enum applies depends on
/// the status that set it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    Status(StatusReason),
    Failure(FailureReason),
    /// Transport failure description ("timeout", OS error text).
    Connection(String),
}

impl Reason {
    pub fn is_recognized(&self) -> bool {
        match self {
            Reason::Status(r) => r.is_recognized(),
            Reason::Failure(r) => r.is_recognized(),
            Reason::Connection(_) => true,
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::Status(r) => r.fmt(f),
            Reason::Failure(r) => r.fmt(f),
            Reason::Connection(text) => f.write_str(text),
        }
    }
}

// ── DeviceStatus ─────────────────────────────────────────────────

/// Last protocol-level outcome observed for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    ChannelStatus,
    ChannelFailed,
    LiveTvReady,
    MissingTeleportName,
    InvalidKey,
    Screen(Screen),
    CantConnect,
    CantReceive,
    Error,
}

impl DeviceStatus {
    /// Whether this status records a failure of any kind.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::ChannelFailed
                | Self::MissingTeleportName
                | Self::InvalidKey
                | Self::CantConnect
                | Self::CantReceive
                | Self::Error
        )
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChannelStatus => f.write_str("CH_STATUS"),
            Self::ChannelFailed => f.write_str("CH_FAILED"),
            Self::LiveTvReady => f.write_str("LIVETV_READY"),
            Self::MissingTeleportName => f.write_str("MISSING_TELEPORT_NAME"),
            Self::InvalidKey => f.write_str("INVALID_KEY"),
            Self::Screen(screen) => screen.fmt(f),
            Self::CantConnect => f.write_str("Can't connect"),
            Self::CantReceive => f.write_str("Can't receive"),
            Self::Error => f.write_str("ERROR"),
        }
    }
}

// ── Response ─────────────────────────────────────────────────────

/// One parsed status line from a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// `CH_STATUS <channel> [<subchannel>] <reason>`
    ChannelStatus {
        channel: String,
        subchannel: Option<String>,
        reason: StatusReason,
    },
    /// `CH_FAILED [<reason>]`
    ChannelFailed { reason: Option<FailureReason> },
    /// `LIVETV_READY`
    LiveTvReady,
    /// `MISSING_TELEPORT_NAME`
    MissingTeleportName,
    /// `INVALID_KEY`: undocumented, seen in the wild.
    InvalidKey,
    /// A bare screen name.
    Screen(Screen),
    /// Anything else, kept verbatim.
    Unrecognized(String),
}

impl Response {
    /// Parse one trimmed status line. Never fails.
    pub fn parse(text: &str) -> Self {
        let words: Vec<&str> = text.split_whitespace().collect();

        match words.as_slice() {
            ["CH_STATUS", channel, reason] => Response::ChannelStatus {
                channel: channel.to_string(),
                subchannel: None,
                reason: StatusReason::from_token(reason),
            },
            ["CH_STATUS", channel, subchannel, reason] => Response::ChannelStatus {
                channel: channel.to_string(),
                subchannel: Some(subchannel.to_string()),
                reason: StatusReason::from_token(reason),
            },
            ["CH_FAILED"] => Response::ChannelFailed { reason: None },
            ["CH_FAILED", reason, ..] => Response::ChannelFailed {
                reason: Some(FailureReason::from_token(reason)),
            },
            ["LIVETV_READY", ..] => Response::LiveTvReady,
            ["MISSING_TELEPORT_NAME", ..] => Response::MissingTeleportName,
            ["INVALID_KEY", ..] => Response::InvalidKey,
            [first, ..] => match Screen::ALL.into_iter().find(|s| s.as_str() == *first) {
                Some(screen) => Response::Screen(screen),
                None => Response::Unrecognized(text.to_string()),
            },
            [] => Response::Unrecognized(text.to_string()),
        }
    }

    /// Status recorded on the device after this response.
    pub fn status(&self) -> DeviceStatus {
        match self {
            Response::ChannelStatus { .. } => DeviceStatus::ChannelStatus,
            Response::ChannelFailed { .. } => DeviceStatus::ChannelFailed,
            Response::LiveTvReady => DeviceStatus::LiveTvReady,
            Response::MissingTeleportName => DeviceStatus::MissingTeleportName,
            Response::InvalidKey => DeviceStatus::InvalidKey,
            Response::Screen(screen) => DeviceStatus::Screen(*screen),
            Response::Unrecognized(_) => DeviceStatus::Error,
        }
    }

    /// The `CH_STATUS <channel> REMOTE` line a device sends on connect.
    pub fn remote_status(channel: impl ToString) -> Self {
        Response::ChannelStatus {
            channel: channel.to_string(),
            subchannel: None,
            reason: StatusReason::Remote,
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::ChannelStatus {
                channel,
                subchannel: Some(sub),
                reason,
            } => write!(f, "CH_STATUS {channel} {sub} {reason}"),
            Response::ChannelStatus {
                channel,
                subchannel: None,
                reason,
            } => write!(f, "CH_STATUS {channel} {reason}"),
            Response::ChannelFailed { reason: Some(reason) } => write!(f, "CH_FAILED {reason}"),
            Response::ChannelFailed { reason: None } => f.write_str("CH_FAILED"),
            Response::LiveTvReady => f.write_str("LIVETV_READY"),
            Response::MissingTeleportName => f.write_str("MISSING_TELEPORT_NAME"),
            Response::InvalidKey => f.write_str("INVALID_KEY"),
            Response::Screen(screen) => screen.fmt(f),
            Response::Unrecognized(text) => f.write_str(text),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
