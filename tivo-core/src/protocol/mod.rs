//! Wire formats shared by the client and the emulator.
//!
//! Two channels exist per device:
//!
//! - **Discovery**: newline-separated `key=value` ASCII datagrams
//!   broadcast to UDP port [`DISCOVERY_PORT`] (see [`beacon`]).
//! - **Control**: a TCP stream to [`CONTROL_PORT`]. Commands are single
//!   ASCII lines terminated by a bare carriage return (see [`command`]);
//!   the device answers with one status line per command (see [`response`]).

use std::time::Duration;

pub mod beacon;
pub mod command;
pub mod response;

pub use beacon::Beacon;
pub use command::{Command, IrCode, Screen};
pub use response::{DeviceStatus, FailureReason, Reason, Response, StatusReason};

// ── Constants ────────────────────────────────────────────────────

/// UDP port devices broadcast their beacons to.
pub const DISCOVERY_PORT: u16 = 2190;

/// TCP port of the control channel on a real device.
pub const CONTROL_PORT: u16 = 31339;

/// Largest discovery datagram read from the socket.
pub const MAX_DATAGRAM_SIZE: usize = 1024;

/// Largest unterminated control message yielded by the codec in one piece.
pub const MAX_MESSAGE_SIZE: usize = 1024;

/// Terminator appended to every control command.
pub const COMMAND_TERMINATOR: u8 = b'\r';

/// Connect and receive timeout for control sessions.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);
