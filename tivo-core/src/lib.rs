//! # tivo-core
//!
//! Protocol engine for driving TiVo set-top devices over the local network.
//!
//! This crate contains:
//! - **Protocol types**: `Command`, `IrCode`, `Screen`, `Response`, `Beacon`
//! - **Codec**: `ControlCodec` for carriage-return framed TCP I/O via `tokio_util`
//! - **Registry**: `DeviceRegistry`, the in-memory table of known devices
//! - **Session**: `DeviceSession`, the lazily connected per-device control channel
//! - **Control**: `Controller`, the session pool and the remote-control operations
//! - **Discovery**: `DiscoveryListener`, the UDP beacon listener
//! - **Error**: `TivoError`: typed, `thiserror`-based error hierarchy

pub mod codec;
pub mod control;
pub mod discovery;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod resolve;
pub mod session;
pub mod state;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::ControlCodec;
pub use control::{ChannelReport, Controller, RemoteAction};
pub use discovery::DiscoveryListener;
pub use error::{Result, TivoError};
pub use protocol::{
    Beacon, CONTROL_PORT, Command, DEFAULT_TIMEOUT, DISCOVERY_PORT, DeviceStatus, FailureReason,
    IrCode, Reason, Response, Screen, StatusReason,
};
pub use registry::{DeviceRecord, DeviceRegistry, DeviceUpdate, MatchField, Upsert};
pub use resolve::{Resolver, StaticResolver, SystemResolver};
pub use session::DeviceSession;
pub use state::ConnectionPhase;
