//! # tivo-emulator: Emulated Set-Top Units
//!
//! Impersonates one or more TiVo devices on the local network so the
//! remote can be exercised without hardware. Each emulated unit:
//!
//! - broadcasts a discovery beacon on the discovery port at a fixed or
//!   jittered interval, and
//! - serves the control protocol on its own TCP port, announcing its
//!   channel on connect and after every command it receives.
//!
//! Only `IRCODE CHANNELUP` and `IRCODE CHANNELDOWN` change state; every
//! other command is logged and answered with the unchanged channel.

pub mod beacon;
pub mod config;
pub mod device;
pub mod listener;
pub mod service;
