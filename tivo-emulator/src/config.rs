//! Configuration for the device emulator.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use tivo_core::{CONTROL_PORT, DISCOVERY_PORT, TivoError};

use crate::device::MAX_DEVICES;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    /// Emulated units and their network behaviour.
    pub emulator: EmulatorSection,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Emulated unit settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorSection {
    /// How many units to run (1 to 7).
    pub num_devices: usize,
    /// Seconds between beacons. `0` makes unit N beacon every N seconds.
    pub interval_secs: f64,
    /// Draw each beacon interval from 50–150% of `interval_secs`.
    pub randomize: bool,
    /// Delay between starting successive units, in seconds.
    pub stagger_secs: f64,
    /// Where beacons are sent.
    pub broadcast_address: IpAddr,
    /// UDP port beacons are sent to.
    pub discovery_port: u16,
    /// Control port of unit 1; unit N listens on `base_port + N - 1`.
    /// `0` lets the OS pick a port per unit.
    pub base_port: u16,
    /// Address the control listeners bind to.
    pub bind_address: IpAddr,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for EmulatorSection {
    fn default() -> Self {
        Self {
            num_devices: 1,
            interval_secs: 60.0,
            randomize: false,
            stagger_secs: 0.0,
            broadcast_address: IpAddr::V4(Ipv4Addr::BROADCAST),
            discovery_port: DISCOVERY_PORT,
            base_port: CONTROL_PORT,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl EmulatorConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }
}

impl EmulatorSection {
    /// Reject settings the emulator can't run with.
    pub fn validate(&self) -> Result<(), TivoError> {
        if !(1..=MAX_DEVICES).contains(&self.num_devices) {
            return Err(TivoError::Other(format!(
                "num_devices must be from 1 to {MAX_DEVICES}, got {}",
                self.num_devices
            )));
        }
        // randomized intervals reach 150% of the configured one
        let longest = if self.randomize {
            self.interval_secs * 1.5
        } else {
            self.interval_secs
        };
        if Duration::try_from_secs_f64(longest).is_err() {
            return Err(TivoError::Other(format!(
                "interval must be a non-negative number of seconds, got {}",
                self.interval_secs
            )));
        }
        if Duration::try_from_secs_f64(self.stagger_secs).is_err() {
            return Err(TivoError::Other(format!(
                "stagger must be a non-negative number of seconds, got {}",
                self.stagger_secs
            )));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        seconds(self.interval_secs)
    }

    pub fn stagger(&self) -> Duration {
        seconds(self.stagger_secs)
    }

    /// Destination of every beacon.
    pub fn beacon_target(&self) -> SocketAddr {
        SocketAddr::new(self.broadcast_address, self.discovery_port)
    }
}

/// Saturating conversion for settings that skipped `validate`.
fn seconds(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
}

// ── Tests ────────────────────────────────────────────────────────
