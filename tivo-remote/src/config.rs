//! Configuration for the command-line remote.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use tivo_core::{CONTROL_PORT, DISCOVERY_PORT};

/// Default config file name, looked up in the home directory.
pub const CONFIG_FILE: &str = ".tivo.toml";

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Known devices: identity → host name.
    pub identity: BTreeMap<String, String>,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// UDP port beacons arrive on.
    pub discovery_port: u16,
    /// Control port for devices that don't advertise one.
    pub control_port: u16,
    /// Connect and receive timeout, in milliseconds.
    pub timeout_ms: u64,
    /// How long to listen for beacons before giving up on a name.
    pub discover_ms: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            discovery_port: DISCOVERY_PORT,
            control_port: CONTROL_PORT,
            timeout_ms: 2000,
            discover_ms: 3000,
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

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn discover(&self) -> Duration {
        Duration::from_millis(self.discover_ms)
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl RemoteConfig {
    /// `~/.tivo.toml`, or `.tivo.toml` when there is no home directory.
    pub fn default_path() -> PathBuf {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_default()
            .join(CONFIG_FILE)
    }

    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

// ── Tests ────────────────────────────────────────────────────────
