//! Discovery beacon payloads.
//!
//! A beacon is newline-separated `key=value` ASCII text:
//!
//! ```text
//! tivoconnect=1
//! swversion=20.7.4d.RC2-746-2-746
//! method=broadcast
//! identity=7460001902767F2
//! machine=DVR 67F2
//! platform=tcd/Series4
//! services=TiVoMediaServer:80/http
//! port=31339
//! ```
//!
//! Only `identity` and `machine` are required. `port` is an extension
//! emitted by the emulator; real devices omit it.

use crate::error::TivoError;

/// The fields of a beacon the registry cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Beacon {
    pub identity: String,
    pub machine: String,
    /// Control port override, when the sender advertises one.
    pub port: Option<u16>,
}

impl Beacon {
    /// Parse a raw datagram. Keys may appear in any order, unknown keys
    /// are ignored, and an unparseable `port` is treated as absent.
    pub fn parse(payload: &[u8]) -> Result<Self, TivoError> {
        let text = String::from_utf8_lossy(payload);

        let mut identity = None;
        let mut machine = None;
        let mut port = None;

        for line in text.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key.trim() {
                "identity" => identity = Some(value.to_string()),
                "machine" => machine = Some(value.to_string()),
                "port" => port = value.parse::<u16>().ok(),
                _ => {}
            }
        }

        match (identity, machine) {
            (Some(identity), Some(machine)) => Ok(Self {
                identity,
                machine,
                port,
            }),
            (None, _) => Err(TivoError::MalformedBeacon(format!(
                "missing identity in {:?}",
                text.trim_end()
            ))),
            (_, None) => Err(TivoError::MalformedBeacon(format!(
                "missing machine in {:?}",
                text.trim_end()
            ))),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
