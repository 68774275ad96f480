//! In-memory registry of known devices.
//!
//! The registry is the single source of truth for which devices exist and
//! what was last learned about them. Records are created from the
//! startup identity→host table or from the first beacon of an unseen
//! identity, updated by beacons and session responses, and never removed.
//!
//! All mutation goes through one `Mutex`; the lock is never held while
//! subscriber callbacks run or across an `.await`.

use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::protocol::{DeviceStatus, Reason, Response, Screen};

type DeviceAddedCallback = Box<dyn Fn(&DeviceRecord) + Send + Sync + 'static>;
type StatusChangedCallback = Box<dyn Fn() + Send + Sync + 'static>;

// ── DeviceRecord ─────────────────────────────────────────────────

/// Everything known about one device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    /// Opaque, globally unique, immutable key.
    pub identity: String,
    /// Display name from the beacon, e.g. `DVR 67F2`.
    pub machine: Option<String>,
    /// Host name, configured or reverse-resolved.
    pub host: Option<String>,
    pub address: Option<IpAddr>,
    /// Control port override; `None` means the protocol default.
    pub port: Option<u16>,

    /// Last known UI context.
    pub screen: Screen,
    pub status: Option<DeviceStatus>,
    pub channel: Option<String>,
    pub subchannel: Option<String>,
    pub reason: Option<Reason>,

    pub last_msg_sent: Option<String>,
    pub last_msg_rcvd: Option<String>,
    pub last_msg_rcvd_time: Option<Instant>,
    /// Number of beacons heard from this identity.
    pub ping_count: u64,
}

impl DeviceRecord {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            machine: None,
            host: None,
            address: None,
            port: None,
            screen: Screen::default(),
            status: None,
            channel: None,
            subchannel: None,
            reason: None,
            last_msg_sent: None,
            last_msg_rcvd: None,
            last_msg_rcvd_time: None,
            ping_count: 0,
        }
    }

    /// Control port, falling back to `default_port`.
    pub fn control_port_or(&self, default_port: u16) -> u16 {
        self.port.unwrap_or(default_port)
    }

    /// Name used in log lines and listings: host, else address, else identity.
    pub fn display_host(&self) -> String {
        if let Some(host) = &self.host {
            host.clone()
        } else if let Some(addr) = self.address {
            addr.to_string()
        } else {
            self.identity.clone()
        }
    }

    /// Time since the last message was received, if any.
    pub fn since_last_message(&self) -> Option<Duration> {
        self.last_msg_rcvd_time.map(|t| t.elapsed())
    }

    /// Which field of this record equals `name`, checked in
    /// [`MatchField`] priority order.
    pub fn matches(&self, name: &str) -> Option<MatchField> {
        MatchField::PRIORITY
            .into_iter()
            .find(|field| field.matches(self, name))
    }

    /// Record a received status line and fold its parsed meaning into
    /// the record. `channel`/`subchannel` change only on `CH_STATUS`.
    pub fn apply_response(&mut self, text: &str) -> Response {
        self.last_msg_rcvd = Some(text.to_string());
        self.last_msg_rcvd_time = Some(Instant::now());

        let response = Response::parse(text);
        self.status = Some(response.status());

        match &response {
            Response::ChannelStatus {
                channel,
                subchannel,
                reason,
            } => {
                self.channel = Some(channel.clone());
                self.subchannel = subchannel.clone();
                self.reason = Some(Reason::Status(reason.clone()));
            }
            Response::ChannelFailed { reason } => {
                self.reason = reason.clone().map(Reason::Failure);
            }
            Response::Screen(screen) => self.screen = *screen,
            Response::LiveTvReady
            | Response::MissingTeleportName
            | Response::InvalidKey
            | Response::Unrecognized(_) => {}
        }
        response
    }

    /// Record a transport failure as state.
    pub fn record_failure(&mut self, status: DeviceStatus, reason: impl Into<String>) {
        self.status = Some(status);
        self.reason = Some(Reason::Connection(reason.into()));
    }
}

// ── MatchField ───────────────────────────────────────────────────

/// Record fields a user-supplied device name is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchField {
    Identity,
    Machine,
    Address,
    Host,
}

impl MatchField {
    /// Lookup priority: an identity match beats a machine match on any
    /// other record, and so on down the list.
    pub const PRIORITY: [MatchField; 4] = [
        MatchField::Identity,
        MatchField::Machine,
        MatchField::Address,
        MatchField::Host,
    ];

    fn matches(self, record: &DeviceRecord, name: &str) -> bool {
        match self {
            MatchField::Identity => record.identity == name,
            MatchField::Machine => record.machine.as_deref() == Some(name),
            MatchField::Address => record.address.is_some_and(|a| a.to_string() == name),
            MatchField::Host => record.host.as_deref() == Some(name),
        }
    }
}

// ── DeviceUpdate ─────────────────────────────────────────────────

/// Fields offered to [`DeviceRegistry::upsert`]. Each one fills the
/// record only where it is still unset.
#[derive(Debug, Clone, Default)]
pub struct DeviceUpdate {
    pub machine: Option<String>,
    pub host: Option<String>,
    pub address: Option<IpAddr>,
    pub port: Option<u16>,
    /// A beacon was heard: bump `ping_count` and the receive timestamp.
    pub heard: bool,
}

impl DeviceUpdate {
    /// Update for a device named in the startup identity→host table.
    pub fn configured(host: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
            ..Default::default()
        }
    }
}

/// Result of [`DeviceRegistry::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Added,
    Updated,
}

// ── DeviceRegistry ───────────────────────────────────────────────

/// Thread-safe table of [`DeviceRecord`]s in insertion order.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: Mutex<Vec<DeviceRecord>>,
    device_added: RwLock<Vec<DeviceAddedCallback>>,
    status_changed: RwLock<Vec<StatusChangedCallback>>,
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("devices", &*self.lock())
            .finish_non_exhaustive()
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<DeviceRecord>> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Subscriptions ────────────────────────────────────────────

    /// Register a callback run after a record is created.
    pub fn on_device_added<F>(&self, f: F)
    where
        F: Fn(&DeviceRecord) + Send + Sync + 'static,
    {
        self.device_added
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(f));
    }

    /// Register a callback run after any record changes.
    pub fn on_status_changed<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.status_changed
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(f));
    }

    /// Run the status-changed callbacks.
    pub fn notify_status_changed(&self) {
        let callbacks = self
            .status_changed
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for callback in callbacks.iter() {
            callback();
        }
    }

    fn notify_device_added(&self, record: &DeviceRecord) {
        let callbacks = self
            .device_added
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for callback in callbacks.iter() {
            callback(record);
        }
    }

    // ── Mutation ─────────────────────────────────────────────────

    /// Create the record for `identity`, or merge `update` into it.
    pub fn upsert(&self, identity: &str, update: DeviceUpdate) -> Upsert {
        let (outcome, snapshot) = {
            let mut devices = self.lock();
            let (outcome, record) = match devices.iter().position(|d| d.identity == identity) {
                Some(index) => (Upsert::Updated, &mut devices[index]),
                None => {
                    devices.push(DeviceRecord::new(identity));
                    let last = devices.len() - 1;
                    (Upsert::Added, &mut devices[last])
                }
            };

            if record.machine.is_none() {
                record.machine = update.machine;
            }
            if record.host.is_none() {
                record.host = update.host;
            }
            if record.address.is_none() {
                record.address = update.address;
            }
            if record.port.is_none() {
                record.port = update.port;
            }
            if update.heard {
                record.ping_count += 1;
                record.last_msg_rcvd = Some("HELLO".to_string());
                record.last_msg_rcvd_time = Some(Instant::now());
            }
            (outcome, record.clone())
        };

        match outcome {
            Upsert::Added => {
                debug!(device = %snapshot.identity, host = %snapshot.display_host(), "added device");
                self.notify_device_added(&snapshot);
            }
            Upsert::Updated => {
                debug!(device = %snapshot.identity, pings = snapshot.ping_count, "updated device");
            }
        }
        outcome
    }

    /// Apply `f` to the record for `identity` and notify subscribers.
    ///
    /// Returns `None` when no such record exists.
    pub fn update<R>(&self, identity: &str, f: impl FnOnce(&mut DeviceRecord) -> R) -> Option<R> {
        let result = {
            let mut devices = self.lock();
            let Some(record) = devices.iter_mut().find(|d| d.identity == identity) else {
                warn!(device = %identity, "update for unknown device");
                return None;
            };
            f(record)
        };
        self.notify_status_changed();
        Some(result)
    }

    // ── Queries ──────────────────────────────────────────────────

    /// Copy of the record for exactly this identity.
    pub fn get(&self, identity: &str) -> Option<DeviceRecord> {
        self.lock().iter().find(|d| d.identity == identity).cloned()
    }

    /// First record matching `name` by identity, then machine, then
    /// address, then host.
    pub fn find(&self, name: &str) -> Option<DeviceRecord> {
        let devices = self.lock();
        MatchField::PRIORITY.into_iter().find_map(|field| {
            devices
                .iter()
                .find(|record| field.matches(record, name))
                .cloned()
        })
    }

    /// Copies of all records, in the order they were first seen.
    pub fn snapshot(&self) -> Vec<DeviceRecord> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

// ── Tests ────────────────────────────────────────────────────────
