//! Remote-control operations over the device registry.
//!
//! `Controller` owns one [`DeviceSession`] per device identity, created on
//! first use, and exposes the user-facing operations (get/set channel,
//! channel up/down, IR codes, keystrokes, teleport). Operations address
//! devices by any name [`DeviceRegistry::find`] understands and report the
//! device's latest channel and status rather than failing; the only error
//! is a name that matches no device.
//!
//! Each session sits behind its own `tokio::sync::Mutex`, so two callers
//! driving the same device are serialised instead of interleaving
//! commands on one connection.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tracing::info;

use crate::error::{Result, TivoError};
use crate::protocol::{CONTROL_PORT, DEFAULT_TIMEOUT, DeviceStatus, IrCode, Reason, Screen};
use crate::registry::{DeviceRecord, DeviceRegistry, DeviceUpdate};
use crate::resolve::{Resolver, SystemResolver};
use crate::session::DeviceSession;

pub type SharedSession = Arc<AsyncMutex<DeviceSession>>;

// ── RemoteAction ─────────────────────────────────────────────────

/// Every action a front end can ask of a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteAction {
    GetChannel,
    SetChannel(String),
    ChannelUp,
    ChannelDown,
    IrCode(IrCode),
    Key(String),
    Teleport(Screen),
}

impl fmt::Display for RemoteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteAction::GetChannel => write!(f, "get channel"),
            RemoteAction::SetChannel(ch) => write!(f, "set channel {ch}"),
            RemoteAction::ChannelUp => write!(f, "channel up"),
            RemoteAction::ChannelDown => write!(f, "channel down"),
            RemoteAction::IrCode(code) => write!(f, "ircode {code}"),
            RemoteAction::Key(text) => write!(f, "key {text}"),
            RemoteAction::Teleport(screen) => write!(f, "teleport {screen}"),
        }
    }
}

// ── ChannelReport ────────────────────────────────────────────────

/// What a control operation reports back: the device's channel and
/// latest status after the operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelReport {
    pub host: String,
    pub channel: Option<String>,
    pub subchannel: Option<String>,
    pub status: Option<DeviceStatus>,
    pub reason: Option<Reason>,
}

impl From<&DeviceRecord> for ChannelReport {
    fn from(record: &DeviceRecord) -> Self {
        Self {
            host: record.display_host(),
            channel: record.channel.clone(),
            subchannel: record.subchannel.clone(),
            status: record.status,
            reason: record.reason.clone(),
        }
    }
}

impl ChannelReport {
    /// Whether the last exchange ended in an error status.
    pub fn is_error(&self) -> bool {
        self.status.is_some_and(|s| s.is_error())
    }
}

impl fmt::Display for ChannelReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channel = self.channel.as_deref().unwrap_or("None");
        match &self.subchannel {
            Some(sub) => write!(f, "{} is tuned to channel {channel}-{sub}", self.host)?,
            None => write!(f, "{} is tuned to channel {channel}", self.host)?,
        }
        if let Some(status) = self.status.filter(|s| s.is_error()) {
            write!(f, " ({status}")?;
            if let Some(reason) = &self.reason {
                write!(f, ": {reason}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

// ── Controller ───────────────────────────────────────────────────

pub struct Controller {
    registry: Arc<DeviceRegistry>,
    resolver: Arc<dyn Resolver>,
    timeout: Duration,
    default_port: u16,
    sessions: Mutex<HashMap<String, SharedSession>>,
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("registry", &self.registry)
            .field("timeout", &self.timeout)
            .field("default_port", &self.default_port)
            .finish_non_exhaustive()
    }
}

impl Controller {
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        Self {
            registry,
            resolver: Arc::new(SystemResolver),
            timeout: DEFAULT_TIMEOUT,
            default_port: CONTROL_PORT,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Connect/receive timeout for every session.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Control port for devices that don't advertise one.
    pub fn with_default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn resolver(&self) -> &Arc<dyn Resolver> {
        &self.resolver
    }

    /// Register devices from the startup identity → host table.
    pub fn add_configured<'a, I>(&self, table: I)
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (identity, host) in table {
            self.registry
                .upsert(identity, DeviceUpdate::configured(host.clone()));
            info!(device = %identity, "{host:?} configured device");
        }
    }

    /// The session for `identity`, created on first use.
    pub fn session(&self, identity: &str) -> SharedSession {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(sessions.entry(identity.to_string()).or_insert_with(|| {
            Arc::new(AsyncMutex::new(
                DeviceSession::new(identity, Arc::clone(&self.registry))
                    .with_resolver(Arc::clone(&self.resolver))
                    .with_timeout(self.timeout)
                    .with_default_port(self.default_port),
            ))
        }))
    }

    /// Resolve a user-supplied name to a record.
    pub fn lookup(&self, name: &str) -> Result<DeviceRecord> {
        self.registry
            .find(name)
            .ok_or_else(|| TivoError::DeviceNotFound(name.to_string()))
    }

    // ── Operations ───────────────────────────────────────────────

    /// Run `action` against the device called `name`.
    pub async fn perform(&self, name: &str, action: RemoteAction) -> Result<ChannelReport> {
        let identity = self.lookup(name)?.identity;
        info!(device = %identity, "{action}");

        {
            let session = self.session(&identity);
            let mut session = session.lock().await;
            match action {
                RemoteAction::GetChannel => session.getch().await,
                RemoteAction::SetChannel(channel) => session.send_setch(&channel).await,
                RemoteAction::ChannelUp => session.send_ircode(IrCode::ChannelUp).await,
                RemoteAction::ChannelDown => session.send_ircode(IrCode::ChannelDown).await,
                RemoteAction::IrCode(code) => session.send_ircode(code).await,
                RemoteAction::Key(text) => session.send_key(&text).await,
                RemoteAction::Teleport(screen) => session.send_teleport(screen).await,
            }
        }

        self.report(&identity)
    }

    pub async fn getch(&self, name: &str) -> Result<ChannelReport> {
        self.perform(name, RemoteAction::GetChannel).await
    }

    pub async fn setch(&self, name: &str, channel: &str) -> Result<ChannelReport> {
        self.perform(name, RemoteAction::SetChannel(channel.to_string()))
            .await
    }

    pub async fn channel_up(&self, name: &str) -> Result<ChannelReport> {
        self.perform(name, RemoteAction::ChannelUp).await
    }

    pub async fn channel_down(&self, name: &str) -> Result<ChannelReport> {
        self.perform(name, RemoteAction::ChannelDown).await
    }

    pub async fn send_ircode(&self, name: &str, code: IrCode) -> Result<ChannelReport> {
        self.perform(name, RemoteAction::IrCode(code)).await
    }

    pub async fn send_key(&self, name: &str, text: &str) -> Result<ChannelReport> {
        self.perform(name, RemoteAction::Key(text.to_string())).await
    }

    pub async fn send_teleport(&self, name: &str, screen: Screen) -> Result<ChannelReport> {
        self.perform(name, RemoteAction::Teleport(screen)).await
    }

    /// Forced status query by exact identity, used when a beacon is heard.
    pub async fn refresh(&self, identity: &str) {
        let session = self.session(identity);
        session.lock().await.getch().await;
    }

    fn report(&self, identity: &str) -> Result<ChannelReport> {
        self.registry
            .get(identity)
            .map(|rec| ChannelReport::from(&rec))
            .ok_or_else(|| TivoError::DeviceNotFound(identity.to_string()))
    }
}

// ── Tests ────────────────────────────────────────────────────────
