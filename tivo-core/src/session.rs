//! Per-device TCP control session.
//!
//! A `DeviceSession` owns at most one live connection to its device and
//! writes every outcome back into the shared [`DeviceRegistry`]. Nothing
//! here returns an error to the caller: connect failures, timeouts and
//! unparseable responses all become `status` / `reason` on the record.
//!
//! Connecting makes a device announce its current channel, so `connect`
//! always reads one status line after the TCP handshake, and `getch`
//! is implemented as "drop the connection and connect again".
//!
//! A session is driven by one caller at a time; `&mut self` on every
//! operation enforces that, and [`Controller`](crate::Controller) keeps
//! each session behind its own async mutex.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{FutureExt, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, trace, warn};

use crate::codec::ControlCodec;
use crate::protocol::{
    CONTROL_PORT, Command, DEFAULT_TIMEOUT, DeviceStatus, IrCode, Reason, Response, Screen,
};
use crate::registry::DeviceRegistry;
use crate::resolve::{Resolver, SystemResolver};
use crate::state::ConnectionPhase;

type ControlStream = Framed<TcpStream, ControlCodec>;

/// How long to wait for a stray reply to a command sent without reading
/// one, before the next command that does read one.
const STRAY_REPLY_GRACE: Duration = Duration::from_millis(100);

pub struct DeviceSession {
    identity: String,
    registry: Arc<DeviceRegistry>,
    resolver: Arc<dyn Resolver>,
    timeout: Duration,
    default_port: u16,
    phase: ConnectionPhase,
    conn: Option<ControlStream>,
    /// A command went out without its reply, if any, being read.
    unanswered: bool,
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("identity", &self.identity)
            .field("phase", &self.phase)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl DeviceSession {
    /// Create a disconnected session for the record keyed by `identity`.
    pub fn new(identity: impl Into<String>, registry: Arc<DeviceRegistry>) -> Self {
        Self {
            identity: identity.into(),
            registry,
            resolver: Arc::new(SystemResolver),
            timeout: DEFAULT_TIMEOUT,
            default_port: CONTROL_PORT,
            phase: ConnectionPhase::default(),
            unanswered: false,
            conn: None,
        }
    }

    /// Use `resolver` for host → address lookups.
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Bound connect and receive by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Port used when the record carries no port of its own.
    pub fn with_default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn phase(&self) -> &ConnectionPhase {
        &self.phase
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    // ── Operations ───────────────────────────────────────────────

    /// Open the control connection if there is none, then read the status
    /// line the device sends on connect.
    ///
    /// Gives up quietly when no address is known yet; a later beacon will
    /// supply one.
    pub async fn connect(&mut self) {
        if self.conn.is_some() {
            return;
        }

        let Some(addr) = self.control_addr().await else {
            warn!(device = %self.identity, "no address yet");
            return;
        };

        if !self.phase.is_disconnected() {
            debug!(device = %self.identity, "stale phase {}; resetting", self.phase);
            self.phase.force_disconnect();
        }
        if let Err(e) = self.phase.begin_connect() {
            warn!(device = %self.identity, "{e}");
        }
        trace!(device = %self.identity, "connecting to TCP {addr}");

        match timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(device = %self.identity, "set_nodelay: {e}");
                }
                self.conn = Some(Framed::new(stream, ControlCodec));
                self.unanswered = false;
                if let Err(e) = self.phase.complete_connect() {
                    warn!(device = %self.identity, "{e}");
                }
                debug!(device = %self.identity, "connected to TCP {addr}");
                self.receive().await;
            }
            Ok(Err(e)) => {
                error!(device = %self.identity, "{addr} can't connect; {e}");
                self.connect_failed(e.to_string());
            }
            Err(_) => {
                warn!(device = %self.identity, "{addr} connect timeout");
                self.connect_failed("timeout");
            }
        }
    }

    /// Query the current channel with a fresh connection.
    pub async fn getch(&mut self) {
        self.reset();
        self.connect().await;
    }

    /// `KEYBOARD <text>`; no response is awaited.
    pub async fn send_key(&mut self, text: &str) {
        self.exchange(Command::Keyboard(text.to_string())).await;
    }

    /// `IRCODE <code>`, then read one response.
    pub async fn send_ircode(&mut self, code: IrCode) {
        self.exchange(Command::IrCode(code)).await;
    }

    /// `TELEPORT <screen>`, then read one response.
    pub async fn send_teleport(&mut self, screen: Screen) {
        self.exchange(Command::Teleport(screen)).await;
    }

    /// `SETCH <channel>`, then read one response.
    pub async fn send_setch(&mut self, channel: &str) {
        self.exchange(Command::SetChannel(channel.to_string())).await;
    }

    /// Drop the connection, if any.
    pub fn reset(&mut self) {
        if self.conn.take().is_some() {
            trace!(device = %self.identity, "closing connection");
        }
        self.unanswered = false;
        self.phase.force_disconnect();
    }

    // ── Internal ─────────────────────────────────────────────────

    /// Send `command` and, when the protocol defines a reply to it, read
    /// that reply.
    async fn exchange(&mut self, command: Command) {
        let expects_response = command.expects_response();
        if expects_response {
            self.discard_pending().await;
        }
        if !self.send(command).await {
            return;
        }
        if expects_response {
            self.receive().await;
        } else {
            self.unanswered = true;
        }
    }

    /// Drop replies nobody asked for so the next `receive` reads the
    /// answer to the command about to be sent.
    ///
    /// Bytes already buffered are discarded, then anything ready on the
    /// socket. After a command sent without reading its reply, stray
    /// replies get [`STRAY_REPLY_GRACE`] to arrive.
    async fn discard_pending(&mut self) {
        let grace = if std::mem::take(&mut self.unanswered) {
            STRAY_REPLY_GRACE.min(self.timeout)
        } else {
            Duration::ZERO
        };
        let Some(conn) = self.conn.as_mut() else {
            return;
        };
        conn.read_buffer_mut().clear();

        loop {
            let next = if grace.is_zero() {
                conn.next().now_or_never()
            } else {
                timeout(grace, conn.next()).await.ok()
            };
            match next {
                Some(Some(Ok(text))) => debug!(device = %self.identity, "discarding stray {text:?}"),
                Some(Some(Err(e))) => {
                    debug!(device = %self.identity, "connection failed while idle; {e}");
                    self.reset();
                    return;
                }
                Some(None) => {
                    debug!(device = %self.identity, "connection closed while idle");
                    self.reset();
                    return;
                }
                None => return,
            }
        }
    }

    /// Send one command, connecting first if needed. Returns whether the
    /// command went out; a command that can't be sent is dropped.
    async fn send(&mut self, command: Command) -> bool {
        if self.conn.is_none() {
            self.connect().await;
        }
        let Some(conn) = self.conn.as_mut() else {
            warn!(device = %self.identity, "not connected; dropping {command}");
            return false;
        };

        info!(device = %self.identity, "sending {command}");
        let text = command.to_string();
        match timeout(self.timeout, conn.send(command)).await {
            Ok(Ok(())) => {
                self.registry
                    .update(&self.identity, |rec| rec.last_msg_sent = Some(text));
                true
            }
            Ok(Err(e)) => {
                error!(device = %self.identity, "can't send; {e}");
                self.reset();
                false
            }
            Err(_) => {
                error!(device = %self.identity, "can't send; timeout");
                self.reset();
                false
            }
        }
    }

    /// Read and apply one response.
    async fn receive(&mut self) {
        let Some(conn) = self.conn.as_mut() else {
            return;
        };

        match timeout(self.timeout, conn.next()).await {
            Ok(Some(Ok(text))) => {
                trace!(device = %self.identity, "received {text:?}");
                let identity = self.identity.clone();
                let applied = self.registry.update(&identity, |rec| {
                    let response = rec.apply_response(&text);
                    (response, rec.reason.clone())
                });
                if let Some((response, reason)) = applied {
                    self.log_response(&response, reason.as_ref(), &text);
                }
            }
            Ok(Some(Err(e))) => {
                error!(device = %self.identity, "can't receive; {e}");
                self.reset();
                self.receive_failed(e.to_string());
            }
            Ok(None) => {
                warn!(device = %self.identity, "connection closed by device");
                self.reset();
                self.receive_failed("connection closed");
            }
            Err(_) => {
                // a late reply would answer the wrong command
                warn!(device = %self.identity, "receive timeout");
                self.reset();
                self.receive_failed("timeout");
            }
        }
    }

    fn log_response(&self, response: &Response, reason: Option<&Reason>, text: &str) {
        let device = &self.identity;
        if let Some(reason) = reason.filter(|r| !r.is_recognized()) {
            warn!(device = %device, "unknown reason {reason}");
        }
        match response {
            Response::ChannelStatus {
                channel,
                subchannel,
                reason,
            } => debug!(
                device = %device,
                "status CH_STATUS channel {channel} subchannel {subchannel:?}; reason {reason}"
            ),
            Response::ChannelFailed { reason } => {
                error!(device = %device, "status CH_FAILED reason {reason:?}")
            }
            Response::LiveTvReady => info!(device = %device, "status LIVETV_READY"),
            Response::MissingTeleportName | Response::InvalidKey => {
                error!(device = %device, "status {response}")
            }
            Response::Screen(screen) => debug!(device = %device, "screen {screen}"),
            Response::Unrecognized(_) => error!(device = %device, "can't parse {text:?}"),
        }
    }

    fn connect_failed(&mut self, reason: impl Into<String>) {
        self.conn = None;
        self.phase.force_disconnect();
        self.registry.update(&self.identity, |rec| {
            rec.record_failure(DeviceStatus::CantConnect, reason)
        });
    }

    fn receive_failed(&mut self, reason: impl Into<String>) {
        self.registry.update(&self.identity, |rec| {
            rec.last_msg_rcvd = None;
            rec.record_failure(DeviceStatus::CantReceive, reason)
        });
    }

    /// Control address from the record, resolving a configured host name
    /// on first use. Resolution failure leaves the address unset.
    async fn control_addr(&self) -> Option<SocketAddr> {
        let record = self.registry.get(&self.identity)?;
        let port = record.control_port_or(self.default_port);

        if let Some(ip) = record.address {
            return Some(SocketAddr::new(ip, port));
        }

        let host = record.host?;
        match self.resolver.lookup_host(&host).await {
            Ok(ip) => {
                debug!(device = %self.identity, "lookup_host({host:?}) => address {ip}");
                self.registry.update(&self.identity, |rec| {
                    rec.address.get_or_insert(ip);
                });
                Some(SocketAddr::new(ip, port))
            }
            Err(e) => {
                debug!(device = %self.identity, "{host:?} can't resolve; {e}");
                None
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::StatusReason;
    use crate::registry::DeviceUpdate;
    use crate::resolve::StaticResolver;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    /// Registry with one device pointing at `addr`.
    fn registry_for(addr: SocketAddr) -> Arc<DeviceRegistry> {
        let registry = Arc::new(DeviceRegistry::new());
        registry.upsert(
            "ABC",
            DeviceUpdate {
                address: Some(addr.ip()),
                port: Some(addr.port()),
                ..Default::default()
            },
        );
        registry
    }

    fn session(registry: &Arc<DeviceRegistry>) -> DeviceSession {
        DeviceSession::new("ABC", Arc::clone(registry))
            .with_resolver(Arc::new(StaticResolver::new()))
            .with_timeout(Duration::from_millis(500))
    }

    /// Accept one connection, announce `greeting`, then answer each
    /// received command with the matching entry of `replies`.
    async fn scripted_device(greeting: &'static str, replies: Vec<&'static str>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(greeting.as_bytes()).await.unwrap();
            let mut buf = [0u8; 1024];
            for reply in replies {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    return;
                }
                stream.write_all(reply.as_bytes()).await.unwrap();
            }
            // Hold the connection open until the client goes away.
            let _ = stream.read(&mut buf).await;
        });
        addr
    }

    #[tokio::test]
    async fn getch_reads_announced_channel() {
        let addr = scripted_device("CH_STATUS 101 REMOTE\r", vec![]).await;
        let registry = registry_for(addr);
        let mut session = session(&registry);

        session.getch().await;

        let rec = registry.get("ABC").unwrap();
        assert!(session.is_connected());
        assert!(session.phase().is_connected());
        assert_eq!(rec.status, Some(DeviceStatus::ChannelStatus));
        assert_eq!(rec.channel.as_deref(), Some("101"));
        assert_eq!(rec.reason, Some(Reason::Status(StatusReason::Remote)));
    }

    #[tokio::test]
    async fn setch_sends_and_parses_reply() {
        let addr = scripted_device("CH_STATUS 101 REMOTE\r", vec!["CH_STATUS 0702 LOCAL\r"]).await;
        let registry = registry_for(addr);
        let mut session = session(&registry);

        session.send_setch("702").await;

        let rec = registry.get("ABC").unwrap();
        assert_eq!(rec.last_msg_sent.as_deref(), Some("SETCH 702"));
        assert_eq!(rec.channel.as_deref(), Some("0702"));
        assert_eq!(rec.reason.unwrap().to_string(), "LOCAL");
    }

    #[tokio::test]
    async fn failed_channel_change_keeps_channel() {
        let addr = scripted_device("CH_STATUS 101 REMOTE\r", vec!["CH_FAILED INVALID_CHANNEL\r"]).await;
        let registry = registry_for(addr);
        let mut session = session(&registry);

        session.send_setch("99999").await;

        let rec = registry.get("ABC").unwrap();
        assert_eq!(rec.status, Some(DeviceStatus::ChannelFailed));
        assert_eq!(rec.reason.unwrap().to_string(), "INVALID_CHANNEL");
        assert_eq!(rec.channel.as_deref(), Some("101"));
    }

    #[tokio::test]
    async fn receive_timeout_is_recorded() {
        // The device never announces anything.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });
        let registry = registry_for(addr);
        let mut session = session(&registry).with_timeout(Duration::from_millis(100));

        session.getch().await;

        let rec = registry.get("ABC").unwrap();
        assert_eq!(rec.status.unwrap().to_string(), "Can't receive");
        assert_eq!(rec.reason.unwrap().to_string(), "timeout");
        assert_eq!(rec.channel, None);
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn late_reply_does_not_answer_next_command() {
        // First connection answers SETCH only after the client gave up;
        // the second behaves.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            let (mut slow, _) = listener.accept().await.unwrap();
            slow.write_all(b"CH_STATUS 101 LOCAL\r").await.unwrap();
            let _ = slow.read(&mut buf).await;
            tokio::time::sleep(Duration::from_millis(300)).await;
            let _ = slow.write_all(b"CH_STATUS 200 REMOTE\r").await;

            let (mut fresh, _) = listener.accept().await.unwrap();
            fresh.write_all(b"CH_STATUS 101 LOCAL\r").await.unwrap();
            let _ = fresh.read(&mut buf).await;
            fresh.write_all(b"CH_STATUS 102 REMOTE\r").await.unwrap();
            let _ = fresh.read(&mut buf).await;
        });
        let registry = registry_for(addr);
        let mut session = session(&registry).with_timeout(Duration::from_millis(100));

        session.send_setch("200").await;
        let rec = registry.get("ABC").unwrap();
        assert_eq!(rec.reason.unwrap().to_string(), "timeout");
        assert!(!session.is_connected());

        tokio::time::sleep(Duration::from_millis(300)).await;
        session.send_ircode(IrCode::ChannelUp).await;

        let rec = registry.get("ABC").unwrap();
        assert_eq!(rec.status, Some(DeviceStatus::ChannelStatus));
        assert_eq!(rec.channel.as_deref(), Some("102"));
    }

    #[tokio::test]
    async fn keyboard_reply_does_not_answer_next_command() {
        let addr = scripted_device(
            "CH_STATUS 101 LOCAL\r",
            vec!["CH_STATUS 101 LOCAL\r", "CH_STATUS 102 REMOTE\r"],
        )
        .await;
        let registry = registry_for(addr);
        let mut session = session(&registry);

        session.send_key("A").await;
        session.send_ircode(IrCode::ChannelUp).await;

        let rec = registry.get("ABC").unwrap();
        assert!(session.is_connected());
        assert_eq!(rec.channel.as_deref(), Some("102"));
        assert_eq!(rec.reason, Some(Reason::Status(StatusReason::Remote)));
    }

    #[tokio::test]
    async fn repeated_getch_walks_phases_cleanly() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut open = Vec::new();
            for channel in ["101", "102", "103"] {
                let (mut stream, _) = listener.accept().await.unwrap();
                let status = format!("CH_STATUS {channel} LOCAL\r");
                stream.write_all(status.as_bytes()).await.unwrap();
                open.push(stream);
            }
        });
        let registry = registry_for(addr);
        let mut session = session(&registry);

        for channel in ["101", "102", "103"] {
            session.getch().await;
            assert!(session.phase().is_connected());
            assert_eq!(registry.get("ABC").unwrap().channel.as_deref(), Some(channel));
        }

        session.reset();
        assert!(session.phase().is_disconnected());
    }

    #[tokio::test]
    async fn refused_connection_is_state_not_error() {
        // Bind then drop to find a port nobody listens on.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let registry = registry_for(addr);
        let mut session = session(&registry);

        session.send_ircode(IrCode::ChannelUp).await;

        let rec = registry.get("ABC").unwrap();
        assert!(!session.is_connected());
        assert!(session.phase().is_disconnected());
        assert_eq!(rec.status, Some(DeviceStatus::CantConnect));
        assert_eq!(rec.last_msg_sent, None);
    }

    #[tokio::test]
    async fn no_address_drops_command() {
        let registry = Arc::new(DeviceRegistry::new());
        registry.upsert("ABC", DeviceUpdate::configured("nowhere.invalid"));
        let mut session = session(&registry);

        session.send_key("A").await;

        let rec = registry.get("ABC").unwrap();
        assert_eq!(rec.address, None);
        assert_eq!(rec.status, None);
        assert_eq!(rec.last_msg_sent, None);
    }

    #[tokio::test]
    async fn host_resolves_address_on_first_connect() {
        let addr = scripted_device("CH_STATUS 5 REMOTE", vec![]).await;
        let registry = Arc::new(DeviceRegistry::new());
        registry.upsert(
            "ABC",
            DeviceUpdate {
                host: Some("den".into()),
                port: Some(addr.port()),
                ..Default::default()
            },
        );
        let resolver = StaticResolver::new().with_host("den", LOCALHOST);
        let mut session = DeviceSession::new("ABC", Arc::clone(&registry))
            .with_resolver(Arc::new(resolver))
            .with_timeout(Duration::from_millis(500));

        session.connect().await;

        let rec = registry.get("ABC").unwrap();
        assert_eq!(rec.address, Some(LOCALHOST));
        assert_eq!(rec.channel.as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn closed_connection_is_dropped() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });
        let registry = registry_for(addr);
        let mut session = session(&registry);

        session.connect().await;

        assert!(!session.is_connected());
        let rec = registry.get("ABC").unwrap();
        assert_eq!(rec.status, Some(DeviceStatus::CantReceive));
    }
}
