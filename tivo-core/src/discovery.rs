//! UDP discovery: listen for device beacons and keep the registry current.
//!
//! Every datagram on the discovery port is parsed as a [`Beacon`]. A new
//! identity gets a record (host name reverse-resolved from the sender's
//! address); a known one has any still-unset fields filled in and its
//! ping count bumped. Either way the device is then queried for its
//! channel through the [`Controller`] and subscribers are told that
//! status may have changed.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::control::Controller;
use crate::error::{Result, TivoError};
use crate::protocol::{Beacon, DISCOVERY_PORT, MAX_DATAGRAM_SIZE};
use crate::registry::DeviceUpdate;

/// Pause after a failed `recv_from` before trying again.
const RECV_RETRY_DELAY: Duration = Duration::from_millis(100);

pub struct DiscoveryListener {
    socket: UdpSocket,
    controller: Arc<Controller>,
}

impl DiscoveryListener {
    /// Bind the discovery socket on all interfaces at the standard port.
    pub async fn bind_default(controller: Arc<Controller>) -> Result<Self> {
        Self::bind(
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DISCOVERY_PORT),
            controller,
        )
        .await
    }

    /// Bind the discovery socket at `addr`.
    ///
    /// The socket is opened with address reuse so several listeners on
    /// one host can share the port, and with broadcast enabled.
    pub async fn bind(addr: SocketAddr, controller: Arc<Controller>) -> Result<Self> {
        let socket = open_socket(addr).map_err(|source| TivoError::Bind {
            port: addr.port(),
            source,
        })?;
        info!("listening for beacons on UDP {}", socket.local_addr()?);
        Ok(Self { socket, controller })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn controller(&self) -> &Arc<Controller> {
        &self.controller
    }

    /// Receive and process beacons until the task is dropped.
    ///
    /// Socket errors are logged and the loop carries on.
    pub async fn run(self) {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((n, from)) => self.handle_datagram(&buf[..n], from).await,
                Err(e) => {
                    warn!("discovery receive failed: {e}");
                    tokio::time::sleep(RECV_RETRY_DELAY).await;
                }
            }
        }
    }

    /// Run the listener on its own task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Process one datagram received from `from`.
    pub async fn handle_datagram(&self, payload: &[u8], from: SocketAddr) {
        let beacon = match Beacon::parse(payload) {
            Ok(beacon) => beacon,
            Err(e) => {
                warn!("dropping datagram from {from}: {e}");
                return;
            }
        };
        trace!(device = %beacon.identity, "beacon from {from}");

        let registry = self.controller.registry();
        let address = from.ip();

        let host = if registry.get(&beacon.identity).is_none() {
            let host = match self.controller.resolver().lookup_addr(address).await {
                Ok(host) => host,
                Err(e) => {
                    debug!(device = %beacon.identity, "no name for {address}: {e}");
                    address.to_string()
                }
            };
            info!(device = %beacon.identity, "new device {} at {host} ({address})", beacon.machine);
            Some(host)
        } else {
            None
        };

        registry.upsert(
            &beacon.identity,
            DeviceUpdate {
                machine: Some(beacon.machine),
                host,
                address: Some(address),
                port: beacon.port,
                heard: true,
            },
        );

        self.controller.refresh(&beacon.identity).await;
        registry.notify_status_changed();
    }
}

fn open_socket(addr: SocketAddr) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SockAddr::from(addr))?;
    UdpSocket::from_std(socket.into())
}

// ── Tests ────────────────────────────────────────────────────────
