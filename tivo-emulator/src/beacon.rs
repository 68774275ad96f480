//! Periodic discovery beacon for an emulated unit.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use tivo_core::{Result, TivoError};

use crate::device::EmulatedDevice;

/// Sends one unit's hello payload to the discovery address on a timer.
pub struct BeaconEmitter {
    socket: UdpSocket,
    target: SocketAddr,
    interval: Duration,
    randomize: bool,
}

impl BeaconEmitter {
    /// Open a broadcast-capable socket that sends to `target`.
    pub async fn bind(target: SocketAddr) -> Result<Self> {
        let local = match target.ip() {
            IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED), 0),
        };
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|source| TivoError::Bind { port: 0, source })?;
        socket.set_broadcast(true)?;
        Ok(Self {
            socket,
            target,
            interval: Duration::from_secs(60),
            randomize: false,
        })
    }

    /// Nominal time between beacons. See [`EmulatedDevice::beacon_interval`].
    pub fn with_interval(mut self, interval: Duration, randomize: bool) -> Self {
        self.interval = interval;
        self.randomize = randomize;
        self
    }

    /// Send the unit's beacon once.
    pub async fn send_once(&self, device: &EmulatedDevice) -> Result<()> {
        self.socket.send_to(device.hello(), self.target).await?;
        Ok(())
    }

    /// Beacon forever. Send failures are logged and retried on the next tick.
    pub async fn run(self, device: Arc<EmulatedDevice>) {
        info!(unit = device.device_id(), "starting beacon to UDP {}", self.target);
        loop {
            match self.send_once(&device).await {
                Ok(()) => debug!(unit = device.device_id(), "sent beacon"),
                Err(e) => warn!(unit = device.device_id(), "beacon send failed: {e}"),
            }
            tokio::time::sleep(device.beacon_interval(self.interval, self.randomize)).await;
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
