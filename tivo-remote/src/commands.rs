//! Runs remote commands against the device registry.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::{info, warn};

use tivo_core::{Controller, DeviceRecord, DeviceRegistry, DiscoveryListener, RemoteAction, Result};

use crate::config::RemoteConfig;

/// Poll period while waiting for a device to be discovered.
const DISCOVER_POLL: Duration = Duration::from_millis(50);

/// One line of `tivo list` output; unknown fields are left out.
pub fn listing_line(record: &DeviceRecord) -> String {
    let mut parts = Vec::with_capacity(4);
    if let Some(host) = &record.host {
        parts.push(format!("host {host}"));
    }
    parts.push(format!("identity {}", record.identity));
    if let Some(machine) = &record.machine {
        parts.push(format!("machine {machine}"));
    }
    if let Some(address) = record.address {
        parts.push(format!("address {address}"));
    }
    parts.join(" ")
}

/// Controller plus the discovery task feeding it.
pub struct Remote {
    controller: Arc<Controller>,
    discover: Duration,
    discovery: Option<JoinHandle<()>>,
}

impl Remote {
    /// Build the controller from `config`, register the configured
    /// devices and start listening for beacons.
    ///
    /// A discovery port that can't be bound is logged; configured
    /// devices remain usable.
    pub async fn start(config: &RemoteConfig) -> Self {
        let controller = Arc::new(
            Controller::new(Arc::new(DeviceRegistry::new()))
                .with_timeout(config.network.timeout())
                .with_default_port(config.network.control_port),
        );
        controller.add_configured(&config.identity);

        let addr = SocketAddr::new(
            IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            config.network.discovery_port,
        );
        let discovery = match DiscoveryListener::bind(addr, Arc::clone(&controller)).await {
            Ok(listener) => Some(listener.spawn()),
            Err(e) => {
                warn!("discovery disabled: {e}");
                None
            }
        };

        Self {
            controller,
            discover: config.network.discover(),
            discovery,
        }
    }

    /// Wrap an existing controller without starting discovery.
    pub fn with_controller(controller: Arc<Controller>, discover: Duration) -> Self {
        Self {
            controller,
            discover,
            discovery: None,
        }
    }

    pub fn controller(&self) -> &Arc<Controller> {
        &self.controller
    }

    /// Wait up to the discovery window for a device called `name`.
    pub async fn wait_for(&self, name: &str) -> bool {
        let deadline = Instant::now() + self.discover;
        loop {
            if self.controller.registry().find(name).is_some() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(DISCOVER_POLL).await;
        }
    }

    /// Every known device after the discovery window, one line each.
    pub async fn list(&self) -> Vec<String> {
        if self.discovery.is_some() {
            sleep(self.discover).await;
        }
        self.controller
            .registry()
            .snapshot()
            .iter()
            .map(listing_line)
            .collect()
    }

    /// Run `action` on the device called `name` and describe the outcome
    /// the way a user addressed it.
    pub async fn run_action(&self, name: &str, action: RemoteAction) -> Result<String> {
        self.wait_for(name).await;
        let mut report = self.controller.perform(name, action).await?;
        report.host = name.to_string();
        Ok(report.to_string())
    }

    /// Log device arrivals and status changes until Ctrl-C.
    pub async fn listen(&self) -> Result<()> {
        let registry = self.controller.registry();
        registry.on_device_added(|rec| {
            info!(device = %rec.identity, "found {}", listing_line(rec));
        });
        let watched = Arc::clone(registry);
        registry.on_status_changed(move || {
            for rec in watched.snapshot() {
                let status = rec.status.map(|s| s.to_string()).unwrap_or_default();
                info!(
                    device = %rec.identity,
                    "{} channel {} {status} (pings {})",
                    rec.display_host(),
                    rec.channel.as_deref().unwrap_or("None"),
                    rec.ping_count
                );
            }
        });

        for rec in registry.snapshot() {
            self.controller.refresh(&rec.identity).await;
        }
        registry.notify_status_changed();

        tokio::signal::ctrl_c().await?;
        info!("Ctrl-C received, stopping");
        Ok(())
    }
}

impl Drop for Remote {
    fn drop(&mut self) {
        if let Some(task) = self.discovery.take() {
            task.abort();
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
