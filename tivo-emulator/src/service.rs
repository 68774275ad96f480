//! Emulator service: starts the configured units and keeps them running.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};

use tivo_core::{Result, TivoError};

use crate::beacon::BeaconEmitter;
use crate::config::EmulatorSection;
use crate::device::{EmulatedDevice, port_for};
use crate::listener::ControlListener;

// ── RunningUnit ──────────────────────────────────────────────────

/// A started unit and the tasks serving it. Stopping or dropping it
/// also closes every control connection the unit accepted.
pub struct RunningUnit {
    pub device: Arc<EmulatedDevice>,
    listener: JoinHandle<()>,
    beacon: JoinHandle<()>,
}

impl RunningUnit {
    pub fn stop(&self) {
        self.listener.abort();
        self.beacon.abort();
    }
}

impl Drop for RunningUnit {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── EmulatorService ──────────────────────────────────────────────

pub struct EmulatorService {
    config: EmulatorSection,
    running: Arc<AtomicBool>,
}

impl EmulatorService {
    pub fn new(config: EmulatorSection) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle used to stop [`run`](Self::run) from another task.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start one unit: bind its control port, then begin beaconing.
    pub async fn start_unit(&self, device_id: usize) -> Result<RunningUnit> {
        let port = port_for(self.config.base_port, device_id).ok_or_else(|| {
            TivoError::Other(format!(
                "no control port for unit {device_id} above base {}",
                self.config.base_port
            ))
        })?;
        let port = if self.config.base_port == 0 { 0 } else { port };

        let listener =
            ControlListener::bind(SocketAddr::new(self.config.bind_address, port)).await?;
        let device = Arc::new(EmulatedDevice::new(device_id, listener.local_addr()?.port())?);

        let emitter = BeaconEmitter::bind(self.config.beacon_target())
            .await?
            .with_interval(self.config.interval(), self.config.randomize);

        info!(unit = device_id, "starting {device}");
        let listener = tokio::spawn(listener.serve(Arc::clone(&device)));
        let beacon = tokio::spawn(emitter.run(Arc::clone(&device)));

        Ok(RunningUnit {
            device,
            listener,
            beacon,
        })
    }

    /// Start every configured unit, `stagger` apart. A unit that fails to
    /// start is logged and skipped; the others keep going.
    pub async fn start_units(&self) -> Result<Vec<RunningUnit>> {
        self.config.validate()?;

        let mut units = Vec::with_capacity(self.config.num_devices);
        for device_id in 1..=self.config.num_devices {
            match self.start_unit(device_id).await {
                Ok(unit) => units.push(unit),
                Err(e) => error!(unit = device_id, "can't start: {e}"),
            }
            if device_id < self.config.num_devices && !self.config.stagger().is_zero() {
                tokio::time::sleep(self.config.stagger()).await;
            }
        }
        Ok(units)
    }

    /// Run until stopped.
    pub async fn run(&self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);

        let units = self.start_units().await?;
        if units.is_empty() {
            self.running.store(false, Ordering::SeqCst);
            return Err(TivoError::Other("no unit could be started".into()));
        }
        info!("{} unit(s) running", units.len());

        Self::wait_for_stop(&self.running).await;

        info!("stopping all units");
        drop(units);
        Ok(())
    }

    async fn wait_for_stop(running: &Arc<AtomicBool>) {
        while running.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
