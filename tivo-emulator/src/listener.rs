//! Control-port server for an emulated unit.
//!
//! Every accepted connection gets its own task: the unit's status is
//! sent straight away, then once more after each message received.
//! A handler ends on EOF or any transport error without affecting the
//! listener or other connections. Handlers belong to the listener and
//! are aborted with it.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, trace, warn};

use tivo_core::{ControlCodec, Result, TivoError};

use crate::device::EmulatedDevice;

pub struct ControlListener {
    listener: TcpListener,
}

impl ControlListener {
    /// Bind the control port. Port `0` picks an ephemeral one.
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TivoError::Bind {
                port: addr.port(),
                source,
            })?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections for `device` until the task is dropped.
    /// Dropping the future closes every connection it accepted.
    pub async fn serve(self, device: Arc<EmulatedDevice>) {
        let unit = device.device_id();
        match self.listener.local_addr() {
            Ok(addr) => info!(unit, "TCP listener started on {addr}"),
            Err(e) => warn!(unit, "TCP listener started; local address unknown: {e}"),
        }

        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        connections.spawn(handle_connection(stream, peer, Arc::clone(&device)));
                    }
                    Err(e) => warn!(unit, "accept error: {e}"),
                },
                Some(done) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = done {
                        error!(unit, "connection handler failed: {e}");
                    }
                }
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, device: Arc<EmulatedDevice>) {
    let unit = device.device_id();
    trace!(unit, "new connection from {peer}");
    let mut framed = Framed::new(stream, ControlCodec);

    let status = device.channel_status();
    debug!(unit, "sending {status}");
    if let Err(e) = framed.send(status).await {
        error!(unit, "{peer}: {e}");
        return;
    }

    while let Some(next) = framed.next().await {
        let message = match next {
            Ok(message) => message,
            Err(e) => {
                error!(unit, "{peer}: {e}");
                break;
            }
        };
        info!(unit, "received {message:?}");

        let status = device.handle_message(&message);
        debug!(unit, "sending {status}");
        if let Err(e) = framed.send(status).await {
            error!(unit, "{peer}: {e}");
            break;
        }
    }
    trace!(unit, "{peer} disconnected");
}

// ── Tests ────────────────────────────────────────────────────────
