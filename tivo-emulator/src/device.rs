//! State of one emulated unit.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use rand::Rng;
use tracing::info;

use tivo_core::{Response, TivoError};

/// Identities handed out to emulated units, by `device_id`.
pub const IDENTITIES: [&str; 7] = [
    "7460001902767F2",
    "A9000019022E28B",
    "75000019042F2CD",
    "66600099999AA11",
    "66600099999BB22",
    "66600099999CC33",
    "66600099999DD44",
];

pub const MAX_DEVICES: usize = IDENTITIES.len();

/// Control port of unit `device_id` when unit 1 listens on `base`.
pub fn port_for(base: u16, device_id: usize) -> Option<u16> {
    let offset = u16::try_from(device_id.checked_sub(1)?).ok()?;
    base.checked_add(offset)
}

/// One emulated set-top unit.
///
/// `channel` is shared by every connection to the unit and is updated
/// atomically.
#[derive(Debug)]
pub struct EmulatedDevice {
    device_id: usize,
    identity: &'static str,
    channel: AtomicI64,
    tcp_port: u16,
    hello: Vec<u8>,
}

impl EmulatedDevice {
    /// Unit `device_id` (1-based) listening on `tcp_port`.
    pub fn new(device_id: usize, tcp_port: u16) -> Result<Self, TivoError> {
        let identity = device_id
            .checked_sub(1)
            .and_then(|i| IDENTITIES.get(i))
            .copied()
            .ok_or_else(|| {
                TivoError::Other(format!(
                    "device id must be from 1 to {MAX_DEVICES}, got {device_id}"
                ))
            })?;

        Ok(Self {
            device_id,
            identity,
            channel: AtomicI64::new(device_id as i64 * 100 + 1),
            tcp_port,
            hello: hello_payload(identity, tcp_port),
        })
    }

    pub fn device_id(&self) -> usize {
        self.device_id
    }

    pub fn identity(&self) -> &'static str {
        self.identity
    }

    pub fn tcp_port(&self) -> u16 {
        self.tcp_port
    }

    pub fn channel(&self) -> i64 {
        self.channel.load(Ordering::SeqCst)
    }

    /// The beacon datagram.
    pub fn hello(&self) -> &[u8] {
        &self.hello
    }

    /// `CH_STATUS <channel> REMOTE`.
    pub fn channel_status(&self) -> Response {
        Response::remote_status(self.channel())
    }

    /// Apply one received control message and return the status to send
    /// back. Only the exact upper-case `IRCODE CHANNELUP` and
    /// `IRCODE CHANNELDOWN` move the channel; trailing whitespace is
    /// ignored.
    pub fn handle_message(&self, message: &str) -> Response {
        match message.trim_end() {
            "IRCODE CHANNELUP" => {
                self.channel.fetch_add(1, Ordering::SeqCst);
            }
            "IRCODE CHANNELDOWN" => {
                self.channel.fetch_sub(1, Ordering::SeqCst);
            }
            _ => info!(unit = self.device_id, "unhandled {message:?}"),
        }
        self.channel_status()
    }

    /// Sleep between two beacons.
    ///
    /// A zero interval sleeps `device_id` seconds so co-located units
    /// don't beacon in lock-step; otherwise `randomize` draws uniformly
    /// from 50–150% of `interval`.
    pub fn beacon_interval(&self, interval: Duration, randomize: bool) -> Duration {
        if interval.is_zero() {
            Duration::from_secs(self.device_id as u64)
        } else if randomize {
            let secs = interval.as_secs_f64();
            Duration::try_from_secs_f64(rand::thread_rng().gen_range(secs * 0.5..=secs * 1.5))
                .unwrap_or(interval)
        } else {
            interval
        }
    }
}

impl std::fmt::Display for EmulatedDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unit {} identity {} port {} channel {}",
            self.device_id,
            self.identity,
            self.tcp_port,
            self.channel()
        )
    }
}

fn hello_payload(identity: &str, tcp_port: u16) -> Vec<u8> {
    let machine = &identity[identity.len().saturating_sub(4)..];
    [
        "tivoconnect=1".to_string(),
        "swversion=20.7.4d.RC2-746-2-746".to_string(),
        "method=broadcast".to_string(),
        format!("identity={identity}"),
        format!("machine=DVR {machine}"),
        "platform=tcd/Series4".to_string(),
        "services=TiVoMediaServer:80/http".to_string(),
        format!("port={tcp_port}"),
    ]
    .join("\n")
    .into_bytes()
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tivo_core::Beacon;

    #[test]
    fn units_get_sequential_state() {
        let one = EmulatedDevice::new(1, port_for(31339, 1).unwrap()).unwrap();
        let two = EmulatedDevice::new(2, port_for(31339, 2).unwrap()).unwrap();

        assert_eq!(one.identity(), "7460001902767F2");
        assert_eq!(two.identity(), "A9000019022E28B");
        assert_eq!(one.channel(), 101);
        assert_eq!(two.channel(), 201);
        assert_eq!(one.tcp_port(), 31339);
        assert_eq!(two.tcp_port(), 31340);
    }

    #[test]
    fn device_id_out_of_range() {
        assert!(EmulatedDevice::new(0, 1).is_err());
        assert!(EmulatedDevice::new(8, 1).is_err());
        assert!(EmulatedDevice::new(7, 1).is_ok());
    }

    #[test]
    fn port_for_overflow() {
        assert_eq!(port_for(65535, 1), Some(65535));
        assert_eq!(port_for(65535, 2), None);
        assert_eq!(port_for(100, 0), None);
    }

    #[test]
    fn hello_payload_lines() {
        let dev = EmulatedDevice::new(1, 31339).unwrap();
        let text = String::from_utf8(dev.hello().to_vec()).unwrap();
        let lines: Vec<_> = text.split('\n').collect();
        assert_eq!(
            lines,
            [
                "tivoconnect=1",
                "swversion=20.7.4d.RC2-746-2-746",
                "method=broadcast",
                "identity=7460001902767F2",
                "machine=DVR 67F2",
                "platform=tcd/Series4",
                "services=TiVoMediaServer:80/http",
                "port=31339",
            ]
        );

        let beacon = Beacon::parse(dev.hello()).unwrap();
        assert_eq!(beacon.identity, "7460001902767F2");
        assert_eq!(beacon.port, Some(31339));
    }

    #[test]
    fn channel_up_down_and_unknown() {
        let dev = EmulatedDevice::new(1, 31339).unwrap();
        assert_eq!(dev.handle_message("IRCODE CHANNELUP").to_string(), "CH_STATUS 102 REMOTE");
        assert_eq!(dev.handle_message("IRCODE CHANNELDOWN").to_string(), "CH_STATUS 101 REMOTE");
        assert_eq!(dev.handle_message("SETCH 500").to_string(), "CH_STATUS 101 REMOTE");
        assert_eq!(dev.handle_message("garbage").to_string(), "CH_STATUS 101 REMOTE");
    }

    #[test]
    fn channel_codes_match_exactly() {
        let dev = EmulatedDevice::new(1, 31339).unwrap();
        assert_eq!(dev.handle_message("IRCODE channelup").to_string(), "CH_STATUS 101 REMOTE");
        assert_eq!(dev.handle_message("ircode CHANNELDOWN").to_string(), "CH_STATUS 101 REMOTE");
        assert_eq!(dev.handle_message("IRCODE  CHANNELUP").to_string(), "CH_STATUS 101 REMOTE");
        assert_eq!(dev.handle_message("IRCODE CHANNELUP  ").to_string(), "CH_STATUS 102 REMOTE");
        assert_eq!(dev.handle_message("IRCODE CHANNELDOWN\t").to_string(), "CH_STATUS 101 REMOTE");
    }

    #[test]
    fn zero_interval_staggers_by_unit() {
        let one = EmulatedDevice::new(1, 1).unwrap();
        let two = EmulatedDevice::new(2, 2).unwrap();
        assert_eq!(one.beacon_interval(Duration::ZERO, false), Duration::from_secs(1));
        assert_eq!(two.beacon_interval(Duration::ZERO, false), Duration::from_secs(2));
        assert_eq!(
            one.beacon_interval(Duration::from_secs(60), false),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn randomized_interval_within_bounds() {
        let dev = EmulatedDevice::new(3, 1).unwrap();
        for _ in 0..100 {
            let d = dev.beacon_interval(Duration::from_secs(10), true);
            assert!(d >= Duration::from_secs(5) && d <= Duration::from_secs(15), "{d:?}");
        }
    }

    #[test]
    fn huge_randomized_interval_does_not_panic() {
        let dev = EmulatedDevice::new(1, 1).unwrap();
        let interval = Duration::MAX;
        for _ in 0..100 {
            let d = dev.beacon_interval(interval, true);
            assert!(d >= interval / 4, "{d:?}");
        }
    }

    #[test]
    fn concurrent_channel_updates_are_not_lost() {
        let dev = std::sync::Arc::new(EmulatedDevice::new(1, 1).unwrap());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dev = std::sync::Arc::clone(&dev);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        dev.handle_message("IRCODE CHANNELUP");
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(dev.channel(), 101 + 800);
    }
}
