//! Integration tests: controller operations and wire exchanges against a
//! scripted device over a real TCP connection on localhost.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tivo_core::{
    ControlCodec, Controller, DeviceRegistry, DeviceStatus, DeviceUpdate, FailureReason, IrCode,
    Reason, RemoteAction, Screen, StaticResolver,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;

const IDENTITY: &str = "7460001902767F2";

// ── Helpers ──────────────────────────────────────────────────────

/// Spin up a listener on an OS-assigned port.
async fn ephemeral_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Scripted device: announces `greeting` on every connection, then
/// answers each command from `reply`. Commands seen are forwarded on
/// the returned channel.
async fn scripted_device(
    greeting: &'static str,
    reply: fn(&str) -> Option<String>,
) -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let (listener, addr) = ephemeral_listener().await;
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut framed = Framed::new(stream, ControlCodec);
                framed.send(greeting).await.unwrap();
                while let Some(Ok(command)) = framed.next().await {
                    let answer = reply(&command);
                    let _ = tx.send(command);
                    if let Some(answer) = answer {
                        if framed.send(answer).await.is_err() {
                            break;
                        }
                    }
                }
            });
        }
    });
    (addr, rx)
}

/// Controller with one beacon-discovered device at `addr`.
fn controller_for(addr: SocketAddr) -> Controller {
    let registry = Arc::new(DeviceRegistry::new());
    registry.upsert(
        IDENTITY,
        DeviceUpdate {
            machine: Some("DVR 67F2".into()),
            address: Some(addr.ip()),
            port: Some(addr.port()),
            heard: true,
            ..Default::default()
        },
    );
    Controller::new(registry)
        .with_resolver(Arc::new(StaticResolver::new()))
        .with_timeout(Duration::from_millis(500))
}

fn tivo_like(command: &str) -> Option<String> {
    match command {
        "SETCH 999" => Some("CH_FAILED INVALID_CHANNEL".into()),
        c if c.starts_with("SETCH ") => Some(format!("CH_STATUS {} LOCAL", &c[6..])),
        "TELEPORT LIVETV" => Some("LIVETV_READY".into()),
        c if c.starts_with("TELEPORT ") => Some(c[9..].to_string()),
        c if c.starts_with("KEYBOARD ") => None,
        "IRCODE BOGUS" => Some("INVALID_KEY".into()),
        _ => Some("CH_STATUS 0702 REMOTE".into()),
    }
}

// ── Control operations ───────────────────────────────────────────

#[tokio::test]
async fn test_setch_then_failure_keeps_channel() {
    let (addr, mut seen) = scripted_device("CH_STATUS 0101 REMOTE", tivo_like).await;
    let controller = controller_for(addr);

    let report = controller.setch("DVR 67F2", "0702").await.unwrap();
    assert_eq!(report.channel.as_deref(), Some("0702"));
    assert_eq!(report.status, Some(DeviceStatus::ChannelStatus));
    assert_eq!(seen.recv().await.unwrap(), "SETCH 0702");

    let report = controller.setch(IDENTITY, "999").await.unwrap();
    assert_eq!(report.status, Some(DeviceStatus::ChannelFailed));
    assert_eq!(
        report.reason,
        Some(Reason::Failure(FailureReason::InvalidChannel))
    );
    assert_eq!(report.channel.as_deref(), Some("0702"));
}

#[tokio::test]
async fn test_teleport_updates_screen() {
    let (addr, _seen) = scripted_device("CH_STATUS 0101 REMOTE", tivo_like).await;
    let controller = controller_for(addr);

    let report = controller.send_teleport(IDENTITY, Screen::Guide).await.unwrap();
    assert_eq!(report.status, Some(DeviceStatus::Screen(Screen::Guide)));
    let rec = controller.registry().get(IDENTITY).unwrap();
    assert_eq!(rec.screen, Screen::Guide);

    let report = controller.send_teleport(IDENTITY, Screen::LiveTv).await.unwrap();
    assert_eq!(report.status, Some(DeviceStatus::LiveTvReady));
}

#[tokio::test]
async fn test_keyboard_expects_no_reply() {
    let (addr, mut seen) = scripted_device("CH_STATUS 0101 REMOTE", tivo_like).await;
    let controller = controller_for(addr);

    let report = controller.send_key(IDENTITY, "A").await.unwrap();
    assert_eq!(seen.recv().await.unwrap(), "KEYBOARD A");
    // status comes from the connect announcement only
    assert_eq!(report.channel.as_deref(), Some("0101"));

    let rec = controller.registry().get(IDENTITY).unwrap();
    assert_eq!(rec.last_msg_sent.as_deref(), Some("KEYBOARD A"));
}

#[tokio::test]
async fn test_unknown_ircode_reports_invalid_key() {
    let (addr, _seen) = scripted_device("CH_STATUS 0101 REMOTE", tivo_like).await;
    let controller = controller_for(addr);

    let code: IrCode = "bogus".parse().unwrap();
    let report = controller
        .perform(IDENTITY, RemoteAction::IrCode(code))
        .await
        .unwrap();
    assert_eq!(report.status, Some(DeviceStatus::InvalidKey));
    assert!(report.is_error());
}

#[tokio::test]
async fn test_concurrent_callers_are_serialised() {
    let (addr, mut seen) = scripted_device("CH_STATUS 0101 REMOTE", tivo_like).await;
    let controller = Arc::new(controller_for(addr));

    let tasks: Vec<_> = (0..4)
        .map(|i| {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.setch(IDENTITY, &format!("{}", 500 + i)).await })
        })
        .collect();
    for task in tasks {
        let report = task.await.unwrap().unwrap();
        assert_eq!(report.status, Some(DeviceStatus::ChannelStatus));
    }

    let mut commands = Vec::new();
    while let Ok(c) = seen.try_recv() {
        commands.push(c);
    }
    commands.sort();
    assert_eq!(commands, ["SETCH 500", "SETCH 501", "SETCH 502", "SETCH 503"]);
}

#[tokio::test]
async fn test_unterminated_announcement() {
    use tokio::io::AsyncWriteExt;

    let (listener, addr) = ephemeral_listener().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(b"CH_STATUS 0505 RECORDING").await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
    });

    let controller = controller_for(addr);
    let report = controller.getch(IDENTITY).await.unwrap();
    assert_eq!(report.channel.as_deref(), Some("0505"));
    assert_eq!(
        report.to_string(),
        format!("{} is tuned to channel 0505", IpAddr::V4(Ipv4Addr::LOCALHOST))
    );
}
