//! TiVo remote: entry point.
//!
//! ```text
//! tivo                           Listen for devices and log what they report
//! tivo list                      List known devices
//! tivo getch <host>              Show the current channel
//! tivo setch <host> <channel>    Tune to a channel
//! tivo upch|downch <host>        Step the channel
//! tivo ircode <host> <code>      Press a remote button (e.g. GUIDE, NUM5)
//! tivo key <host> <text>         Type a keystroke
//! tivo teleport <host> <screen>  Jump to TIVO, LIVETV, GUIDE or NOWPLAYING
//! tivo --gen-config              Write default config to stdout
//! ```
//!
//! `<host>` may be a configured host name, a machine name such as
//! `DVR 67F2`, an identity or an address.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use tivo_core::{IrCode, RemoteAction, Screen, TivoError};
use tivo_remote::commands::Remote;
use tivo_remote::config::RemoteConfig;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "tivo", about = "Control TiVo set-top devices over the network")]
struct Cli {
    /// Path to configuration TOML file [default: ~/.tivo.toml].
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// More logging; repeat for trace.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// List known devices.
    List,
    /// Listen for devices and log their status (default).
    Listen,
    /// Show the channel a device is tuned to.
    Getch { host: String },
    /// Tune a device to CHANNEL.
    Setch { host: String, channel: String },
    /// Channel up.
    Upch { host: String },
    /// Channel down.
    Downch { host: String },
    /// Send an IR code, e.g. GUIDE, SELECT, NUM5.
    Ircode { host: String, code: IrCode },
    /// Send a keystroke.
    Key { host: String, text: String },
    /// Jump to a screen: TIVO, LIVETV, GUIDE or NOWPLAYING.
    Teleport { host: String, screen: Screen },
}

impl Cmd {
    /// Target device and action, for the commands that drive one device.
    fn into_action(self) -> Option<(String, RemoteAction)> {
        let pair = match self {
            Cmd::List | Cmd::Listen => return None,
            Cmd::Getch { host } => (host, RemoteAction::GetChannel),
            Cmd::Setch { host, channel } => (host, RemoteAction::SetChannel(channel)),
            Cmd::Upch { host } => (host, RemoteAction::ChannelUp),
            Cmd::Downch { host } => (host, RemoteAction::ChannelDown),
            Cmd::Ircode { host, code } => (host, RemoteAction::IrCode(code)),
            Cmd::Key { host, text } => (host, RemoteAction::Key(text)),
            Cmd::Teleport { host, screen } => (host, RemoteAction::Teleport(screen)),
        };
        Some(pair)
    }
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&RemoteConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // Load config.
    let path = cli.config.unwrap_or_else(RemoteConfig::default_path);
    let config = RemoteConfig::load(&path);

    // Init tracing.
    let level = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!("tivo v{}", env!("CARGO_PKG_VERSION"));
    debug!("{} configured device(s)", config.identity.len());

    let remote = Remote::start(&config).await;

    match cli.command.unwrap_or(Cmd::Listen) {
        Cmd::List => {
            for line in remote.list().await {
                println!("{line}");
            }
        }
        Cmd::Listen => remote.listen().await?,
        cmd => {
            let Some((host, action)) = cmd.into_action() else {
                return Ok(());
            };
            match remote.run_action(&host, action).await {
                Ok(line) => println!("{line}"),
                Err(e @ TivoError::DeviceNotFound(_)) => {
                    eprintln!("{e}");
                    std::process::exit(1);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    Ok(())
}
