//! TiVo device emulator: entry point.
//!
//! ```text
//! tivo-emulator                    Emulate one unit with the config file's settings
//! tivo-emulator -n 3 -i 0          Three units, beaconing every 1, 2 and 3 s
//! tivo-emulator -i 30 -r           Beacon every 15–45 s
//! tivo-emulator --config <path>    Load a custom config TOML
//! tivo-emulator --gen-config       Write default config to stdout
//! ```

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tivo_emulator::config::EmulatorConfig;
use tivo_emulator::service::EmulatorService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "tivo-emulator", about = "Emulate TiVo set-top devices on the local network")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "tivo-emulator.toml")]
    config: PathBuf,

    /// Number of devices to emulate (1 to 7).
    #[arg(short, long)]
    num_devices: Option<usize>,

    /// Seconds between beacons; 0 makes unit N beacon every N seconds.
    #[arg(short, long)]
    interval: Option<f64>,

    /// Randomize each interval to 50–150% of its nominal value.
    #[arg(short, long)]
    randomize: bool,

    /// Seconds to wait between starting successive devices.
    #[arg(short, long)]
    stagger: Option<f64>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&EmulatorConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // Load config, then apply command-line overrides.
    let mut config = EmulatorConfig::load(&cli.config);
    if let Some(n) = cli.num_devices {
        config.emulator.num_devices = n;
    }
    if let Some(interval) = cli.interval {
        config.emulator.interval_secs = interval;
    }
    if cli.randomize {
        config.emulator.randomize = true;
    }
    if let Some(stagger) = cli.stagger {
        config.emulator.stagger_secs = stagger;
    }
    config.emulator.validate()?;

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("tivo-emulator v{}", env!("CARGO_PKG_VERSION"));
    info!("units: {}", config.emulator.num_devices);
    info!("beacon target: UDP {}", config.emulator.beacon_target());
    info!("interval: {}s (randomize: {})", config.emulator.interval_secs, config.emulator.randomize);

    let service = EmulatorService::new(config.emulator);
    let stop = service.stop_handle();

    // Ctrl-C handler.
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, stopping all devices");
        stop.store(false, Ordering::SeqCst);
    });

    service.run().await?;

    Ok(())
}
