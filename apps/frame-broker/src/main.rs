use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use device_registry::MetricsHub;
use frame_bridge::{
    Bridge, BridgeConfig, ChannelProfile, DiscoveryMode, EnvSource, DEFAULT_PRODUCT,
};
use frame_bus::{BusTransport, MockBus};
use hid_transport::{DeviceInfo, HidBackend, MockBackend};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "frame-broker",
    version,
    about = "Bridge HID devices to a publish/subscribe bus",
    disable_help_subcommand = true
)]
struct Cli {
    /// YAML configuration file (defaults apply when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Dotenv file with REDIS_URL and friends (default: ./.env if present)
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// HID backend
    #[arg(long, value_enum, global = true, default_value_t = HidKind::default_kind())]
    hid: HidKind,

    /// Bus backend
    #[arg(long, value_enum, global = true, default_value_t = BusKind::default_kind())]
    bus: BusKind,

    /// Path of a simulated device for the mock HID backend (repeatable)
    #[arg(long = "mock-device", global = true, action = ArgAction::Append)]
    mock_devices: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum HidKind {
    Mock,
    Hidapi,
}

impl HidKind {
    fn default_kind() -> Self {
        if cfg!(feature = "hidapi") {
            HidKind::Hidapi
        } else {
            HidKind::Mock
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum BusKind {
    Mock,
    Redis,
}

impl BusKind {
    fn default_kind() -> Self {
        if cfg!(feature = "redis") {
            BusKind::Redis
        } else {
            BusKind::Mock
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Mode {
    Polling,
    Startup,
}

impl From<Mode> for DiscoveryMode {
    fn from(m: Mode) -> Self {
        match m {
            Mode::Polling => DiscoveryMode::Polling,
            Mode::Startup => DiscoveryMode::Startup,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Profile {
    Routed,
    Usb,
}

impl From<Profile> for ChannelProfile {
    fn from(p: Profile) -> Self {
        match p {
            Profile::Routed => ChannelProfile::Routed,
            Profile::Usb => ChannelProfile::Usb,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register devices and route reports until ctrl-c
    Run {
        /// Discovery mode
        #[arg(long, value_enum)]
        mode: Option<Mode>,
        /// Reconciliation interval in seconds
        #[arg(long)]
        interval: Option<u64>,
        /// Bus address, e.g. redis://localhost:6379
        #[arg(long)]
        bus_address: Option<String>,
        /// Channel naming profile
        #[arg(long, value_enum)]
        profile: Option<Profile>,
        /// Print prometheus metrics on shutdown
        #[arg(long, action = ArgAction::SetTrue)]
        metrics: bool,
    },
    /// List HID devices
    List {
        /// Include devices outside the allow-list
        #[arg(long, action = ArgAction::SetTrue)]
        all: bool,
        /// Emit JSON instead of text
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Print the effective configuration
    Config {
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
}

#[derive(Serialize)]
struct DeviceRow<'a> {
    path: &'a str,
    vendor_id: u16,
    product_id: u16,
    product: Option<&'a str>,
    manufacturer: Option<&'a str>,
    serial_number: Option<&'a str>,
    allowed: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();
    let env = EnvSource::load(cli.env_file.as_deref())?;
    let mut config = BridgeConfig::load(cli.config.as_deref(), &env)?;
    if let Commands::Run {
        mode,
        interval,
        bus_address,
        profile,
        ..
    } = &cli.command
    {
        apply_run_overrides(&mut config, *mode, *interval, bus_address.clone(), *profile);
    }
    config.validate()?;

    match cli.command {
        Commands::Run { metrics, .. } => {
            let backend = hid_backend(cli.hid, &cli.mock_devices)?;
            let transport = bus_transport(cli.bus)?;
            run(config, backend, transport, metrics).await
        }
        Commands::List { all, json } => {
            let backend = hid_backend(cli.hid, &cli.mock_devices)?;
            list(&config, backend.as_ref(), all, json)
        }
        Commands::Config { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print!("{}", config.to_yaml()?);
            }
            Ok(())
        }
    }
}

fn apply_run_overrides(
    config: &mut BridgeConfig,
    mode: Option<Mode>,
    interval: Option<u64>,
    bus_address: Option<String>,
    profile: Option<Profile>,
) {
    if let Some(mode) = mode {
        config.discovery.mode = mode.into();
    }
    if let Some(secs) = interval {
        config.discovery.interval_secs = secs;
    }
    if let Some(address) = bus_address {
        config.bus.address = address;
    }
    if let Some(profile) = profile {
        config.channels.profile = profile.into();
    }
}

fn setup_tracing() {
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn hid_backend(kind: HidKind, mock_devices: &[String]) -> Result<Arc<dyn HidBackend>> {
    match kind {
        HidKind::Mock => {
            let devices = mock_devices
                .iter()
                .map(|p| DeviceInfo::new(p.as_str()).with_product(DEFAULT_PRODUCT));
            Ok(Arc::new(MockBackend::with_devices(devices)))
        }
        HidKind::Hidapi => hidapi_backend(),
    }
}

#[cfg(feature = "hidapi")]
fn hidapi_backend() -> Result<Arc<dyn HidBackend>> {
    let backend = hid_transport::HidapiBackend::new().context("initializing hidapi")?;
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "hidapi"))]
fn hidapi_backend() -> Result<Arc<dyn HidBackend>> {
    anyhow::bail!("hidapi backend not enabled in this build (feature `hidapi`)")
}

fn bus_transport(kind: BusKind) -> Result<Arc<dyn BusTransport>> {
    match kind {
        BusKind::Mock => Ok(Arc::new(MockBus::new())),
        BusKind::Redis => redis_transport(),
    }
}

#[cfg(feature = "redis")]
fn redis_transport() -> Result<Arc<dyn BusTransport>> {
    Ok(Arc::new(frame_bus::RedisTransport))
}

#[cfg(not(feature = "redis"))]
fn redis_transport() -> Result<Arc<dyn BusTransport>> {
    anyhow::bail!("redis bus not enabled in this build (feature `redis`)")
}

async fn run(
    config: BridgeConfig,
    backend: Arc<dyn HidBackend>,
    transport: Arc<dyn BusTransport>,
    print_metrics: bool,
) -> Result<()> {
    let hub = MetricsHub::new().map_err(|e| anyhow::anyhow!(e))?;
    info!(
        "frame-broker starting (mode={:?}, profile={:?}, bus={})",
        config.discovery.mode, config.channels.profile, config.bus.address
    );
    let bridge = Bridge::new(&config, backend, transport, hub.dev.clone());
    bridge
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for ctrl-c: {e}");
            }
            info!("ctrl-c received, shutting down");
        })
        .await
        .context("bridge stopped")?;

    if print_metrics {
        print!("{}", hub.encode_text());
    }
    Ok(())
}

fn list(config: &BridgeConfig, backend: &dyn HidBackend, all: bool, json: bool) -> Result<()> {
    let filter = config.discovery.filter();
    let devices = backend.list().context("listing HID devices")?;
    let rows: Vec<DeviceRow<'_>> = devices
        .iter()
        .map(|d| DeviceRow {
            path: &d.path,
            vendor_id: d.vendor_id,
            product_id: d.product_id,
            product: d.product.as_deref(),
            manufacturer: d.manufacturer.as_deref(),
            serial_number: d.serial_number.as_deref(),
            allowed: filter.matches(d),
        })
        .filter(|row| all || row.allowed)
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    if rows.is_empty() {
        println!("no devices");
    }
    for row in &rows {
        println!(
            "{}\t{:04x}:{:04x}\t{}\t{}{}",
            row.path,
            row.vendor_id,
            row.product_id,
            row.product.unwrap_or("-"),
            row.manufacturer.unwrap_or("-"),
            if row.allowed { "" } else { "\t(not allowed)" }
        );
    }
    Ok(())
}
