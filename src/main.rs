use clap::Parser;
use log::{debug, error, info, warn};
use presence_matter_bridge::bridge::{PollLoop, PresenceCache};
use presence_matter_bridge::config::{Config, JoinProbeKind, load_dotenv};
use presence_matter_bridge::error::BridgeError;
use presence_matter_bridge::instance_lock::InstanceLock;
use presence_matter_bridge::join::{
    DeviceRole, JoinMonitor, JoinStatus, OtCtlProbe, RoleProbe, StaticRole,
};
use presence_matter_bridge::matter::{
    self, MatterPresenceSink, PresenceAttributes, SENSOR_ENDPOINT_ID,
};
use presence_matter_bridge::sensor::{SensorLink, SerialPortTransport};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tokio::signal;

/// Host loop spin period; the poll loop enforces its own cadence on top
const SPIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Parser)]
#[command(name = "presence-matter-bridge")]
#[command(about = "Expose an LD2410 presence radar as a Matter occupancy and light sensor")]
struct Cli {
    /// Serial device the radar is attached to
    #[arg(long)]
    serial: Option<PathBuf>,

    /// Serial baud rate
    #[arg(long)]
    baud: Option<u32>,

    /// Reporting cadence in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

/// Poll the join monitor until it finishes.
///
/// Returns the joined role, or the last role seen when the timeout elapsed.
async fn wait_for_network<P: RoleProbe>(
    config: &Config,
    probe: &mut P,
) -> Result<DeviceRole, Option<DeviceRole>> {
    let mut monitor = JoinMonitor::new(config.join_timeout(), config.join_probe_interval());
    loop {
        match monitor.tick(Instant::now(), probe) {
            JoinStatus::Joined(role) => return Ok(role),
            JoinStatus::TimedOut(last) => return Err(last),
            JoinStatus::Joining(_) => {}
        }
        tokio::time::sleep(config.join_probe_interval()).await;
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    load_dotenv();
    init_logger();
    info!("Starting Presence Matter Bridge");

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(serial) = cli.serial {
        config.serial.device = serial;
    }
    if let Some(baud) = cli.baud {
        config.serial.baud_rate = baud;
    }
    if let Some(interval_ms) = cli.interval_ms {
        config.bridge.interval_ms = interval_ms;
    }

    info!("Configuration loaded:");
    info!(
        "  Serial: {} @ {} baud",
        config.serial.device.display(),
        config.serial.baud_rate
    );
    info!("  Enhanced mode: {}", config.sensor.enhanced);
    info!("  Poll interval: {} ms", config.bridge.interval_ms);
    info!("  Device Name: {}", config.matter.device_name);
    info!("  Interface: {}", config.matter.interface);

    let _lock = if config.bridge.single_instance {
        match InstanceLock::acquire(&config.serial.device) {
            Ok(lock) => Some(lock),
            Err(e) => {
                error!("{}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        None
    };

    let transport = match SerialPortTransport::open(&config.serial.device, config.serial.baud_rate)
    {
        Ok(transport) => transport,
        Err(e) => {
            error!(
                "Cannot open {}: {}; sensor absent",
                config.serial.device.display(),
                e
            );
            return ExitCode::FAILURE;
        }
    };

    let link = match SensorLink::initialize(transport, &config.link_config()) {
        Ok(link) => link,
        Err(e) => {
            if e.is_fatal() {
                error!("LD2410 sensor absent or broken: {}", e);
            } else {
                error!("LD2410 initialization failed: {}", e);
            }
            return ExitCode::FAILURE;
        }
    };
    if let Some(firmware) = link.firmware() {
        info!("LD2410 firmware {}", firmware);
    }

    let joined = match config.join.probe {
        JoinProbeKind::OtCtl => {
            let mut probe = OtCtlProbe::new(config.join.ot_ctl_program.clone());
            wait_for_network(&config, &mut probe).await
        }
        JoinProbeKind::Static => {
            wait_for_network(&config, &mut StaticRole(DeviceRole::Leader)).await
        }
    };
    match joined {
        Ok(role) => info!("Network joined as {}", role),
        Err(last) => {
            error!(
                "Network join timed out after {}s (last role: {})",
                config.join.timeout_secs,
                last.map_or_else(|| "unknown".to_string(), |r| r.to_string())
            );
            return ExitCode::FAILURE;
        }
    }

    let attributes = PresenceAttributes::new();
    let mut sink = MatterPresenceSink::new(attributes.clone());
    if let Err(e) = sink.begin(SENSOR_ENDPOINT_ID, false, 0) {
        error!("Failed to bind presence endpoint: {}", e);
        return ExitCode::FAILURE;
    }

    // rs-matter runs on its own executor; give it a dedicated thread
    let matter_config = config.matter.clone();
    let matter_attributes = attributes.clone();
    let spawned = std::thread::Builder::new()
        .name("matter-stack".into())
        .stack_size(550 * 1024)
        .spawn(move || {
            if let Err(e) = futures_lite::future::block_on(matter::run_matter_stack(
                &matter_config,
                matter_attributes,
            )) {
                error!("Matter stack error: {:?}", e);
            }
        });
    if let Err(e) = spawned {
        error!("Failed to spawn Matter thread: {}", e);
        return ExitCode::FAILURE;
    }
    info!("Matter stack started on dedicated thread");

    let mut poll_loop =
        PollLoop::with_interval(link, PresenceCache::new(), sink, config.poll_interval());
    let mut spin = tokio::time::interval(SPIN_PERIOD);
    spin.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    info!("Presence Matter Bridge is running (Ctrl+C to exit)");
    let mut shutdown = std::pin::pin!(signal::ctrl_c());
    loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(e) = result {
                    error!("Failed to listen for shutdown signal: {}", e);
                }
                info!("Received shutdown signal");
                break;
            }
            _ = spin.tick() => {
                match poll_loop.tick(Instant::now()) {
                    Ok(_) => {}
                    // Matter not serving yet; the next reading supersedes this one
                    Err(BridgeError::SinkNotReady) => debug!("Sink not ready, reading dropped"),
                    Err(e) => warn!("{}", e),
                }
            }
        }
    }

    let stats = poll_loop.link().stats();
    info!(
        "Link stats: {} frames decoded, {} dropped, {} bytes discarded",
        stats.frames_decoded, stats.frames_dropped, stats.bytes_discarded
    );
    info!("Presence Matter Bridge stopped");
    ExitCode::SUCCESS
}
