use anyhow::Result;
use clap::Parser;
use device_registry as devreg;
use poll_engine::{EngineOptions, EngineStatus, PollContext, RefreshMode};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "labmon-daemon")]
#[command(about = "Polls configured lab devices and keeps their data fresh")]
struct Args {
    /// Device config file (JSON or YAML)
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Poll N simulated devices instead of the configured ones
    #[arg(long, num_args = 0..=1, default_missing_value = "10")]
    simulated: Option<usize>,

    /// Directory for per-device CSV logs
    #[arg(long, default_value = "csv")]
    csv_dir: PathBuf,

    /// Delay between the end of one tick and the start of the next
    #[arg(long, default_value = "150")]
    tick_ms: u64,

    /// Delay before the first tick
    #[arg(long, default_value = "250")]
    first_delay_ms: u64,

    /// Refresh devices concurrently within a tick
    #[arg(long)]
    concurrent: bool,

    /// Enable CSV logging at startup
    #[arg(long)]
    log: bool,

    /// Seconds between status lines
    #[arg(long, default_value = "30")]
    status_every: u64,

    /// Seconds between metrics dumps (off when unset)
    #[arg(long)]
    metrics_every: Option<u64>,
}

/// Requests the supervisor acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Reconnect,
    ToggleLogging,
    Shutdown,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();

    let args = Args::parse();
    info!("labmon-daemon starting");

    let cfg = match args.simulated {
        Some(n) => {
            info!(devices = n, "simulation mode");
            devreg::Config {
                entries: Vec::new(),
                datapoints: devreg::DatapointConfig::default(),
            }
        }
        None => devreg::load_config(&args.config)?,
    };
    let options = EngineOptions {
        first_delay: Duration::from_millis(args.first_delay_ms),
        interval: Duration::from_millis(args.tick_ms),
        refresh_mode: if args.concurrent {
            RefreshMode::Concurrent
        } else {
            RefreshMode::Serial
        },
        csv_dir: args.csv_dir.clone(),
        simulated: args.simulated,
        ..EngineOptions::default()
    };
    let ctx = Arc::new(PollContext::init(&cfg, options)?);
    if args.log {
        ctx.enable_logging();
    }

    let (tx, rx) = mpsc::channel(8);
    spawn_signal_forwarder(tx);
    supervise(
        ctx.clone(),
        rx,
        Duration::from_secs(args.status_every.max(1)),
        args.metrics_every.map(|s| Duration::from_secs(s.max(1))),
    )
    .await;

    let teardown_ctx = ctx.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || teardown_ctx.teardown()).await {
        warn!("teardown task failed: {e}");
    }
    info!("labmon-daemon shutting down");
    Ok(())
}

/// Act on control requests and log status until a shutdown arrives or all senders are gone.
async fn supervise(
    ctx: Arc<PollContext>,
    mut control: mpsc::Receiver<Control>,
    status_every: Duration,
    metrics_every: Option<Duration>,
) {
    let mut status_tick = tokio::time::interval(status_every);
    let mut metrics_tick = tokio::time::interval(metrics_every.unwrap_or(Duration::from_secs(3600)));
    loop {
        tokio::select! {
            msg = control.recv() => match msg {
                Some(Control::Reconnect) => {
                    info!("reconnect requested");
                    let _ = ctx.connect_devices();
                }
                Some(Control::ToggleLogging) => {
                    let on = toggle_logging(&ctx);
                    info!(logging = on, "logging toggled");
                }
                Some(Control::Shutdown) | None => break,
            },
            _ = status_tick.tick() => {
                info!("{}", status_line(&ctx.status(), ctx.metrics().poll.ticks.get()));
            }
            _ = metrics_tick.tick(), if metrics_every.is_some() => {
                println!("{}", ctx.metrics().encode_text());
            }
        }
    }
}

fn toggle_logging(ctx: &PollContext) -> bool {
    if ctx.logging_enabled() {
        ctx.disable_logging();
        false
    } else {
        ctx.enable_logging();
        true
    }
}

fn status_line(status: &EngineStatus, ticks: u64) -> String {
    format!(
        "{}/{} devices connected, logging {}, {} ticks{}",
        status.connected,
        status.devices,
        if status.logging { "on" } else { "off" },
        ticks,
        if status.running { "" } else { " (scheduler stopped)" }
    )
}

fn spawn_signal_forwarder(tx: mpsc::Sender<Control>) {
    let ctrl_c_tx = tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = ctrl_c_tx.send(Control::Shutdown).await;
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut hup, mut usr1) = match (signal(SignalKind::hangup()), signal(SignalKind::user_defined1())) {
            (Ok(h), Ok(u)) => (h, u),
            (Err(e), _) | (_, Err(e)) => {
                warn!("signal handlers not installed: {e}");
                return;
            }
        };
        loop {
            let msg = tokio::select! {
                Some(()) = hup.recv() => Control::Reconnect,
                Some(()) = usr1.recv() => Control::ToggleLogging,
                else => break,
            };
            if tx.send(msg).await.is_err() {
                break;
            }
        }
    });

    #[cfg(not(unix))]
    drop(tx);
}

fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
