use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use device_registry as devreg;
use device_registry::DeviceProtocol;
use device_transport::{Endpoint, TcpConnector};
use poll_engine::{DeviceTable, EngineOptions, PollContext, RefreshMode};

#[derive(Parser, Debug)]
#[command(
    name = "labmon",
    version,
    about = "Lab device monitor CLI",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum ByteOrderArg {
    Native,
    Little,
    Big,
}

impl ByteOrderArg {
    fn into_codec(self) -> devreg::ByteOrder {
        match self {
            ByteOrderArg::Native => devreg::ByteOrder::Native,
            ByteOrderArg::Little => devreg::ByteOrder::Little,
            ByteOrderArg::Big => devreg::ByteOrder::Big,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum RelayCmdArg {
    /// `tag all`: tag metadata
    TagAll,
    /// `tag read-all`: current values
    ReadAll,
}

impl RelayCmdArg {
    fn into_command(self) -> devreg::RelayCommand {
        match self {
            RelayCmdArg::TagAll => devreg::RelayCommand::TagAll,
            RelayCmdArg::ReadAll => devreg::RelayCommand::ReadAll,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load and validate a device config (JSON or YAML)
    ConfigValidate {
        #[arg(long, default_value = "config.json")]
        config: PathBuf,
        /// Print the parsed config as JSON
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// List configured devices
    DeviceList {
        #[arg(long, default_value = "config.json")]
        config: PathBuf,
    },
    /// Connect to one configured device and print its data
    DeviceProbe {
        #[arg(long, default_value = "config.json")]
        config: PathBuf,
        /// Device id from the config
        #[arg(long)]
        id: String,
        /// Refreshes after the initial read
        #[arg(long, default_value_t = 3u32)]
        count: u32,
        /// Milliseconds between refreshes
        #[arg(long, default_value_t = 150u64)]
        interval_ms: u64,
        /// Byte order of streamed doubles
        #[arg(long, value_enum, default_value = "native")]
        byte_order: ByteOrderArg,
        /// Print the snapshot as JSON instead of a table
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Send one command to a Pi relay and print the decoded reply
    RelaySend {
        #[arg(long)]
        host: String,
        #[arg(long)]
        port: u16,
        #[arg(long, value_enum, default_value = "tag-all")]
        command: RelayCmdArg,
        /// Per-chunk read timeout in milliseconds
        #[arg(long, default_value_t = 3000u64)]
        timeout_ms: u64,
    },
    /// Run the poller against simulated devices and print their tables
    Simulate {
        #[arg(long, default_value_t = 10usize)]
        devices: usize,
        /// Ticks to run before printing
        #[arg(long, default_value_t = 5u64)]
        ticks: u64,
        #[arg(long, default_value_t = 150u64)]
        tick_ms: u64,
        /// Refresh devices concurrently within a tick
        #[arg(long, action = ArgAction::SetTrue)]
        concurrent: bool,
        /// Also write CSV logs into this directory
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::ConfigValidate { config, json } => config_validate(&config, json),
        Commands::DeviceList { config } => device_list(&config),
        Commands::DeviceProbe {
            config,
            id,
            count,
            interval_ms,
            byte_order,
            json,
        } => device_probe(&config, &id, count, interval_ms, byte_order, json),
        Commands::RelaySend {
            host,
            port,
            command,
            timeout_ms,
        } => relay_send(&host, port, command, timeout_ms),
        Commands::Simulate {
            devices,
            ticks,
            tick_ms,
            concurrent,
            log_dir,
        } => simulate(devices, ticks, tick_ms, concurrent, log_dir),
    }
}

fn setup_tracing() {
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn config_validate(path: &Path, json: bool) -> Result<()> {
    let cfg = devreg::load_config(path)?;
    println!(
        "ok: {} devices (qarm={}, qbot={}, rotatory={} datapoints)",
        cfg.entries.len(),
        cfg.datapoints.qarm.len(),
        cfg.datapoints.qbot.len(),
        cfg.datapoints.rotatory.len()
    );
    if json {
        println!("{}", serde_json::to_string_pretty(&cfg)?);
    }
    Ok(())
}

fn device_list(path: &Path) -> Result<()> {
    let cfg = devreg::load_config(path)?;
    for e in &cfg.entries {
        println!("{}\t{}\t{}:{}\t{}", e.id, e.device_type, e.ip, e.port, e.name);
    }
    Ok(())
}

fn device_probe(
    path: &Path,
    id: &str,
    count: u32,
    interval_ms: u64,
    byte_order: ByteOrderArg,
    json: bool,
) -> Result<()> {
    let cfg = devreg::load_config(path)?;
    let entry = cfg
        .entries
        .iter()
        .find(|e| e.id == id)
        .ok_or_else(|| anyhow::anyhow!("no device with id {id:?} in {}", path.display()))?;

    let mut env = devreg::DeviceEnv::default();
    env.options.byte_order = byte_order.into_codec();
    let dev = devreg::create_device(entry, &cfg.datapoints, &env)?;

    dev.full_initialize();
    if !dev.is_connected() {
        anyhow::bail!("device {id:?} at {}:{} did not connect", entry.ip, entry.port);
    }
    for _ in 0..count {
        thread::sleep(Duration::from_millis(interval_ms));
        if dev.periodic_refresh() == devreg::RefreshOutcome::Failed {
            warn!(device = id, "refresh failed; showing last good data");
            break;
        }
    }

    let snap = dev.snapshot();
    if json {
        println!("{}", serde_json::to_string_pretty(&*snap)?);
    } else {
        print!("{}", format_table(dev.name(), &DeviceTable::new(dev.headings(), &snap)));
    }
    dev.disconnect();
    Ok(())
}

fn relay_send(host: &str, port: u16, cmd: RelayCmdArg, timeout_ms: u64) -> Result<()> {
    let options = devreg::ConnectionOptions {
        relay_read_timeout: Duration::from_millis(timeout_ms),
        ..devreg::ConnectionOptions::default()
    };
    let mut relay = devreg::RelayProtocol::new(
        Endpoint::new(host, port),
        Arc::new(TcpConnector),
        options,
    );
    relay
        .connect()
        .with_context(|| format!("connecting to relay {host}:{port}"))?;
    let cmd = cmd.into_command();
    let reply = relay.request(cmd)?;
    info!(command = cmd.as_str(), tags = reply.len(), "relay replied");
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::Value::Object(reply))?
    );
    relay.disconnect();
    Ok(())
}

fn simulate(
    devices: usize,
    ticks: u64,
    tick_ms: u64,
    concurrent: bool,
    log_dir: Option<PathBuf>,
) -> Result<()> {
    let logging = log_dir.is_some();
    let options = EngineOptions {
        interval: Duration::from_millis(tick_ms),
        refresh_mode: if concurrent {
            RefreshMode::Concurrent
        } else {
            RefreshMode::Serial
        },
        csv_dir: log_dir.unwrap_or_else(|| PathBuf::from("csv")),
        simulated: Some(devices),
        ..EngineOptions::default()
    };
    let cfg = devreg::Config {
        entries: Vec::new(),
        datapoints: devreg::DatapointConfig::default(),
    };
    let env = devreg::DeviceEnv {
        sink: Arc::new(devreg::CsvSink::new(options.csv_dir.clone())),
        ..devreg::DeviceEnv::default()
    };
    let ctx = PollContext::init_with_env(&cfg, options, &env)?;
    if logging {
        ctx.enable_logging();
    }

    let deadline = Instant::now() + Duration::from_millis(tick_ms * (ticks + 10) + 1000);
    while ctx.metrics().poll.ticks.get() < ticks && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(tick_ms.max(10)));
    }

    let status = ctx.status();
    println!(
        "{} of {} simulated devices connected after {} ticks",
        status.connected,
        status.devices,
        ctx.metrics().poll.ticks.get()
    );
    for summary in ctx.devices() {
        println!();
        println!(
            "{} [{}] {}:{} {}",
            summary.name,
            summary.id,
            summary.ip,
            summary.port,
            if summary.connected { "connected" } else { "not connected" }
        );
        let table = ctx.table(&summary.id)?;
        print!("{}", format_table(&summary.name, &table));
    }
    ctx.teardown();
    Ok(())
}

/// Plain-text table: the datapoint column followed by one column per heading.
fn format_table(title: &str, table: &DeviceTable) -> String {
    let mut header = vec![title.to_string()];
    header.extend(table.headings.iter().map(|h| h.label.to_string()));
    let rows: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|r| {
            let mut row = vec![r.name.clone()];
            row.extend(r.cells.iter().cloned());
            row
        })
        .collect();

    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    for row in std::iter::once(&header).chain(rows.iter()) {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, w)| format!("{cell:<w$}"))
            .collect();
        out.push_str(line.join("  ").trim_end());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_table() {
        let mut snap = devreg::Snapshot::new();
        snap.insert("x", devreg::ValueRecord::double(1.0));
        snap.insert("speed", devreg::ValueRecord::double(-12.5));
        let table = DeviceTable::new(devreg::STREAM_HEADINGS, &snap);
        let text = format_table("Arm", &table);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Arm    Type    Value");
        assert_eq!(lines[1], "x      DOUBLE  1.0");
        assert_eq!(lines[2], "speed  DOUBLE  -12.5");
    }

    #[test]
    fn test_cli_parses_probe() {
        let cli = Cli::try_parse_from([
            "labmon",
            "device-probe",
            "--id",
            "arm-1",
            "--byte-order",
            "big",
        ])
        .unwrap();
        match cli.command {
            Commands::DeviceProbe {
                id,
                count,
                byte_order,
                ..
            } => {
                assert_eq!(id, "arm-1");
                assert_eq!(count, 3);
                assert_eq!(byte_order.into_codec(), devreg::ByteOrder::Big);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
