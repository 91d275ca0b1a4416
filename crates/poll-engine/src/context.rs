use crate::error::{EngineError, QueryError};
use crate::metrics::MetricsHub;
use crate::scheduler::{connect_pass, ReconnectPass, RefreshMode, ScheduleOptions, Scheduler};
use device_registry::{
    column_width_percent, truncate_cell, Config, ConnectionOptions, CsvSink, DataValue,
    DeviceConnection, DeviceEnv, DeviceRegistry, DeviceSummary, Heading, Snapshot,
    UnavailableDriverFactory,
};
use device_transport::TcpConnector;
use parking_lot::Mutex;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Knobs for a [`PollContext`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub first_delay: Duration,
    pub interval: Duration,
    pub refresh_mode: RefreshMode,
    /// Directory the CSV sink writes `<device name>.csv` files into.
    pub csv_dir: PathBuf,
    /// When set, ignore the config entries and poll this many simulated devices.
    pub simulated: Option<usize>,
    pub connection: ConnectionOptions,
}

impl Default for EngineOptions {
    fn default() -> Self {
        let schedule = ScheduleOptions::default();
        Self {
            first_delay: schedule.first_delay,
            interval: schedule.interval,
            refresh_mode: schedule.mode,
            csv_dir: PathBuf::from("csv"),
            simulated: None,
            connection: ConnectionOptions::default(),
        }
    }
}

impl EngineOptions {
    pub fn schedule(&self) -> ScheduleOptions {
        ScheduleOptions {
            first_delay: self.first_delay,
            interval: self.interval,
            mode: self.refresh_mode,
        }
    }
}

/// Full view of one connected device.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceDetail {
    #[serde(flatten)]
    pub summary: DeviceSummary,
    pub headings: Vec<Heading>,
    pub column_width: u32,
    pub data: Snapshot,
}

/// One rendered table row: the datapoint name plus one cell per heading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableRow {
    pub name: String,
    pub cells: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceTable {
    pub headings: Vec<Heading>,
    pub column_width: u32,
    pub rows: Vec<TableRow>,
}

impl DeviceTable {
    pub fn new(headings: &[Heading], snapshot: &Snapshot) -> Self {
        let rows = snapshot
            .iter()
            .map(|(name, rec)| TableRow {
                name: name.to_string(),
                cells: headings
                    .iter()
                    .map(|h| truncate_cell(rec.field_text(h.key).as_deref()))
                    .collect(),
            })
            .collect();
        Self {
            headings: headings.to_vec(),
            column_width: column_width_percent(headings),
            rows,
        }
    }
}

/// Device count at a glance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub devices: usize,
    pub connected: usize,
    pub logging: bool,
    pub running: bool,
}

/// Process-wide polling state: the registry, its ticker, the global logging flag and metrics.
pub struct PollContext {
    registry: Arc<DeviceRegistry>,
    logging: AtomicBool,
    scheduler: Mutex<Option<Scheduler>>,
    metrics: MetricsHub,
}

impl PollContext {
    /// Build the registry with TCP transports and a CSV sink, start the ticker and launch a
    /// reconnect pass.
    pub fn init(cfg: &Config, options: EngineOptions) -> Result<Self, EngineError> {
        let env = DeviceEnv {
            options: options.connection.clone(),
            connector: Arc::new(TcpConnector),
            drivers: Arc::new(UnavailableDriverFactory),
            sink: Arc::new(CsvSink::new(options.csv_dir.clone())),
        };
        Self::init_with_env(cfg, options, &env)
    }

    /// Like [`PollContext::init`] with caller-supplied collaborators.
    pub fn init_with_env(
        cfg: &Config,
        options: EngineOptions,
        env: &DeviceEnv,
    ) -> Result<Self, EngineError> {
        let registry = match options.simulated {
            Some(n) => DeviceRegistry::simulated(n, env),
            None => DeviceRegistry::from_config(cfg, env)?,
        };
        let ctx = Self::start(registry, &options)?;
        // Detached: each device connects on its own thread.
        let _ = ctx.connect_devices();
        Ok(ctx)
    }

    /// Start the ticker over an existing registry. No connect pass is launched.
    pub fn start(registry: DeviceRegistry, options: &EngineOptions) -> Result<Self, EngineError> {
        let registry = Arc::new(registry);
        let metrics = MetricsHub::new()?;
        metrics.poll.devices_loaded.set(registry.len() as i64);
        let scheduler = Scheduler::start(registry.clone(), options.schedule(), metrics.clone())?;
        info!(devices = registry.len(), "poll context started");
        Ok(Self {
            registry,
            logging: AtomicBool::new(false),
            scheduler: Mutex::new(Some(scheduler)),
            metrics,
        })
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &MetricsHub {
        &self.metrics
    }

    fn device(&self, id: &str) -> Result<&Arc<DeviceConnection>, QueryError> {
        self.registry
            .get(id)
            .ok_or_else(|| QueryError::NotFound(id.to_string()))
    }

    pub fn devices(&self) -> Vec<DeviceSummary> {
        self.registry.iter().map(|d| d.summary()).collect()
    }

    pub fn device_detail(&self, id: &str) -> Result<DeviceDetail, QueryError> {
        let dev = self.device(id)?;
        if !dev.is_connected() {
            return Err(QueryError::NotConnected(id.to_string()));
        }
        let headings = dev.headings();
        Ok(DeviceDetail {
            summary: dev.summary(),
            headings: headings.to_vec(),
            column_width: column_width_percent(headings),
            data: (*dev.snapshot()).clone(),
        })
    }

    /// Rendered table of the last-known snapshot. Works for disconnected devices too.
    pub fn table(&self, id: &str) -> Result<DeviceTable, QueryError> {
        let dev = self.device(id)?;
        Ok(DeviceTable::new(dev.headings(), &dev.snapshot()))
    }

    pub fn raw_values(&self, id: &str) -> Result<Vec<DataValue>, QueryError> {
        Ok(self.device(id)?.snapshot().values())
    }

    pub fn logging_enabled(&self) -> bool {
        self.logging.load(Ordering::SeqCst)
    }

    pub fn enable_logging(&self) {
        self.logging.store(true, Ordering::SeqCst);
        for dev in self.registry.iter() {
            dev.enable_logging();
        }
        info!("logging enabled");
    }

    pub fn disable_logging(&self) {
        self.logging.store(false, Ordering::SeqCst);
        for dev in self.registry.iter() {
            dev.disable_logging();
        }
        info!("logging disabled");
    }

    /// Launch a reconnect pass over every device. Callers may drop the result.
    pub fn connect_devices(&self) -> ReconnectPass {
        self.metrics.poll.reconnect_passes.inc();
        connect_pass(&self.registry)
    }

    pub fn status(&self) -> EngineStatus {
        let connected = self.registry.iter().filter(|d| d.is_connected()).count();
        EngineStatus {
            devices: self.registry.len(),
            connected,
            logging: self.logging_enabled(),
            running: self
                .scheduler
                .lock()
                .as_ref()
                .is_some_and(Scheduler::is_running),
        }
    }

    /// Stop the ticker and shut every device down. Reconnect threads still running cannot
    /// reopen a transport afterwards. Safe to call more than once.
    pub fn teardown(&self) {
        let sched = self.scheduler.lock().take();
        let Some(mut sched) = sched else {
            return;
        };
        sched.stop();
        for dev in self.registry.iter() {
            dev.shutdown();
        }
        info!("poll context torn down");
    }
}

impl Drop for PollContext {
    fn drop(&mut self) {
        self.teardown();
    }
}
