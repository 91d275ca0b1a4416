//! Fixed-delay refresh ticker and reconnect passes.
//!
//! The ticker sleeps `first_delay`, runs a tick, then sleeps `interval` measured from the end of
//! that tick. A slow device therefore stretches the period rather than causing ticks to pile
//! up.

use crate::metrics::MetricsHub;
use device_registry::{DeviceConnection, DeviceRegistry, RefreshOutcome};
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// How one tick walks the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshMode {
    /// One device after another, in registry order.
    #[default]
    Serial,
    /// One scoped thread per device; the tick ends when the slowest device finishes.
    Concurrent,
}

#[derive(Debug, Clone, Copy)]
pub struct ScheduleOptions {
    pub first_delay: Duration,
    pub interval: Duration,
    pub mode: RefreshMode,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            first_delay: Duration::from_millis(250),
            interval: Duration::from_millis(150),
            mode: RefreshMode::Serial,
        }
    }
}

/// Per-tick tally of refresh outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub refreshed: usize,
    pub failed: usize,
    /// Not initialized or not connected.
    pub skipped: usize,
    /// Devices connected once the tick finished.
    pub connected: usize,
}

impl TickStats {
    fn count(&mut self, outcome: RefreshOutcome) {
        match outcome {
            RefreshOutcome::Refreshed => self.refreshed += 1,
            RefreshOutcome::Failed => self.failed += 1,
            RefreshOutcome::NotInitialized | RefreshOutcome::Disconnected => self.skipped += 1,
        }
    }
}

/// Refresh every device once.
pub fn run_tick(registry: &DeviceRegistry, mode: RefreshMode) -> TickStats {
    let mut stats = TickStats::default();
    match mode {
        RefreshMode::Serial => {
            for dev in registry.iter() {
                stats.count(dev.periodic_refresh());
            }
        }
        RefreshMode::Concurrent => {
            thread::scope(|s| {
                let handles: Vec<_> = registry
                    .iter()
                    .map(|dev| s.spawn(move || dev.periodic_refresh()))
                    .collect();
                for h in handles {
                    stats.count(h.join().unwrap_or(RefreshOutcome::Failed));
                }
            });
        }
    }
    stats.connected = registry.iter().filter(|d| d.is_connected()).count();
    stats
}

/// Handle to a running ticker thread.
pub struct Scheduler {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn start(
        registry: Arc<DeviceRegistry>,
        opts: ScheduleOptions,
        metrics: MetricsHub,
    ) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("labmon-ticker".into())
            .spawn(move || {
                let mut wait = opts.first_delay;
                loop {
                    // A message or a dropped sender both mean stop.
                    match rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    let started = Instant::now();
                    let stats = run_tick(&registry, opts.mode);
                    metrics.record_tick(&stats);
                    trace!(
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        refreshed = stats.refreshed,
                        failed = stats.failed,
                        skipped = stats.skipped,
                        "tick"
                    );
                    wait = opts.interval;
                }
                debug!("ticker stopped");
            })?;
        info!(
            first_delay_ms = opts.first_delay.as_millis() as u64,
            interval_ms = opts.interval.as_millis() as u64,
            mode = ?opts.mode,
            "scheduler started"
        );
        Ok(Self {
            stop: Some(tx),
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Interrupt the sleep and wait for an in-flight tick to finish.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
        if let Some(h) = self.handle.take() {
            if h.join().is_err() {
                warn!("ticker thread panicked");
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Threads of one reconnect pass. Dropping this detaches them.
#[derive(Default)]
pub struct ReconnectPass {
    handles: Vec<JoinHandle<()>>,
}

impl ReconnectPass {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait until every device in the pass has finished `full_initialize`.
    pub fn join(self) {
        for h in self.handles {
            if h.join().is_err() {
                warn!("reconnect thread panicked");
            }
        }
    }
}

/// Run `full_initialize` on every device, one thread each.
pub fn connect_pass(registry: &DeviceRegistry) -> ReconnectPass {
    let mut pass = ReconnectPass::default();
    for dev in registry.iter() {
        let d: Arc<DeviceConnection> = dev.clone();
        let spawned = thread::Builder::new()
            .name(format!("labmon-connect-{}", dev.id()))
            .spawn(move || d.full_initialize());
        match spawned {
            Ok(h) => pass.handles.push(h),
            Err(e) => {
                warn!(device = %dev.name(), error = %e, "connect thread not spawned; connecting inline");
                dev.full_initialize();
            }
        }
    }
    debug!(devices = pass.len(), "reconnect pass launched");
    pass
}
