use crate::scheduler::TickStats;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

#[derive(Clone)]
pub struct PollMetrics {
    pub ticks: IntCounter,
    pub refresh_failures: IntCounter,
    pub reconnect_passes: IntCounter,
    pub devices_loaded: IntGauge,
    pub devices_connected: IntGauge,
}

#[derive(Clone)]
pub struct MetricsHub {
    pub registry: Registry,
    pub poll: PollMetrics,
}

impl MetricsHub {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let poll = PollMetrics {
            ticks: IntCounter::new("labmon_ticks_total", "Scheduler ticks completed")?,
            refresh_failures: IntCounter::new(
                "labmon_refresh_failures_total",
                "Device refreshes that left the device disconnected",
            )?,
            reconnect_passes: IntCounter::new(
                "labmon_reconnect_passes_total",
                "Reconnect passes launched",
            )?,
            devices_loaded: IntGauge::new("labmon_devices_loaded", "Devices in the registry")?,
            devices_connected: IntGauge::new(
                "labmon_devices_connected",
                "Devices connected after the last tick",
            )?,
        };
        registry.register(Box::new(poll.ticks.clone()))?;
        registry.register(Box::new(poll.refresh_failures.clone()))?;
        registry.register(Box::new(poll.reconnect_passes.clone()))?;
        registry.register(Box::new(poll.devices_loaded.clone()))?;
        registry.register(Box::new(poll.devices_connected.clone()))?;
        Ok(Self { registry, poll })
    }

    pub fn record_tick(&self, stats: &TickStats) {
        self.poll.ticks.inc();
        self.poll.refresh_failures.inc_by(stats.failed as u64);
        self.poll.devices_connected.set(stats.connected as i64);
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}
