//! poll-engine: keeps every registered device's snapshot fresh
//!
//! [`PollContext`] owns the device registry, a fixed-delay ticker that refreshes each device,
//! the global logging switch and a prometheus [`MetricsHub`]. Display code reads snapshots
//! through its query methods and never blocks on device I/O.

mod error;
pub use error::{EngineError, QueryError};

mod metrics;
pub use metrics::{MetricsHub, PollMetrics};

pub mod scheduler;
pub use scheduler::{
    connect_pass, run_tick, ReconnectPass, RefreshMode, ScheduleOptions, Scheduler, TickStats,
};

mod context;
pub use context::{DeviceDetail, DeviceTable, EngineOptions, EngineStatus, PollContext, TableRow};
