//! Live connections to configured devices.
//!
//! Each [`DeviceConnection`] wraps one [`DeviceProtocol`] implementation. Protocol I/O runs
//! under a per-device mutex so a reconnect pass and a refresh tick never interleave on the same
//! device. The observable state sits behind a separate lock and is swapped whole once I/O
//! finishes, so readers never wait on the network.

mod logix;
mod relay;
mod simulated;
mod stream;

pub use logix::LogixProtocol;
pub use relay::RelayProtocol;
pub use simulated::SimulatedProtocol;
pub use stream::StreamProtocol;

use crate::decode::ByteOrder;
use crate::sink::SnapshotSink;
use crate::{DeviceError, DeviceKind, Heading, Snapshot};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timeouts and wire assumptions shared by all connections.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub connect_timeout: Duration,
    /// Read timeout for one full frame from a stream device.
    pub stream_read_timeout: Duration,
    /// Read timeout for each relay response chunk.
    pub relay_read_timeout: Duration,
    /// Largest single read while collecting a relay response.
    pub relay_chunk_size: usize,
    /// Upper bound on the time spent collecting one relay response.
    pub relay_response_timeout: Duration,
    /// Upper bound on the size of one relay response, terminator included.
    pub relay_max_response: usize,
    pub byte_order: ByteOrder,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            stream_read_timeout: Duration::from_secs(1),
            relay_read_timeout: Duration::from_secs(3),
            relay_chunk_size: 4_096_000,
            relay_response_timeout: Duration::from_secs(10),
            relay_max_response: 16 * 1024 * 1024,
            byte_order: ByteOrder::Native,
        }
    }
}

/// Immutable identity of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub name: String,
    pub id: String,
    pub address: String,
    pub port: u16,
    pub kind: DeviceKind,
}

/// What the device list shows for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSummary {
    pub name: String,
    pub id: String,
    pub ip: String,
    pub port: u16,
    pub connected: bool,
}

/// One protocol family's way of talking to a device.
///
/// Implementations own their transport. They report failures as errors and never touch
/// connection flags; [`DeviceConnection`] turns errors into a disconnected state.
pub trait DeviceProtocol: Send {
    /// Open the transport.
    fn connect(&mut self) -> Result<(), DeviceError>;

    /// Discover the data shape and produce the first snapshot.
    fn initialize_data(&mut self) -> Result<Snapshot, DeviceError>;

    /// Produce a fresh snapshot given the current one.
    fn update_data(&mut self, current: &Snapshot) -> Result<Snapshot, DeviceError>;

    /// Column layout for tabular display.
    fn headings(&self) -> &'static [Heading];

    /// Drop the transport, if any.
    fn disconnect(&mut self) {}
}

#[derive(Debug, Clone, Default)]
struct DeviceView {
    connected: bool,
    initialized: bool,
    logging: bool,
    /// Set by [`DeviceConnection::shutdown`]; no further I/O happens.
    closed: bool,
    snapshot: Arc<Snapshot>,
}

/// Outcome of one [`DeviceConnection::periodic_refresh`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// `full_initialize` has not run yet.
    NotInitialized,
    /// Initialized but disconnected; nothing was read.
    Disconnected,
    Refreshed,
    /// The refresh failed and the device is now disconnected.
    Failed,
}

/// The live, mutable entity for one configured device.
pub struct DeviceConnection {
    info: DeviceInfo,
    headings: &'static [Heading],
    protocol: Mutex<Box<dyn DeviceProtocol>>,
    view: RwLock<DeviceView>,
    sink: Arc<dyn SnapshotSink>,
}

impl DeviceConnection {
    pub fn new(
        info: DeviceInfo,
        protocol: Box<dyn DeviceProtocol>,
        sink: Arc<dyn SnapshotSink>,
    ) -> Self {
        Self {
            headings: protocol.headings(),
            info,
            protocol: Mutex::new(protocol),
            view: RwLock::new(DeviceView::default()),
            sink,
        }
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn headings(&self) -> &'static [Heading] {
        self.headings
    }

    pub fn is_connected(&self) -> bool {
        self.view.read().connected
    }

    pub fn is_initialized(&self) -> bool {
        self.view.read().initialized
    }

    pub fn logging_enabled(&self) -> bool {
        self.view.read().logging
    }

    /// Last-known-good snapshot. Cheap; shares the stored copy.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.view.read().snapshot.clone()
    }

    pub fn summary(&self) -> DeviceSummary {
        DeviceSummary {
            name: self.info.name.clone(),
            id: self.info.id.clone(),
            ip: self.info.address.clone(),
            port: self.info.port,
            connected: self.is_connected(),
        }
    }

    /// Connect if needed, then load the initial data shape. The device counts as initialized
    /// afterwards even if the connect failed.
    pub fn full_initialize(&self) {
        let mut proto = self.protocol.lock();
        if self.view.read().closed {
            debug!(device = %self.info.name, "shut down; connect skipped");
            return;
        }

        if !self.is_connected() {
            match proto.connect() {
                Ok(()) => {
                    info!(device = %self.info.name, id = %self.info.id, "connected");
                    self.view.write().connected = true;
                }
                Err(e) => {
                    self.mark_failed(&mut **proto, &e);
                }
            }
        }

        if self.is_connected() {
            match proto.initialize_data() {
                Ok(snapshot) => self.replace_snapshot(snapshot),
                Err(e) => self.mark_failed(&mut **proto, &e),
            }
        }

        self.view.write().initialized = true;
    }

    /// Refresh data and, if logging, append it to the sink. Never fails; errors leave the
    /// device disconnected with its last snapshot intact.
    pub fn periodic_refresh(&self) -> RefreshOutcome {
        if !self.is_initialized() {
            return RefreshOutcome::NotInitialized;
        }

        let mut proto = self.protocol.lock();
        if !self.is_connected() {
            return RefreshOutcome::Disconnected;
        }

        let current = self.snapshot();
        match proto.update_data(&current) {
            Ok(next) => self.replace_snapshot(next),
            Err(e) => {
                self.mark_failed(&mut **proto, &e);
                return RefreshOutcome::Failed;
            }
        }

        let view = self.view.read().clone();
        if view.connected && view.logging {
            if let Err(e) = self.sink.append_row(&self.info, &view.snapshot) {
                warn!(device = %self.info.name, error = %e, "log row not written");
            }
        }
        RefreshOutcome::Refreshed
    }

    /// Turn logging on and write the header row. Holds the I/O lock so no refresh can append a
    /// row ahead of the header.
    pub fn enable_logging(&self) {
        let _proto = self.protocol.lock();
        let view = {
            let mut v = self.view.write();
            v.logging = true;
            v.clone()
        };
        if let Err(e) = self
            .sink
            .write_header(&self.info, &view.snapshot, view.connected)
        {
            warn!(device = %self.info.name, error = %e, "log header not written");
        }
    }

    pub fn disable_logging(&self) {
        self.view.write().logging = false;
    }

    /// Disconnect for good. Reconnect passes still in flight become no-ops once they get the
    /// I/O lock.
    pub fn shutdown(&self) {
        let mut proto = self.protocol.lock();
        proto.disconnect();
        let mut view = self.view.write();
        view.connected = false;
        view.closed = true;
        debug!(device = %self.info.name, "shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.view.read().closed
    }

    /// Close the transport and mark the device disconnected. The snapshot is kept.
    pub fn disconnect(&self) {
        let mut proto = self.protocol.lock();
        proto.disconnect();
        self.view.write().connected = false;
        debug!(device = %self.info.name, "disconnected");
    }

    fn replace_snapshot(&self, snapshot: Snapshot) {
        self.view.write().snapshot = Arc::new(snapshot);
    }

    fn mark_failed(&self, proto: &mut dyn DeviceProtocol, err: &DeviceError) {
        proto.disconnect();
        let was_connected = std::mem::replace(&mut self.view.write().connected, false);
        if was_connected {
            warn!(device = %self.info.name, id = %self.info.id, error = %err, "device disconnected");
        } else {
            warn!(device = %self.info.name, id = %self.info.id, error = %err, "device unavailable");
        }
    }
}

impl std::fmt::Debug for DeviceConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceConnection")
            .field("info", &self.info)
            .field("view", &*self.view.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{MemorySink, SinkRecord};
    use crate::{DataValue, ValueRecord};
    use std::collections::VecDeque;

    /// Protocol double whose results are scripted per call.
    #[derive(Default)]
    struct Scripted {
        connects: VecDeque<bool>,
        frames: VecDeque<Option<f64>>,
        disconnects: usize,
    }

    impl Scripted {
        fn frame(&mut self) -> Result<Snapshot, DeviceError> {
            match self.frames.pop_front().flatten() {
                Some(v) => {
                    let mut s = Snapshot::new();
                    s.insert("x", ValueRecord::double(v));
                    Ok(s)
                }
                None => Err(DeviceError::Protocol("no frame".into())),
            }
        }
    }

    impl DeviceProtocol for Scripted {
        fn connect(&mut self) -> Result<(), DeviceError> {
            if self.connects.pop_front().unwrap_or(false) {
                Ok(())
            } else {
                Err(DeviceError::NotConnected)
            }
        }

        fn initialize_data(&mut self) -> Result<Snapshot, DeviceError> {
            self.frame()
        }

        fn update_data(&mut self, _current: &Snapshot) -> Result<Snapshot, DeviceError> {
            self.frame()
        }

        fn headings(&self) -> &'static [Heading] {
            crate::STREAM_HEADINGS
        }

        fn disconnect(&mut self) {
            self.disconnects += 1;
        }
    }

    fn device(script: Scripted, sink: Arc<MemorySink>) -> DeviceConnection {
        let info = DeviceInfo {
            name: "Arm".into(),
            id: "arm".into(),
            address: "10.0.0.1".into(),
            port: 18000,
            kind: DeviceKind::QArm,
        };
        DeviceConnection::new(info, Box::new(script), sink)
    }

    fn x(dev: &DeviceConnection) -> Option<DataValue> {
        dev.snapshot().get("x").map(|r| r.value.clone())
    }

    #[test]
    fn test_refresh_before_initialize_is_noop() {
        let script = Scripted {
            connects: VecDeque::from([true]),
            frames: VecDeque::from([Some(1.0)]),
            ..Default::default()
        };
        let dev = device(script, Arc::new(MemorySink::new()));
        assert_eq!(dev.periodic_refresh(), RefreshOutcome::NotInitialized);
        assert!(!dev.is_connected());
        assert!(dev.snapshot().is_empty());
    }

    #[test]
    fn test_failed_connect_then_reconnect() {
        let script = Scripted {
            connects: VecDeque::from([false, true]),
            frames: VecDeque::from([Some(4.0), Some(5.0)]),
            ..Default::default()
        };
        let dev = device(script, Arc::new(MemorySink::new()));

        dev.full_initialize();
        assert!(dev.is_initialized());
        assert!(!dev.is_connected());
        assert!(dev.snapshot().is_empty());
        assert_eq!(dev.periodic_refresh(), RefreshOutcome::Disconnected);

        dev.full_initialize();
        assert!(dev.is_connected());
        assert_eq!(x(&dev), Some(DataValue::Double(4.0)));
        assert_eq!(dev.periodic_refresh(), RefreshOutcome::Refreshed);
        assert_eq!(x(&dev), Some(DataValue::Double(5.0)));
    }

    #[test]
    fn test_refresh_failure_keeps_stale_snapshot() {
        let script = Scripted {
            connects: VecDeque::from([true]),
            frames: VecDeque::from([Some(1.0), None]),
            ..Default::default()
        };
        let dev = device(script, Arc::new(MemorySink::new()));
        dev.full_initialize();
        assert_eq!(dev.periodic_refresh(), RefreshOutcome::Failed);
        assert!(!dev.is_connected());
        assert_eq!(x(&dev), Some(DataValue::Double(1.0)));
        assert_eq!(dev.periodic_refresh(), RefreshOutcome::Disconnected);
    }

    #[test]
    fn test_connected_device_skips_connect() {
        let script = Scripted {
            connects: VecDeque::from([true, false]),
            frames: VecDeque::from([Some(1.0), Some(2.0)]),
            ..Default::default()
        };
        let dev = device(script, Arc::new(MemorySink::new()));
        dev.full_initialize();
        // A second pass must not consume the scripted failing connect.
        dev.full_initialize();
        assert!(dev.is_connected());
        assert_eq!(x(&dev), Some(DataValue::Double(2.0)));
    }

    #[test]
    fn test_logging_rows_only_when_enabled() {
        let sink = Arc::new(MemorySink::new());
        let script = Scripted {
            connects: VecDeque::from([true]),
            frames: VecDeque::from([Some(1.0), Some(2.0), Some(3.0)]),
            ..Default::default()
        };
        let dev = device(script, sink.clone());
        dev.full_initialize();
        dev.periodic_refresh();
        dev.enable_logging();
        dev.periodic_refresh();
        dev.disable_logging();
        assert!(!dev.logging_enabled());

        let recs = sink.records();
        assert_eq!(recs.len(), 2);
        assert_eq!(
            recs[0],
            SinkRecord::Header {
                device: "arm".into(),
                keys: vec!["x".into()],
                connected: true,
            }
        );
        assert_eq!(sink.rows_for("arm"), vec![vec!["3.0".to_string()]]);
    }

    #[test]
    fn test_header_precedes_rows_under_concurrent_refresh() {
        let sink = Arc::new(MemorySink::new());
        let script = Scripted {
            connects: VecDeque::from([true]),
            frames: (0..400).map(|i| Some(f64::from(i))).collect(),
            ..Default::default()
        };
        let dev = Arc::new(device(script, sink.clone()));
        dev.full_initialize();

        let ticker = {
            let dev = dev.clone();
            std::thread::spawn(move || {
                for _ in 0..300 {
                    dev.periodic_refresh();
                }
            })
        };
        std::thread::sleep(std::time::Duration::from_millis(1));
        dev.enable_logging();
        ticker.join().unwrap();

        let recs = sink.records();
        assert!(matches!(recs.first(), Some(SinkRecord::Header { .. })));
        assert_eq!(
            recs.iter()
                .filter(|r| matches!(r, SinkRecord::Header { .. }))
                .count(),
            1
        );
    }

    #[test]
    fn test_enable_logging_while_disconnected() {
        let sink = Arc::new(MemorySink::new());
        let dev = device(Scripted::default(), sink.clone());
        dev.full_initialize();
        dev.enable_logging();
        assert!(dev.logging_enabled());
        assert!(matches!(
            sink.records().first(),
            Some(SinkRecord::Header { connected: false, .. })
        ));
    }

    #[test]
    fn test_shutdown_blocks_later_connects() {
        let script = Scripted {
            connects: VecDeque::from([true, true]),
            frames: VecDeque::from([Some(1.0), Some(2.0)]),
            ..Default::default()
        };
        let dev = device(script, Arc::new(MemorySink::new()));
        dev.full_initialize();
        dev.shutdown();
        assert!(dev.is_shut_down());

        dev.full_initialize();
        assert!(!dev.is_connected());
        assert_eq!(dev.periodic_refresh(), RefreshOutcome::Disconnected);
        assert_eq!(x(&dev), Some(DataValue::Double(1.0)));
    }

    #[test]
    fn test_summary() {
        let dev = device(Scripted::default(), Arc::new(MemorySink::new()));
        let s = dev.summary();
        assert_eq!(s.ip, "10.0.0.1");
        assert_eq!(s.port, 18000);
        assert!(!s.connected);
    }
}
