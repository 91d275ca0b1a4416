use crate::{DeviceInfo, SinkError, Snapshot};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::OffsetDateTime;

/// Row written instead of a header when logging starts on a disconnected device.
pub const NO_CONNECTION_ROW: &str = "Err no connection";

/// Append-only destination for a device's snapshots over time.
pub trait SnapshotSink: Send + Sync {
    /// Called when logging is switched on for `device`.
    fn write_header(
        &self,
        device: &DeviceInfo,
        snapshot: &Snapshot,
        connected: bool,
    ) -> Result<(), SinkError>;

    /// Called after each successful refresh while logging is on.
    fn append_row(&self, device: &DeviceInfo, snapshot: &Snapshot) -> Result<(), SinkError>;
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl SnapshotSink for NullSink {
    fn write_header(&self, _: &DeviceInfo, _: &Snapshot, _: bool) -> Result<(), SinkError> {
        Ok(())
    }

    fn append_row(&self, _: &DeviceInfo, _: &Snapshot) -> Result<(), SinkError> {
        Ok(())
    }
}

/// One CSV file per device, `<dir>/<device name>.csv`, always appended to.
#[derive(Debug, Clone)]
pub struct CsvSink {
    dir: PathBuf,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, device: &DeviceInfo) -> PathBuf {
        let file: String = device
            .name
            .chars()
            .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
            .collect();
        self.dir.join(format!("{file}.csv"))
    }

    fn write_record<I, S>(&self, device: &DeviceInfo, fields: I) -> Result<(), SinkError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        fs::create_dir_all(&self.dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(device))?;
        let mut w = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(file);
        w.write_record(fields)?;
        w.flush()?;
        Ok(())
    }
}

impl SnapshotSink for CsvSink {
    fn write_header(
        &self,
        device: &DeviceInfo,
        snapshot: &Snapshot,
        connected: bool,
    ) -> Result<(), SinkError> {
        if !connected {
            return self.write_record(device, [NO_CONNECTION_ROW]);
        }
        let row: Vec<&str> = std::iter::once("Date").chain(snapshot.keys()).collect();
        self.write_record(device, row)
    }

    fn append_row(&self, device: &DeviceInfo, snapshot: &Snapshot) -> Result<(), SinkError> {
        let row: Vec<String> = std::iter::once(log_timestamp())
            .chain(snapshot.values().iter().map(ToString::to_string))
            .collect();
        self.write_record(device, row)
    }
}

/// Local wall-clock time as `HH:MM:SS ffffff`.
pub fn log_timestamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(format_description!(
        "[hour]:[minute]:[second] [subsecond digits:6]"
    ))
    .unwrap_or_default()
}

#[cfg(feature = "mock")]
pub use memory::{MemorySink, SinkRecord};

#[cfg(feature = "mock")]
mod memory {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub enum SinkRecord {
        Header {
            device: String,
            keys: Vec<String>,
            connected: bool,
        },
        Row {
            device: String,
            values: Vec<String>,
        },
    }

    /// Keeps every write in memory, in order.
    #[derive(Debug, Default)]
    pub struct MemorySink {
        records: Mutex<Vec<SinkRecord>>,
    }

    impl MemorySink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn records(&self) -> Vec<SinkRecord> {
            self.records
                .lock()
                .map(|r| r.clone())
                .unwrap_or_default()
        }

        pub fn rows_for(&self, device: &str) -> Vec<Vec<String>> {
            self.records()
                .into_iter()
                .filter_map(|r| match r {
                    SinkRecord::Row { device: d, values } if d == device => Some(values),
                    _ => None,
                })
                .collect()
        }

        fn push(&self, rec: SinkRecord) {
            if let Ok(mut r) = self.records.lock() {
                r.push(rec);
            }
        }
    }

    impl SnapshotSink for MemorySink {
        fn write_header(
            &self,
            device: &DeviceInfo,
            snapshot: &Snapshot,
            connected: bool,
        ) -> Result<(), SinkError> {
            self.push(SinkRecord::Header {
                device: device.id.clone(),
                keys: snapshot.keys().map(String::from).collect(),
                connected,
            });
            Ok(())
        }

        fn append_row(&self, device: &DeviceInfo, snapshot: &Snapshot) -> Result<(), SinkError> {
            self.push(SinkRecord::Row {
                device: device.id.clone(),
                values: snapshot.values().iter().map(ToString::to_string).collect(),
            });
            Ok(())
        }
    }
}
