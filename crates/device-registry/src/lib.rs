//! device-registry: configured lab devices, their wire protocols and the registry that owns them
//!
//! A [`DeviceRegistry`] is built once from a [`Config`] and holds one [`DeviceConnection`] per
//! entry. Each connection speaks one protocol family: the Quanser double stream, the Pi relay's
//! terminated JSON, or a Logix controller behind a [`LogixDriver`].

mod types;
pub use types::*;

mod loader;
pub use loader::load_config;

mod error;
pub use error::{ConfigError, DeviceError, DriverError, SinkError};

mod snapshot;
pub use snapshot::{
    column_width_percent, truncate_cell, DataValue, Heading, Snapshot, ValueRecord,
    STREAM_HEADINGS, TAG_HEADINGS,
};

pub mod decode;
pub use decode::{decode_stream_frame, ByteOrder, RelayFrame, RELAY_TERMINATOR};

pub mod encode;
pub use encode::{encode_relay_response, encode_stream_frame, RelayCommand};

mod drivers;
pub use drivers::{DriverFactory, LogixDriver, TagInfo, TagReading, UnavailableDriverFactory};
#[cfg(feature = "mock")]
pub use drivers::{MockDriverFactory, MockDriverHandle};

mod sink;
pub use sink::{log_timestamp, CsvSink, NullSink, SnapshotSink, NO_CONNECTION_ROW};
#[cfg(feature = "mock")]
pub use sink::{MemorySink, SinkRecord};

mod connection;
pub use connection::{
    ConnectionOptions, DeviceConnection, DeviceInfo, DeviceProtocol, DeviceSummary,
    LogixProtocol, RefreshOutcome, RelayProtocol, SimulatedProtocol, StreamProtocol,
};

mod registry;
pub use registry::{create_device, DeviceEnv, DeviceRegistry};
