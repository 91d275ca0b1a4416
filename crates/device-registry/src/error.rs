use device_transport::TransportError;
use thiserror::Error;

/// Fatal problems with the static device configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid device type {0:?} in config")]
    UnknownDeviceType(String),
    #[error("duplicate device id {0:?} in config")]
    DuplicateId(String),
    #[error("invalid port {0:?}")]
    InvalidPort(String),
}

/// Failures reported by an external controller driver.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("communication error: {0}")]
    Comm(String),
    #[error("driver unavailable: {0}")]
    Unavailable(String),
}

/// Per-device runtime failures. These never leave the device boundary; they are logged and
/// turned into a disconnected state.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("connect failed: {0}")]
    Connect(#[source] TransportError),
    #[error("device is not supplying data: {0}")]
    NoData(#[source] TransportError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),
    #[error("not connected")]
    NotConnected,
}

impl From<serde_json::Error> for DeviceError {
    fn from(e: serde_json::Error) -> Self {
        DeviceError::Protocol(format!("invalid json: {e}"))
    }
}

/// Logging sink write failures.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}
