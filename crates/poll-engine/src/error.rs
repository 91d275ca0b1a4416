use device_registry::ConfigError;
use thiserror::Error;

/// Failures starting or running the engine itself.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
    #[error("failed to spawn scheduler thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Query-time failures seen by display callers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("device {0:?} not found")]
    NotFound(String),
    #[error("device {0:?} not connected")]
    NotConnected(String),
}
