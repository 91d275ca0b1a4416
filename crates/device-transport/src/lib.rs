//! device-transport: blocking byte-stream transports for polled devices
//!
//! This crate provides the traits and types device connections use to talk to hardware over
//! the network. Every operation is blocking with a bounded timeout. The default build enables a
//! `mock` backend so protocol code can be exercised without a live device.

mod types;
pub use types::{Chunk, Endpoint};

mod error;
pub use error::{Result, TransportError};

mod traits;
pub use traits::{Connector, Transport};

mod tcp;
pub use tcp::{TcpConnector, TcpTransport};

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockConnector, MockHandle, MockTransport};
