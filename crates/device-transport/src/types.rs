use core::fmt;
use time::OffsetDateTime;

/// Network location of a device.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One read's worth of bytes, as delivered by the transport.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Chunk {
    pub data: Vec<u8>,
    pub received_at: OffsetDateTime,
}

impl Chunk {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            received_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn last_byte(&self) -> Option<u8> {
        self.data.last().copied()
    }
}
