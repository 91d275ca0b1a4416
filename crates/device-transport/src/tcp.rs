use crate::{Chunk, Connector, Endpoint, Result, Transport, TransportError};
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::trace;

/// Plain TCP stream with per-call read timeouts.
pub struct TcpTransport {
    peer: Endpoint,
    stream: Option<TcpStream>,
    /// Read buffer reused across `recv_chunk` calls; grows to the largest `max_len` seen.
    read_buf: Vec<u8>,
}

impl TcpTransport {
    /// Resolve `endpoint` and connect to the first address that accepts within `timeout`.
    pub fn open(endpoint: &Endpoint, timeout: Duration) -> Result<Self> {
        let addrs: Vec<SocketAddr> = (endpoint.host.as_str(), endpoint.port)
            .to_socket_addrs()
            .map_err(|e| TransportError::AddressNotFound(format!("{endpoint}: {e}")))?
            .collect();
        if addrs.is_empty() {
            return Err(TransportError::AddressNotFound(endpoint.to_string()));
        }

        let mut last_err = TransportError::Connect(endpoint.to_string());
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    let _ = stream.set_nodelay(true);
                    trace!(%addr, "tcp connected");
                    return Ok(Self {
                        peer: endpoint.clone(),
                        stream: Some(stream),
                        read_buf: Vec::new(),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    last_err = TransportError::Timeout;
                }
                Err(e) => {
                    last_err = TransportError::Connect(format!("{addr}: {e}"));
                }
            }
        }
        Err(last_err)
    }

    pub fn peer(&self) -> &Endpoint {
        &self.peer
    }

    fn stream(&mut self) -> Result<&mut TcpStream> {
        self.stream.as_mut().ok_or(TransportError::Closed)
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let stream = self.stream()?;
        stream.write_all(bytes).map_err(TransportError::from_io)?;
        stream.flush().map_err(TransportError::from_io)
    }

    fn recv_chunk(&mut self, max_len: usize, timeout: Option<Duration>) -> Result<Chunk> {
        let len = max_len.max(1);
        if self.read_buf.len() < len {
            self.read_buf.resize(len, 0);
        }
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
        stream
            .set_read_timeout(timeout)
            .map_err(TransportError::from_io)?;
        let n = stream
            .read(&mut self.read_buf[..len])
            .map_err(TransportError::from_io)?;
        if n == 0 {
            return Err(TransportError::Closed);
        }
        Ok(Chunk::new(self.read_buf[..n].to_vec()))
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Connector producing [`TcpTransport`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connect(&self, endpoint: &Endpoint, timeout: Duration) -> Result<Box<dyn Transport>> {
        TcpTransport::open(endpoint, timeout).map(|t| Box::new(t) as Box<dyn Transport>)
    }
}
