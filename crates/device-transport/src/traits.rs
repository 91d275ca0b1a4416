use crate::{Chunk, Endpoint, Result, TransportError};
use std::time::Duration;

/// A minimal blocking byte-stream interface.
pub trait Transport: Send {
    /// Send bytes verbatim. No framing is added.
    fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Receive whatever the peer has delivered next, up to `max_len` bytes.
    ///
    /// A zero-length read means the peer closed the stream and is reported as
    /// [`TransportError::Closed`].
    fn recv_chunk(&mut self, max_len: usize, timeout: Option<Duration>) -> Result<Chunk>;

    /// Fill `buf` completely, issuing as many reads as needed.
    fn recv_exact(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let chunk = self.recv_chunk(buf.len() - filled, timeout)?;
            if chunk.data.is_empty() {
                return Err(TransportError::Closed);
            }
            let n = chunk.data.len().min(buf.len() - filled);
            buf[filled..filled + n].copy_from_slice(&chunk.data[..n]);
            filled += n;
        }
        Ok(())
    }

    /// Release the underlying handle. Further calls fail.
    fn close(&mut self) {}
}

/// Opens transports to endpoints.
pub trait Connector: Send + Sync {
    fn connect(&self, endpoint: &Endpoint, timeout: Duration) -> Result<Box<dyn Transport>>;
}
