use crate::{Chunk, Connector, Endpoint, Result, Transport, TransportError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug)]
enum Scripted {
    Bytes(Vec<u8>),
    Timeout,
    Closed,
}

#[derive(Debug, Default)]
struct MockState {
    refuse: bool,
    script: VecDeque<Scripted>,
    sent: Vec<Vec<u8>>,
    connects: usize,
    open: bool,
}

/// Test-side control of a mock peer. Clones share the same peer.
#[derive(Clone, Debug, Default)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue one chunk; the next `recv_chunk` returns it as-is.
    pub fn push_chunk(&self, data: impl Into<Vec<u8>>) {
        self.lock().script.push_back(Scripted::Bytes(data.into()));
    }

    /// Queue a read timeout.
    pub fn push_timeout(&self) {
        self.lock().script.push_back(Scripted::Timeout);
    }

    /// Queue a peer close.
    pub fn push_close(&self) {
        self.lock().script.push_back(Scripted::Closed);
    }

    /// Make subsequent connects fail (or succeed again).
    pub fn refuse_connections(&self, refuse: bool) {
        self.lock().refuse = refuse;
    }

    /// Everything sent so far, one entry per `send` call.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.lock().sent.clone()
    }

    pub fn sent_text(&self) -> Vec<String> {
        self.sent()
            .iter()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect()
    }

    pub fn connect_count(&self) -> usize {
        self.lock().connects
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    pub fn pending(&self) -> usize {
        self.lock().script.len()
    }
}

/// An in-process scripted peer.
pub struct MockTransport {
    handle: MockHandle,
}

impl Transport for MockTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let mut st = self.handle.lock();
        if !st.open {
            return Err(TransportError::Closed);
        }
        st.sent.push(bytes.to_vec());
        Ok(())
    }

    fn recv_chunk(&mut self, max_len: usize, _timeout: Option<Duration>) -> Result<Chunk> {
        let mut st = self.handle.lock();
        if !st.open {
            return Err(TransportError::Closed);
        }
        match st.script.pop_front() {
            Some(Scripted::Bytes(mut data)) => {
                // Hand back the remainder on the next read, like a socket would.
                if data.len() > max_len {
                    let rest = data.split_off(max_len);
                    st.script.push_front(Scripted::Bytes(rest));
                }
                if data.is_empty() {
                    return Err(TransportError::Closed);
                }
                Ok(Chunk::new(data))
            }
            Some(Scripted::Closed) => {
                st.open = false;
                Err(TransportError::Closed)
            }
            Some(Scripted::Timeout) | None => Err(TransportError::Timeout),
        }
    }

    fn close(&mut self) {
        self.handle.lock().open = false;
    }
}

/// Connector handing out [`MockTransport`]s bound to one shared [`MockHandle`].
#[derive(Clone, Debug, Default)]
pub struct MockConnector {
    handle: MockHandle,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> MockHandle {
        self.handle.clone()
    }
}

impl Connector for MockConnector {
    fn connect(&self, endpoint: &Endpoint, _timeout: Duration) -> Result<Box<dyn Transport>> {
        let mut st = self.handle.lock();
        st.connects += 1;
        if st.refuse {
            return Err(TransportError::Connect(endpoint.to_string()));
        }
        st.open = true;
        drop(st);
        Ok(Box::new(MockTransport {
            handle: self.handle.clone(),
        }))
    }
}
