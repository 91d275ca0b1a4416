use super::{ConnectionOptions, DeviceProtocol};
use crate::decode::RelayFrame;
use crate::encode::RelayCommand;
use crate::{DataValue, DeviceError, Heading, Snapshot, ValueRecord, TAG_HEADINGS};
use device_transport::{Connector, Endpoint, Transport};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::trace;

/// Raspberry Pi relay: text commands answered by JSON terminated with byte 191.
pub struct RelayProtocol {
    endpoint: Endpoint,
    connector: Arc<dyn Connector>,
    options: ConnectionOptions,
    transport: Option<Box<dyn Transport>>,
}

impl RelayProtocol {
    pub fn new(endpoint: Endpoint, connector: Arc<dyn Connector>, options: ConnectionOptions) -> Self {
        Self {
            endpoint,
            connector,
            options,
            transport: None,
        }
    }

    /// Send `cmd` and collect the terminated response as a JSON object.
    pub fn request(&mut self, cmd: RelayCommand) -> Result<Map<String, Value>, DeviceError> {
        let transport = self.transport.as_mut().ok_or(DeviceError::NotConnected)?;
        transport.send(cmd.as_bytes())?;

        let deadline = Instant::now() + self.options.relay_response_timeout;
        let mut frame = RelayFrame::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(DeviceError::Protocol(format!(
                    "relay response not terminated within {:?}",
                    self.options.relay_response_timeout
                )));
            }
            let chunk = transport.recv_chunk(
                self.options.relay_chunk_size,
                Some(self.options.relay_read_timeout.min(remaining)),
            )?;
            if frame.push(&chunk.data) {
                break;
            }
            if frame.received() >= self.options.relay_max_response {
                return Err(DeviceError::Protocol(format!(
                    "relay response exceeds {} bytes without a terminator",
                    self.options.relay_max_response
                )));
            }
        }
        trace!(endpoint = %self.endpoint, cmd = cmd.as_str(), bytes = frame.received(), "relay response");
        frame.into_object()
    }
}

/// Build a record from `tag all` metadata. `dim` is accepted as an alias for `dimension`.
fn tag_record(tag: &str, meta: Value) -> Result<ValueRecord, DeviceError> {
    let Value::Object(fields) = meta else {
        return Err(DeviceError::Protocol(format!(
            "metadata for tag {tag:?} is not an object"
        )));
    };
    let mut rec = ValueRecord::new(String::new(), DataValue::Unknown);
    for (key, v) in fields {
        match key.as_str() {
            "type" => rec.data_type = text(v),
            "dimension" | "dim" => rec.dimension = Some(v),
            "access" => rec.access = Some(text(v)),
            // Seeded as unknown until the first read.
            "value" => {}
            _ => {
                rec.extra.insert(key, v);
            }
        }
    }
    Ok(rec)
}

fn text(v: Value) -> String {
    match v {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

impl DeviceProtocol for RelayProtocol {
    fn connect(&mut self) -> Result<(), DeviceError> {
        let transport = self
            .connector
            .connect(&self.endpoint, self.options.connect_timeout)
            .map_err(DeviceError::Connect)?;
        self.transport = Some(transport);
        Ok(())
    }

    fn initialize_data(&mut self) -> Result<Snapshot, DeviceError> {
        self.request(RelayCommand::TagAll)?
            .into_iter()
            .map(|(tag, meta)| tag_record(&tag, meta).map(|rec| (tag, rec)))
            .collect()
    }

    /// Only tags already in `current` are updated; the key set never changes.
    fn update_data(&mut self, current: &Snapshot) -> Result<Snapshot, DeviceError> {
        let values = self.request(RelayCommand::ReadAll)?;
        let mut next = current.clone();
        for (tag, raw) in &values {
            if let Some(rec) = next.get_mut(tag) {
                rec.value = DataValue::from_json_text(raw);
            }
        }
        Ok(next)
    }

    fn headings(&self) -> &'static [Heading] {
        TAG_HEADINGS
    }

    fn disconnect(&mut self) {
        if let Some(mut t) = self.transport.take() {
            t.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::encode_relay_response;
    use device_transport::{MockConnector, MockHandle};
    use serde_json::json;
    use std::time::Duration;

    fn proto() -> (RelayProtocol, MockHandle) {
        let conn = MockConnector::new();
        let handle = conn.handle();
        let p = RelayProtocol::new(
            Endpoint::new("10.0.0.2", 5000),
            Arc::new(conn),
            ConnectionOptions::default(),
        );
        (p, handle)
    }

    #[test]
    fn test_tag_all_then_read_all() {
        let (mut p, h) = proto();
        h.push_chunk(encode_relay_response(&json!({"T1": {"type": "INT"}})));
        h.push_chunk(encode_relay_response(&json!({"T1": 5})));
        p.connect().unwrap();

        let init = p.initialize_data().unwrap();
        assert_eq!(init.get("T1").map(|r| &r.value), Some(&DataValue::Unknown));
        let next = p.update_data(&init).unwrap();
        assert_eq!(
            serde_json::to_value(&next).unwrap(),
            json!({"T1": {"type": "INT", "value": "5"}})
        );
        assert_eq!(h.sent_text(), vec!["tag all", "tag read-all"]);
    }

    #[test]
    fn test_read_all_keeps_key_set() {
        let (mut p, h) = proto();
        h.push_chunk(encode_relay_response(
            &json!({"A": {"type": "BOOL"}, "B": {"type": "REAL", "dim": [2], "access": "Read"}}),
        ));
        h.push_chunk(encode_relay_response(&json!({"A": true, "Z": 1})));
        p.connect().unwrap();
        let init = p.initialize_data().unwrap();
        let b = init.get("B").unwrap();
        assert_eq!(b.dimension, Some(json!([2])));
        assert_eq!(b.access.as_deref(), Some("Read"));

        let next = p.update_data(&init).unwrap();
        assert_eq!(next.keys().collect::<Vec<_>>(), vec!["A", "B"]);
        assert_eq!(next.get("A").map(|r| r.value.to_string()).as_deref(), Some("true"));
        assert_eq!(next.get("B").map(|r| &r.value), Some(&DataValue::Unknown));
    }

    #[test]
    fn test_chunked_response() {
        let (mut p, h) = proto();
        let wire = encode_relay_response(&json!({"T1": {"type": "INT"}, "T2": {"type": "DINT"}}));
        for part in wire.chunks(4) {
            h.push_chunk(part.to_vec());
        }
        p.connect().unwrap();
        assert_eq!(p.initialize_data().unwrap().len(), 2);
    }

    fn proto_with(options: ConnectionOptions) -> (RelayProtocol, MockHandle) {
        let conn = MockConnector::new();
        let handle = conn.handle();
        let p = RelayProtocol::new(Endpoint::new("10.0.0.2", 5000), Arc::new(conn), options);
        (p, handle)
    }

    #[test]
    fn test_unterminated_response_hits_size_cap() {
        let (mut p, h) = proto_with(ConnectionOptions {
            relay_max_response: 64,
            ..ConnectionOptions::default()
        });
        for _ in 0..32 {
            h.push_chunk(vec![b' '; 8]);
        }
        p.connect().unwrap();
        let err = p.request(RelayCommand::TagAll).unwrap_err();
        assert!(matches!(err, DeviceError::Protocol(ref m) if m.contains("64 bytes")));
        // Reading stops at the cap rather than draining the peer.
        assert_eq!(h.pending(), 24);
    }

    #[test]
    fn test_unterminated_response_hits_deadline() {
        let (mut p, h) = proto_with(ConnectionOptions {
            relay_response_timeout: Duration::ZERO,
            ..ConnectionOptions::default()
        });
        h.push_chunk(b"{\"T1\":".to_vec());
        p.connect().unwrap();
        assert!(matches!(
            p.request(RelayCommand::ReadAll),
            Err(DeviceError::Protocol(_))
        ));
    }

    #[test]
    fn test_io_errors_surface() {
        let (mut p, h) = proto();
        p.connect().unwrap();
        h.push_chunk(b"{\"T1\":".to_vec());
        h.push_timeout();
        assert!(matches!(p.initialize_data(), Err(DeviceError::Transport(_))));

        h.push_chunk(encode_relay_response(&json!({"T1": 3})));
        assert!(matches!(p.initialize_data(), Err(DeviceError::Protocol(_))));
    }
}
