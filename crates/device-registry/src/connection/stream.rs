use super::{ConnectionOptions, DeviceProtocol};
use crate::decode::{decode_stream_frame, stream_frame_len};
use crate::{DeviceError, Heading, Snapshot, STREAM_HEADINGS};
use device_transport::{Connector, Endpoint, Transport};
use std::sync::Arc;

/// Quanser rigs (qarm, qbot, rotatory): a raw frame of doubles, one per configured datapoint.
pub struct StreamProtocol {
    endpoint: Endpoint,
    datapoints: Vec<String>,
    connector: Arc<dyn Connector>,
    options: ConnectionOptions,
    transport: Option<Box<dyn Transport>>,
}

impl StreamProtocol {
    pub fn new(
        endpoint: Endpoint,
        datapoints: Vec<String>,
        connector: Arc<dyn Connector>,
        options: ConnectionOptions,
    ) -> Self {
        Self {
            endpoint,
            datapoints,
            connector,
            options,
            transport: None,
        }
    }

    pub fn datapoints(&self) -> &[String] {
        &self.datapoints
    }

    fn read_frame(&mut self) -> Result<Snapshot, DeviceError> {
        let transport = self.transport.as_mut().ok_or(DeviceError::NotConnected)?;
        let mut frame = vec![0u8; stream_frame_len(&self.datapoints)];
        transport
            .recv_exact(&mut frame, Some(self.options.stream_read_timeout))
            .map_err(DeviceError::NoData)?;
        decode_stream_frame(&self.datapoints, &frame, self.options.byte_order)
    }
}

impl DeviceProtocol for StreamProtocol {
    fn connect(&mut self) -> Result<(), DeviceError> {
        let transport = self
            .connector
            .connect(&self.endpoint, self.options.connect_timeout)
            .map_err(DeviceError::Connect)?;
        self.transport = Some(transport);
        Ok(())
    }

    fn initialize_data(&mut self) -> Result<Snapshot, DeviceError> {
        self.read_frame()
    }

    // No incremental form: every frame replaces the whole snapshot.
    fn update_data(&mut self, _current: &Snapshot) -> Result<Snapshot, DeviceError> {
        self.read_frame()
    }

    fn headings(&self) -> &'static [Heading] {
        STREAM_HEADINGS
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
    use crate::decode::ByteOrder;
    use crate::encode::encode_stream_frame;
    use crate::DataValue;
    use device_transport::{MockConnector, MockHandle};

    fn proto(points: &[&str]) -> (StreamProtocol, MockHandle) {
        let conn = MockConnector::new();
        let handle = conn.handle();
        let p = StreamProtocol::new(
            Endpoint::new("10.0.0.1", 18000),
            points.iter().map(|s| s.to_string()).collect(),
            Arc::new(conn),
            ConnectionOptions::default(),
        );
        (p, handle)
    }

    #[test]
    fn test_frame_split_across_reads() {
        let (mut p, h) = proto(&["x", "y", "z"]);
        let wire = encode_stream_frame(&[1.0, 2.0, 3.0], ByteOrder::Native);
        h.push_chunk(&wire[..5]);
        h.push_chunk(&wire[5..]);
        p.connect().unwrap();
        let snap = p.initialize_data().unwrap();
        assert_eq!(snap.keys().collect::<Vec<_>>(), vec!["x", "y", "z"]);
        assert_eq!(snap.get("z").map(|r| &r.value), Some(&DataValue::Double(3.0)));
    }

    #[test]
    fn test_timeout_is_no_data() {
        let (mut p, h) = proto(&["x"]);
        h.push_timeout();
        p.connect().unwrap();
        assert!(matches!(p.initialize_data(), Err(DeviceError::NoData(_))));
    }

    #[test]
    fn test_refused_connect() {
        let (mut p, h) = proto(&["x"]);
        h.refuse_connections(true);
        assert!(matches!(p.connect(), Err(DeviceError::Connect(_))));
        assert!(matches!(p.update_data(&Snapshot::new()), Err(DeviceError::NotConnected)));
    }

    #[test]
    fn test_disconnect_closes_transport() {
        let (mut p, h) = proto(&["x"]);
        p.connect().unwrap();
        assert!(h.is_open());
        p.disconnect();
        assert!(!h.is_open());
    }
}
