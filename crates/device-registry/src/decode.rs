use crate::{DeviceError, Snapshot, ValueRecord};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Width of one streamed datapoint.
pub const DOUBLE_BYTES: usize = 8;

/// Byte that ends every relay response.
pub const RELAY_TERMINATOR: u8 = 191;

/// Byte order of the doubles a stream device emits.
///
/// The devices send their in-memory representation; `Native` assumes the poller runs on a
/// host with the same endianness as the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    #[default]
    Native,
    Little,
    Big,
}

impl ByteOrder {
    pub(crate) fn read_f64(self, b: [u8; DOUBLE_BYTES]) -> f64 {
        match self {
            ByteOrder::Native => f64::from_ne_bytes(b),
            ByteOrder::Little => f64::from_le_bytes(b),
            ByteOrder::Big => f64::from_be_bytes(b),
        }
    }

    pub(crate) fn write_f64(self, v: f64) -> [u8; DOUBLE_BYTES] {
        match self {
            ByteOrder::Native => v.to_ne_bytes(),
            ByteOrder::Little => v.to_le_bytes(),
            ByteOrder::Big => v.to_be_bytes(),
        }
    }
}

/// Expected frame length for a datapoint list.
pub fn stream_frame_len(names: &[String]) -> usize {
    names.len() * DOUBLE_BYTES
}

/// Bind each 8-byte double in `frame` to the datapoint name at the same position.
pub fn decode_stream_frame(
    names: &[String],
    frame: &[u8],
    order: ByteOrder,
) -> Result<Snapshot, DeviceError> {
    let expected = stream_frame_len(names);
    if frame.len() != expected {
        return Err(DeviceError::Protocol(format!(
            "stream frame is {} bytes, expected {expected}",
            frame.len()
        )));
    }
    let snap = names
        .iter()
        .zip(frame.chunks_exact(DOUBLE_BYTES))
        .map(|(name, raw)| {
            let mut b = [0u8; DOUBLE_BYTES];
            b.copy_from_slice(raw);
            (name.clone(), ValueRecord::double(order.read_f64(b)))
        })
        .collect();
    Ok(snap)
}

/// Accumulates relay response chunks until one ends with [`RELAY_TERMINATOR`].
///
/// Only the last byte of the most recent chunk is inspected. A payload byte of 191 that happens
/// to land at a chunk boundary ends the frame early; the relay protocol has no length prefix to
/// tell the two apart.
#[derive(Debug, Default)]
pub struct RelayFrame {
    buf: Vec<u8>,
    complete: bool,
}

impl RelayFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Returns true once the frame is complete.
    pub fn push(&mut self, chunk: &[u8]) -> bool {
        if self.complete {
            return true;
        }
        self.buf.extend_from_slice(chunk);
        if chunk.last() == Some(&RELAY_TERMINATOR) {
            self.complete = true;
        }
        self.complete
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn received(&self) -> usize {
        self.buf.len()
    }

    /// Everything received except the trailing terminator.
    pub fn payload(&self) -> Option<&[u8]> {
        if !self.complete {
            return None;
        }
        self.buf.split_last().map(|(_, rest)| rest)
    }

    /// Parse the payload as a JSON object.
    pub fn into_object(self) -> Result<Map<String, Value>, DeviceError> {
        let payload = self
            .payload()
            .ok_or_else(|| DeviceError::Protocol("relay response not terminated".into()))?;
        parse_relay_object(payload)
    }
}

/// Parse a relay payload (terminator already stripped) as a JSON object.
pub fn parse_relay_object(payload: &[u8]) -> Result<Map<String, Value>, DeviceError> {
    match serde_json::from_slice::<Value>(payload)? {
        Value::Object(map) => Ok(map),
        other => Err(DeviceError::Protocol(format!(
            "relay response is not a JSON object: {}",
            type_name(&other)
        ))),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
