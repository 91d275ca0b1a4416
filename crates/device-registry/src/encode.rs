use crate::decode::{ByteOrder, RELAY_TERMINATOR};
use serde_json::Value;

/// Commands understood by the relay server. Sent verbatim, unterminated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayCommand {
    /// Describe every tag the relay exposes.
    TagAll,
    /// Current value of every tag.
    ReadAll,
}

impl RelayCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            RelayCommand::TagAll => "tag all",
            RelayCommand::ReadAll => "tag read-all",
        }
    }

    pub fn as_bytes(self) -> &'static [u8] {
        self.as_str().as_bytes()
    }
}

/// Serialize doubles the way a stream device emits them.
pub fn encode_stream_frame(values: &[f64], order: ByteOrder) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * crate::decode::DOUBLE_BYTES);
    for v in values {
        out.extend_from_slice(&order.write_f64(*v));
    }
    out
}

/// Serialize a relay response body followed by the terminator byte.
pub fn encode_relay_response(body: &Value) -> Vec<u8> {
    let mut out = body.to_string().into_bytes();
    out.push(RELAY_TERMINATOR);
    out
}
