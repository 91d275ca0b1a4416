use super::DeviceProtocol;
use crate::{DataValue, DeviceError, Heading, Snapshot, ValueRecord, STREAM_HEADINGS};
use rand::Rng;
use time::macros::format_description;
use time::OffsetDateTime;

/// Stand-in device for running without hardware. Connects by coin flip and reports the wall
/// clock plus a random number.
#[derive(Debug, Clone)]
pub struct SimulatedProtocol {
    connect_probability: f64,
}

impl Default for SimulatedProtocol {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl SimulatedProtocol {
    pub fn new(connect_probability: f64) -> Self {
        Self {
            connect_probability: connect_probability.clamp(0.0, 1.0),
        }
    }

    fn sample() -> Snapshot {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let clock = now
            .format(format_description!("[hour]:[minute]:[second]"))
            .unwrap_or_default();
        let rng: f64 = rand::thread_rng().gen();

        let mut snap = Snapshot::new();
        snap.insert("date", ValueRecord::new("DATE", DataValue::Text(clock)));
        snap.insert(
            "rng",
            ValueRecord::new("DOUBLE", DataValue::Text(format!("{rng:.2}"))),
        );
        snap
    }
}

impl DeviceProtocol for SimulatedProtocol {
    fn connect(&mut self) -> Result<(), DeviceError> {
        if rand::thread_rng().gen_bool(self.connect_probability) {
            Ok(())
        } else {
            Err(DeviceError::Protocol("simulated connect failure".into()))
        }
    }

    fn initialize_data(&mut self) -> Result<Snapshot, DeviceError> {
        Ok(Self::sample())
    }

    fn update_data(&mut self, _current: &Snapshot) -> Result<Snapshot, DeviceError> {
        Ok(Self::sample())
    }

    fn headings(&self) -> &'static [Heading] {
        STREAM_HEADINGS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_shape() {
        let mut p = SimulatedProtocol::new(1.0);
        p.connect().unwrap();
        let snap = p.initialize_data().unwrap();
        assert_eq!(snap.keys().collect::<Vec<_>>(), vec!["date", "rng"]);

        let clock = snap.get("date").unwrap().value.to_string();
        assert_eq!(clock.len(), "12:00:00".len());
        let rng = snap.get("rng").unwrap();
        assert_eq!(rng.data_type, "DOUBLE");
        let text = rng.value.to_string();
        assert_eq!(text.split('.').nth(1).map(str::len), Some(2));
        assert!((0.0..=1.0).contains(&rng.value.as_f64().unwrap()));
    }

    #[test]
    fn test_connect_probability_bounds() {
        assert!(SimulatedProtocol::new(0.0).connect().is_err());
        assert!(SimulatedProtocol::new(7.0).connect().is_ok());
    }
}
