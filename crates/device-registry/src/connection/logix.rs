use super::DeviceProtocol;
use crate::drivers::{DriverFactory, LogixDriver};
use crate::{DataValue, DeviceError, Heading, Snapshot, ValueRecord, TAG_HEADINGS};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Logix controller reached through an external [`LogixDriver`].
pub struct LogixProtocol {
    address: String,
    factory: Arc<dyn DriverFactory>,
    driver: Option<Box<dyn LogixDriver>>,
}

impl LogixProtocol {
    pub fn new(address: impl Into<String>, factory: Arc<dyn DriverFactory>) -> Self {
        Self {
            address: address.into(),
            factory,
            driver: None,
        }
    }

    fn driver(&mut self) -> Result<&mut Box<dyn LogixDriver>, DeviceError> {
        self.driver.as_mut().ok_or(DeviceError::NotConnected)
    }
}

impl DeviceProtocol for LogixProtocol {
    fn connect(&mut self) -> Result<(), DeviceError> {
        let mut driver = self.factory.create(&self.address);
        driver.open()?;
        self.driver = Some(driver);
        Ok(())
    }

    fn initialize_data(&mut self) -> Result<Snapshot, DeviceError> {
        let tags = self.driver()?.list_readable_tags()?;
        let snap: Snapshot = tags
            .into_iter()
            .filter(|t| t.is_readable())
            .map(|t| {
                let mut rec = ValueRecord::new(t.data_type, DataValue::Unknown);
                rec.dimension = Some(Value::from(t.dimensions));
                rec.access = t.external_access;
                (t.name, rec)
            })
            .collect();
        debug!(address = %self.address, tags = snap.len(), "controller tags discovered");
        Ok(snap)
    }

    fn update_data(&mut self, current: &Snapshot) -> Result<Snapshot, DeviceError> {
        if current.is_empty() {
            return Ok(current.clone());
        }
        let names: Vec<String> = current.keys().map(String::from).collect();
        let readings = self.driver()?.read(&names)?;

        let mut next = current.clone();
        for r in readings {
            let Some(rec) = next.get_mut(&r.tag) else {
                continue;
            };
            rec.value = match r.error {
                Some(_) => DataValue::Null,
                None => DataValue::from_json_text(&r.value),
            };
        }
        Ok(next)
    }

    fn headings(&self) -> &'static [Heading] {
        TAG_HEADINGS
    }

    fn disconnect(&mut self) {
        if let Some(mut d) = self.driver.take() {
            d.close();
        }
    }
}
