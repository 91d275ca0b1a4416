use crate::DriverError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tag as listed by a controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagInfo {
    pub name: String,
    pub data_type: String,
    #[serde(default)]
    pub dimensions: Vec<u32>,
    /// Access descriptor as the controller reports it, e.g. "Read/Write".
    #[serde(default)]
    pub external_access: Option<String>,
}

impl TagInfo {
    pub fn is_readable(&self) -> bool {
        self.external_access
            .as_deref()
            .map(|a| a.to_lowercase().contains("read"))
            .unwrap_or(false)
    }
}

/// Result of reading one tag in a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagReading {
    pub tag: String,
    pub value: Value,
    #[serde(default)]
    pub error: Option<String>,
}

/// Narrow view of an EtherNet/IP controller driver.
pub trait LogixDriver: Send {
    fn open(&mut self) -> Result<(), DriverError>;

    fn list_readable_tags(&mut self) -> Result<Vec<TagInfo>, DriverError>;

    /// Read all `tags` in one request. Per-tag failures are reported in
    /// [`TagReading::error`]; an `Err` means the whole exchange failed.
    fn read(&mut self, tags: &[String]) -> Result<Vec<TagReading>, DriverError>;

    fn close(&mut self) {}
}

/// Creates a driver for a controller address.
pub trait DriverFactory: Send + Sync {
    fn create(&self, address: &str) -> Box<dyn LogixDriver>;
}

/// Factory used when no controller driver is linked in. Every open fails, so Logix devices
/// simply stay disconnected.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableDriverFactory;

struct UnavailableDriver {
    address: String,
}

impl LogixDriver for UnavailableDriver {
    fn open(&mut self) -> Result<(), DriverError> {
        Err(DriverError::Unavailable(format!(
            "no EtherNet/IP driver linked for {}",
            self.address
        )))
    }

    fn list_readable_tags(&mut self) -> Result<Vec<TagInfo>, DriverError> {
        self.open().map(|_| Vec::new())
    }

    fn read(&mut self, _tags: &[String]) -> Result<Vec<TagReading>, DriverError> {
        self.open().map(|_| Vec::new())
    }
}

impl DriverFactory for UnavailableDriverFactory {
    fn create(&self, address: &str) -> Box<dyn LogixDriver> {
        Box::new(UnavailableDriver {
            address: address.to_string(),
        })
    }
}

#[cfg(feature = "mock")]
pub use mock::{MockDriverFactory, MockDriverHandle};

#[cfg(feature = "mock")]
mod mock {
    use super::*;
    use std::sync::{Arc, Mutex, MutexGuard};

    #[derive(Debug, Default)]
    struct MockPlc {
        tags: Vec<TagInfo>,
        values: Vec<TagReading>,
        fail_open: bool,
        fail_read: bool,
        reads: Vec<Vec<String>>,
    }

    /// Test-side control of a simulated controller.
    #[derive(Clone, Debug, Default)]
    pub struct MockDriverHandle {
        plc: Arc<Mutex<MockPlc>>,
    }

    impl MockDriverHandle {
        fn lock(&self) -> MutexGuard<'_, MockPlc> {
            self.plc.lock().unwrap_or_else(|e| e.into_inner())
        }

        pub fn set_tags(&self, tags: Vec<TagInfo>) {
            self.lock().tags = tags;
        }

        pub fn set_readings(&self, values: Vec<TagReading>) {
            self.lock().values = values;
        }

        pub fn fail_open(&self, fail: bool) {
            self.lock().fail_open = fail;
        }

        pub fn fail_read(&self, fail: bool) {
            self.lock().fail_read = fail;
        }

        /// Tag lists of every batched read so far.
        pub fn reads(&self) -> Vec<Vec<String>> {
            self.lock().reads.clone()
        }
    }

    struct MockDriver {
        handle: MockDriverHandle,
    }

    impl LogixDriver for MockDriver {
        fn open(&mut self) -> Result<(), DriverError> {
            if self.handle.lock().fail_open {
                return Err(DriverError::Comm("connection refused".into()));
            }
            Ok(())
        }

        fn list_readable_tags(&mut self) -> Result<Vec<TagInfo>, DriverError> {
            Ok(self.handle.lock().tags.clone())
        }

        fn read(&mut self, tags: &[String]) -> Result<Vec<TagReading>, DriverError> {
            let mut plc = self.handle.lock();
            plc.reads.push(tags.to_vec());
            if plc.fail_read {
                return Err(DriverError::Comm("forward open failed".into()));
            }
            Ok(plc.values.clone())
        }
    }

    /// Factory whose drivers all share one [`MockDriverHandle`].
    #[derive(Clone, Debug, Default)]
    pub struct MockDriverFactory {
        handle: MockDriverHandle,
    }

    impl MockDriverFactory {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn handle(&self) -> MockDriverHandle {
            self.handle.clone()
        }
    }

    impl DriverFactory for MockDriverFactory {
        fn create(&self, _address: &str) -> Box<dyn LogixDriver> {
            Box::new(MockDriver {
                handle: self.handle.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(access: Option<&str>) -> TagInfo {
        TagInfo {
            name: "t".into(),
            data_type: "DINT".into(),
            dimensions: vec![0, 0, 0],
            external_access: access.map(String::from),
        }
    }

    #[test]
    fn test_readable_filter() {
        assert!(tag(Some("Read/Write")).is_readable());
        assert!(tag(Some("READ ONLY")).is_readable());
        assert!(!tag(Some("None")).is_readable());
        assert!(!tag(None).is_readable());
    }

    #[test]
    fn test_unavailable_driver_never_opens() {
        let mut d = UnavailableDriverFactory.create("10.0.0.3");
        assert!(matches!(d.open(), Err(DriverError::Unavailable(_))));
    }
}
