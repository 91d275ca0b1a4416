use crate::ConfigError;
use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;

/// Root of the device configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub entries: Vec<ConfigEntry>,
    #[serde(default)]
    pub datapoints: DatapointConfig,
}

impl Config {
    /// Reject unknown device types and duplicate ids.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for entry in &self.entries {
            entry.kind()?;
            if !seen.insert(entry.id.as_str()) {
                return Err(ConfigError::DuplicateId(entry.id.clone()));
            }
        }
        Ok(())
    }
}

/// One configured device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEntry {
    /// Display name; also names the device's log file.
    pub name: String,
    pub id: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub ip: String,
    #[serde(deserialize_with = "port_from_number_or_string")]
    pub port: u16,
}

impl ConfigEntry {
    pub fn kind(&self) -> Result<DeviceKind, ConfigError> {
        self.device_type.parse()
    }
}

/// Names of the doubles each Quanser device class streams, in wire order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatapointConfig {
    #[serde(default)]
    pub qarm: Vec<String>,
    #[serde(default)]
    pub qbot: Vec<String>,
    #[serde(default)]
    pub rotatory: Vec<String>,
}

impl DatapointConfig {
    pub fn for_kind(&self, kind: DeviceKind) -> Option<&[String]> {
        match kind {
            DeviceKind::QArm => Some(&self.qarm),
            DeviceKind::QBot => Some(&self.qbot),
            DeviceKind::Rotatory => Some(&self.rotatory),
            _ => None,
        }
    }
}

/// Closed set of supported device families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    #[serde(rename = "qarm")]
    QArm,
    #[serde(rename = "qbot")]
    QBot,
    #[serde(rename = "rotatory")]
    Rotatory,
    /// Allen-Bradley Logix controller reached through an external driver.
    #[serde(rename = "skill-boss-logistics")]
    Logix,
    /// Raspberry Pi relay speaking the terminated-JSON protocol.
    #[serde(rename = "pi-plc-server")]
    Relay,
    /// Synthetic device for simulation mode. Not accepted in config files.
    #[serde(rename = "simulated")]
    Simulated,
}

impl DeviceKind {
    pub const CONFIGURABLE: [DeviceKind; 5] = [
        DeviceKind::QArm,
        DeviceKind::QBot,
        DeviceKind::Rotatory,
        DeviceKind::Logix,
        DeviceKind::Relay,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DeviceKind::QArm => "qarm",
            DeviceKind::QBot => "qbot",
            DeviceKind::Rotatory => "rotatory",
            DeviceKind::Logix => "skill-boss-logistics",
            DeviceKind::Relay => "pi-plc-server",
            DeviceKind::Simulated => "simulated",
        }
    }

    /// True for the binary double-stream family.
    pub fn is_stream(self) -> bool {
        matches!(
            self,
            DeviceKind::QArm | DeviceKind::QBot | DeviceKind::Rotatory
        )
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeviceKind::CONFIGURABLE
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownDeviceType(s.to_string()))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PortRepr {
    Number(u16),
    Text(String),
}

fn port_from_number_or_string<'de, D>(de: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    match PortRepr::deserialize(de)? {
        PortRepr::Number(p) => Ok(p),
        PortRepr::Text(s) => s
            .trim()
            .parse::<u16>()
            .map_err(|_| serde::de::Error::custom(ConfigError::InvalidPort(s))),
    }
}
