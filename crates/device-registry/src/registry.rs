use crate::connection::{
    ConnectionOptions, DeviceConnection, DeviceInfo, DeviceProtocol, LogixProtocol, RelayProtocol,
    SimulatedProtocol, StreamProtocol,
};
use crate::drivers::{DriverFactory, UnavailableDriverFactory};
use crate::sink::{NullSink, SnapshotSink};
use crate::types::{Config, ConfigEntry, DatapointConfig, DeviceKind};
use crate::ConfigError;
use device_transport::{Connector, Endpoint, TcpConnector};
use rand::Rng;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::info;

/// Collaborators every device connection is built with.
#[derive(Clone)]
pub struct DeviceEnv {
    pub options: ConnectionOptions,
    pub connector: Arc<dyn Connector>,
    pub drivers: Arc<dyn DriverFactory>,
    pub sink: Arc<dyn SnapshotSink>,
}

impl Default for DeviceEnv {
    fn default() -> Self {
        Self {
            options: ConnectionOptions::default(),
            connector: Arc::new(TcpConnector),
            drivers: Arc::new(UnavailableDriverFactory),
            sink: Arc::new(NullSink),
        }
    }
}

/// Build the connection for one config entry. Fails only on an unknown device type.
pub fn create_device(
    entry: &ConfigEntry,
    datapoints: &DatapointConfig,
    env: &DeviceEnv,
) -> Result<DeviceConnection, ConfigError> {
    let kind = entry.kind()?;
    let endpoint = Endpoint::new(entry.ip.clone(), entry.port);
    let protocol: Box<dyn DeviceProtocol> = match kind {
        DeviceKind::QArm | DeviceKind::QBot | DeviceKind::Rotatory => {
            let names = datapoints.for_kind(kind).map(<[String]>::to_vec).unwrap_or_default();
            Box::new(StreamProtocol::new(
                endpoint,
                names,
                env.connector.clone(),
                env.options.clone(),
            ))
        }
        DeviceKind::Relay => Box::new(RelayProtocol::new(
            endpoint,
            env.connector.clone(),
            env.options.clone(),
        )),
        DeviceKind::Logix => Box::new(LogixProtocol::new(entry.ip.clone(), env.drivers.clone())),
        DeviceKind::Simulated => {
            return Err(ConfigError::UnknownDeviceType(kind.as_str().to_string()))
        }
    };
    let info = DeviceInfo {
        name: entry.name.clone(),
        id: entry.id.clone(),
        address: entry.ip.clone(),
        port: entry.port,
        kind,
    };
    Ok(DeviceConnection::new(info, protocol, env.sink.clone()))
}

/// Every device the process polls, in config order. Never resized after construction.
#[derive(Debug, Default, Clone)]
pub struct DeviceRegistry {
    devices: Vec<Arc<DeviceConnection>>,
}

impl DeviceRegistry {
    pub fn from_config(cfg: &Config, env: &DeviceEnv) -> Result<Self, ConfigError> {
        let devices = cfg
            .entries
            .iter()
            .map(|e| create_device(e, &cfg.datapoints, env).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        info!(devices = devices.len(), "device registry built");
        Ok(Self { devices })
    }

    /// `count` simulated devices named `Simulated #i` with ids `simulated-i`.
    pub fn simulated(count: usize, env: &DeviceEnv) -> Self {
        let mut rng = rand::thread_rng();
        let devices = (0..count)
            .map(|i| {
                let info = DeviceInfo {
                    name: format!("Simulated #{i}"),
                    id: format!("simulated-{i}"),
                    address: Ipv4Addr::from(rng.gen_range(1..=u32::MAX)).to_string(),
                    port: rng.gen_range(0..=256),
                    kind: DeviceKind::Simulated,
                };
                Arc::new(DeviceConnection::new(
                    info,
                    Box::new(SimulatedProtocol::default()),
                    env.sink.clone(),
                ))
            })
            .collect();
        info!(devices = count, "simulated device registry built");
        Self { devices }
    }

    pub fn get(&self, id: &str) -> Option<&Arc<DeviceConnection>> {
        self.devices.iter().find(|d| d.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<DeviceConnection>> {
        self.devices.iter()
    }

    pub fn devices(&self) -> &[Arc<DeviceConnection>] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, ty: &str) -> ConfigEntry {
        ConfigEntry {
            name: format!("Device {id}"),
            id: id.into(),
            device_type: ty.into(),
            ip: "127.0.0.1".into(),
            port: 1,
        }
    }

    #[test]
    fn test_registry_preserves_order_and_lookup() {
        let cfg = Config {
            entries: vec![
                entry("b", "qarm"),
                entry("a", "pi-plc-server"),
                entry("c", "skill-boss-logistics"),
            ],
            datapoints: DatapointConfig::default(),
        };
        let reg = DeviceRegistry::from_config(&cfg, &DeviceEnv::default()).unwrap();
        let ids: Vec<&str> = reg.iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert_eq!(reg.get("a").map(|d| d.info().kind), Some(DeviceKind::Relay));
        assert!(reg.get("zz").is_none());
        assert!(reg.iter().all(|d| !d.is_connected() && !d.is_initialized()));
    }

    #[test]
    fn test_unknown_type_is_config_error() {
        let cfg = Config {
            entries: vec![entry("x", "teapot")],
            datapoints: DatapointConfig::default(),
        };
        assert!(matches!(
            DeviceRegistry::from_config(&cfg, &DeviceEnv::default()),
            Err(ConfigError::UnknownDeviceType(_))
        ));
    }

    #[test]
    fn test_simulated_registry() {
        let reg = DeviceRegistry::simulated(10, &DeviceEnv::default());
        assert_eq!(reg.len(), 10);
        let first = &reg.devices()[0];
        assert_eq!(first.name(), "Simulated #0");
        assert_eq!(first.id(), "simulated-0");
        assert!(first.info().address.parse::<Ipv4Addr>().is_ok());
        assert!(first.info().port <= 256);
        assert!(reg.get("simulated-9").is_some());
    }
}
