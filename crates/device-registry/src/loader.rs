use crate::types::Config;
use anyhow::Context;
use std::fs;
use std::path::Path;

/// Load and validate a device configuration file.
///
/// `.yml`/`.yaml` files are read as YAML, everything else as JSON.
pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let raw =
        fs::read_to_string(path).with_context(|| format!("reading config: {}", path.display()))?;
    let cfg = parse_config(&raw, is_yaml(path))
        .with_context(|| format!("parsing config: {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validating config: {}", path.display()))?;
    Ok(cfg)
}

fn parse_config(raw: &str, yaml: bool) -> anyhow::Result<Config> {
    let cfg = if yaml {
        serde_yaml::from_str(raw)?
    } else {
        serde_json::from_str(raw)?
    };
    Ok(cfg)
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext == "yml" || ext == "yaml")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut f = fs::File::create(&path).unwrap();
        write!(
            f,
            r#"{{"entries":[{{"name":"Arm","id":"arm-1","type":"qarm","ip":"10.0.0.5","port":"18000"}}],
               "datapoints":{{"qarm":["x","y","z"],"qbot":[],"rotatory":[]}}}}"#
        )
        .unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.entries.len(), 1);
        assert_eq!(cfg.entries[0].id, "arm-1");
        assert_eq!(cfg.datapoints.qarm.len(), 3);
    }

    #[test]
    fn test_load_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.yaml");
        fs::write(
            &path,
            "entries:\n  - name: Relay\n    id: relay-1\n    type: pi-plc-server\n    ip: 10.0.0.9\n    port: 5000\n",
        )
        .unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.entries[0].port, 5000);
        assert!(cfg.datapoints.qarm.is_empty());
    }

    #[test]
    fn test_load_rejects_unknown_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"entries":[{"name":"X","id":"x","type":"microwave","ip":"h","port":1}]}"#,
        )
        .unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("microwave"));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(load_config("/nonexistent/labmon.json").is_err());
    }
}
