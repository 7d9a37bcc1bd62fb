use crate::ChannelProfile;
use anyhow::{bail, Context};
use device_registry::DeviceFilter;
use frame_bus::BrokerConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Environment variable that overrides `bus.address`.
pub const BUS_ADDRESS_ENV: &str = "REDIS_URL";

pub const DEFAULT_PRODUCT: &str = "DALIUSBInterface";

/// Dotenv file read from the working directory when no other is named.
pub const DOTENV_FILE: &str = ".env";

/// Environment variables for configuration: a dotenv file overlaid by the
/// process environment, so variables already set in the process win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSource {
    vars: HashMap<String, String>,
}

impl EnvSource {
    /// Read `dotenv`, or `.env` in the working directory if present, then
    /// overlay the process environment. A named file must exist.
    pub fn load(dotenv: Option<&Path>) -> anyhow::Result<Self> {
        let file = match dotenv {
            Some(path) => read_dotenv(path)?,
            None if Path::new(DOTENV_FILE).is_file() => read_dotenv(Path::new(DOTENV_FILE))?,
            None => HashMap::new(),
        };
        let process = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)));
        Ok(Self::layered(file, process))
    }

    pub fn layered<F, P>(file: F, process: P) -> Self
    where
        F: IntoIterator<Item = (String, String)>,
        P: IntoIterator<Item = (String, String)>,
    {
        let mut vars: HashMap<String, String> = file.into_iter().collect();
        vars.extend(process);
        Self { vars }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn read_dotenv(path: &Path) -> anyhow::Result<HashMap<String, String>> {
    dotenvy::from_path_iter(path)
        .with_context(|| format!("reading {}", path.display()))?
        .map(|item| item.with_context(|| format!("parsing {}", path.display())))
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMode {
    /// Reconcile against the hardware listing on every tick.
    #[default]
    Polling,
    /// Register matching devices once at startup.
    Startup,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default)]
    pub mode: DiscoveryMode,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_products")]
    pub products: Vec<String>,
    #[serde(default)]
    pub product_ids: Vec<u16>,
}

fn default_interval_secs() -> u64 {
    5
}

fn default_products() -> Vec<String> {
    vec![DEFAULT_PRODUCT.to_string()]
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            mode: DiscoveryMode::default(),
            interval_secs: default_interval_secs(),
            products: default_products(),
            product_ids: Vec::new(),
        }
    }
}

impl DiscoveryConfig {
    pub fn filter(&self) -> DeviceFilter {
        DeviceFilter {
            products: self.products.clone(),
            product_ids: self.product_ids.clone(),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default)]
    pub profile: ChannelProfile,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub bus: BrokerConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub channels: ChannelConfig,
}

impl BridgeConfig {
    /// Load from `path` (defaults when `None`) and apply `env`. Callers
    /// validate once their own overrides are in place.
    pub fn load(path: Option<&Path>, env: &EnvSource) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                Self::from_yaml_str(&raw).with_context(|| format!("parsing {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env_from(|key| env.get(key));
        Ok(config)
    }

    pub fn from_yaml_str(raw: &str) -> anyhow::Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(address) = lookup(BUS_ADDRESS_ENV).filter(|a| !a.trim().is_empty()) {
            self.bus.address = address;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bus.address.trim().is_empty() {
            bail!("bus.address must not be empty");
        }
        if self.bus.pattern.trim().is_empty() {
            bail!("bus.pattern must not be empty");
        }
        if self.discovery.interval_secs == 0 {
            bail!("discovery.interval_secs must be at least 1");
        }
        if self.discovery.filter().is_empty() {
            warn!("discovery allow-list is empty, no device will be registered");
        }
        Ok(())
    }

    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frame_bus::{DEFAULT_ADDRESS, DEFAULT_PATTERN};

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.bus.address, DEFAULT_ADDRESS);
        assert_eq!(config.bus.pattern, DEFAULT_PATTERN);
        assert_eq!(config.discovery.mode, DiscoveryMode::Polling);
        assert_eq!(config.discovery.interval(), Duration::from_secs(5));
        assert_eq!(config.discovery.products, vec![DEFAULT_PRODUCT.to_string()]);
        assert_eq!(config.channels.profile, ChannelProfile::Routed);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = BridgeConfig::from_yaml_str(
            "discovery:\n  mode: startup\n  product_ids: [1503]\nchannels:\n  profile: usb\n",
        )
        .unwrap();
        assert_eq!(config.discovery.mode, DiscoveryMode::Startup);
        assert_eq!(config.discovery.product_ids, vec![1503]);
        assert_eq!(config.discovery.products, vec![DEFAULT_PRODUCT.to_string()]);
        assert_eq!(config.discovery.interval_secs, 5);
        assert_eq!(config.channels.profile, ChannelProfile::Usb);
        assert_eq!(config.bus.address, DEFAULT_ADDRESS);
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(BridgeConfig::from_yaml_str("  \n").unwrap(), BridgeConfig::default());
    }

    #[test]
    fn test_unknown_mode_rejected() {
        assert!(BridgeConfig::from_yaml_str("discovery:\n  mode: sometimes\n").is_err());
    }

    #[test]
    fn test_env_overrides_address() {
        let mut config = BridgeConfig::default();
        config.apply_env_from(|key| {
            (key == BUS_ADDRESS_ENV).then(|| "redis://bus.local:6380".to_string())
        });
        assert_eq!(config.bus.address, "redis://bus.local:6380");

        config.apply_env_from(|_| Some("   ".to_string()));
        assert_eq!(config.bus.address, "redis://bus.local:6380");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = BridgeConfig::default();
        config.discovery.interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::default();
        config.bus.address = String::new();
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::default();
        config.bus.pattern = " ".into();
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::default();
        config.discovery.products.clear();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_round_trip_of_effective_config() {
        let mut config = BridgeConfig::default();
        config.discovery.mode = DiscoveryMode::Startup;
        let text = config.to_yaml().unwrap();
        assert!(text.contains("mode: startup"));
        assert_eq!(BridgeConfig::from_yaml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file_fails_with_path() {
        let err = BridgeConfig::load(
            Some(Path::new("/nonexistent/frame-broker.yaml")),
            &EnvSource::default(),
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/frame-broker.yaml"));
    }

    fn temp_file(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{name}-{}", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_dotenv_file_supplies_bus_address() {
        let path = temp_file(
            "frame-broker-test.env",
            "# deployment\nREDIS_URL=redis://from-dotenv:6379\nOTHER=1\n",
        );
        let vars = read_dotenv(&path).unwrap();
        assert_eq!(vars.get("REDIS_URL").map(String::as_str), Some("redis://from-dotenv:6379"));

        let env = EnvSource::layered(vars, Vec::<(String, String)>::new());
        let config = BridgeConfig::load(None, &env).unwrap();
        assert_eq!(config.bus.address, "redis://from-dotenv:6379");
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_process_env_wins_over_dotenv() {
        let env = EnvSource::layered(
            vec![(BUS_ADDRESS_ENV.to_string(), "redis://file:6379".to_string())],
            vec![(BUS_ADDRESS_ENV.to_string(), "redis://process:6379".to_string())],
        );
        assert_eq!(env.get(BUS_ADDRESS_ENV).as_deref(), Some("redis://process:6379"));
        assert_eq!(env.get("MISSING"), None);
    }

    #[test]
    fn test_named_dotenv_must_exist() {
        assert!(EnvSource::load(Some(Path::new("/nonexistent/.env"))).is_err());
    }

    #[test]
    fn test_load_does_not_validate() {
        let path = temp_file("frame-broker-test.yaml", "discovery:\n  interval_secs: 0\n");
        let config = BridgeConfig::load(Some(&path), &EnvSource::default()).unwrap();
        assert!(config.validate().is_err());
        std::fs::remove_file(&path).unwrap();
    }
}
