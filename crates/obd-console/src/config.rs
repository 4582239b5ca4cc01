//! Layered console configuration
//!
//! Built-in defaults, then an optional TOML file, then `OBD_` environment
//! variables (`OBD_LINK__TIMEOUT_MS=500`). Command-line flags are applied on
//! top by the caller.

use config::{Config, ConfigError, Environment, File, FileFormat};
use obd_protocol::{
    LinkConfig, ObdError, TransportConfig, VehicleProfile, DEFAULT_BAUD_RATE, DEFAULT_HOST,
    DEFAULT_PORT,
};
use serde::{Deserialize, Serialize};
use snapshot_log::DEFAULT_RETENTION;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub link: LinkConfig,
    /// Name of the vehicle profile to use, built-in or declared below
    pub profile: Option<String>,
    /// Extra vehicle profiles
    pub profiles: Vec<VehicleProfile>,
    /// Snapshots kept in memory by `monitor`
    pub retention: usize,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            link: LinkConfig::default(),
            profile: None,
            profiles: Vec::new(),
            retention: DEFAULT_RETENTION,
        }
    }
}

impl ConsoleConfig {
    /// Load defaults, `path` (if given) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);
        if let Some(path) = path {
            debug!("Loading configuration from {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }
        builder
            .add_source(environment())
            .build()?
            .try_deserialize()
    }

    /// Load defaults overlaid with TOML text
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    /// Configured profiles followed by the built-in ones
    pub fn all_profiles(&self) -> Vec<VehicleProfile> {
        let mut profiles = self.profiles.clone();
        profiles.extend(VehicleProfile::builtin());
        profiles
    }

    /// The selected profile, if any; configured profiles shadow built-in ones
    pub fn resolve_profile(&self) -> Result<Option<VehicleProfile>, ObdError> {
        let Some(name) = self.profile.as_deref() else {
            return Ok(None);
        };
        VehicleProfile::find(&self.all_profiles(), name)
            .cloned()
            .map(Some)
            .ok_or_else(|| ObdError::UnknownProfile(name.to_string()))
    }
}

/// Command-line settings applied over the loaded configuration
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub serial: Option<String>,
    pub baud_rate: Option<u32>,
    pub mock: bool,
    pub profile: Option<String>,
    pub poll_interval_ms: Option<u64>,
}

impl Overrides {
    pub fn apply(&self, config: &mut ConsoleConfig) {
        let transport = &mut config.link.transport;
        if self.mock {
            *transport = TransportConfig::Mock;
        } else if let Some(device) = &self.serial {
            let baud_rate = match transport {
                TransportConfig::Serial { baud_rate, .. } => *baud_rate,
                _ => DEFAULT_BAUD_RATE,
            };
            *transport = TransportConfig::Serial {
                device: device.clone(),
                baud_rate: self.baud_rate.unwrap_or(baud_rate),
            };
        } else if self.host.is_some() || self.port.is_some() {
            let (host, port) = match transport {
                TransportConfig::Tcp { host, port } => (host.clone(), *port),
                _ => (DEFAULT_HOST.to_string(), DEFAULT_PORT),
            };
            *transport = TransportConfig::Tcp {
                host: self.host.clone().unwrap_or(host),
                port: self.port.unwrap_or(port),
            };
        }

        if let Some(profile) = &self.profile {
            config.profile = Some(profile.clone());
        }
        if let Some(interval) = self.poll_interval_ms {
            config.link.poll_interval_ms = interval;
        }
    }
}

fn environment() -> Environment {
    Environment::with_prefix("OBD")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_protocol::{ObdProtocol, Pid};

    #[test]
    fn test_defaults() {
        let config = ConsoleConfig::from_toml("").unwrap();
        assert_eq!(config, ConsoleConfig::default());
        assert_eq!(config.link.transport.to_string(), "192.168.0.10:35000");
        assert!(config.resolve_profile().unwrap().is_none());
    }

    #[test]
    fn test_file_overrides_link_settings() {
        let config = ConsoleConfig::from_toml(
            r#"
            profile = "toyota c-hr/corolla"

            [link]
            timeout_ms = 750

            [link.transport]
            kind = "serial"
            device = "/dev/rfcomm0"
            "#,
        )
        .unwrap();

        assert_eq!(config.link.timeout_ms, 750);
        assert_eq!(config.link.poll_interval_ms, 500);
        assert_eq!(
            config.link.transport,
            TransportConfig::Serial {
                device: "/dev/rfcomm0".to_string(),
                baud_rate: 38400,
            }
        );
        let profile = config.resolve_profile().unwrap().unwrap();
        assert_eq!(profile.name, "Toyota C-HR/Corolla");
    }

    #[test]
    fn test_declared_profiles() {
        let config = ConsoleConfig::from_toml(
            r#"
            profile = "Fleet Van"

            [[profiles]]
            name = "Fleet Van"
            protocol = "Iso15765_4Can29bit500"
            fallback = "Auto"

            [[profiles.parameters]]
            name = "Oil Temperature"
            pid = "015C"
            "#,
        )
        .unwrap();

        assert_eq!(config.all_profiles().len(), 4);
        let profile = config.resolve_profile().unwrap().unwrap();
        assert_eq!(profile.protocol, ObdProtocol::Iso15765_4Can29bit500);
        assert_eq!(profile.parameters[0].pid, Pid::OilTemperature);
    }

    #[test]
    fn test_overrides() {
        let mut config = ConsoleConfig::default();
        Overrides {
            port: Some(23),
            profile: Some("Volkswagen Group".to_string()),
            ..Default::default()
        }
        .apply(&mut config);
        assert_eq!(config.link.transport.to_string(), "192.168.0.10:23");
        assert_eq!(config.profile.as_deref(), Some("Volkswagen Group"));

        Overrides {
            serial: Some("/dev/ttyUSB0".to_string()),
            ..Default::default()
        }
        .apply(&mut config);
        assert_eq!(config.link.transport.to_string(), "/dev/ttyUSB0@38400");

        Overrides {
            mock: true,
            host: Some("10.0.0.1".to_string()),
            ..Default::default()
        }
        .apply(&mut config);
        assert_eq!(config.link.transport, TransportConfig::Mock);
    }

    #[test]
    fn test_unknown_profile() {
        let config = ConsoleConfig {
            profile: Some("Trabant 601".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            config.resolve_profile(),
            Err(ObdError::UnknownProfile(name)) if name == "Trabant 601"
        ));
    }
}
