//! Link configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default adapter address for Wi-Fi ELM327 dongles
pub const DEFAULT_HOST: &str = "192.168.0.10";
/// Default adapter TCP port
pub const DEFAULT_PORT: u16 = 35000;
/// Default serial baud rate for USB/Bluetooth adapters
pub const DEFAULT_BAUD_RATE: u32 = 38400;

/// Where the adapter lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    /// OBD-to-IP adapter reachable over TCP
    Tcp { host: String, port: u16 },
    /// Serial adapter (USB or Bluetooth SPP)
    Serial {
        device: String,
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
    /// In-process simulated adapter
    Mock,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Tcp {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl fmt::Display for TransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportConfig::Tcp { host, port } => write!(f, "{}:{}", host, port),
            TransportConfig::Serial { device, baud_rate } => write!(f, "{}@{}", device, baud_rate),
            TransportConfig::Mock => write!(f, "mock"),
        }
    }
}

/// Connection and pacing settings for one diagnostic link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Adapter transport
    pub transport: TransportConfig,
    /// Per-exchange response timeout (milliseconds)
    pub timeout_ms: u64,
    /// Delay between poll cycles (milliseconds)
    pub poll_interval_ms: u64,
    /// Wait after a failed request before the next cycle (milliseconds)
    pub error_backoff_ms: u64,
    /// Socket read chunk size in bytes
    pub buffer_size: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            timeout_ms: 2000,
            poll_interval_ms: 500,
            error_backoff_ms: 1000,
            buffer_size: 1024,
        }
    }
}

impl LinkConfig {
    /// TCP link to the given adapter with default timings
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            transport: TransportConfig::Tcp {
                host: host.into(),
                port,
            },
            ..Default::default()
        }
    }

    /// Link to the built-in simulated adapter with short timings
    pub fn mock() -> Self {
        Self {
            transport: TransportConfig::Mock,
            timeout_ms: 100,
            poll_interval_ms: 50,
            error_backoff_ms: 100,
            ..Default::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_wifi_adapter() {
        let config = LinkConfig::default();
        assert_eq!(config.transport.to_string(), "192.168.0.10:35000");
        assert_eq!(config.timeout(), Duration::from_secs(2));
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.buffer_size, 1024);
    }

    #[test]
    fn test_partial_config_deserializes_with_defaults() {
        let config: LinkConfig = serde_json::from_str(
            r#"{
                "transport": {"kind": "serial", "device": "/dev/ttyUSB0", "baud_rate": 115200},
                "timeout_ms": 500
            }"#,
        )
        .unwrap();
        assert_eq!(
            config.transport,
            TransportConfig::Serial {
                device: "/dev/ttyUSB0".to_string(),
                baud_rate: 115200
            }
        );
        assert_eq!(config.timeout_ms, 500);
        assert_eq!(config.poll_interval_ms, 500);
    }

    #[test]
    fn test_serial_baud_rate_defaults() {
        let transport: TransportConfig =
            serde_json::from_str(r#"{"kind": "serial", "device": "COM3"}"#).unwrap();
        assert_eq!(transport.to_string(), "COM3@38400");
    }
}
