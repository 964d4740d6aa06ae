//! Relay configuration.
//!
//! Defines where the relay listens, the mount path it serves under, and how
//! it talks to upstream origins.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};

/// Configuration for the relay server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Bind address (default: 127.0.0.1)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: IpAddr,

    /// Bind port (0 = OS-assigned ephemeral port)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path prefix every relayed request lives under (e.g. "proxy").
    #[serde(default = "default_mount_path")]
    pub mount_path: String,

    /// Skip upstream certificate verification.
    ///
    /// Lets the relay reach origins with self-signed certificates at the cost
    /// of transport security: any party on the path can impersonate the
    /// upstream. Off by default.
    #[serde(default)]
    pub insecure_upstream_tls: bool,

    /// Upper bound for establishing an upstream connection.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Upper bound for receiving the upstream response head.
    #[serde(default = "default_response_timeout")]
    pub response_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            mount_path: default_mount_path(),
            insecure_upstream_tls: false,
            connect_timeout_secs: default_connect_timeout(),
            response_timeout_secs: default_response_timeout(),
        }
    }
}

impl RelayConfig {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    /// Mount path without surrounding slashes.
    pub fn mount(&self) -> &str {
        self.mount_path.trim_matches('/')
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    /// Reject values the router or the HTTP client cannot work with.
    pub fn validate(&self) -> Result<()> {
        let mount = self.mount();
        if mount.is_empty() {
            return Err(RelayError::Config("mount path must not be empty".into()));
        }
        if mount == "health" {
            return Err(RelayError::Config(
                "mount path `health` collides with the health endpoint".into(),
            ));
        }
        let valid_segment = |segment: &str| {
            !segment.is_empty()
                && segment
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~'))
        };
        if !mount.split('/').all(valid_segment) {
            return Err(RelayError::Config(format!(
                "mount path `{mount}` may only contain letters, digits, `-`, `_`, `.`, `~` and `/`"
            )));
        }
        if self.connect_timeout_secs == 0 || self.response_timeout_secs == 0 {
            return Err(RelayError::Config("timeouts must be at least one second".into()));
        }
        Ok(())
    }
}

fn default_bind_addr() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_port() -> u16 {
    3001
}

fn default_mount_path() -> String {
    "proxy".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_response_timeout() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.listen_addr().to_string(), "127.0.0.1:3001");
        assert_eq!(config.mount(), "proxy");
        assert!(!config.insecure_upstream_tls);
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.response_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mount_slashes_trimmed() {
        let config = RelayConfig {
            mount_path: "/api/proxy/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.mount(), "api/proxy");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_mounts_rejected() {
        for mount in ["", "/", "health", "pro{xy}", "a//b", "with space"] {
            let config = RelayConfig {
                mount_path: mount.to_string(),
                ..Default::default()
            };
            assert!(
                matches!(config.validate(), Err(RelayError::Config(_))),
                "mount {mount:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = RelayConfig {
            response_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: RelayConfig =
            serde_json::from_str(r#"{"port":8080,"insecure_upstream_tls":true}"#).unwrap();
        assert_eq!(config.port, 8080);
        assert!(config.insecure_upstream_tls);
        assert_eq!(config.mount_path, "proxy");
    }
}
