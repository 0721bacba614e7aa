//! Centralized configuration for the dev registry.
//!
//! Constants live on [`RegistryConfig`]; the runtime knobs a session can
//! change (address, timeouts, liveness) live on [`RegistrySettings`].

use crate::error::{RegistryError, Result};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Registry-level constants.
pub struct RegistryConfig;

impl RegistryConfig {
    /// Well-known port shared by every cooperating process.
    pub const DEFAULT_PORT: u16 = 6284;
    pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    pub const PORT_ENV: &'static str = "DEVREG_PORT";
    pub const HOST_ENV: &'static str = "DEVREG_HOST";

    // Liveness probing
    pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(30);
    pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

    /// Upper bound on a single worker definition body.
    pub const MAX_BODY_BYTES: usize = 64 * 1024;
}

/// How the server treats entries whose worker has gone away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LivenessPolicy {
    /// Entries persist until explicitly removed.
    #[default]
    Never,
    /// Periodically probe local workers and drop the unreachable ones.
    Probe { interval: Duration, timeout: Duration },
}

impl LivenessPolicy {
    /// Probe policy with the default interval and timeout.
    pub fn probe() -> Self {
        LivenessPolicy::Probe {
            interval: RegistryConfig::DEFAULT_PROBE_INTERVAL,
            timeout: RegistryConfig::DEFAULT_PROBE_TIMEOUT,
        }
    }
}

/// Runtime configuration for a registry session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySettings {
    pub host: IpAddr,
    pub port: u16,
    /// Per-request timeout for client calls. `None` keeps the transport default.
    pub request_timeout: Option<Duration>,
    pub liveness: LivenessPolicy,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            host: RegistryConfig::DEFAULT_HOST,
            port: RegistryConfig::DEFAULT_PORT,
            request_timeout: None,
            liveness: LivenessPolicy::Never,
        }
    }
}

impl RegistrySettings {
    /// Defaults overridden by `DEVREG_HOST` / `DEVREG_PORT` when set.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut settings = Self::default();

        if let Some(raw) = lookup(RegistryConfig::PORT_ENV) {
            settings.port = raw.trim().parse().map_err(|_| RegistryError::Config {
                message: format!("{} is not a valid port: {:?}", RegistryConfig::PORT_ENV, raw),
            })?;
        }

        if let Some(raw) = lookup(RegistryConfig::HOST_ENV) {
            settings.host = raw.trim().parse().map_err(|_| RegistryError::Config {
                message: format!(
                    "{} is not a valid IP address: {:?}",
                    RegistryConfig::HOST_ENV,
                    raw
                ),
            })?;
        }

        settings.validate()?;
        Ok(settings)
    }

    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_liveness(mut self, liveness: LivenessPolicy) -> Self {
        self.liveness = liveness;
        self
    }

    /// Reject settings that would expose the registry beyond this machine.
    pub fn validate(&self) -> Result<()> {
        if !self.host.is_loopback() {
            return Err(RegistryError::Config {
                message: format!("registry host must be a loopback address, got {}", self.host),
            });
        }
        if self.port == 0 {
            return Err(RegistryError::Config {
                message: "registry port must be fixed; 0 would defeat bind arbitration"
                    .to_string(),
            });
        }
        if let LivenessPolicy::Probe { interval, timeout } = self.liveness {
            if interval.is_zero() || timeout.is_zero() {
                return Err(RegistryError::Config {
                    message: "liveness interval and timeout must be non-zero".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Base URL of the registry, e.g. `http://127.0.0.1:6284`.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.socket_addr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = RegistrySettings::default();
        assert_eq!(settings.base_url(), "http://127.0.0.1:6284");
        assert_eq!(settings.liveness, LivenessPolicy::Never);
        assert!(settings.request_timeout.is_none());
    }

    #[test]
    fn test_env_overrides_port() {
        let settings = RegistrySettings::from_lookup(lookup_from(&[("DEVREG_PORT", "7000")]))
            .unwrap();
        assert_eq!(settings.port, 7000);
        assert_eq!(settings.host, RegistryConfig::DEFAULT_HOST);
    }

    #[test]
    fn test_env_rejects_garbage_port() {
        let err = RegistrySettings::from_lookup(lookup_from(&[("DEVREG_PORT", "http")]))
            .unwrap_err();
        assert!(matches!(err, RegistryError::Config { .. }));
    }

    #[test]
    fn test_non_loopback_host_rejected() {
        let err = RegistrySettings::from_lookup(lookup_from(&[("DEVREG_HOST", "0.0.0.0")]))
            .unwrap_err();
        assert!(err.to_string().contains("loopback"));
    }

    #[test]
    fn test_ipv6_loopback_base_url() {
        let settings = RegistrySettings::default().with_host("::1".parse().unwrap());
        assert!(settings.validate().is_ok());
        assert_eq!(settings.base_url(), "http://[::1]:6284");
    }

    #[test]
    fn test_zero_probe_interval_rejected() {
        let settings = RegistrySettings::default().with_liveness(LivenessPolicy::Probe {
            interval: Duration::ZERO,
            timeout: Duration::from_millis(100),
        });
        assert!(settings.validate().is_err());
    }
}
