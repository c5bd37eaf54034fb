//! Bridge configuration from environment variables

use anyhow::{anyhow, Context};
use lip_protocol::LipConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_REFRESH_SECS: u64 = 300;
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_DATA_DIR: &str = "./data";

/// Runtime configuration for the bridge
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub lip: LipConfig,
    /// How often every known device is re-queried
    pub refresh_interval: Duration,
    pub data_dir: PathBuf,
    pub bind_addr: SocketAddr,
}

impl BridgeConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup
    ///
    /// `LUTRON_HOST` is required. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host = get("LUTRON_HOST").ok_or_else(|| anyhow!("LUTRON_HOST must be set"))?;
        let mut lip = LipConfig::new(host);

        if let Some(port) = get("LUTRON_PORT") {
            lip.port = port
                .parse()
                .with_context(|| format!("invalid LUTRON_PORT: {port}"))?;
        }
        if let Some(username) = get("LUTRON_USERNAME") {
            lip.username = username;
        }
        if let Some(password) = get("LUTRON_PASSWORD") {
            lip.password = password;
        }

        let refresh_secs = match get("LUTRON_REFRESH_SECS") {
            Some(secs) => secs
                .parse::<u64>()
                .with_context(|| format!("invalid LUTRON_REFRESH_SECS: {secs}"))?,
            None => DEFAULT_REFRESH_SECS,
        };
        if refresh_secs == 0 {
            anyhow::bail!("LUTRON_REFRESH_SECS must be greater than zero");
        }

        let data_dir = PathBuf::from(get("DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.into()));

        let bind = get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.into());
        let bind_addr = bind
            .parse()
            .with_context(|| format!("invalid BIND_ADDR: {bind}"))?;

        Ok(Self {
            lip,
            refresh_interval: Duration::from_secs(refresh_secs),
            data_dir,
            bind_addr,
        })
    }

    #[must_use]
    pub fn inventory_path(&self) -> PathBuf {
        self.data_dir.join("inventory.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::from_lookup(lookup(&[("LUTRON_HOST", "192.168.1.50")])).unwrap();
        assert_eq!(config.lip.host, "192.168.1.50");
        assert_eq!(config.lip.port, 23);
        assert_eq!(config.lip.username, "lutron");
        assert_eq!(config.lip.password, "integration");
        assert_eq!(config.refresh_interval, Duration::from_secs(300));
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.inventory_path(), PathBuf::from("./data/inventory.json"));
    }

    #[test]
    fn test_overrides() {
        let config = BridgeConfig::from_lookup(lookup(&[
            ("LUTRON_HOST", "repeater.local"),
            ("LUTRON_PORT", "2323"),
            ("LUTRON_USERNAME", "admin"),
            ("LUTRON_PASSWORD", "secret"),
            ("LUTRON_REFRESH_SECS", "30"),
            ("DATA_DIR", "/var/lib/lutron"),
            ("BIND_ADDR", "127.0.0.1:8080"),
        ]))
        .unwrap();
        assert_eq!(config.lip.address(), "repeater.local:2323");
        assert_eq!(config.lip.username, "admin");
        assert_eq!(config.lip.password, "secret");
        assert_eq!(config.refresh_interval, Duration::from_secs(30));
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/lutron"));
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
    }

    #[test]
    fn test_invalid_values() {
        assert!(BridgeConfig::from_lookup(lookup(&[])).is_err());
        assert!(BridgeConfig::from_lookup(lookup(&[("LUTRON_HOST", "  ")])).is_err());
        assert!(
            BridgeConfig::from_lookup(lookup(&[("LUTRON_HOST", "h"), ("LUTRON_PORT", "telnet")]))
                .is_err()
        );
        assert!(BridgeConfig::from_lookup(lookup(&[
            ("LUTRON_HOST", "h"),
            ("LUTRON_REFRESH_SECS", "0")
        ]))
        .is_err());
        assert!(
            BridgeConfig::from_lookup(lookup(&[("LUTRON_HOST", "h"), ("BIND_ADDR", "nowhere")]))
                .is_err()
        );
    }
}
