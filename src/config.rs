// src/config.rs
//! Configuration file parsing for `opcat`
//!
//! Supports TOML configuration files with the following sections:
//! - [cache] - Sync interval, gRPC timeout, connection reuse
//! - [[catalog_sources]] - Statically registered catalog sources
//! - [[install_requests]] - Packages to resolve

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::cache::CacheConfig;
use crate::catalog::CatalogSource;
use crate::registry::{GrpcRegistryClient, ProxyConfig};
use crate::resolution::InstallRequest;

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize)]
pub struct CatalogConfig {
    /// Cache settings
    #[serde(default)]
    pub cache: CacheSection,

    #[serde(default)]
    pub catalog_sources: Vec<CatalogSource>,

    #[serde(default)]
    pub install_requests: Vec<InstallRequest>,
}

/// Cache and registry client settings
#[derive(Debug, Deserialize)]
pub struct CacheSection {
    /// Resync interval for polled sources (e.g., "5m")
    #[serde(default = "default_sync_interval")]
    pub sync_interval: String,

    /// Per-fetch registry timeout (e.g., "2m")
    #[serde(default = "default_grpc_timeout")]
    pub grpc_timeout: String,

    /// Keep registry connections open between fetches
    #[serde(default = "default_true")]
    pub reuse_connections: bool,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            sync_interval: default_sync_interval(),
            grpc_timeout: default_grpc_timeout(),
            reuse_connections: true,
        }
    }
}

fn default_sync_interval() -> String {
    "5m".to_string()
}

fn default_grpc_timeout() -> String {
    "2m".to_string()
}

fn default_true() -> bool {
    true
}

impl CatalogConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: CatalogConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let interval = self.sync_interval()?;
        if interval.is_zero() {
            anyhow::bail!("cache.sync_interval must be greater than zero");
        }
        self.grpc_timeout()?;

        let mut keys = std::collections::HashSet::new();
        for source in &self.catalog_sources {
            if source.name.is_empty() || source.namespace.is_empty() {
                anyhow::bail!("catalog source needs both name and namespace");
            }
            if source.registry_address().is_none() {
                anyhow::bail!("catalog source '{}' has no address or service", source.key());
            }
            if !keys.insert(source.key()) {
                anyhow::bail!("catalog source '{}' is defined more than once", source.key());
            }
        }

        for request in &self.install_requests {
            if request.package_name.is_empty() {
                anyhow::bail!("install request '{}' has an empty package_name", request.name);
            }
        }

        Ok(())
    }

    pub fn sync_interval(&self) -> Result<Duration> {
        parse_duration(&self.cache.sync_interval)
            .with_context(|| format!("Invalid cache.sync_interval: {}", self.cache.sync_interval))
    }

    pub fn grpc_timeout(&self) -> Result<Duration> {
        parse_duration(&self.cache.grpc_timeout)
            .with_context(|| format!("Invalid cache.grpc_timeout: {}", self.cache.grpc_timeout))
    }

    /// Cache settings as a [`CacheConfig`]
    pub fn cache_config(&self) -> Result<CacheConfig> {
        Ok(CacheConfig::default().with_sync_interval(self.sync_interval()?))
    }

    /// Registry client with the configured timeout and proxy settings from the environment
    pub fn registry_client(&self) -> Result<GrpcRegistryClient> {
        Ok(GrpcRegistryClient::new(self.grpc_timeout()?)
            .with_connection_reuse(self.cache.reuse_connections)
            .with_proxy_config(ProxyConfig::from_env()))
    }
}

/// Parse a human-readable duration string (e.g., "30s", "5m", "2h", "1d")
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();

    let (num_str, multiplier): (&str, u64) = if let Some(n) = s.strip_suffix('d') {
        (n, 24 * 60 * 60)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 60 * 60)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1)
    } else {
        // Assume seconds
        (s.as_str(), 1)
    };

    let num: u64 = num_str
        .trim()
        .parse()
        .with_context(|| format!("Invalid duration number: {}", num_str))?;

    let secs = num
        .checked_mul(multiplier)
        .with_context(|| format!("Duration out of range: {}", s))?;
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration(" 2H ").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("2d").unwrap(), Duration::from_secs(2 * 24 * 3600));
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn test_parse_duration_overflow() {
        let err = parse_duration("6000000000000000h").unwrap_err();
        assert!(err.to_string().contains("Duration out of range"));
        assert!(parse_duration("999999999999999999999").is_err());
        assert_eq!(
            parse_duration(&format!("{}s", u64::MAX)).unwrap(),
            Duration::from_secs(u64::MAX)
        );
    }

    #[test]
    fn test_default_config() {
        let config = CatalogConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sync_interval().unwrap(), Duration::from_secs(300));
        assert_eq!(config.grpc_timeout().unwrap(), Duration::from_secs(120));
        assert!(config.cache.reuse_connections);
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
[cache]
sync_interval = "30s"
reuse_connections = false

[[catalog_sources]]
name = "operatorhub"
namespace = "olm"
address = "localhost:50051"

[[catalog_sources]]
name = "community"
namespace = "olm"

[catalog_sources.service]
name = "community"
namespace = "olm"
port = 50051

[[install_requests]]
name = "prometheus"
package_name = "prometheus"
version = ">=0.40.0"
channel = "beta"
"#;
        let config: CatalogConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.sync_interval().unwrap(), Duration::from_secs(30));
        assert_eq!(config.grpc_timeout().unwrap(), Duration::from_secs(120));
        assert!(!config.cache.reuse_connections);

        assert_eq!(config.catalog_sources.len(), 2);
        assert_eq!(config.catalog_sources[0].key(), "olm/operatorhub");
        assert!(config.catalog_sources[1].is_managed());
        assert_eq!(
            config.catalog_sources[1].registry_address().as_deref(),
            Some("community.olm.svc:50051")
        );

        let request = &config.install_requests[0];
        assert_eq!(request.version.as_deref(), Some(">=0.40.0"));
        assert_eq!(request.channel.as_deref(), Some("beta"));
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let toml_str = r#"
[[catalog_sources]]
name = "a"
namespace = "olm"
address = "localhost:1"

[[catalog_sources]]
name = "a"
namespace = "olm"
address = "localhost:2"
"#;
        let config: CatalogConfig = toml::from_str(toml_str).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("defined more than once"));
    }

    #[test]
    fn test_validate_rejects_unreachable_source() {
        let config = CatalogConfig {
            catalog_sources: vec![CatalogSource::new("a", "olm", "")],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[cache]\nsync_interval = \"10m\"").unwrap();
        let config = CatalogConfig::load(file.path()).unwrap();
        assert_eq!(config.sync_interval().unwrap(), Duration::from_secs(600));

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        writeln!(bad, "[cache]\nsync_interval = \"whenever\"").unwrap();
        assert!(CatalogConfig::load(bad.path()).is_err());
    }
}
