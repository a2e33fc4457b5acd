//! Runtime configuration
//!
//! Every section has defaults matching the deployed field setup, so an
//! absent or partial TOML file is valid:
//!
//! ```toml
//! [remote]
//! base_url = "http://raspberrypi.local"
//!
//! [batch]
//! max_pending = 2
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AirlinkError, AirlinkResult};
use crate::verify::AUTHORITY_PUBLIC_KEY;

/// Service identifier peers advertise and scan for.
pub const DEFAULT_SERVICE_ID: &str = "fa87c0d0-afac-11de-8a39-0800200c9a66";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AirlinkConfig {
    pub remote: RemoteConfig,
    pub cache: CacheConfig,
    pub authority: AuthorityConfig,
    pub batch: BatchConfig,
    pub link: LinkConfig,
    pub scheduler: SchedulerConfig,
}

impl AirlinkConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> AirlinkResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> AirlinkResult<Self> {
        toml::from_str(content).map_err(|e| AirlinkError::Config(e.to_string()))
    }

    /// Load `path` if given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> AirlinkResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Render as TOML, used by `airlink info`.
    pub fn to_toml(&self) -> AirlinkResult<String> {
        toml::to_string_pretty(self).map_err(|e| AirlinkError::Config(e.to_string()))
    }
}

/// Default data directory: `~/.airlink/data`.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".airlink")
        .join("data")
}

/// Where the signed endpoints live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub flights_path: String,
    pub news_path: String,
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://raspberrypi.local".to_string(),
            flights_path: "api/ALL/data".to_string(),
            news_path: "api/ALL/news".to_string(),
            timeout_secs: 10,
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long a verified payload is served without refetching
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 15 * 60 }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorityConfig {
    /// Base64 SubjectPublicKeyInfo DER
    pub public_key: String,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            public_key: AUTHORITY_PUBLIC_KEY.to_string(),
        }
    }
}

/// Thresholds for the profile writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Flush once this many fields are pending
    pub max_pending: usize,
    /// Flush once this long has passed since the last flush
    pub max_age_ms: u64,
    /// Minimum spacing between flush checks
    pub flush_throttle_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_pending: 3,
            max_age_ms: 5000,
            flush_throttle_ms: 1000,
        }
    }
}

impl BatchConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_millis(self.max_age_ms)
    }

    pub fn flush_throttle(&self) -> Duration {
        Duration::from_millis(self.flush_throttle_ms)
    }
}

/// A peer reachable without discovery, listed by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticPeer {
    /// Advertised name; matched against the pairing code
    pub name: String,
    /// `host:port`
    pub addr: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub bind_addr: String,
    pub service_id: String,
    pub connect_timeout_secs: u64,
    pub discovery_timeout_secs: u64,
    pub read_buffer: usize,
    pub peers: Vec<StaticPeer>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:0".to_string(),
            service_id: DEFAULT_SERVICE_ID.to_string(),
            connect_timeout_secs: 10,
            discovery_timeout_secs: 12,
            read_buffer: 1024,
            peers: Vec::new(),
        }
    }
}

impl LinkConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }
}

/// Retry pacing for the `watch` loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub initial_backoff_secs: u64,
    pub max_backoff_secs: u64,
    pub interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            initial_backoff_secs: 30,
            max_backoff_secs: 30 * 60,
            interval_secs: 15 * 60,
        }
    }
}

impl SchedulerConfig {
    /// Delay before retry number `attempt` (0-based), doubling up to the cap.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
        let secs = self
            .initial_backoff_secs
            .saturating_mul(factor)
            .min(self.max_backoff_secs);
        Duration::from_secs(secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_yields_defaults() {
        let config = AirlinkConfig::from_toml("").unwrap();
        assert_eq!(config, AirlinkConfig::default());
        assert_eq!(config.cache.ttl(), Duration::from_secs(900));
        assert_eq!(config.remote.flights_path, "api/ALL/data");
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = AirlinkConfig::from_toml(
            r#"
            [batch]
            max_pending = 2

            [[link.peers]]
            name = "gate-B12-4821"
            addr = "10.0.0.7:7000"
            "#,
        )
        .unwrap();

        assert_eq!(config.batch.max_pending, 2);
        assert_eq!(config.batch.max_age_ms, 5000);
        assert_eq!(config.link.peers.len(), 1);
        assert_eq!(config.link.service_id, DEFAULT_SERVICE_ID);
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = AirlinkConfig::from_toml("[remote\nbase_url = 1").unwrap_err();
        assert!(matches!(err, AirlinkError::Config(_)));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let scheduler = SchedulerConfig::default();
        assert_eq!(scheduler.backoff(0), Duration::from_secs(30));
        assert_eq!(scheduler.backoff(1), Duration::from_secs(60));
        assert_eq!(scheduler.backoff(5), Duration::from_secs(960));
        assert_eq!(scheduler.backoff(6), Duration::from_secs(1800));
        assert_eq!(scheduler.backoff(64), Duration::from_secs(1800));
    }

    #[test]
    fn test_round_trips_through_toml() {
        let config = AirlinkConfig::default();
        let text = config.to_toml().unwrap();
        assert_eq!(AirlinkConfig::from_toml(&text).unwrap(), config);
    }
}
