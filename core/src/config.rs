//! Engine configuration, loaded once at startup from a TOML file.
//!
//! Every tunable the engine exposes lives here with a documented default;
//! nothing is a hidden constant. A malformed configuration is fatal before
//! any polling begins and never mid-run.
//!
//! ```toml
//! max_concurrent_polls = 8
//!
//! [[target]]
//! id = "core-router"
//! host = "10.0.0.1"
//! community = "public"
//! poll_interval_secs = 5
//! interfaces = [1, 2]          # empty or omitted: discover and monitor all
//! metrics = ["in-octets", "out-octets"]
//! retention_points = 720
//! ```

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::sample::MetricKind;
use crate::scheduler::health::ResilienceConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("no targets configured")]
    NoTargets,
    #[error("duplicate target id `{0}`")]
    DuplicateTarget(String),
    #[error("target `{0}`: {1}")]
    InvalidTarget(String, String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Cap on SNMP requests in flight across all targets.
    #[serde(default = "default_max_concurrent_polls")]
    pub max_concurrent_polls: usize,

    #[serde(default, rename = "target")]
    pub targets: Vec<TargetConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    pub id: String,

    /// Device address, `host` or `host:port` (SNMP default port 161).
    pub host: String,

    #[serde(default = "default_community")]
    pub community: String,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// ifIndex values to monitor. Empty means discover and monitor all.
    #[serde(default)]
    pub interfaces: Vec<u32>,

    #[serde(default = "default_metrics")]
    pub metrics: Vec<MetricKind>,

    /// Points kept per (interface, metric) series.
    #[serde(default = "default_retention_points")]
    pub retention_points: usize,

    /// Optional age cap on retained points, seconds.
    #[serde(default)]
    pub retention_max_age_secs: Option<u64>,

    /// Hard per-request timeout, distinct from the retry/backoff policy.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Prefer GETBULK column walks over per-OID GETs.
    #[serde(default = "default_true")]
    pub prefer_getbulk: bool,

    /// Consecutive failures before Healthy -> Degraded.
    #[serde(default = "default_degraded_after")]
    pub degraded_after: u32,

    /// Consecutive failures before Degraded -> Down.
    #[serde(default = "default_down_after")]
    pub down_after: u32,

    /// Ceiling for the exponential poll backoff while Down.
    #[serde(default = "default_backoff_ceiling")]
    pub backoff_ceiling_secs: u64,

    /// Retry interval after an authentication failure.
    #[serde(default = "default_auth_retry")]
    pub auth_retry_secs: u64,

    /// A derived rate above `factor x nominal capacity` is treated as a
    /// counter reset and recorded as a gap.
    #[serde(default = "default_plausibility_factor")]
    pub plausibility_factor: f64,

    /// Assumed capacity when the device does not report ifHighSpeed.
    #[serde(default = "default_fallback_capacity")]
    pub fallback_capacity_bps: u64,
}

fn default_max_concurrent_polls() -> usize {
    8
}

fn default_community() -> String {
    "public".to_string()
}

fn default_poll_interval() -> u64 {
    5
}

fn default_metrics() -> Vec<MetricKind> {
    vec![MetricKind::InOctets, MetricKind::OutOctets]
}

fn default_retention_points() -> usize {
    720
}

fn default_request_timeout_ms() -> u64 {
    2000
}

fn default_true() -> bool {
    true
}

fn default_degraded_after() -> u32 {
    3
}

fn default_down_after() -> u32 {
    8
}

fn default_backoff_ceiling() -> u64 {
    300
}

fn default_auth_retry() -> u64 {
    600
}

fn default_plausibility_factor() -> f64 {
    2.0
}

fn default_fallback_capacity() -> u64 {
    100_000_000_000 // 100 Gb/s
}

impl EngineConfig {
    /// Load and validate a configuration file.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        let config: EngineConfig =
            toml::de::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_string(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }
        let mut seen = std::collections::HashSet::new();
        for target in &self.targets {
            if !seen.insert(target.id.as_str()) {
                return Err(ConfigError::DuplicateTarget(target.id.clone()));
            }
            target.validate()?;
        }
        Ok(())
    }
}

impl TargetConfig {
    /// A target with every tunable at its default. Callers fill in the
    /// fields they care about.
    pub fn new(id: &str, host: &str) -> Self {
        Self {
            id: id.to_string(),
            host: host.to_string(),
            community: default_community(),
            poll_interval_secs: default_poll_interval(),
            interfaces: Vec::new(),
            metrics: default_metrics(),
            retention_points: default_retention_points(),
            retention_max_age_secs: None,
            request_timeout_ms: default_request_timeout_ms(),
            prefer_getbulk: true,
            degraded_after: default_degraded_after(),
            down_after: default_down_after(),
            backoff_ceiling_secs: default_backoff_ceiling(),
            auth_retry_secs: default_auth_retry(),
            plausibility_factor: default_plausibility_factor(),
            fallback_capacity_bps: default_fallback_capacity(),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| ConfigError::InvalidTarget(self.id.clone(), msg.to_string());
        if self.id.trim().is_empty() {
            return Err(ConfigError::InvalidTarget(
                "<unnamed>".to_string(),
                "empty id".to_string(),
            ));
        }
        if self.host.trim().is_empty() {
            return Err(invalid("empty host"));
        }
        if self.poll_interval_secs == 0 {
            return Err(invalid("poll_interval_secs must be at least 1"));
        }
        if self.metrics.is_empty() {
            return Err(invalid("no metrics selected"));
        }
        if self.retention_points == 0 {
            return Err(invalid("retention_points must be at least 1"));
        }
        if self.request_timeout_ms == 0 {
            return Err(invalid("request_timeout_ms must be at least 1"));
        }
        if self.degraded_after == 0 || self.down_after <= self.degraded_after {
            return Err(invalid("thresholds must satisfy 0 < degraded_after < down_after"));
        }
        if !(self.plausibility_factor > 0.0) {
            return Err(invalid("plausibility_factor must be positive"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn resilience(&self) -> ResilienceConfig {
        ResilienceConfig {
            poll_interval: self.poll_interval(),
            degraded_after: self.degraded_after,
            down_after: self.down_after,
            backoff_ceiling: Duration::from_secs(self.backoff_ceiling_secs),
            auth_retry: Duration::from_secs(self.auth_retry_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_target_gets_documented_defaults() {
        let config: EngineConfig = toml::de::from_str(
            r#"
            [[target]]
            id = "edge"
            host = "192.0.2.10"
            "#,
        )
        .unwrap();
        config.validate().unwrap();

        let target = &config.targets[0];
        assert_eq!(target.community, "public");
        assert_eq!(target.poll_interval_secs, 5);
        assert_eq!(target.metrics, vec![MetricKind::InOctets, MetricKind::OutOctets]);
        assert_eq!(target.retention_points, 720);
        assert!(target.prefer_getbulk);
        assert_eq!(config.max_concurrent_polls, 8);
    }

    #[test]
    fn metric_names_use_kebab_case() {
        let config: EngineConfig = toml::de::from_str(
            r#"
            [[target]]
            id = "edge"
            host = "192.0.2.10"
            metrics = ["in-octets", "out-ucast-pkts"]
            "#,
        )
        .unwrap();
        assert_eq!(
            config.targets[0].metrics,
            vec![MetricKind::InOctets, MetricKind::OutUcastPkts]
        );
    }

    #[test]
    fn duplicate_target_ids_are_rejected() {
        let config: EngineConfig = toml::de::from_str(
            r#"
            [[target]]
            id = "edge"
            host = "192.0.2.10"

            [[target]]
            id = "edge"
            host = "192.0.2.11"
            "#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateTarget(id)) if id == "edge"
        ));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let config: EngineConfig = toml::de::from_str(
            r#"
            [[target]]
            id = "edge"
            host = "192.0.2.10"
            poll_interval_secs = 0
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_target_list_is_rejected() {
        let config: EngineConfig = toml::de::from_str("").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::NoTargets)));
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let config: EngineConfig = toml::de::from_str(
            r#"
            [[target]]
            id = "edge"
            host = "192.0.2.10"
            degraded_after = 8
            down_after = 3
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }
}
