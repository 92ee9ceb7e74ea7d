//! Ring configuration and the json config file used by the `bucketring` binary.
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{
    error::{Error, Result},
    hash::HashAlgorithm,
    ring::{HashRing, BUCKETS_NUMBER, POINTS_PER_SERVER},
};

/// Tuning knobs of a [`HashRing`]. Both are fixed at construction time.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RingConfig {
    /// Virtual points per node. More points means a more even distribution
    /// but also more memory and slower rebuilds
    #[serde(default = "default_replicas")]
    pub replicas: usize,
    /// Size of the bucket table. More buckets means finer routing granularity
    #[serde(default = "default_buckets_number")]
    pub buckets_number: usize,
    #[serde(default)]
    pub hash: HashAlgorithm,
}

fn default_replicas() -> usize {
    POINTS_PER_SERVER
}

fn default_buckets_number() -> usize {
    BUCKETS_NUMBER
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            replicas: POINTS_PER_SERVER,
            buckets_number: BUCKETS_NUMBER,
            hash: HashAlgorithm::default(),
        }
    }
}

impl RingConfig {
    /// Checks the ring arguments against a hash function producing values in `[0, domain_max]`
    pub fn validate(replicas: usize, buckets_number: usize, domain_max: u32) -> Result<()> {
        if replicas == 0 {
            return Err(Error::InvalidConfig {
                reason: "replicas must be at least 1".to_string(),
            });
        }

        if buckets_number == 0 || buckets_number as u64 > domain_max as u64 {
            return Err(Error::InvalidConfig {
                reason: format!(
                    "buckets_number must be in [1, {}], got {}",
                    domain_max, buckets_number
                ),
            });
        }

        Ok(())
    }
}

/// A static description of a ring: its nodes and how it's tuned
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ClusterConfig {
    pub nodes: Vec<String>,
    #[serde(flatten)]
    pub ring: RingConfig,
}

impl ClusterConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let stringified_json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&stringified_json)?)
    }
}

impl HashRing<String> {
    pub fn from_config(config: ClusterConfig) -> Result<Self> {
        HashRing::new(config.nodes, config.ring)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{ClusterConfig, RingConfig};
    use crate::{hash::HashAlgorithm, ring::HashRing};

    #[test]
    fn deserialize_cluster() {
        let mut config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        config_path.push("conf/ring.json");

        let config = ClusterConfig::from_path(config_path).unwrap();

        assert!(matches!(
            config,
            ClusterConfig {
                ring: RingConfig {
                    replicas: 160,
                    buckets_number: 1024,
                    hash: HashAlgorithm::Crc32,
                },
                ..
            }
        ));
        assert_eq!(
            config.nodes,
            vec![
                "cache-1:11211".to_string(),
                "cache-2:11211".to_string(),
                "cache-3:11211".to_string(),
            ]
        );

        let ring = HashRing::from_config(config).unwrap();
        assert_eq!(ring.len().unwrap(), 3);
    }

    #[test]
    fn deserialize_defaults() {
        let config: ClusterConfig = serde_json::from_str(r#"{"nodes": ["a", "b"]}"#).unwrap();
        assert_eq!(config.ring, RingConfig::default());

        let config: ClusterConfig = serde_json::from_str(
            r#"{"nodes": [], "replicas": 10, "buckets_number": 64, "hash": "crc32c"}"#,
        )
        .unwrap();
        assert_eq!(
            config.ring,
            RingConfig {
                replicas: 10,
                buckets_number: 64,
                hash: HashAlgorithm::Crc32c,
            }
        );
    }

    #[test]
    fn missing_file() {
        let err = ClusterConfig::from_path("conf/does_not_exist.json").unwrap_err();
        assert!(matches!(err, crate::error::Error::Io { .. }));
    }

    #[test]
    fn validate() {
        assert!(RingConfig::validate(1, 1, u32::MAX).is_ok());
        assert!(RingConfig::validate(0, 1, u32::MAX).is_err());
        assert!(RingConfig::validate(1, 0, u32::MAX).is_err());
        assert!(RingConfig::validate(160, 64, 63).is_err());
        assert!(RingConfig::validate(160, 63, 63).is_ok());
    }
}
