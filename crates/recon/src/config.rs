use serde::{Deserialize, Serialize};

use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Per-source configuration, injected into each run.
///
/// Paths, URLs and field names all live here rather than in module-level
/// constants, so a run can be exercised against temp files with no network.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    /// Path of the base database CSV this source maintains.
    pub destination: String,
    /// Field whose value uniquely identifies a record.
    pub identity_field: String,
    /// Field whose comparable value decides which of two same-identity
    /// records is more recent. Absent → append-only dedup.
    #[serde(default)]
    pub freshness_field: Option<String>,
    #[serde(default)]
    pub mode: MergeMode,
    /// Upstream snapshot URL for sources with a direct CSV feed.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub partition: Option<PartitionConfig>,
    #[serde(default)]
    pub batch: Option<BatchConfig>,
}

// ---------------------------------------------------------------------------
// Merge mode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// Baseline rows are never overwritten; only new identity keys append.
    DedupAppend,
    /// Whole-row replacement when the incoming record is strictly newer.
    FreshnessMerge,
}

impl Default for MergeMode {
    fn default() -> Self {
        Self::DedupAppend
    }
}

impl std::fmt::Display for MergeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DedupAppend => write!(f, "dedup_append"),
            Self::FreshnessMerge => write!(f, "freshness_merge"),
        }
    }
}

// ---------------------------------------------------------------------------
// Partition + Batch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct PartitionConfig {
    /// Root directory of the partitioned base databases.
    pub base_dir: String,
}

/// Batch scoring API settings (EPSS-style sources).
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    pub api_url: String,
    /// Query parameter carrying the comma-joined identity keys.
    #[serde(default = "default_query_param")]
    pub query_param: String,
    /// JSON key of the response array.
    #[serde(default = "default_response_root")]
    pub response_root: String,
    /// Fields extracted from each response item, in output column order.
    /// The first one is the identity key.
    pub response_fields: Vec<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Minimum interval between API calls.
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
    /// Sleep before retrying a rate-limited batch.
    #[serde(default = "default_rate_limit_sleep_secs")]
    pub rate_limit_sleep_secs: u64,
    /// Consecutive rate-limit responses tolerated before giving up.
    #[serde(default = "default_max_rate_limit_retries")]
    pub max_rate_limit_retries: u32,
}

fn default_query_param() -> String {
    "cve".into()
}

fn default_response_root() -> String {
    "data".into()
}

fn default_batch_size() -> usize {
    100
}

fn default_throttle_ms() -> u64 {
    60
}

fn default_rate_limit_sleep_secs() -> u64 {
    120
}

fn default_max_rate_limit_retries() -> u32 {
    5
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl SourceConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: SourceConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.name.trim().is_empty() {
            return Err(ReconError::ConfigValidation("name must not be empty".into()));
        }
        if self.destination.trim().is_empty() {
            return Err(ReconError::ConfigValidation(
                "destination must not be empty".into(),
            ));
        }
        if self.identity_field.trim().is_empty() {
            return Err(ReconError::ConfigValidation(
                "identity_field must not be empty".into(),
            ));
        }

        if self.mode == MergeMode::FreshnessMerge
            && self.freshness_field.as_deref().map_or(true, |f| f.trim().is_empty())
        {
            return Err(ReconError::ConfigValidation(
                "mode = \"freshness_merge\" requires a freshness_field".into(),
            ));
        }

        if let Some(ref partition) = self.partition {
            if partition.base_dir.trim().is_empty() {
                return Err(ReconError::ConfigValidation(
                    "partition.base_dir must not be empty".into(),
                ));
            }
        }

        if let Some(ref batch) = self.batch {
            if batch.api_url.trim().is_empty() {
                return Err(ReconError::ConfigValidation(
                    "batch.api_url must not be empty".into(),
                ));
            }
            if batch.response_fields.is_empty() {
                return Err(ReconError::ConfigValidation(
                    "batch.response_fields must name at least one field".into(),
                ));
            }
            if batch.batch_size == 0 {
                return Err(ReconError::ConfigValidation(
                    "batch.batch_size must be at least 1".into(),
                ));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
