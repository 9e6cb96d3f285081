// collection-backup/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::utils::retry::RetryPolicy;

// Structs for deserializing config.json
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonS3StorageConfig {
    pub bucket_name: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonQueueConfig {
    pub queue_url: Option<String>,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonRetryOptions {
    pub max_attempts: Option<usize>,
    pub min_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJsonConfig {
    pub source_database_url: Option<String>,
    pub partitions: Option<Vec<String>>,
    pub s3_storage: Option<JsonS3StorageConfig>,
    pub queue: Option<JsonQueueConfig>,
    pub retry: Option<JsonRetryOptions>,
    pub max_concurrent_uploads: Option<usize>,
    pub run_timeout_secs: Option<u64>,
    pub date_timezone: Option<DateZone>,
}

/// Zone whose calendar decides the `<year>/<month>/<day>` of a backup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateZone {
    #[default]
    Local,
    Utc,
}

// Application's internal configuration structs
#[derive(Clone, PartialEq, Eq)]
pub struct AwsSettings {
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl fmt::Debug for AwsSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsSettings")
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "****"))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub bucket_name: String,
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub queue_url: String,
    pub region: Option<String>, // overrides the shared AWS region for the queue client
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub source_db_url: String,
    pub partitions: Option<Vec<String>>, // None backs up every discovered partition
    pub aws: AwsSettings,
    pub storage: StorageConfig,
    pub queue: QueueConfig,
    pub retry: RetryPolicy,
    pub max_concurrent_uploads: usize,
    pub run_timeout: Option<Duration>,
    pub date_timezone: DateZone,
}

impl AppConfig {
    /// Reads `config_path` (if present) and fills every gap from the
    /// process environment.
    pub fn load(config_path: &Path) -> Result<Self> {
        let raw_json_config = if config_path.exists() {
            let config_content = fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
            serde_json::from_str(&config_content).with_context(|| {
                format!(
                    "Failed to parse JSON from config file at {}",
                    config_path.display()
                )
            })?
        } else {
            tracing::warn!(
                path = %config_path.display(),
                "Config file not found, using environment variables only"
            );
            RawJsonConfig::default()
        };

        Self::resolve(raw_json_config, |name| std::env::var(name).ok())
    }

    /// Merges the parsed file with `env`; file values win over the
    /// environment, and empty strings count as unset.
    pub fn resolve(raw: RawJsonConfig, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let pick = |value: Option<&String>, var: &str| -> Option<String> {
            value
                .filter(|s| !s.trim().is_empty())
                .cloned()
                .or_else(|| env(var).filter(|s| !s.trim().is_empty()))
        };

        let s3_raw = raw.s3_storage.unwrap_or_default();
        let queue_raw = raw.queue.unwrap_or_default();
        let retry_raw = raw.retry.unwrap_or_default();

        let source_db_url = pick(raw.source_database_url.as_ref(), "DB_URL")
            .context("source_database_url must be set in config.json (or DB_URL) for backup")?;
        Url::parse(&source_db_url).context("source_database_url is not a valid URL")?;

        let bucket_name = pick(s3_raw.bucket_name.as_ref(), "BACKUP_BUCKET")
            .context("s3_storage.bucket_name must be set in config.json (or BACKUP_BUCKET)")?;
        let queue_url = pick(queue_raw.queue_url.as_ref(), "AWS_SQS_QUEUE_URL")
            .context("queue.queue_url must be set in config.json (or AWS_SQS_QUEUE_URL)")?;

        let aws = AwsSettings {
            region: pick(s3_raw.region.as_ref(), "AWS_REGION"),
            access_key_id: pick(s3_raw.access_key_id.as_ref(), "AWS_ACCESS_KEY_ID"),
            secret_access_key: pick(s3_raw.secret_access_key.as_ref(), "AWS_SECRET_ACCESS_KEY"),
        };

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: retry_raw.max_attempts.unwrap_or(defaults.max_attempts),
            min_delay: retry_raw
                .min_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.min_delay),
            max_delay: retry_raw
                .max_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
        };
        if retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        if retry.min_delay > retry.max_delay {
            anyhow::bail!("retry.min_delay_ms cannot exceed retry.max_delay_ms");
        }

        let max_concurrent_uploads = raw.max_concurrent_uploads.unwrap_or(1);
        if max_concurrent_uploads == 0 {
            anyhow::bail!("max_concurrent_uploads must be at least 1");
        }

        let partitions = raw.partitions.filter(|list| !list.is_empty());

        Ok(AppConfig {
            source_db_url,
            partitions,
            aws,
            storage: StorageConfig {
                bucket_name,
                endpoint_url: pick(s3_raw.endpoint_url.as_ref(), "AWS_ENDPOINT_URL"),
            },
            queue: QueueConfig {
                queue_url,
                region: queue_raw.region.filter(|s| !s.trim().is_empty()),
                endpoint_url: queue_raw.endpoint_url.filter(|s| !s.trim().is_empty()),
            },
            retry,
            max_concurrent_uploads,
            run_timeout: raw.run_timeout_secs.map(Duration::from_secs),
            date_timezone: raw.date_timezone.unwrap_or_default(),
        })
    }
}
