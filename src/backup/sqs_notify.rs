// collection-backup/src/backup/sqs_notify.rs
use async_trait::async_trait;
use aws_sdk_sqs as sqs;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use sqs::error::DisplayErrorContext;

use crate::backup::s3_upload::load_sdk_config;
use crate::config::{AwsSettings, QueueConfig};
use crate::errors::{BackupError, Result};

/// Facts sent to the work queue. Consumers tell the variants apart by their
/// fields, so no type tag is written.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueueMessage {
    #[serde(rename_all = "camelCase")]
    ChunkFailure {
        collection: String,
        chunk_number: usize,
        #[serde(serialize_with = "millis_rfc3339")]
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    RunSummary {
        collection: String,
        total_chunks: usize,
        uploaded_chunks: usize,
        #[serde(serialize_with = "millis_rfc3339")]
        timestamp: DateTime<Utc>,
    },
}

impl QueueMessage {
    pub fn to_body(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// 2024-06-15T10:00:00.000Z
fn millis_rfc3339<S: Serializer>(at: &DateTime<Utc>, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&at.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Append-only message sink.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn send(&self, queue_url: &str, body: String) -> Result<()>;
}

pub struct SqsQueue {
    client: sqs::Client,
}

impl SqsQueue {
    pub async fn connect(aws: &AwsSettings, queue: &QueueConfig) -> Self {
        let aws = AwsSettings {
            region: queue.region.clone().or_else(|| aws.region.clone()),
            ..aws.clone()
        };
        let sdk_config = load_sdk_config(&aws, queue.endpoint_url.as_deref()).await;
        tracing::info!(queue_url = %queue.queue_url, region = ?aws.region, "Work queue client ready");
        SqsQueue {
            client: sqs::Client::new(&sdk_config),
        }
    }
}

#[async_trait]
impl WorkQueue for SqsQueue {
    async fn send(&self, queue_url: &str, body: String) -> Result<()> {
        self.client
            .send_message()
            .queue_url(queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|err| BackupError::Notification(DisplayErrorContext(&err).to_string()))?;
        Ok(())
    }
}
