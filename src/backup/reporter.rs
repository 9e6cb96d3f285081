// collection-backup/src/backup/reporter.rs
use std::sync::Arc;

use async_trait::async_trait;
use backon::Retryable;
use chrono::Utc;

use crate::backup::sqs_notify::{QueueMessage, WorkQueue};
use crate::utils::retry::RetryPolicy;

/// Reports per-chunk failures and per-partition summaries downstream.
///
/// Neither method fails observably: delivery problems are retried and then
/// logged, so the backup loop never has to branch on them.
#[async_trait]
pub trait BackupReporter: Send + Sync {
    async fn report_chunk_failure(&self, collection: &str, chunk_number: usize);

    async fn report_run_summary(&self, collection: &str, total_chunks: usize, uploaded_chunks: usize);
}

/// Sends reports to the configured work queue.
pub struct QueueReporter {
    queue: Arc<dyn WorkQueue>,
    queue_url: String,
    retry: RetryPolicy,
}

impl QueueReporter {
    pub fn new(queue: Arc<dyn WorkQueue>, queue_url: impl Into<String>, retry: RetryPolicy) -> Self {
        QueueReporter {
            queue,
            queue_url: queue_url.into(),
            retry,
        }
    }

    async fn deliver(&self, message: QueueMessage) {
        let body = match message.to_body() {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, ?message, "Dropping queue message that failed to serialize");
                return;
            }
        };

        let sent = (|| async { self.queue.send(&self.queue_url, body.clone()).await })
            .retry(self.retry.backoff())
            .notify(|err, dur| {
                tracing::warn!(
                    error = %err,
                    "Queue send failed. Retrying in {:.1}s",
                    dur.as_secs_f32()
                );
            })
            .await;

        if let Err(e) = sent {
            tracing::error!(error = %e, body = %body, "Giving up on queue message");
        }
    }
}

#[async_trait]
impl BackupReporter for QueueReporter {
    async fn report_chunk_failure(&self, collection: &str, chunk_number: usize) {
        tracing::info!(partition = collection, chunk = chunk_number, "Reporting chunk failure");
        self.deliver(QueueMessage::ChunkFailure {
            collection: collection.to_string(),
            chunk_number,
            timestamp: Utc::now(),
        })
        .await;
    }

    async fn report_run_summary(&self, collection: &str, total_chunks: usize, uploaded_chunks: usize) {
        tracing::info!(
            partition = collection,
            total_chunks,
            uploaded_chunks,
            "Reporting partition summary"
        );
        self.deliver(QueueMessage::RunSummary {
            collection: collection.to_string(),
            total_chunks,
            uploaded_chunks,
            timestamp: Utc::now(),
        })
        .await;
    }
}
