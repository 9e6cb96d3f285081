// collection-backup/src/backup/logic.rs
use std::sync::Arc;

use futures::{StreamExt, stream};
use tokio_util::sync::CancellationToken;

use crate::backup::chunk_upload::{ChunkUploader, UploadOutcome};
use crate::backup::chunker::{self, Chunk};
use crate::backup::db_source::{RecordSource, SourceConnection};
use crate::backup::path_planner::{Clock, PathPlanner, StoragePrefix};
use crate::backup::reporter::BackupReporter;
use crate::backup::s3_upload::ObjectStore;
use crate::errors::Result;
use crate::utils::cancel::guarded;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionOutcome {
    /// The chunk stage was reached; one outcome per chunk, in index order.
    Completed { outcomes: Vec<UploadOutcome> },
    /// The partition never reached its chunks.
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionReport {
    pub partition: String,
    pub outcome: PartitionOutcome,
    /// Cancellation cut the chunk stage short; the unattempted chunks are
    /// among the failed ones.
    pub interrupted: bool,
}

impl PartitionReport {
    pub fn total_chunks(&self) -> usize {
        match &self.outcome {
            PartitionOutcome::Completed { outcomes } => outcomes.len(),
            PartitionOutcome::Failed { .. } => 0,
        }
    }

    pub fn uploaded_chunks(&self) -> usize {
        match &self.outcome {
            PartitionOutcome::Completed { outcomes } => outcomes.iter().filter(|o| o.is_uploaded()).count(),
            PartitionOutcome::Failed { .. } => 0,
        }
    }

    /// 1-based numbers of the chunks that did not make it.
    pub fn failed_chunks(&self) -> Vec<usize> {
        match &self.outcome {
            PartitionOutcome::Completed { outcomes } => outcomes
                .iter()
                .enumerate()
                .filter(|(_, o)| !o.is_uploaded())
                .map(|(i, _)| i + 1)
                .collect(),
            PartitionOutcome::Failed { .. } => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub connected: bool,
    pub cancelled: bool,
    pub partitions: Vec<PartitionReport>,
}

impl RunReport {
    pub fn log_summary(&self) {
        for p in &self.partitions {
            match &p.outcome {
                PartitionOutcome::Completed { outcomes } => {
                    tracing::info!(
                        partition = %p.partition,
                        total_chunks = p.total_chunks(),
                        uploaded_chunks = p.uploaded_chunks(),
                        failed_chunks = ?p.failed_chunks(),
                        interrupted = p.interrupted,
                        "Partition backed up"
                    );
                    for (i, outcome) in outcomes.iter().enumerate() {
                        if let UploadOutcome::Failed { cause } = outcome {
                            tracing::debug!(partition = %p.partition, chunk = i + 1, cause = %cause, "Chunk not uploaded");
                        }
                    }
                }
                PartitionOutcome::Failed { error } => {
                    tracing::error!(partition = %p.partition, error = %error, "Partition backup failed")
                }
            }
        }
        tracing::info!(
            connected = self.connected,
            cancelled = self.cancelled,
            partitions = self.partitions.len(),
            "Backup run finished"
        );
    }
}

/// Drives one backup run: connect, enumerate, and per partition extract,
/// ensure the prefix, upload every chunk, then summarise. The source
/// connection is closed on every path once it has been opened.
pub struct BackupOrchestrator {
    source: Arc<dyn RecordSource>,
    planner: PathPlanner,
    uploader: ChunkUploader,
    reporter: Arc<dyn BackupReporter>,
    clock: Arc<dyn Clock>,
    partition_filter: Option<Vec<String>>,
    max_concurrent_uploads: usize,
}

impl BackupOrchestrator {
    pub fn new(
        source: Arc<dyn RecordSource>,
        store: Arc<dyn ObjectStore>,
        reporter: Arc<dyn BackupReporter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        BackupOrchestrator {
            source,
            planner: PathPlanner::new(store.clone()),
            uploader: ChunkUploader::new(store, reporter.clone()),
            reporter,
            clock,
            partition_filter: None,
            max_concurrent_uploads: 1,
        }
    }

    /// Restricts the run to the named partitions. `None` backs up all.
    pub fn with_partition_filter(mut self, partitions: Option<Vec<String>>) -> Self {
        self.partition_filter = partitions;
        self
    }

    pub fn with_max_concurrent_uploads(mut self, limit: usize) -> Self {
        self.max_concurrent_uploads = limit.max(1);
        self
    }

    pub async fn run(&self, cancel: &CancellationToken) -> RunReport {
        let mut report = RunReport::default();

        let connection = match guarded(cancel, "connect source", self.source.connect()).await {
            Ok(connection) => connection,
            Err(e) => {
                tracing::error!(error = %e, "❌ Cannot proceed with backup - source connection failed");
                report.cancelled = e.is_cancelled();
                return report;
            }
        };
        report.connected = true;

        self.back_up_partitions(connection.as_ref(), cancel, &mut report).await;

        connection.close().await;
        report
    }

    async fn back_up_partitions(
        &self,
        connection: &dyn SourceConnection,
        cancel: &CancellationToken,
        report: &mut RunReport,
    ) {
        let discovered = match guarded(cancel, "list partitions", connection.list_partitions()).await {
            Ok(names) => names,
            Err(e) if e.is_cancelled() => {
                report.cancelled = true;
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "Error fetching partitions, nothing to back up");
                Vec::new()
            }
        };

        for partition in self.select_partitions(discovered) {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            match self.back_up_partition(connection, &partition, cancel).await {
                Ok(done) => {
                    let interrupted = done.interrupted;
                    report.partitions.push(done);
                    if interrupted {
                        tracing::warn!(partition = %partition, "Backup cancelled mid-partition, remaining chunks marked failed");
                        report.cancelled = true;
                        break;
                    }
                }
                Err(e) if e.is_cancelled() => {
                    tracing::warn!(partition = %partition, "Backup cancelled mid-partition");
                    report.cancelled = true;
                    break;
                }
                Err(e) => {
                    tracing::error!(partition = %partition, error = %e, "Partition backup failed, continuing");
                    report.partitions.push(PartitionReport {
                        partition,
                        outcome: PartitionOutcome::Failed { error: e.to_string() },
                        interrupted: false,
                    });
                }
            }
        }
    }

    fn select_partitions(&self, discovered: Vec<String>) -> Vec<String> {
        let Some(wanted) = &self.partition_filter else {
            return discovered;
        };
        for name in wanted.iter().filter(|w| !discovered.contains(w)) {
            tracing::warn!(partition = %name, "Configured partition not found in source, skipping");
        }
        discovered.into_iter().filter(|name| wanted.contains(name)).collect()
    }

    async fn back_up_partition(
        &self,
        connection: &dyn SourceConnection,
        partition: &str,
        cancel: &CancellationToken,
    ) -> Result<PartitionReport> {
        tracing::info!(partition, "🔍 Backing up partition");
        let chunks = chunker::chunks_of(connection, partition, cancel).await?;
        let total_chunks = chunks.len();

        let (outcomes, interrupted) = if chunks.is_empty() {
            tracing::info!(partition, "Partition is empty, no prefix created");
            (Vec::new(), false)
        } else {
            let date = self.clock.today();
            match self.planner.ensure_prefix(partition, date, cancel).await {
                Ok(prefix) => self.upload_chunks(&chunks, &prefix, cancel).await,
                Err(e) => {
                    let interrupted = e.is_cancelled();
                    if !interrupted {
                        tracing::error!(partition, error = %e, "Storage prefix unavailable, failing every chunk");
                    }
                    (self.fail_all(&chunks, &e.to_string()).await, interrupted)
                }
            }
        };

        let uploaded_chunks = outcomes.iter().filter(|o| o.is_uploaded()).count();
        self.reporter
            .report_run_summary(partition, total_chunks, uploaded_chunks)
            .await;

        Ok(PartitionReport {
            partition: partition.to_string(),
            outcome: PartitionOutcome::Completed { outcomes },
            interrupted,
        })
    }

    async fn fail_all(&self, chunks: &[Chunk], cause: &str) -> Vec<UploadOutcome> {
        let mut outcomes = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            outcomes.push(self.uploader.fail_unattempted(chunk, cause).await);
        }
        outcomes
    }

    /// Attempts every chunk. Outcomes come back in index order whatever the
    /// concurrency limit. Chunks that cancellation kept from being written
    /// are reported as failed, and the flag says it happened.
    async fn upload_chunks(
        &self,
        chunks: &[Chunk],
        prefix: &StoragePrefix,
        cancel: &CancellationToken,
    ) -> (Vec<UploadOutcome>, bool) {
        let attempts: Vec<Result<UploadOutcome>> = stream::iter(chunks)
            .map(|chunk| self.uploader.upload(chunk, prefix, cancel))
            .buffered(self.max_concurrent_uploads)
            .collect()
            .await;

        let mut interrupted = false;
        let mut outcomes = Vec::with_capacity(chunks.len());
        for (chunk, attempt) in chunks.iter().zip(attempts) {
            match attempt {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    interrupted |= e.is_cancelled();
                    outcomes.push(self.uploader.fail_unattempted(chunk, &e.to_string()).await);
                }
            }
        }
        (outcomes, interrupted)
    }
}
