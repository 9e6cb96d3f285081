// collection-backup/src/backup/chunk_upload.rs
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::backup::chunker::Chunk;
use crate::backup::path_planner::StoragePrefix;
use crate::backup::reporter::BackupReporter;
use crate::backup::s3_upload::{LocationId, ObjectStore};
use crate::errors::{BackupError, Result};
use crate::utils::cancel::guarded;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded { location: LocationId },
    Failed { cause: String },
}

impl UploadOutcome {
    pub fn is_uploaded(&self) -> bool {
        matches!(self, UploadOutcome::Uploaded { .. })
    }
}

/// Writes chunks as JSON arrays, one attempt each. Failures are reported
/// and absorbed; only cancellation is returned as an error.
pub struct ChunkUploader {
    store: Arc<dyn ObjectStore>,
    reporter: Arc<dyn BackupReporter>,
}

impl ChunkUploader {
    pub fn new(store: Arc<dyn ObjectStore>, reporter: Arc<dyn BackupReporter>) -> Self {
        ChunkUploader { store, reporter }
    }

    pub async fn upload(
        &self,
        chunk: &Chunk,
        prefix: &StoragePrefix,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome> {
        let key = prefix.chunk_key(chunk.index);
        tracing::info!(partition = %chunk.collection_name, chunk = chunk.index, key = %key, "Uploading chunk");

        let written = match serde_json::to_vec(&chunk.records) {
            Ok(body) => guarded(cancel, &key, self.store.put_blob(&key, body)).await,
            Err(e) => Err(BackupError::from(e)),
        };

        match written {
            Ok(location) => {
                tracing::info!(chunk = chunk.index, location = %location, "✅ Chunk uploaded");
                Ok(UploadOutcome::Uploaded { location })
            }
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                tracing::error!(partition = %chunk.collection_name, chunk = chunk.index, error = %e, "Chunk upload failed");
                self.reporter
                    .report_chunk_failure(&chunk.collection_name, chunk.index)
                    .await;
                Ok(UploadOutcome::Failed { cause: e.to_string() })
            }
        }
    }

    /// Records a chunk that was never written, because its prefix is
    /// unavailable or the run was cancelled first.
    pub async fn fail_unattempted(&self, chunk: &Chunk, cause: &str) -> UploadOutcome {
        self.reporter
            .report_chunk_failure(&chunk.collection_name, chunk.index)
            .await;
        UploadOutcome::Failed { cause: cause.to_string() }
    }
}
