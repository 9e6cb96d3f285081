mod logic;
pub(crate) mod chunk_upload;
pub(crate) mod chunker;
pub(crate) mod db_source;
pub(crate) mod path_planner;
pub(crate) mod reporter;
pub(crate) mod s3_upload;
pub(crate) mod sqs_notify;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::utils::cancel::cancel_after;
use db_source::PgSource;
use path_planner::SystemClock;
use reporter::QueueReporter;
use s3_upload::S3Store;
use sqs_notify::SqsQueue;

pub use logic::{BackupOrchestrator, RunReport};

/// Public entry point for the backup process: wires the production
/// collaborators from `app_config` and performs one run.
pub async fn run_backup_flow(app_config: &AppConfig) -> RunReport {
    let source = Arc::new(PgSource::new(app_config.source_db_url.clone(), app_config.retry));
    let store = Arc::new(S3Store::connect(&app_config.aws, &app_config.storage).await);
    let queue = Arc::new(SqsQueue::connect(&app_config.aws, &app_config.queue).await);
    let reporter = Arc::new(QueueReporter::new(
        queue,
        app_config.queue.queue_url.clone(),
        app_config.retry,
    ));
    let clock = Arc::new(SystemClock {
        zone: app_config.date_timezone,
    });

    let orchestrator = BackupOrchestrator::new(source, store, reporter, clock)
        .with_partition_filter(app_config.partitions.clone())
        .with_max_concurrent_uploads(app_config.max_concurrent_uploads);

    let cancel = CancellationToken::new();
    let deadline = app_config.run_timeout.map(|timeout| cancel_after(&cancel, timeout));

    let report = orchestrator.run(&cancel).await;

    if let Some(deadline) = deadline {
        deadline.abort();
    }
    report
}
