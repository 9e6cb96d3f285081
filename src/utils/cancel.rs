// collection-backup/src/utils/cancel.rs
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::errors::{BackupError, Result};

/// Awaits `fut` unless `cancel` fires first.
pub async fn guarded<T, F>(cancel: &CancellationToken, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(BackupError::Cancelled(operation.to_string())),
        res = fut => res,
    }
}

/// Cancels `token` once `deadline` has elapsed. The returned task ends early
/// if the token is cancelled by someone else.
pub fn cancel_after(token: &CancellationToken, deadline: Duration) -> JoinHandle<()> {
    let token = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::time::sleep(deadline) => {
                tracing::warn!(deadline_secs = deadline.as_secs(), "Backup run deadline reached, cancelling");
                token.cancel();
            }
        }
    })
}
