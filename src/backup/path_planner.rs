// collection-backup/src/backup/path_planner.rs
//! Date-partitioned storage prefixes: `<partition>/<year>/<month>/<day>/`.
//!
//! Every ancestor level is materialised as an empty marker object before
//! anything is written beneath it. Levels that already exist are never
//! rewritten.

use std::fmt;
use std::sync::Arc;

use chrono::{Datelike, Local, NaiveDate, Utc};
use tokio_util::sync::CancellationToken;

use crate::backup::s3_upload::ObjectStore;
use crate::config::DateZone;
use crate::errors::{BackupError, Result};
use crate::utils::cancel::guarded;

/// A real calendar day. Construction goes through `NaiveDate`, so an
/// out-of-range day such as 2023-02-29 cannot exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunDate(NaiveDate);

impl RunDate {
    #[cfg(test)]
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(RunDate)
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn day(&self) -> u32 {
        self.0.day()
    }

    /// `MM-DD-YYYY`, for humans reading the logs.
    pub fn mdy(&self) -> String {
        self.0.format("%m-%d-%Y").to_string()
    }
}

impl From<NaiveDate> for RunDate {
    fn from(date: NaiveDate) -> Self {
        RunDate(date)
    }
}

/// Source of the calendar day a partition is filed under.
pub trait Clock: Send + Sync {
    fn today(&self) -> RunDate;
}

pub struct SystemClock {
    pub zone: DateZone,
}

impl Clock for SystemClock {
    fn today(&self) -> RunDate {
        match self.zone {
            DateZone::Local => Local::now().date_naive().into(),
            DateZone::Utc => Utc::now().date_naive().into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePrefix {
    partition: String,
    date: RunDate,
}

impl StoragePrefix {
    pub fn new(partition: &str, date: RunDate) -> Result<Self> {
        if partition.is_empty() || partition.contains('/') {
            return Err(BackupError::InvalidPartition(partition.to_string()));
        }
        Ok(StoragePrefix {
            partition: partition.to_string(),
            date,
        })
    }

    pub fn year_key(&self) -> String {
        format!("{}/{}/", self.partition, self.date.year())
    }

    pub fn month_key(&self) -> String {
        format!("{}{}/", self.year_key(), self.date.month())
    }

    pub fn day_key(&self) -> String {
        format!("{}{}/", self.month_key(), self.date.day())
    }

    /// Ancestor marker keys, outermost first.
    pub fn levels(&self) -> [String; 3] {
        [self.year_key(), self.month_key(), self.day_key()]
    }

    pub fn chunk_key(&self, index: usize) -> String {
        format!("{}chunk-{}.json", self.day_key(), index)
    }
}

impl fmt::Display for StoragePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.day_key())
    }
}

pub struct PathPlanner {
    store: Arc<dyn ObjectStore>,
}

impl PathPlanner {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        PathPlanner { store }
    }

    /// Makes sure the year, month and day markers of `partition` on `date`
    /// exist, in that order, and returns the day-level prefix.
    pub async fn ensure_prefix(
        &self,
        partition: &str,
        date: RunDate,
        cancel: &CancellationToken,
    ) -> Result<StoragePrefix> {
        let prefix = StoragePrefix::new(partition, date)?;
        for level in prefix.levels() {
            self.ensure_marker(&level, cancel).await?;
        }
        tracing::info!(partition, date = %date.mdy(), prefix = %prefix, "Storage prefix ready");
        Ok(prefix)
    }

    async fn ensure_marker(&self, key: &str, cancel: &CancellationToken) -> Result<()> {
        let exists = match guarded(cancel, key, self.store.exists(key)).await {
            Ok(exists) => exists,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                // an unanswered probe is indistinguishable from absence
                tracing::warn!(key, error = %e, "Existence probe failed, creating marker");
                false
            }
        };

        if exists {
            tracing::debug!(key, "Folder marker already exists");
            return Ok(());
        }

        match guarded(cancel, key, self.store.put_empty(key)).await {
            Ok(()) => {
                tracing::info!(key, "Folder marker created");
                Ok(())
            }
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => Err(BackupError::PathEnsure {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}
