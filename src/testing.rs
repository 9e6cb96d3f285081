//! In-memory collaborators for unit tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::backup::db_source::{Record, RecordSource, SourceConnection};
use crate::backup::path_planner::{Clock, RunDate};
use crate::backup::reporter::BackupReporter;
use crate::backup::s3_upload::{LocationId, ObjectStore};
use crate::backup::sqs_notify::WorkQueue;
use crate::errors::{BackupError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Exists(String),
    PutEmpty(String),
    PutBlob(String),
}

#[derive(Default)]
struct StoreState {
    objects: BTreeMap<String, Vec<u8>>,
    ops: Vec<StoreOp>,
    failing_puts: Vec<String>,
    probes_fail: bool,
    cancel_after: Option<(String, CancellationToken)>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    fn with_state<T>(&self, f: impl FnOnce(&mut StoreState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn insert(&self, key: &str, body: Vec<u8>) {
        self.with_state(|s| s.objects.insert(key.to_string(), body));
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.with_state(|s| s.objects.get(key).cloned())
    }

    pub fn keys(&self) -> Vec<String> {
        self.with_state(|s| s.objects.keys().cloned().collect())
    }

    pub fn ops(&self) -> Vec<StoreOp> {
        self.with_state(|s| s.ops.clone())
    }

    pub fn clear_ops(&self) {
        self.with_state(|s| s.ops.clear());
    }

    /// Every existence probe errors from now on.
    pub fn fail_probes(&self) {
        self.with_state(|s| s.probes_fail = true);
    }

    /// Every put whose key starts with `prefix` errors from now on.
    pub fn fail_puts_under(&self, prefix: &str) {
        self.with_state(|s| s.failing_puts.push(prefix.to_string()));
    }

    /// Cancels `token` right after `key` has been written.
    pub fn cancel_after_put(&self, key: &str, token: &CancellationToken) {
        self.with_state(|s| s.cancel_after = Some((key.to_string(), token.clone())));
    }

    pub fn put_attempts(&self, key: &str) -> usize {
        self.with_state(|s| {
            s.ops
                .iter()
                .filter(|op| matches!(op, StoreOp::PutEmpty(k) | StoreOp::PutBlob(k) if k == key))
                .count()
        })
    }

    fn put(&self, key: &str, op: StoreOp, body: Vec<u8>) -> Result<()> {
        self.with_state(|s| {
            s.ops.push(op);
            if s.failing_puts.iter().any(|p| key.starts_with(p.as_str())) {
                return Err(BackupError::store(key, "simulated write failure"));
            }
            s.objects.insert(key.to_string(), body);
            if let Some((trigger, token)) = &s.cancel_after {
                if trigger == key {
                    token.cancel();
                }
            }
            Ok(())
        })
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        self.with_state(|s| {
            s.ops.push(StoreOp::Exists(key.to_string()));
            if s.probes_fail {
                return Err(BackupError::store(key, "simulated probe failure"));
            }
            Ok(s.objects.contains_key(key))
        })
    }

    async fn put_empty(&self, key: &str) -> Result<()> {
        self.put(key, StoreOp::PutEmpty(key.to_string()), Vec::new())
    }

    async fn put_blob(&self, key: &str, body: Vec<u8>) -> Result<LocationId> {
        self.put(key, StoreOp::PutBlob(key.to_string()), body)?;
        Ok(format!("memory://{}", key))
    }
}

/// Queue that records every delivered body and can refuse the first sends.
#[derive(Default)]
pub struct RecordingQueue {
    sent: Mutex<Vec<(String, String)>>,
    attempts: AtomicUsize,
    fail_first: usize,
}

impl RecordingQueue {
    pub fn failing_first(fail_first: usize) -> Self {
        RecordingQueue {
            fail_first,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkQueue for RecordingQueue {
    async fn send(&self, queue_url: &str, body: String) -> Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_first {
            return Err(BackupError::Notification("simulated queue outage".into()));
        }
        self.sent.lock().unwrap().push((queue_url.to_string(), body));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    ChunkFailure {
        collection: String,
        chunk_number: usize,
    },
    RunSummary {
        collection: String,
        total_chunks: usize,
        uploaded_chunks: usize,
    },
}

#[derive(Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<Report>>,
}

impl RecordingReporter {
    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().unwrap().clone()
    }

    pub fn summaries(&self) -> Vec<Report> {
        self.reports()
            .into_iter()
            .filter(|r| matches!(r, Report::RunSummary { .. }))
            .collect()
    }
}

#[async_trait]
impl BackupReporter for RecordingReporter {
    async fn report_chunk_failure(&self, collection: &str, chunk_number: usize) {
        self.reports.lock().unwrap().push(Report::ChunkFailure {
            collection: collection.to_string(),
            chunk_number,
        });
    }

    async fn report_run_summary(&self, collection: &str, total_chunks: usize, uploaded_chunks: usize) {
        self.reports.lock().unwrap().push(Report::RunSummary {
            collection: collection.to_string(),
            total_chunks,
            uploaded_chunks,
        });
    }
}

#[derive(Default)]
pub struct SourceCounters {
    connects: AtomicUsize,
    lists: AtomicUsize,
    closes: AtomicUsize,
    reads: Mutex<Vec<String>>,
}

/// Source holding its partitions in memory, in discovery order.
#[derive(Default)]
pub struct MemorySource {
    partitions: Vec<(String, Vec<Record>)>,
    fail_connect: bool,
    fail_list: bool,
    failing_reads: Vec<String>,
    counters: Arc<SourceCounters>,
}

impl MemorySource {
    pub fn with_partition(mut self, name: &str, records: Vec<Record>) -> Self {
        self.partitions.push((name.to_string(), records));
        self
    }

    pub fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    pub fn failing_read(mut self, partition: &str) -> Self {
        self.failing_reads.push(partition.to_string());
        self
    }

    pub fn connects(&self) -> usize {
        self.counters.connects.load(Ordering::SeqCst)
    }

    pub fn lists(&self) -> usize {
        self.counters.lists.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> Vec<String> {
        self.counters.reads.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordSource for MemorySource {
    async fn connect(&self) -> Result<Box<dyn SourceConnection>> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(BackupError::SourceConnection("simulated refusal".into()));
        }
        Ok(Box::new(MemoryConnection {
            partitions: self.partitions.clone(),
            fail_list: self.fail_list,
            failing_reads: self.failing_reads.clone(),
            counters: self.counters.clone(),
        }))
    }
}

struct MemoryConnection {
    partitions: Vec<(String, Vec<Record>)>,
    fail_list: bool,
    failing_reads: Vec<String>,
    counters: Arc<SourceCounters>,
}

#[async_trait]
impl SourceConnection for MemoryConnection {
    async fn list_partitions(&self) -> Result<Vec<String>> {
        self.counters.lists.fetch_add(1, Ordering::SeqCst);
        if self.fail_list {
            return Err(BackupError::Enumeration("simulated listing failure".into()));
        }
        Ok(self.partitions.iter().map(|(name, _)| name.clone()).collect())
    }

    async fn read_all(&self, partition: &str) -> Result<Vec<Record>> {
        self.counters.reads.lock().unwrap().push(partition.to_string());
        if self.failing_reads.iter().any(|p| p == partition) {
            return Err(BackupError::Extraction {
                partition: partition.to_string(),
                reason: "simulated read failure".into(),
            });
        }
        self.partitions
            .iter()
            .find(|(name, _)| name == partition)
            .map(|(_, records)| records.clone())
            .ok_or_else(|| BackupError::Extraction {
                partition: partition.to_string(),
                reason: "no such partition".into(),
            })
    }

    async fn close(self: Box<Self>) {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FixedClock(pub RunDate);

impl Clock for FixedClock {
    fn today(&self) -> RunDate {
        self.0
    }
}
