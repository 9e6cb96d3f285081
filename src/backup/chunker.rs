// collection-backup/src/backup/chunker.rs
use tokio_util::sync::CancellationToken;

use crate::backup::db_source::{Record, SourceConnection};
use crate::errors::Result;
use crate::utils::cancel::guarded;

/// Records per uploaded object.
pub const CHUNK_SIZE: usize = 2000;

/// A contiguous slice of one partition's records.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub collection_name: String,
    /// 1-based position of the slice within its partition.
    pub index: usize,
    pub records: Vec<Record>,
}

/// Number of chunks `record_count` records are split into.
pub fn chunk_count(record_count: usize) -> usize {
    record_count.div_ceil(CHUNK_SIZE)
}

/// Splits `records` into consecutive chunks of `CHUNK_SIZE`, the last one
/// possibly shorter. An empty input yields no chunks.
pub fn into_chunks(collection_name: &str, records: Vec<Record>) -> impl Iterator<Item = Chunk> + '_ {
    let mut remaining = records.into_iter().peekable();
    let mut index = 0;
    std::iter::from_fn(move || {
        remaining.peek()?;
        index += 1;
        Some(Chunk {
            collection_name: collection_name.to_string(),
            index,
            records: remaining.by_ref().take(CHUNK_SIZE).collect(),
        })
    })
}

/// Reads the whole partition in one go and materialises its chunks.
pub async fn chunks_of(
    source: &dyn SourceConnection,
    partition: &str,
    cancel: &CancellationToken,
) -> Result<Vec<Chunk>> {
    let records = guarded(cancel, partition, source.read_all(partition)).await?;
    let record_count = records.len();
    let chunks: Vec<Chunk> = into_chunks(partition, records).collect();
    tracing::info!(partition, record_count, chunk_count = chunk_count(record_count), "Partition extracted");
    Ok(chunks)
}
