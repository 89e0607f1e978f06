//! Ordered download streaming with bounded prefetch.
//!
//! Chunks are fetched with up to `download_concurrency` requests in flight,
//! but bytes are emitted strictly in ascending chunk-index order. Range
//! requests seek to the first covering chunk and trim the first and last
//! slices.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use teledrive_core::{
    BlobStore, Chunk, DriveError, DriveResult, Item, RuntimeSettings, TransferDirection,
    TransferRecord, TransferStatus, backoff_delay,
};
use teledrive_data::{ChunkStore, HistoryStore, ItemStore, SettingsStore};
use teledrive_telemetry::Metrics;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

const MAX_FETCH_ATTEMPTS: u32 = 4;
const MAX_PREFETCH: usize = 32;

/// Inclusive byte range requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte offset to emit.
    pub start: u64,
    /// Last byte offset to emit; `None` means to the end.
    pub end: Option<u64>,
}

/// One planned fetch: a chunk plus the trim applied to its body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ChunkSlice {
    chat_id: i64,
    message_id: i64,
    chunk_index: i32,
    skip: usize,
    take: usize,
}

/// An open download: metadata plus the ordered byte stream.
pub struct DownloadStream {
    /// The streamed item.
    pub item: Item,
    /// Identifier of this stream in the transfer history ledger.
    pub stream_id: Uuid,
    /// First emitted byte offset.
    pub offset: u64,
    /// Number of bytes the stream will emit.
    pub length: u64,
    /// Full size of the item.
    pub total_size: u64,
    /// Ordered chunk bodies, already range-trimmed.
    pub stream: ReceiverStream<DriveResult<Vec<u8>>>,
}

/// Download/stream assembler.
#[derive(Clone)]
pub struct Downloader {
    items: ItemStore,
    chunks: ChunkStore,
    history: HistoryStore,
    settings: SettingsStore,
    defaults: RuntimeSettings,
    blob: Arc<dyn BlobStore>,
    metrics: Metrics,
}

impl Downloader {
    /// Construct the assembler over the shared repositories.
    #[must_use]
    pub fn new(
        items: ItemStore,
        chunks: ChunkStore,
        history: HistoryStore,
        settings: SettingsStore,
        defaults: RuntimeSettings,
        blob: Arc<dyn BlobStore>,
        metrics: Metrics,
    ) -> Self {
        Self {
            items,
            chunks,
            history,
            settings,
            defaults,
            blob,
            metrics,
        }
    }

    /// Open a stream for an item by id.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::BadInput`] for folders and unsatisfiable
    /// ranges, [`DriveError::NotFound`] for absent or trashed items.
    pub async fn open(
        &self,
        item_id: Uuid,
        range: Option<ByteRange>,
        now: DateTime<Utc>,
    ) -> DriveResult<DownloadStream> {
        let item = self.items.get(item_id).await?;
        self.open_item(item, range, now).await
    }

    /// Open a stream through an enabled share code.
    ///
    /// # Errors
    ///
    /// As [`Downloader::open`], with [`DriveError::NotFound`] for unknown or
    /// disabled codes.
    pub async fn open_shared(
        &self,
        code: &str,
        range: Option<ByteRange>,
        now: DateTime<Utc>,
    ) -> DriveResult<DownloadStream> {
        let item = self.items.get_by_share_code(code).await?;
        self.open_item(item, range, now).await
    }

    async fn open_item(
        &self,
        item: Item,
        range: Option<ByteRange>,
        now: DateTime<Utc>,
    ) -> DriveResult<DownloadStream> {
        if item.kind.is_folder() {
            return Err(DriveError::bad_input("folders cannot be streamed"));
        }
        if item.is_trashed() {
            return Err(DriveError::not_found("item"));
        }

        let chunk_rows = self.chunks.list_for_item(item.id).await?;
        let (slices, offset, length) = plan_slices(&chunk_rows, range, item.size_bytes)?;

        let settings = self.settings.get_or_init(&self.defaults).await?;
        let concurrency = usize::try_from(settings.download_concurrency.max(1))
            .unwrap_or(1)
            .min(MAX_PREFETCH);

        let stream_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(concurrency);
        let driver = DriverContext {
            items: self.items.clone(),
            history: self.history.clone(),
            blob: Arc::clone(&self.blob),
            metrics: self.metrics.clone(),
            item: item.clone(),
            stream_id,
            length,
            concurrency,
        };
        tokio::spawn(driver.run(slices, tx, now));

        Ok(DownloadStream {
            total_size: u64::try_from(item.size_bytes).unwrap_or_default(),
            item,
            stream_id,
            offset,
            length,
            stream: ReceiverStream::new(rx),
        })
    }
}

struct DriverContext {
    items: ItemStore,
    history: HistoryStore,
    blob: Arc<dyn BlobStore>,
    metrics: Metrics,
    item: Item,
    stream_id: Uuid,
    length: u64,
    concurrency: usize,
}

impl DriverContext {
    async fn run(
        self,
        slices: Vec<ChunkSlice>,
        tx: mpsc::Sender<DriveResult<Vec<u8>>>,
        started_at: DateTime<Utc>,
    ) {
        let (status, error) = self.pump(slices, &tx).await;
        drop(tx);
        self.finish(status, error, started_at).await;
    }

    async fn pump(
        &self,
        slices: Vec<ChunkSlice>,
        tx: &mpsc::Sender<DriveResult<Vec<u8>>>,
    ) -> (TransferStatus, Option<String>) {
        let mut pending: VecDeque<(ChunkSlice, JoinHandle<DriveResult<Vec<u8>>>)> =
            VecDeque::new();
        let mut remaining = slices.into_iter();
        let (status, error) = loop {
            while pending.len() < self.concurrency {
                let Some(slice) = remaining.next() else { break };
                let blob = Arc::clone(&self.blob);
                pending.push_back((
                    slice,
                    tokio::spawn(async move {
                        fetch_with_retry(blob.as_ref(), slice.chat_id, slice.message_id).await
                    }),
                ));
            }
            let Some((slice, handle)) = pending.pop_front() else {
                break (TransferStatus::Completed, None);
            };
            let body = match handle.await {
                Ok(Ok(body)) => body,
                Ok(Err(err)) => {
                    warn!(
                        error = %err,
                        item_id = %self.item.id,
                        chunk_index = slice.chunk_index,
                        "chunk fetch failed; aborting stream"
                    );
                    let detail = err.to_string();
                    let _ = tx.send(Err(err)).await;
                    break (TransferStatus::Error, Some(detail));
                }
                Err(join_err) => {
                    let detail = join_err.to_string();
                    let _ = tx
                        .send(Err(DriveError::transient("download.fetch_task", join_err)))
                        .await;
                    break (TransferStatus::Error, Some(detail));
                }
            };
            let end = slice.skip + slice.take;
            if body.len() < end {
                let detail = format!(
                    "chunk {} returned {} bytes, expected at least {end}",
                    slice.chunk_index,
                    body.len()
                );
                let _ = tx
                    .send(Err(DriveError::Permanent {
                        operation: "download.trim_chunk",
                        source: detail.clone().into(),
                    }))
                    .await;
                break (TransferStatus::Error, Some(detail));
            }
            self.metrics.record_chunk_downloaded();
            if tx.send(Ok(body[slice.skip..end].to_vec())).await.is_err() {
                debug!(item_id = %self.item.id, "download receiver dropped; cancelling");
                break (TransferStatus::Canceled, None);
            }
        };
        for (_, handle) in pending {
            handle.abort();
        }
        (status, error)
    }

    async fn finish(
        &self,
        status: TransferStatus,
        error: Option<String>,
        started_at: DateTime<Utc>,
    ) {
        let now = Utc::now();
        let record = TransferRecord {
            id: Uuid::new_v4(),
            direction: TransferDirection::Download,
            source_task_id: self.stream_id,
            item_name: self.item.name.clone(),
            size_bytes: i64::try_from(self.length).unwrap_or(i64::MAX),
            status,
            error,
            faststart_applied: false,
            preview_attached: false,
            started_at: Some(started_at),
            finished_at: Some(now),
            created_at: now,
            updated_at: now,
        };
        if let Err(err) = self.history.upsert(&record).await {
            warn!(error = %err, stream_id = %self.stream_id, "failed to record download history");
        }
        self.metrics.record_transfer("download", status.as_str());
        if status == TransferStatus::Completed {
            if let Err(err) = self.items.touch(self.item.id, now).await {
                warn!(error = %err, item_id = %self.item.id, "failed to touch item after download");
            }
            info!(
                item_id = %self.item.id,
                stream_id = %self.stream_id,
                bytes = self.length,
                "download completed"
            );
        }
    }
}

async fn fetch_with_retry(
    blob: &dyn BlobStore,
    chat_id: i64,
    message_id: i64,
) -> DriveResult<Vec<u8>> {
    let mut attempt = 0;
    loop {
        match blob.fetch_chunk(chat_id, message_id).await {
            Ok(bytes) => return Ok(bytes),
            Err(err) if err.is_transient() && attempt + 1 < MAX_FETCH_ATTEMPTS => {
                debug!(error = %err, attempt, message_id, "retrying chunk fetch");
                tokio::time::sleep(backoff_delay(attempt)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Plan the ordered fetch slices covering the requested range.
fn plan_slices(
    chunks: &[Chunk],
    range: Option<ByteRange>,
    total_size: i64,
) -> DriveResult<(Vec<ChunkSlice>, u64, u64)> {
    let total = u64::try_from(total_size).unwrap_or_default();
    if total == 0 {
        if range.is_some() {
            return Err(DriveError::bad_input(
                "range requested against an empty item",
            ));
        }
        return Ok((Vec::new(), 0, 0));
    }

    let (start, end) = match range {
        None => (0, total - 1),
        Some(range) => {
            if range.start >= total {
                return Err(DriveError::bad_input(format!(
                    "range start {} is beyond the item size {total}",
                    range.start
                )));
            }
            let end = range.end.map_or(total - 1, |end| end.min(total - 1));
            if end < range.start {
                return Err(DriveError::bad_input("range end precedes range start"));
            }
            (range.start, end)
        }
    };

    let mut slices = Vec::new();
    let mut cursor: u64 = 0;
    for chunk in chunks {
        let size = u64::try_from(chunk.chunk_size).unwrap_or_default();
        let chunk_start = cursor;
        let chunk_end = cursor + size;
        cursor = chunk_end;
        if chunk_end <= start {
            continue;
        }
        if chunk_start > end {
            break;
        }
        let skip = start.saturating_sub(chunk_start);
        let take = (end + 1).min(chunk_end) - (chunk_start + skip);
        slices.push(ChunkSlice {
            chat_id: chunk.tg_chat_id,
            message_id: chunk.tg_message_id,
            chunk_index: chunk.chunk_index,
            skip: usize::try_from(skip).unwrap_or_default(),
            take: usize::try_from(take).unwrap_or_default(),
        });
    }

    Ok((slices, start, end - start + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(index: i32, size: i64) -> Chunk {
        Chunk {
            id: Uuid::new_v4(),
            item_id: Uuid::new_v4(),
            chunk_index: index,
            chunk_size: size,
            tg_chat_id: -1,
            tg_message_id: i64::from(index) + 100,
            tg_file_id: format!("file-{index}"),
            tg_file_unique_id: format!("unique-{index}"),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn full_stream_covers_every_chunk_untrimmed() {
        let chunks = [chunk(0, 10), chunk(1, 10), chunk(2, 5)];
        let (slices, offset, length) =
            plan_slices(&chunks, None, 25).expect("plan must succeed");
        assert_eq!(offset, 0);
        assert_eq!(length, 25);
        assert_eq!(slices.len(), 3);
        assert!(slices.iter().all(|slice| slice.skip == 0));
        assert_eq!(slices[2].take, 5);
    }

    #[test]
    fn range_trims_first_and_last_chunks() {
        let chunks = [chunk(0, 10), chunk(1, 10), chunk(2, 10)];
        let range = ByteRange {
            start: 12,
            end: Some(24),
        };
        let (slices, offset, length) =
            plan_slices(&chunks, Some(range), 30).expect("plan must succeed");
        assert_eq!(offset, 12);
        assert_eq!(length, 13);
        assert_eq!(slices.len(), 2);
        assert_eq!((slices[0].chunk_index, slices[0].skip, slices[0].take), (1, 2, 8));
        assert_eq!((slices[1].chunk_index, slices[1].skip, slices[1].take), (2, 0, 5));
    }

    #[test]
    fn open_ended_range_runs_to_the_last_byte() {
        let chunks = [chunk(0, 10), chunk(1, 10)];
        let range = ByteRange {
            start: 15,
            end: None,
        };
        let (slices, offset, length) =
            plan_slices(&chunks, Some(range), 20).expect("plan must succeed");
        assert_eq!(offset, 15);
        assert_eq!(length, 5);
        assert_eq!(slices.len(), 1);
        assert_eq!((slices[0].skip, slices[0].take), (5, 5));
    }

    #[test]
    fn out_of_bounds_ranges_are_rejected() {
        let chunks = [chunk(0, 10)];
        assert!(matches!(
            plan_slices(
                &chunks,
                Some(ByteRange {
                    start: 10,
                    end: None
                }),
                10
            ),
            Err(DriveError::BadInput { .. })
        ));
        assert!(matches!(
            plan_slices(
                &chunks,
                Some(ByteRange {
                    start: 5,
                    end: Some(3)
                }),
                10
            ),
            Err(DriveError::BadInput { .. })
        ));
    }

    #[test]
    fn empty_items_stream_nothing() {
        let (slices, offset, length) = plan_slices(&[], None, 0).expect("plan must succeed");
        assert!(slices.is_empty());
        assert_eq!((offset, length), (0, 0));
    }

    #[test]
    fn range_end_is_clamped_to_the_item_size() {
        let chunks = [chunk(0, 10)];
        let (slices, offset, length) = plan_slices(
            &chunks,
            Some(ByteRange {
                start: 4,
                end: Some(1_000),
            }),
            10,
        )
        .expect("plan must succeed");
        assert_eq!(offset, 4);
        assert_eq!(length, 6);
        assert_eq!((slices[0].skip, slices[0].take), (4, 6));
    }
}
