//! Per-file blob-tier uploads for torrent tasks.
//!
//! Each selected file goes through the regular resumable-upload protocol: a
//! placeholder item and session are opened, the local payload is read in
//! chunk-size slices, and the session commits into a namespace item under
//! the task's target folder.

use std::path::Path;

use chrono::Utc;
use teledrive_core::{DriveError, DriveResult, TorrentTask, TorrentTaskFile, UploadSession};
use teledrive_data::TorrentStore;
use teledrive_transfer::UploadManager;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};
use uuid::Uuid;

const ACCESS_METHOD: &str = "torrent";

/// Uploads one torrent payload file into the drive.
#[derive(Clone)]
pub struct TaskFileUploader {
    torrents: TorrentStore,
    uploads: UploadManager,
}

impl TaskFileUploader {
    /// Construct the uploader over the shared services.
    #[must_use]
    pub const fn new(torrents: TorrentStore, uploads: UploadManager) -> Self {
        Self { torrents, uploads }
    }

    /// Upload one file and mark its row uploaded.
    ///
    /// A failure is recorded on the file row and returned; the caller
    /// continues with the task's remaining files.
    ///
    /// # Errors
    ///
    /// Returns the upload or repository error after recording it.
    pub async fn upload_file(
        &self,
        task: &TorrentTask,
        file: &TorrentTaskFile,
        save_path: &Path,
    ) -> DriveResult<Uuid> {
        match self.try_upload(task, file, save_path).await {
            Ok(item_id) => {
                self.torrents
                    .mark_file_uploaded(task.id, file.file_index, item_id)
                    .await?;
                info!(
                    task_id = %task.id,
                    file_index = file.file_index,
                    item_id = %item_id,
                    "torrent file uploaded"
                );
                Ok(item_id)
            }
            Err(err) => {
                warn!(
                    error = %err,
                    task_id = %task.id,
                    file_index = file.file_index,
                    "torrent file upload failed"
                );
                if let Err(record_err) = self
                    .torrents
                    .set_file_error(task.id, file.file_index, &err.to_string())
                    .await
                {
                    warn!(
                        error = %record_err,
                        task_id = %task.id,
                        file_index = file.file_index,
                        "failed to record torrent file error"
                    );
                }
                Err(err)
            }
        }
    }

    async fn try_upload(
        &self,
        task: &TorrentTask,
        file: &TorrentTaskFile,
        save_path: &Path,
    ) -> DriveResult<Uuid> {
        let local_path = save_path.join(&file.rel_path);
        let now = Utc::now();
        let session = self
            .uploads
            .begin(
                task.target_parent_id,
                &file.file_name,
                None,
                file.size_bytes,
                task.target_chat_id,
                ACCESS_METHOD,
                now,
            )
            .await?;

        let result = self.stream_file(&session, &local_path).await;
        match result {
            Ok(()) => {
                let committed = self.uploads.complete(session.id, Utc::now()).await?;
                Ok(committed.item.id)
            }
            Err(err) => {
                if let Err(abort_err) = self.uploads.abort(session.id, Utc::now()).await {
                    warn!(
                        error = %abort_err,
                        session_id = %session.id,
                        "failed to abort torrent upload session"
                    );
                }
                Err(err)
            }
        }
    }

    async fn stream_file(&self, session: &UploadSession, local_path: &Path) -> DriveResult<()> {
        let mut handle = tokio::fs::File::open(local_path)
            .await
            .map_err(|err| DriveError::transient("torrent.open_payload", err))?;
        for index in 0..session.total_chunks {
            let expected = usize::try_from(session.expected_chunk_len(index))
                .map_err(|_| DriveError::bad_input("chunk length exceeds supported size"))?;
            let mut buffer = vec![0_u8; expected];
            handle
                .read_exact(&mut buffer)
                .await
                .map_err(|err| DriveError::transient("torrent.read_payload", err))?;
            self.uploads
                .put_chunk(session.id, index, buffer, Utc::now())
                .await?;
        }
        Ok(())
    }
}
