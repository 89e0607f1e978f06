//! Domain façade over the namespace repositories.

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use rand::Rng;
use teledrive_core::{
    BlobStore, Chunk, DriveError, DriveResult, Item, ParentPatch, guess_item_kind, is_within,
    join_path,
};
use teledrive_data::{ChunkStore, DriveStats, ItemListQuery, ItemStore};
use tracing::{debug, info};
use uuid::Uuid;

const SHARE_CODE_BYTES: usize = 12;
const SHARE_CODE_ATTEMPTS: u32 = 5;

/// High-level namespace operations consumed by the HTTP surface.
#[derive(Clone)]
pub struct FileService {
    items: ItemStore,
    chunks: ChunkStore,
    blob: Arc<dyn BlobStore>,
}

impl FileService {
    /// Construct the service over the shared repositories.
    #[must_use]
    pub fn new(items: ItemStore, chunks: ChunkStore, blob: Arc<dyn BlobStore>) -> Self {
        Self {
            items,
            chunks,
            blob,
        }
    }

    /// Create a folder, de-duplicating its name among siblings.
    ///
    /// # Errors
    ///
    /// See [`ItemStore::create_folder`].
    pub async fn create_folder(
        &self,
        parent_id: Option<Uuid>,
        name: &str,
        now: DateTime<Utc>,
    ) -> DriveResult<Item> {
        let folder = self.items.create_folder(parent_id, name, now).await?;
        info!(item_id = %folder.id, path = %folder.path, "folder created");
        Ok(folder)
    }

    /// Create a file item, inferring its kind from name and MIME.
    ///
    /// # Errors
    ///
    /// See [`ItemStore::create_file_item`].
    pub async fn create_file(
        &self,
        parent_id: Option<Uuid>,
        name: &str,
        size_bytes: i64,
        mime_type: Option<&str>,
        now: DateTime<Utc>,
    ) -> DriveResult<Item> {
        let kind = guess_item_kind(name, mime_type);
        self.items
            .create_file_item(parent_id, kind, name, size_bytes, mime_type, now)
            .await
    }

    /// Rename and/or move an item; the parent designation is triple-state.
    ///
    /// # Errors
    ///
    /// See [`ItemStore::patch_move_rename`].
    pub async fn move_rename(
        &self,
        id: Uuid,
        new_name: Option<&str>,
        parent: ParentPatch,
        now: DateTime<Utc>,
    ) -> DriveResult<Item> {
        let item = self.items.patch_move_rename(id, new_name, parent, now).await?;
        info!(item_id = %item.id, path = %item.path, "item moved or renamed");
        Ok(item)
    }

    /// Fetch one item.
    ///
    /// # Errors
    ///
    /// See [`ItemStore::get`].
    pub async fn get(&self, id: Uuid) -> DriveResult<Item> {
        self.items.get(id).await
    }

    /// Resolve an item through an enabled share code.
    ///
    /// # Errors
    ///
    /// See [`ItemStore::get_by_share_code`].
    pub async fn get_by_share_code(&self, code: &str) -> DriveResult<Item> {
        self.items.get_by_share_code(code).await
    }

    /// Paged listing of a view.
    ///
    /// # Errors
    ///
    /// See [`ItemStore::list`].
    pub async fn list(&self, query: &ItemListQuery) -> DriveResult<(Vec<Item>, i64)> {
        self.items.list(query).await
    }

    /// Most recently read items.
    ///
    /// # Errors
    ///
    /// See [`ItemStore::list_recent`].
    pub async fn list_recent(&self, limit: i64) -> DriveResult<Vec<Item>> {
        self.items.list_recent(limit).await
    }

    /// Aggregate counters for the dashboard.
    ///
    /// # Errors
    ///
    /// See [`ItemStore::stats`].
    pub async fn stats(&self) -> DriveResult<DriveStats> {
        self.items.stats().await
    }

    /// Enable sharing, generating a fresh opaque code.
    ///
    /// Code collisions are vanishingly rare but surface as a database
    /// conflict, so generation retries a few times before giving up.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::Conflict`] when every generated code collided.
    pub async fn enable_share(&self, id: Uuid, now: DateTime<Utc>) -> DriveResult<Item> {
        let mut last_err = DriveError::conflict("share code generation exhausted its attempts");
        for _ in 0..SHARE_CODE_ATTEMPTS {
            let code = generate_share_code();
            match self.items.set_share(id, &code, now).await {
                Ok(item) => {
                    debug!(item_id = %id, "share enabled");
                    return Ok(item);
                }
                Err(err @ DriveError::Conflict { .. }) => last_err = err,
                Err(err) => return Err(err),
            }
        }
        Err(last_err)
    }

    /// Disable sharing and drop the code.
    ///
    /// # Errors
    ///
    /// See [`ItemStore::unset_share`].
    pub async fn disable_share(&self, id: Uuid, now: DateTime<Utc>) -> DriveResult<Item> {
        self.items.unset_share(id, now).await
    }

    /// Toggle the favorite flag.
    ///
    /// # Errors
    ///
    /// See [`ItemStore::set_favorite`].
    pub async fn set_favorite(
        &self,
        id: Uuid,
        favorite: bool,
        now: DateTime<Utc>,
    ) -> DriveResult<Item> {
        self.items.set_favorite(id, favorite, now).await
    }

    /// Move an item in or out of the vault.
    ///
    /// # Errors
    ///
    /// See [`ItemStore::update_vault`].
    pub async fn set_vault(
        &self,
        id: Uuid,
        in_vault: bool,
        now: DateTime<Utc>,
    ) -> DriveResult<Item> {
        self.items.update_vault(id, in_vault, now).await
    }

    /// Deep-copy an item (and, for folders, its subtree) under a new parent.
    ///
    /// Metadata rows get fresh ids; chunk bodies are re-sent through the
    /// blob tier because blob references are globally unique and cannot be
    /// shared between items.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::Forbidden`] when a folder would be copied into
    /// its own subtree, plus the underlying repository and blob-tier errors.
    pub async fn copy(
        &self,
        source_id: Uuid,
        target_parent_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> DriveResult<Item> {
        let source = self.items.get(source_id).await?;
        let target_parent_path = match target_parent_id {
            None => "/".to_owned(),
            Some(parent_id) => {
                let parent = self.items.get(parent_id).await?;
                if !parent.kind.is_folder() {
                    return Err(DriveError::bad_input("copy target is not a folder"));
                }
                parent.path
            }
        };
        if source.kind.is_folder() && is_within(&source.path, &target_parent_path) {
            return Err(DriveError::forbidden(
                "a folder cannot be copied into its own subtree",
            ));
        }

        let root_name = self
            .items
            .dedup_child_name(target_parent_id, &source.name, None)
            .await?;

        let subtree = self.items.list_subtree(&source.path).await?;
        let mut id_map: HashMap<Uuid, Uuid> = HashMap::new();
        let mut root_copy: Option<Item> = None;
        for original in subtree {
            let copy_id = Uuid::new_v4();
            id_map.insert(original.id, copy_id);
            let (parent_id, name) = if original.id == source.id {
                (target_parent_id, root_name.clone())
            } else {
                let mapped_parent = original
                    .parent_id
                    .and_then(|parent| id_map.get(&parent).copied())
                    .ok_or_else(|| {
                        DriveError::bad_input("subtree copy encountered a detached item")
                    })?;
                (Some(mapped_parent), original.name.clone())
            };
            let parent_path = if original.id == source.id {
                target_parent_path.clone()
            } else {
                // list_subtree orders by path, so the parent copy exists.
                let mapped_parent = parent_id.ok_or_else(|| {
                    DriveError::bad_input("subtree copy encountered a detached item")
                })?;
                self.items.get(mapped_parent).await?.path
            };
            let copy = Item {
                id: copy_id,
                kind: original.kind,
                name: name.clone(),
                parent_id,
                path: join_path(&parent_path, &name),
                size_bytes: original.size_bytes,
                mime_type: original.mime_type.clone(),
                favorite: false,
                in_vault: original.in_vault,
                trashed_at: None,
                last_accessed_at: None,
                shared_code: None,
                shared_enabled: false,
                created_at: now,
                updated_at: now,
            };
            self.items.insert_raw(&copy).await?;
            if !original.kind.is_folder() {
                self.copy_chunks(original.id, copy_id, now).await?;
            }
            if original.id == source.id {
                root_copy = Some(copy);
            }
        }

        let copied = root_copy.ok_or_else(|| DriveError::not_found("item"))?;
        info!(source_id = %source.id, copy_id = %copied.id, path = %copied.path, "subtree copied");
        Ok(copied)
    }

    async fn copy_chunks(
        &self,
        source_item_id: Uuid,
        target_item_id: Uuid,
        now: DateTime<Utc>,
    ) -> DriveResult<()> {
        for chunk in self.chunks.list_for_item(source_item_id).await? {
            let bytes = self
                .blob
                .fetch_chunk(chunk.tg_chat_id, chunk.tg_message_id)
                .await?;
            let sent = self.blob.send_chunk(chunk.tg_chat_id, bytes).await?;
            self.chunks
                .insert(&Chunk {
                    id: Uuid::new_v4(),
                    item_id: target_item_id,
                    chunk_index: chunk.chunk_index,
                    chunk_size: chunk.chunk_size,
                    tg_chat_id: chunk.tg_chat_id,
                    tg_message_id: sent.message_id,
                    tg_file_id: sent.file_id,
                    tg_file_unique_id: sent.file_unique_id,
                    created_at: now,
                })
                .await?;
        }
        Ok(())
    }

}

fn generate_share_code() -> String {
    let mut bytes = [0_u8; SHARE_CODE_BYTES];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn share_codes_are_url_safe_and_distinct() {
        let first = generate_share_code();
        let second = generate_share_code();
        assert_ne!(first, second);
        assert_eq!(first.len(), 16);
        assert!(
            first
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

}
