//! Namespace repository: items, their materialized paths, and the sibling
//! name invariants.
//!
//! Every mutation that can violate a path invariant runs inside one
//! transaction with a row lock on the affected item; the cascade rewrite in
//! [`ItemStore::patch_move_rename`] is the only operation touching many rows.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgConnection;
use sqlx::{FromRow, PgPool};
use teledrive_core::{
    DriveError, DriveResult, Item, ItemKind, ParentPatch, escape_like, is_within, join_path,
    split_name, validate_prefix,
};
use uuid::Uuid;

const DEDUP_BUDGET: u32 = 999;
const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

const SELECT_BY_ID: &str = "SELECT * FROM items WHERE id = $1";

const SELECT_BY_ID_FOR_UPDATE: &str = "SELECT * FROM items WHERE id = $1 FOR UPDATE";

const SELECT_PARENT: &str = "SELECT kind, path FROM items WHERE id = $1";

const SELECT_BY_SHARE_CODE: &str = r"
    SELECT * FROM items
    WHERE shared_code = $1 AND shared_enabled AND trashed_at IS NULL
";

const SIBLING_NAME_TAKEN: &str = r"
    SELECT EXISTS (
        SELECT 1 FROM items
        WHERE parent_id IS NOT DISTINCT FROM $1::uuid
          AND name = $2
          AND ($3::uuid IS NULL OR id <> $3)
    )
";

const INSERT_ITEM: &str = r"
    INSERT INTO items (
        id, kind, name, parent_id, path, size_bytes, mime_type, favorite,
        in_vault, trashed_at, last_accessed_at, shared_code, shared_enabled,
        created_at, updated_at
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
";

const UPDATE_MOVED_ITEM: &str = r"
    UPDATE items
    SET name = $2, parent_id = $3, path = $4, updated_at = $5
    WHERE id = $1
    RETURNING *
";

const CASCADE_DESCENDANT_PATHS: &str = r"
    UPDATE items
    SET path = $1 || substring(path, $2), updated_at = $3
    WHERE path LIKE $4
";

const DELETE_BY_PREFIX: &str = "DELETE FROM items WHERE path = $1 OR path LIKE $2";

const DELETE_BY_ID: &str = "DELETE FROM items WHERE id = $1";

const SELECT_SUBTREE: &str = r"
    SELECT * FROM items WHERE path = $1 OR path LIKE $2 ORDER BY path ASC
";

const SET_TRASHED_BY_PREFIX: &str = r"
    UPDATE items
    SET trashed_at = $1, updated_at = $2
    WHERE path = $3 OR path LIKE $4
";

const TOUCH: &str = "UPDATE items SET last_accessed_at = $2 WHERE id = $1";

const SET_SHARE: &str = r"
    UPDATE items
    SET shared_code = $2, shared_enabled = TRUE, updated_at = $3
    WHERE id = $1
    RETURNING *
";

const UNSET_SHARE: &str = r"
    UPDATE items
    SET shared_code = NULL, shared_enabled = FALSE, updated_at = $2
    WHERE id = $1
    RETURNING *
";

const UPDATE_VAULT: &str = r"
    UPDATE items SET in_vault = $2, updated_at = $3 WHERE id = $1 RETURNING *
";

const UPDATE_SIZE: &str = r"
    UPDATE items SET size_bytes = $2, updated_at = $3 WHERE id = $1 RETURNING *
";

const SET_FAVORITE: &str = r"
    UPDATE items SET favorite = $2, updated_at = $3 WHERE id = $1 RETURNING *
";

const LIST_RECENT: &str = r"
    SELECT * FROM items
    WHERE kind <> 'folder'
      AND trashed_at IS NULL
      AND in_vault = FALSE
      AND last_accessed_at IS NOT NULL
    ORDER BY last_accessed_at DESC
    LIMIT $1
";

const LIST_TRASH: &str = r"
    SELECT child.* FROM items child
    LEFT JOIN items parent ON parent.id = child.parent_id
    WHERE child.trashed_at IS NOT NULL
      AND (parent.id IS NULL OR parent.trashed_at IS NULL)
    ORDER BY child.trashed_at DESC, child.id ASC
    LIMIT $1 OFFSET $2
";

const COUNT_TRASH: &str = r"
    SELECT COUNT(*) FROM items child
    LEFT JOIN items parent ON parent.id = child.parent_id
    WHERE child.trashed_at IS NOT NULL
      AND (parent.id IS NULL OR parent.trashed_at IS NULL)
";

const SELECT_STATS: &str = r"
    SELECT COUNT(*) AS file_count, COALESCE(SUM(size_bytes), 0) AS total_bytes
    FROM items
    WHERE kind <> 'folder' AND trashed_at IS NULL
";

/// Which slice of the namespace a listing targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemView {
    /// Regular files under one parent, vault excluded.
    Files,
    /// Every vault item regardless of parent.
    Vault,
}

/// Listing sort key; folders always sort first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemSortKey {
    /// Sort by display name.
    Name,
    /// Sort by byte size.
    Size,
    /// Sort by item kind.
    Kind,
    /// Sort by last mutation time.
    UpdatedAt,
}

/// Listing sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

/// Parameters for a paged namespace listing.
#[derive(Debug, Clone)]
pub struct ItemListQuery {
    /// Target view.
    pub view: ItemView,
    /// Parent folder for the files view; `None` means the root.
    pub parent_id: Option<Uuid>,
    /// Case-insensitive substring match on the name.
    pub search: Option<String>,
    /// Restrict to favorites.
    pub favorites_only: bool,
    /// Sort key.
    pub sort: ItemSortKey,
    /// Sort direction.
    pub order: SortOrder,
    /// One-based page number.
    pub page: i64,
    /// Page size, clamped to `1..=200`.
    pub page_size: i64,
}

impl Default for ItemListQuery {
    fn default() -> Self {
        Self {
            view: ItemView::Files,
            parent_id: None,
            search: None,
            favorites_only: false,
            sort: ItemSortKey::Name,
            order: SortOrder::Asc,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Aggregate counters for the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveStats {
    /// Live non-folder items.
    pub file_count: i64,
    /// Sum of live non-folder item sizes.
    pub total_bytes: i64,
}

#[derive(Debug, Clone, FromRow)]
struct ItemRow {
    id: Uuid,
    kind: String,
    name: String,
    parent_id: Option<Uuid>,
    path: String,
    size_bytes: i64,
    mime_type: Option<String>,
    favorite: bool,
    in_vault: bool,
    trashed_at: Option<DateTime<Utc>>,
    last_accessed_at: Option<DateTime<Utc>>,
    shared_code: Option<String>,
    shared_enabled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        let kind = ItemKind::parse(&row.kind).unwrap_or_else(|| {
            tracing::warn!(kind = %row.kind, item_id = %row.id, "unknown item kind label");
            ItemKind::Other
        });
        Self {
            id: row.id,
            kind,
            name: row.name,
            parent_id: row.parent_id,
            path: row.path,
            size_bytes: row.size_bytes,
            mime_type: row.mime_type,
            favorite: row.favorite,
            in_vault: row.in_vault,
            trashed_at: row.trashed_at,
            last_accessed_at: row.last_accessed_at,
            shared_code: row.shared_code,
            shared_enabled: row.shared_enabled,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Database-backed repository for namespace items.
#[derive(Clone)]
pub struct ItemStore {
    pool: PgPool,
}

impl ItemStore {
    /// Construct the repository over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a folder under the given parent, de-duplicating the name.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::BadInput`] for an empty name or a non-folder
    /// parent and [`DriveError::Conflict`] when the de-duplication budget is
    /// exhausted.
    pub async fn create_folder(
        &self,
        parent_id: Option<Uuid>,
        desired_name: &str,
        now: DateTime<Utc>,
    ) -> DriveResult<Item> {
        self.create_item(parent_id, ItemKind::Folder, desired_name, 0, None, now)
            .await
    }

    /// Create a non-folder item under the given parent.
    ///
    /// # Errors
    ///
    /// As [`ItemStore::create_folder`]; additionally rejects
    /// `kind == ItemKind::Folder`.
    pub async fn create_file_item(
        &self,
        parent_id: Option<Uuid>,
        kind: ItemKind,
        desired_name: &str,
        size_bytes: i64,
        mime_type: Option<&str>,
        now: DateTime<Utc>,
    ) -> DriveResult<Item> {
        if kind.is_folder() {
            return Err(DriveError::bad_input(
                "file items must not use the folder kind",
            ));
        }
        self.create_item(parent_id, kind, desired_name, size_bytes, mime_type, now)
            .await
    }

    async fn create_item(
        &self,
        parent_id: Option<Uuid>,
        kind: ItemKind,
        desired_name: &str,
        size_bytes: i64,
        mime_type: Option<&str>,
        now: DateTime<Utc>,
    ) -> DriveResult<Item> {
        let desired = desired_name.trim();
        if desired.is_empty() {
            return Err(DriveError::bad_input("item name must not be empty"));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(super::error::map_sqlx_err("items.create.begin"))?;
        let parent_path = resolve_parent_path(tx.as_mut(), parent_id).await?;
        let name = unique_sibling_name(tx.as_mut(), parent_id, desired, None, None).await?;
        let item = Item {
            id: Uuid::new_v4(),
            kind,
            name: name.clone(),
            parent_id,
            path: join_path(&parent_path, &name),
            size_bytes,
            mime_type: mime_type.map(ToOwned::to_owned),
            favorite: false,
            in_vault: false,
            trashed_at: None,
            last_accessed_at: None,
            shared_code: None,
            shared_enabled: false,
            created_at: now,
            updated_at: now,
        };
        insert_item(tx.as_mut(), &item).await?;
        tx.commit()
            .await
            .map_err(super::error::map_sqlx_err("items.create.commit"))?;
        Ok(item)
    }

    /// Insert a fully formed item row, preserving the caller's id.
    ///
    /// Used by subtree copy; the caller owns name de-duplication.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::BadInput`] when the parent reference is broken
    /// and [`DriveError::Conflict`] on an id collision.
    pub async fn insert_raw(&self, item: &Item) -> DriveResult<()> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(super::error::map_sqlx_err("items.insert_raw.acquire"))?;
        insert_item(&mut conn, item).await
    }

    /// Atomic move/rename with descendant path cascade.
    ///
    /// The parent designation is triple-state: keep, move to root, or move
    /// under a folder. No folder may be moved into itself or its subtree.
    ///
    /// # Errors
    ///
    /// [`DriveError::NotFound`] for a missing item, [`DriveError::BadInput`]
    /// for an empty name or non-folder target parent,
    /// [`DriveError::Forbidden`] for a move into the item's own subtree, and
    /// [`DriveError::Conflict`] when de-duplication is exhausted.
    pub async fn patch_move_rename(
        &self,
        id: Uuid,
        new_name: Option<&str>,
        parent: ParentPatch,
        now: DateTime<Utc>,
    ) -> DriveResult<Item> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(super::error::map_sqlx_err("items.patch.begin"))?;

        let current: Item = sqlx::query_as::<_, ItemRow>(SELECT_BY_ID_FOR_UPDATE)
            .bind(id)
            .fetch_optional(tx.as_mut())
            .await
            .map_err(super::error::map_sqlx_err("items.patch.lock"))?
            .ok_or(DriveError::not_found("item"))?
            .into();

        let target_name = match new_name {
            Some(name) => {
                let trimmed = name.trim();
                if trimmed.is_empty() {
                    return Err(DriveError::bad_input("item name must not be empty"));
                }
                trimmed.to_owned()
            }
            None => current.name.clone(),
        };

        let target_parent_id = match parent {
            ParentPatch::Keep => current.parent_id,
            ParentPatch::Root => None,
            ParentPatch::To(parent_id) => Some(parent_id),
        };

        let parent_path = resolve_parent_path(tx.as_mut(), target_parent_id).await?;
        if current.kind.is_folder() && is_within(&current.path, &parent_path) {
            return Err(DriveError::forbidden(
                "a folder cannot be moved into itself or its own subtree",
            ));
        }

        let unique_name =
            unique_sibling_name(tx.as_mut(), target_parent_id, &target_name, None, Some(id))
                .await?;
        let new_path = join_path(&parent_path, &unique_name);

        let updated: Item = sqlx::query_as::<_, ItemRow>(UPDATE_MOVED_ITEM)
            .bind(id)
            .bind(&unique_name)
            .bind(target_parent_id)
            .bind(&new_path)
            .bind(now)
            .fetch_one(tx.as_mut())
            .await
            .map_err(super::error::map_sqlx_err("items.patch.update"))?
            .into();

        if current.kind.is_folder() && new_path != current.path {
            let splice_from = i32::try_from(current.path.chars().count() + 1)
                .map_err(|_| DriveError::bad_input("item path exceeds supported length"))?;
            sqlx::query(CASCADE_DESCENDANT_PATHS)
                .bind(&new_path)
                .bind(splice_from)
                .bind(now)
                .bind(format!("{}/%", escape_like(&current.path)))
                .execute(tx.as_mut())
                .await
                .map_err(super::error::map_sqlx_err("items.patch.cascade"))?;
        }

        tx.commit()
            .await
            .map_err(super::error::map_sqlx_err("items.patch.commit"))?;
        Ok(updated)
    }

    /// Fetch one item.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::NotFound`] when absent.
    pub async fn get(&self, id: Uuid) -> DriveResult<Item> {
        sqlx::query_as::<_, ItemRow>(SELECT_BY_ID)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("items.get"))?
            .map(Into::into)
            .ok_or(DriveError::not_found("item"))
    }

    /// Resolve an item through its share code, ignoring disabled shares.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::NotFound`] when no enabled share matches.
    pub async fn get_by_share_code(&self, code: &str) -> DriveResult<Item> {
        sqlx::query_as::<_, ItemRow>(SELECT_BY_SHARE_CODE)
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("items.get_by_share_code"))?
            .map(Into::into)
            .ok_or(DriveError::not_found("shared item"))
    }

    /// Paged listing of one view, folders first.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::Transient`] on database failure.
    pub async fn list(&self, query: &ItemListQuery) -> DriveResult<(Vec<Item>, i64)> {
        let page = query.page.max(1);
        let page_size = if query.page_size < 1 {
            DEFAULT_PAGE_SIZE
        } else {
            query.page_size.min(MAX_PAGE_SIZE)
        };
        let offset = (page - 1) * page_size;
        let pattern = query
            .search
            .as_deref()
            .map(|term| format!("%{}%", escape_like(term)));
        let order = order_fragment(query.sort, query.order);

        let (rows, total) = match query.view {
            ItemView::Files => {
                let filter = r"
                    FROM items
                    WHERE in_vault = FALSE
                      AND trashed_at IS NULL
                      AND parent_id IS NOT DISTINCT FROM $1::uuid
                      AND ($2::text IS NULL OR name ILIKE $2)
                      AND (NOT $3::boolean OR favorite)
                ";
                let select = format!("SELECT * {filter} ORDER BY {order} LIMIT $4 OFFSET $5");
                let count = format!("SELECT COUNT(*) {filter}");
                let rows = sqlx::query_as::<_, ItemRow>(sqlx::AssertSqlSafe(select))
                    .bind(query.parent_id)
                    .bind(pattern.as_deref())
                    .bind(query.favorites_only)
                    .bind(page_size)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(super::error::map_sqlx_err("items.list"))?;
                let total: i64 = sqlx::query_scalar(sqlx::AssertSqlSafe(count))
                    .bind(query.parent_id)
                    .bind(pattern.as_deref())
                    .bind(query.favorites_only)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(super::error::map_sqlx_err("items.list.count"))?;
                (rows, total)
            }
            ItemView::Vault => {
                let filter = r"
                    FROM items
                    WHERE in_vault = TRUE
                      AND trashed_at IS NULL
                      AND ($1::text IS NULL OR name ILIKE $1)
                      AND (NOT $2::boolean OR favorite)
                ";
                let select = format!("SELECT * {filter} ORDER BY {order} LIMIT $3 OFFSET $4");
                let count = format!("SELECT COUNT(*) {filter}");
                let rows = sqlx::query_as::<_, ItemRow>(sqlx::AssertSqlSafe(select))
                    .bind(pattern.as_deref())
                    .bind(query.favorites_only)
                    .bind(page_size)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(super::error::map_sqlx_err("items.list"))?;
                let total: i64 = sqlx::query_scalar(sqlx::AssertSqlSafe(count))
                    .bind(pattern.as_deref())
                    .bind(query.favorites_only)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(super::error::map_sqlx_err("items.list.count"))?;
                (rows, total)
            }
        };

        Ok((rows.into_iter().map(Into::into).collect(), total))
    }

    /// The item at `prefix` plus all descendants, ordered by path.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::BadInput`] when the prefix is not absolute.
    pub async fn list_subtree(&self, prefix: &str) -> DriveResult<Vec<Item>> {
        validate_prefix(prefix)?;
        let rows = sqlx::query_as::<_, ItemRow>(SELECT_SUBTREE)
            .bind(prefix)
            .bind(format!("{}/%", escape_like(prefix)))
            .fetch_all(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("items.list_subtree"))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Remove every item row under the prefix, chunks cascading with them.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::BadInput`] when the prefix is not absolute.
    pub async fn delete_by_path_prefix(&self, prefix: &str) -> DriveResult<u64> {
        validate_prefix(prefix)?;
        let result = sqlx::query(DELETE_BY_PREFIX)
            .bind(prefix)
            .bind(format!("{}/%", escape_like(prefix)))
            .execute(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("items.delete_by_prefix"))?;
        Ok(result.rows_affected())
    }

    /// Remove a single item row; its chunk rows cascade with it.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::Transient`] on database failure.
    pub async fn delete(&self, id: Uuid) -> DriveResult<u64> {
        let result = sqlx::query(DELETE_BY_ID)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("items.delete"))?;
        Ok(result.rows_affected())
    }

    /// Set or clear `trashed_at` for the subtree rooted at `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::BadInput`] when the prefix is not absolute.
    pub async fn set_trashed_by_path_prefix(
        &self,
        prefix: &str,
        trashed_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> DriveResult<u64> {
        validate_prefix(prefix)?;
        let result = sqlx::query(SET_TRASHED_BY_PREFIX)
            .bind(trashed_at)
            .bind(now)
            .bind(prefix)
            .bind(format!("{}/%", escape_like(prefix)))
            .execute(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("items.set_trashed"))?;
        Ok(result.rows_affected())
    }

    /// Record a successful read for the recent view.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::NotFound`] when the item is absent.
    pub async fn touch(&self, id: Uuid, now: DateTime<Utc>) -> DriveResult<()> {
        let result = sqlx::query(TOUCH)
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("items.touch"))?;
        if result.rows_affected() == 0 {
            return Err(DriveError::not_found("item"));
        }
        Ok(())
    }

    /// Enable sharing with the given code.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::Conflict`] when the code is already in use and
    /// [`DriveError::NotFound`] when the item is absent.
    pub async fn set_share(&self, id: Uuid, code: &str, now: DateTime<Utc>) -> DriveResult<Item> {
        sqlx::query_as::<_, ItemRow>(SET_SHARE)
            .bind(id)
            .bind(code)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("items.set_share"))?
            .map(Into::into)
            .ok_or(DriveError::not_found("item"))
    }

    /// Disable sharing and clear the code.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::NotFound`] when the item is absent.
    pub async fn unset_share(&self, id: Uuid, now: DateTime<Utc>) -> DriveResult<Item> {
        sqlx::query_as::<_, ItemRow>(UNSET_SHARE)
            .bind(id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("items.unset_share"))?
            .map(Into::into)
            .ok_or(DriveError::not_found("item"))
    }

    /// Move an item in or out of the vault.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::NotFound`] when the item is absent.
    pub async fn update_vault(
        &self,
        id: Uuid,
        in_vault: bool,
        now: DateTime<Utc>,
    ) -> DriveResult<Item> {
        sqlx::query_as::<_, ItemRow>(UPDATE_VAULT)
            .bind(id)
            .bind(in_vault)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("items.update_vault"))?
            .map(Into::into)
            .ok_or(DriveError::not_found("item"))
    }

    /// Overwrite the recorded byte size.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::NotFound`] when the item is absent.
    pub async fn update_size(
        &self,
        id: Uuid,
        size_bytes: i64,
        now: DateTime<Utc>,
    ) -> DriveResult<Item> {
        sqlx::query_as::<_, ItemRow>(UPDATE_SIZE)
            .bind(id)
            .bind(size_bytes)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("items.update_size"))?
            .map(Into::into)
            .ok_or(DriveError::not_found("item"))
    }

    /// Toggle the favorite flag.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::NotFound`] when the item is absent.
    pub async fn set_favorite(
        &self,
        id: Uuid,
        favorite: bool,
        now: DateTime<Utc>,
    ) -> DriveResult<Item> {
        sqlx::query_as::<_, ItemRow>(SET_FAVORITE)
            .bind(id)
            .bind(favorite)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("items.set_favorite"))?
            .map(Into::into)
            .ok_or(DriveError::not_found("item"))
    }

    /// Most recently read non-folder items, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::Transient`] on database failure.
    pub async fn list_recent(&self, limit: i64) -> DriveResult<Vec<Item>> {
        let rows = sqlx::query_as::<_, ItemRow>(LIST_RECENT)
            .bind(limit.clamp(1, MAX_PAGE_SIZE))
            .fetch_all(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("items.list_recent"))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Paged listing of trashed subtree roots, newest-trashed first.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::Transient`] on database failure.
    pub async fn list_trash(&self, page: i64, page_size: i64) -> DriveResult<(Vec<Item>, i64)> {
        let page = page.max(1);
        let page_size = if page_size < 1 {
            DEFAULT_PAGE_SIZE
        } else {
            page_size.min(MAX_PAGE_SIZE)
        };
        let rows = sqlx::query_as::<_, ItemRow>(LIST_TRASH)
            .bind(page_size)
            .bind((page - 1) * page_size)
            .fetch_all(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("items.list_trash"))?;
        let total: i64 = sqlx::query_scalar(COUNT_TRASH)
            .fetch_one(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("items.list_trash.count"))?;
        Ok((rows.into_iter().map(Into::into).collect(), total))
    }

    /// Aggregate item counters.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::Transient`] on database failure.
    pub async fn stats(&self) -> DriveResult<DriveStats> {
        let (file_count, total_bytes): (i64, i64) = sqlx::query_as(SELECT_STATS)
            .fetch_one(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("items.stats"))?;
        Ok(DriveStats {
            file_count,
            total_bytes,
        })
    }

    /// De-duplicate `desired` among the children of `parent_id`, probing with
    /// the optional free-form suffix first and ` (i)` counters after.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::Conflict`] when the probe budget is exhausted.
    pub async fn dedup_child_name(
        &self,
        parent_id: Option<Uuid>,
        desired: &str,
        suffix: Option<&str>,
    ) -> DriveResult<String> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(super::error::map_sqlx_err("items.dedup.acquire"))?;
        unique_sibling_name(&mut conn, parent_id, desired, suffix, None).await
    }

    /// Access the underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn order_fragment(sort: ItemSortKey, order: SortOrder) -> &'static str {
    match (sort, order) {
        (ItemSortKey::Name, SortOrder::Asc) => "(kind = 'folder') DESC, name ASC, id ASC",
        (ItemSortKey::Name, SortOrder::Desc) => "(kind = 'folder') DESC, name DESC, id ASC",
        (ItemSortKey::Size, SortOrder::Asc) => {
            "(kind = 'folder') DESC, size_bytes ASC, name ASC, id ASC"
        }
        (ItemSortKey::Size, SortOrder::Desc) => {
            "(kind = 'folder') DESC, size_bytes DESC, name ASC, id ASC"
        }
        (ItemSortKey::Kind, SortOrder::Asc) => {
            "(kind = 'folder') DESC, kind ASC, name ASC, id ASC"
        }
        (ItemSortKey::Kind, SortOrder::Desc) => {
            "(kind = 'folder') DESC, kind DESC, name ASC, id ASC"
        }
        (ItemSortKey::UpdatedAt, SortOrder::Asc) => {
            "(kind = 'folder') DESC, updated_at ASC, name ASC, id ASC"
        }
        (ItemSortKey::UpdatedAt, SortOrder::Desc) => {
            "(kind = 'folder') DESC, updated_at DESC, name ASC, id ASC"
        }
    }
}

async fn resolve_parent_path(
    conn: &mut PgConnection,
    parent_id: Option<Uuid>,
) -> DriveResult<String> {
    let Some(parent_id) = parent_id else {
        return Ok("/".to_owned());
    };
    let row: Option<(String, String)> = sqlx::query_as(SELECT_PARENT)
        .bind(parent_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(super::error::map_sqlx_err("items.resolve_parent"))?;
    match row {
        Some((kind, path)) if kind == ItemKind::Folder.as_str() => Ok(path),
        Some(_) => Err(DriveError::bad_input("parent item is not a folder")),
        None => Err(DriveError::bad_input("parent folder does not exist")),
    }
}

async fn sibling_name_taken(
    conn: &mut PgConnection,
    parent_id: Option<Uuid>,
    name: &str,
    exclude: Option<Uuid>,
) -> DriveResult<bool> {
    sqlx::query_scalar(SIBLING_NAME_TAKEN)
        .bind(parent_id)
        .bind(name)
        .bind(exclude)
        .fetch_one(&mut *conn)
        .await
        .map_err(super::error::map_sqlx_err("items.sibling_name_taken"))
}

async fn unique_sibling_name(
    conn: &mut PgConnection,
    parent_id: Option<Uuid>,
    desired: &str,
    suffix: Option<&str>,
    exclude: Option<Uuid>,
) -> DriveResult<String> {
    let (base, ext) = split_name(desired);
    let first = suffix.map_or_else(|| desired.to_owned(), |s| format!("{base}{s}{ext}"));
    if !sibling_name_taken(&mut *conn, parent_id, &first, exclude).await? {
        return Ok(first);
    }
    let counters = if suffix.is_some() { 2..=DEDUP_BUDGET } else { 1..=DEDUP_BUDGET };
    for counter in counters {
        let candidate = suffix.map_or_else(
            || format!("{base} ({counter}){ext}"),
            |s| format!("{base}{s} ({counter}){ext}"),
        );
        if !sibling_name_taken(&mut *conn, parent_id, &candidate, exclude).await? {
            return Ok(candidate);
        }
    }
    Err(DriveError::conflict(format!(
        "could not find a unique sibling name for {desired}"
    )))
}

async fn insert_item(conn: &mut PgConnection, item: &Item) -> DriveResult<()> {
    sqlx::query(INSERT_ITEM)
        .bind(item.id)
        .bind(item.kind.as_str())
        .bind(&item.name)
        .bind(item.parent_id)
        .bind(&item.path)
        .bind(item.size_bytes)
        .bind(item.mime_type.as_deref())
        .bind(item.favorite)
        .bind(item.in_vault)
        .bind(item.trashed_at)
        .bind(item.last_accessed_at)
        .bind(item.shared_code.as_deref())
        .bind(item.shared_enabled)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(super::error::map_sqlx_err("items.insert"))?;
    Ok(())
}
