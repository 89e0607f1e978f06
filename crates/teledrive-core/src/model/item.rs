//! Namespace items, their blob chunks, and the delete retry ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Classification of a namespace item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// A container for other items.
    Folder,
    /// Generic document.
    Document,
    /// Raster or vector image.
    Image,
    /// Video file.
    Video,
    /// Audio file.
    Audio,
    /// Compressed archive.
    Archive,
    /// Source code or markup.
    Code,
    /// Anything else.
    Other,
}

impl ItemKind {
    /// Stable database label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Folder => "folder",
            Self::Document => "document",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Archive => "archive",
            Self::Code => "code",
            Self::Other => "other",
        }
    }

    /// Parse a database label; `None` for unknown labels.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "folder" => Some(Self::Folder),
            "document" => Some(Self::Document),
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            "audio" => Some(Self::Audio),
            "archive" => Some(Self::Archive),
            "code" => Some(Self::Code),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    /// Whether the kind is the folder container kind.
    #[must_use]
    pub const fn is_folder(self) -> bool {
        matches!(self, Self::Folder)
    }
}

/// One node of the virtual filesystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    /// Opaque identity.
    pub id: Uuid,
    /// Item classification.
    pub kind: ItemKind,
    /// Display name, unique among siblings.
    pub name: String,
    /// Parent folder; `None` means the root.
    pub parent_id: Option<Uuid>,
    /// Materialized absolute path.
    pub path: String,
    /// Size in bytes; zero for folders.
    pub size_bytes: i64,
    /// MIME type; folders never carry one.
    pub mime_type: Option<String>,
    /// Marked as favorite.
    pub favorite: bool,
    /// Lives in the password-protected vault.
    pub in_vault: bool,
    /// Soft-deletion timestamp; `None` when live.
    pub trashed_at: Option<DateTime<Utc>>,
    /// Last successful read, powering the recent view.
    pub last_accessed_at: Option<DateTime<Utc>>,
    /// Share code; meaningful only while sharing is enabled.
    pub shared_code: Option<String>,
    /// Whether the share code grants access.
    pub shared_enabled: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// Whether the item is soft-deleted.
    #[must_use]
    pub const fn is_trashed(&self) -> bool {
        self.trashed_at.is_some()
    }
}

/// Triple-state parent designation for move/rename requests.
///
/// An undiscriminated optional cannot distinguish "keep the current parent"
/// from "move to the root", so the presence bit is explicit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParentPatch {
    /// Leave the parent unchanged.
    #[default]
    Keep,
    /// Move to the root.
    Root,
    /// Move under the given folder.
    To(Uuid),
}

/// One stored slice of an item's bytes, persisted as a blob-tier message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Opaque identity.
    pub id: Uuid,
    /// Owning item.
    pub item_id: Uuid,
    /// Zero-based, contiguous position within the item.
    pub chunk_index: i32,
    /// Byte length of this slice.
    pub chunk_size: i64,
    /// Blob-tier chat holding the message.
    pub tg_chat_id: i64,
    /// Blob-tier message identifier.
    pub tg_message_id: i64,
    /// Platform file identifier usable for re-fetch.
    pub tg_file_id: String,
    /// Platform file identifier stable across chats.
    pub tg_file_unique_id: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Retry-ledger entry for a blob-tier delete that has not succeeded yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteFailure {
    /// Opaque identity.
    pub id: Uuid,
    /// Blob-tier chat of the undeleted message.
    pub tg_chat_id: i64,
    /// Blob-tier message identifier.
    pub tg_message_id: i64,
    /// Item the chunk belonged to, if still known.
    pub item_id: Option<Uuid>,
    /// Original item path kept for post-mortem.
    pub item_path: Option<String>,
    /// Most recent failure detail.
    pub error: String,
    /// Number of delete attempts so far.
    pub retry_count: i32,
    /// Whether the delete eventually succeeded.
    pub resolved: bool,
    /// Timestamp of the most recent retry.
    pub last_retry_at: Option<DateTime<Utc>>,
    /// Timestamp of resolution.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_labels_round_trip() {
        for kind in [
            ItemKind::Folder,
            ItemKind::Document,
            ItemKind::Image,
            ItemKind::Video,
            ItemKind::Audio,
            ItemKind::Archive,
            ItemKind::Code,
            ItemKind::Other,
        ] {
            assert_eq!(ItemKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ItemKind::parse("directory"), None);
    }

    #[test]
    fn parent_patch_defaults_to_keep() {
        assert_eq!(ParentPatch::default(), ParentPatch::Keep);
    }
}
