//! Domain entities persisted by the metadata store.

mod item;
mod settings;
mod torrent;
mod transfer;

pub use item::{Chunk, DeleteFailure, Item, ItemKind, ParentPatch};
pub use settings::{CleanupPolicy, RuntimeSettings, SettingsPatch};
pub use torrent::{TorrentSourceKind, TorrentTask, TorrentTaskFile, TorrentTaskStatus};
pub use transfer::{
    SessionStatus, TransferDirection, TransferRecord, TransferStatus, UploadSession,
};
