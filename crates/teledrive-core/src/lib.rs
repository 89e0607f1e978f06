#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

//! Domain model, error kinds, path rules, and external-service traits shared
//! across the Teledrive workspace.

pub mod blob;
pub mod engine;
pub mod error;
pub mod model;
pub mod path;

pub use blob::{BlobStore, ChunkRef, DeleteOutcome, SentChunk, backoff_delay};
pub use engine::{EngineFile, EngineSource, EngineStatus, TorrentEngine};
pub use error::{DriveError, DriveResult};
pub use model::{
    Chunk, CleanupPolicy, DeleteFailure, Item, ItemKind, ParentPatch, RuntimeSettings,
    SessionStatus, SettingsPatch, TorrentSourceKind, TorrentTask, TorrentTaskFile,
    TorrentTaskStatus, TransferDirection, TransferRecord, TransferStatus, UploadSession,
};
pub use path::{escape_like, guess_item_kind, is_within, join_path, split_name, validate_prefix};
