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

//! Postgres metadata store: migrations and one repository per aggregate.
//!
//! This crate is the sole writer to the drive tables and enforces the
//! namespace invariants. Cross-worker coordination happens here through row
//! locks and unique constraints, never through in-process state.

pub mod chunks;
pub mod cleanup;
mod error;
pub mod history;
pub mod items;
pub mod sessions;
pub mod settings;
pub mod store;
pub mod torrents;

pub use chunks::ChunkStore;
pub use cleanup::DeleteFailureStore;
pub use history::HistoryStore;
pub use items::{DriveStats, ItemListQuery, ItemSortKey, ItemStore, ItemView, SortOrder};
pub use sessions::SessionStore;
pub use settings::SettingsStore;
pub use store::{connect, run_migrations};
pub use torrents::TorrentStore;
