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

//! Torrent ingest pipeline: task submission, the claimer worker driving the
//! state machine, per-file uploads into the blob tier, and deferred source
//! cleanup.

pub mod cleanup;
pub mod pipeline;
pub mod service;
pub mod uploader;

pub use cleanup::SourceCleanupWorker;
pub use pipeline::TorrentClaimWorker;
pub use service::{TaskWithFiles, TorrentService};
pub use uploader::TaskFileUploader;
