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

//! Data transfer services: resumable uploads, ordered download streaming,
//! admission control, and transfer-history maintenance.

pub mod admission;
pub mod download;
pub mod history;
pub mod sweeper;
pub mod upload;

pub use admission::{AdmissionGate, GateKind};
pub use download::{ByteRange, DownloadStream, Downloader};
pub use history::HistoryCleanupWorker;
pub use sweeper::SessionSweeper;
pub use upload::{CompletedUpload, PostProcessOutcome, PostProcessor, SessionView, UploadManager};
