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

//! Namespace services: file operations, trash lifecycle, blob-delete retry,
//! and the vault unlock flow.

pub mod cleanup;
pub mod service;
pub mod trash;
pub mod vault;

pub use cleanup::DeleteRetryWorker;
pub use service::FileService;
pub use trash::{HardDeleteStats, TrashService};
pub use vault::VaultService;
