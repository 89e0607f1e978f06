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

//! Composition root for the Teledrive data plane.
//!
//! The HTTP surface owns the process entrypoint and the platform adapters
//! (blob tier, torrent engine); it hands them to [`bootstrap::AppContext`]
//! and receives every service plus the background worker set, already wired.

pub mod bootstrap;
pub mod config;
pub mod error;

pub use bootstrap::{AppContext, WorkerSet};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
