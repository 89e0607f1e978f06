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
#![allow(clippy::multiple_crate_versions)]

//! Shared test helpers: environment probes and in-memory fakes for the
//! external collaborators (blob tier, torrent engine).

pub mod blob;
pub mod engine;

pub use blob::MemoryBlobStore;
pub use engine::ScriptedTorrentEngine;

/// Docker-related helpers for integration tests that rely on a container
/// runtime.
pub mod docker {
    use std::path::Path;
    use std::process::Command;

    /// Returns `true` if a Docker daemon is reachable for integration tests.
    #[must_use]
    pub fn available() -> bool {
        available_with_host(std::env::var("DOCKER_HOST").ok())
    }

    fn available_with_host(host: Option<String>) -> bool {
        if let Some(host) = host {
            if let Some(path) = host.strip_prefix("unix://") {
                return Path::new(path).exists();
            }
            return true;
        }

        Path::new("/var/run/docker.sock").exists()
            || Command::new("docker")
                .args(["info"])
                .output()
                .map(|output| output.status.success())
                .unwrap_or(false)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn missing_unix_socket_is_unavailable() {
            assert!(!available_with_host(Some(
                "unix:///definitely/missing.sock".into()
            )));
        }

        #[test]
        fn tcp_host_is_assumed_reachable() {
            assert!(available_with_host(Some("tcp://127.0.0.1:2375".into())));
        }

        #[test]
        fn default_probe_path_executes() {
            let _ = available_with_host(None);
        }
    }
}
