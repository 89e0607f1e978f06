//! Service construction and background worker lifecycle.

use std::sync::Arc;

use chrono::Utc;
use teledrive_core::{BlobStore, RuntimeSettings, TorrentEngine};
use teledrive_data::{
    ChunkStore, DeleteFailureStore, HistoryStore, ItemStore, SessionStore, SettingsStore,
    TorrentStore,
};
use teledrive_files::{DeleteRetryWorker, FileService, TrashService, VaultService};
use teledrive_telemetry::{LoggingConfig, Metrics};
use teledrive_torrent::{
    SourceCleanupWorker, TaskFileUploader, TorrentClaimWorker, TorrentService,
};
use teledrive_transfer::{
    AdmissionGate, Downloader, GateKind, HistoryCleanupWorker, SessionSweeper, UploadManager,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};

/// Fully wired data-plane services.
///
/// The embedding HTTP layer builds one of these at startup and routes every
/// request through the services it exposes.
pub struct AppContext {
    /// Namespace item repository.
    pub items: ItemStore,
    /// Chunk repository.
    pub chunks: ChunkStore,
    /// Upload session repository.
    pub sessions: SessionStore,
    /// Transfer history repository.
    pub history: HistoryStore,
    /// Blob delete retry ledger repository.
    pub failures: DeleteFailureStore,
    /// Runtime settings repository.
    pub settings: SettingsStore,
    /// Torrent task repository.
    pub torrents: TorrentStore,
    /// Namespace façade.
    pub files: FileService,
    /// Trash lifecycle orchestrator.
    pub trash: TrashService,
    /// Vault unlock flow.
    pub vault: VaultService,
    /// Resumable upload manager.
    pub uploads: UploadManager,
    /// Download/stream assembler.
    pub downloads: Downloader,
    /// Torrent submission and control surface.
    pub torrent_service: TorrentService,
    /// Shared metrics registry.
    pub metrics: Metrics,
    /// Built-in settings defaults.
    pub defaults: RuntimeSettings,
    /// Static wiring configuration.
    pub config: AppConfig,
    blob: Arc<dyn BlobStore>,
    engine: Arc<dyn TorrentEngine>,
}

/// Handles and shutdown switch for the background workers.
pub struct WorkerSet {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerSet {
    /// Flip the shutdown switch and wait for every worker to exit.
    pub async fn shutdown(self) {
        let Self { shutdown, handles } = self;
        let _ = shutdown.send(true);
        for handle in handles {
            let _ = handle.await;
        }
        info!("background workers drained");
    }
}

impl AppContext {
    /// Install logging, connect to the database, run migrations, seed the
    /// settings singleton, and wire every service.
    ///
    /// # Errors
    ///
    /// Returns an [`AppError`] when telemetry installation, the database
    /// connection, or the migrations fail.
    pub async fn build(
        config: AppConfig,
        blob: Arc<dyn BlobStore>,
        engine: Arc<dyn TorrentEngine>,
    ) -> AppResult<Self> {
        let logging = LoggingConfig {
            format: config.log_format,
            ..LoggingConfig::default()
        };
        if teledrive_telemetry::init_logging(&logging).is_err() {
            // An embedding layer may have installed its own subscriber.
            tracing::debug!("tracing subscriber already installed");
        }

        let pool = teledrive_data::connect(&config.database_url)
            .await
            .map_err(|err| AppError::data("database.connect", err))?;
        teledrive_data::run_migrations(&pool)
            .await
            .map_err(|err| AppError::data("database.migrate", err))?;

        let metrics = Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
        let defaults = RuntimeSettings::defaults(Utc::now());

        let items = ItemStore::new(pool.clone());
        let chunks = ChunkStore::new(pool.clone());
        let sessions = SessionStore::new(pool.clone());
        let history = HistoryStore::new(pool.clone());
        let failures = DeleteFailureStore::new(pool.clone());
        let settings = SettingsStore::new(pool.clone());
        let torrents = TorrentStore::new(pool.clone());

        // Seed the singleton so the first reader does not race the first
        // patch.
        settings
            .get_or_init(&defaults)
            .await
            .map_err(|err| AppError::data("settings.init", err))?;

        let files = FileService::new(items.clone(), chunks.clone(), Arc::clone(&blob));
        let trash = TrashService::new(
            items.clone(),
            chunks.clone(),
            failures.clone(),
            Arc::clone(&blob),
            metrics.clone(),
        );
        let vault = VaultService::new(settings.clone(), defaults.clone());
        let upload_gate = AdmissionGate::new(settings.clone(), defaults.clone(), GateKind::Upload);
        let uploads = UploadManager::new(
            items.clone(),
            chunks.clone(),
            sessions.clone(),
            history.clone(),
            failures.clone(),
            settings.clone(),
            defaults.clone(),
            Arc::clone(&blob),
            upload_gate,
            metrics.clone(),
        );
        let downloads = Downloader::new(
            items.clone(),
            chunks.clone(),
            history.clone(),
            settings.clone(),
            defaults.clone(),
            Arc::clone(&blob),
            metrics.clone(),
        );
        let torrent_service = TorrentService::new(
            torrents.clone(),
            Arc::clone(&engine),
            config.torrent_dir.clone(),
        );

        info!("teledrive data plane wired");
        Ok(Self {
            items,
            chunks,
            sessions,
            history,
            failures,
            settings,
            torrents,
            files,
            trash,
            vault,
            uploads,
            downloads,
            torrent_service,
            metrics,
            defaults,
            config,
            blob,
            engine,
        })
    }

    /// Spawn the five background workers: session sweeper, blob delete
    /// retry, torrent claimer, torrent source cleanup, and history cleanup.
    #[must_use]
    pub fn spawn_workers(&self) -> WorkerSet {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles = Vec::new();

        let sweeper = SessionSweeper::new(
            self.sessions.clone(),
            self.chunks.clone(),
            self.items.clone(),
            self.failures.clone(),
            self.settings.clone(),
            self.defaults.clone(),
        );
        handles.push(sweeper.spawn(shutdown_rx.clone()));

        let retry = DeleteRetryWorker::new(
            self.failures.clone(),
            Arc::clone(&self.blob),
            self.metrics.clone(),
        );
        handles.push(retry.spawn(shutdown_rx.clone()));

        let uploader = TaskFileUploader::new(self.torrents.clone(), self.uploads.clone());
        let claimer = TorrentClaimWorker::new(
            self.torrents.clone(),
            self.settings.clone(),
            self.defaults.clone(),
            Arc::clone(&self.engine),
            uploader,
            self.metrics.clone(),
        );
        handles.push(claimer.spawn(shutdown_rx.clone()));

        let source_cleanup =
            SourceCleanupWorker::new(self.torrents.clone(), Arc::clone(&self.engine));
        handles.push(source_cleanup.spawn(shutdown_rx.clone()));

        let history_cleanup = HistoryCleanupWorker::new(self.history.clone());
        handles.push(history_cleanup.spawn(shutdown_rx));

        info!(workers = handles.len(), "background workers started");
        WorkerSet {
            shutdown: shutdown_tx,
            handles,
        }
    }

    /// Run the workers until the process receives ctrl-c, then drain them.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Telemetry`] when the signal handler cannot be
    /// installed.
    pub async fn run_until_shutdown(&self) -> AppResult<()> {
        let workers = self.spawn_workers();
        tokio::signal::ctrl_c()
            .await
            .map_err(|err| AppError::telemetry("signal.ctrl_c", anyhow::Error::from(err)))?;
        info!("shutdown signal received");
        workers.shutdown().await;
        Ok(())
    }
}
