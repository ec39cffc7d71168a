use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use sysinfo::Disks;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::errors::{LauncherError, Result};
use crate::models::{
    ActiveTransfer, DownloadRecord, FileEntry, GameInstalled, LocalManifest, RateState,
    RemoteManifest,
};
use crate::services::{CatalogSource, DownloadTracker, LibraryService, ManifestService, RecordStore};
use crate::utils::format::bytes_to_size;

pub const EVENT_CHANNEL_CAPACITY: usize = 64;
const STORAGE_SAFETY_MARGIN_BYTES: u64 = 256 * 1024 * 1024;
const NOTIFY_TITLE: &str = "Galleon";

/// Lifecycle of one game install, serialized per game id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstallPhase {
    Diffing,
    Transferring,
    Paused,
    Verifying,
    Installed,
    Cancelled,
    Failed,
}

impl InstallPhase {
    fn is_terminal(self) -> bool {
        matches!(
            self,
            InstallPhase::Installed | InstallPhase::Cancelled | InstallPhase::Failed
        )
    }
}

/// Work order handed to the transfer executor: the exact file set to fetch
/// for one game, plus where the bytes live and where they land.
#[derive(Clone, Debug)]
pub struct TransferRequest {
    pub session_id: String,
    pub game_id: i64,
    pub bucket: String,
    pub remote_prefix: String,
    pub install_path: PathBuf,
    pub files: Vec<FileEntry>,
}

/// Events the executor reports back over the per-game channel. `Completed`
/// carries the manifest describing the finished file set and is treated as
/// logically last; anything arriving after it is discarded.
#[derive(Clone, Debug)]
pub enum TransferEvent {
    Progress {
        bytes_transferred: u64,
        speed_bps: i64,
        total_bytes: u64,
    },
    Completed {
        manifest: LocalManifest,
    },
    Failed {
        message: String,
    },
}

/// External byte-transfer capability. The engine decides *what* to move and
/// *when*; range requests, decompression and disk IO belong to the
/// implementor. Calls initiate or signal work and return immediately;
/// outcomes flow back through the event channel. Cancellation is
/// cooperative.
pub trait TransferExecutor: Send + Sync + 'static {
    fn transfer(
        &self,
        request: TransferRequest,
        events: mpsc::Sender<TransferEvent>,
    ) -> Result<()>;
    fn pause(&self, game_id: i64) -> Result<()>;
    fn resume(&self, game_id: i64) -> Result<()>;
    fn cancel(&self, game_id: i64) -> Result<()>;
    fn create_shortcut(&self, install_path: &Path) -> Result<()>;
    fn launch(&self, install_path: &Path) -> Result<()>;
}

/// User-visible notification delivery; OS plumbing lives in the shell.
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, title: &str, body: &str);
}

/// Fallback notifier writing to the log.
#[derive(Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) {
        tracing::info!(title, "{}", body);
    }
}

/// Everything `start` needs to know about one install or update.
#[derive(Clone, Debug)]
pub struct StartInstall {
    pub game_id: i64,
    pub user_id: i64,
    pub game_title: String,
    pub picture_url: Option<String>,
    pub install_path: PathBuf,
    pub bucket: String,
    pub remote_prefix: String,
    pub remote_manifest: RemoteManifest,
    pub game_binary_size: u64,
    pub desktop_shortcut: bool,
}

struct GameSlot {
    phase: InstallPhase,
    session_id: String,
    user_id: i64,
    install_path: PathBuf,
    updated_at: i64,
}

impl GameSlot {
    fn new(phase: InstallPhase, session_id: String, user_id: i64, install_path: PathBuf) -> Self {
        Self {
            phase,
            session_id,
            user_id,
            install_path,
            updated_at: chrono::Utc::now().timestamp(),
        }
    }
}

struct SessionContext {
    session_id: String,
    game_id: i64,
    user_id: i64,
    game_title: String,
    install_path: PathBuf,
    bucket: String,
    remote_prefix: String,
    desktop_shortcut: bool,
}

enum FinalizeOutcome {
    Committed,
    Requeued(mpsc::Receiver<TransferEvent>),
}

/// Orchestrates start → pause → resume → cancel → finalize per game.
/// All state transitions for one game flow through a single owner: the
/// spawned event-loop task consuming that game's bounded channel in order.
/// Different games transfer independently.
#[derive(Clone)]
pub struct InstallService {
    executor: Arc<dyn TransferExecutor>,
    catalog: Arc<dyn CatalogSource>,
    notifier: Arc<dyn Notifier>,
    manifests: ManifestService,
    tracker: DownloadTracker,
    records: RecordStore,
    library: LibraryService,
    registry: Arc<Mutex<HashMap<i64, GameSlot>>>,
}

impl InstallService {
    pub fn new(
        executor: Arc<dyn TransferExecutor>,
        catalog: Arc<dyn CatalogSource>,
        notifier: Arc<dyn Notifier>,
        manifests: ManifestService,
        tracker: DownloadTracker,
        records: RecordStore,
        library: LibraryService,
    ) -> Self {
        Self {
            executor,
            catalog,
            notifier,
            manifests,
            tracker,
            records,
            library,
            registry: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<i64, GameSlot>> {
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_phase(&self, game_id: i64, phase: InstallPhase) {
        if let Some(slot) = self.registry().get_mut(&game_id) {
            slot.phase = phase;
            slot.updated_at = chrono::Utc::now().timestamp();
        }
    }

    pub fn status(&self, game_id: i64) -> Option<InstallPhase> {
        self.registry().get(&game_id).map(|slot| slot.phase)
    }

    /// Current phase together with the unix timestamp of the last
    /// transition.
    pub fn last_transition(&self, game_id: i64) -> Option<(InstallPhase, i64)> {
        self.registry()
            .get(&game_id)
            .map(|slot| (slot.phase, slot.updated_at))
    }

    /// Begin installing or updating one game. A game already being worked on
    /// is not started twice: the call reports the existing phase and changes
    /// nothing. An empty fetch set short-circuits straight to `Installed`
    /// without involving the transfer executor.
    pub async fn start(&self, request: StartInstall) -> Result<InstallPhase> {
        let session_id = Uuid::new_v4().to_string();
        {
            let mut registry = self.registry();
            if let Some(slot) = registry.get(&request.game_id) {
                if !slot.phase.is_terminal() {
                    tracing::debug!("{}", LauncherError::ConcurrentStart(request.game_id));
                    return Ok(slot.phase);
                }
            }
            registry.insert(
                request.game_id,
                GameSlot::new(
                    InstallPhase::Diffing,
                    session_id.clone(),
                    request.user_id,
                    request.install_path.clone(),
                ),
            );
        }

        let game_id = request.game_id;
        match self.start_inner(request, session_id).await {
            Ok(phase) => Ok(phase),
            Err(err) => {
                // Leave persisted state as-is so a retry resumes from the
                // same point; only the in-memory slot is released.
                self.registry().remove(&game_id);
                Err(err)
            }
        }
    }

    async fn start_inner(&self, request: StartInstall, session_id: String) -> Result<InstallPhase> {
        let install_path_text = request.install_path.to_string_lossy().to_string();
        let local = self
            .manifests
            .read_local(&request.install_path)
            .await
            .unwrap_or_else(|| LocalManifest::fresh(&install_path_text, request.game_id));

        let to_fetch = self
            .manifests
            .files_to_fetch(&request.install_path, &local, &request.remote_manifest)
            .await;

        if to_fetch.is_empty() {
            // Already up to date: commit the remote version as local truth
            // and retire any stale tracking state.
            let manifest = LocalManifest {
                install_path: install_path_text,
                game_id: request.game_id,
                game_title: request.game_title.clone(),
                game_binary_size: request.game_binary_size,
                version: request.remote_manifest.version.clone(),
                files: request.remote_manifest.files.clone(),
            };
            self.manifests.write_local(&manifest)?;
            self.library.save_installed(GameInstalled {
                user_id: request.user_id,
                game_manifest: manifest,
            })?;
            self.tracker.remove(request.game_id, request.user_id);
            self.set_phase(request.game_id, InstallPhase::Installed);
            tracing::info!(game_id = request.game_id, "install already up to date");
            return Ok(InstallPhase::Installed);
        }

        let total_to_download: u64 = to_fetch.iter().map(|f| f.size).sum();

        if let Some(free) = available_disk_space(&request.install_path) {
            let needed = total_to_download + STORAGE_SAFETY_MARGIN_BYTES;
            if free < needed {
                return Err(LauncherError::Config(format!(
                    "not enough disk space for {}: need {}, only {} available",
                    request.game_title,
                    bytes_to_size(needed),
                    bytes_to_size(free)
                )));
            }
        }

        let record = DownloadRecord {
            user_id: request.user_id,
            install_path: request.install_path.to_string_lossy().to_string(),
            game_id: request.game_id,
            game_title: request.game_title.clone(),
            game_version: request.remote_manifest.version.clone(),
            total_size_to_download: total_to_download,
        };
        if let Err(err) = self.records.upsert(record) {
            // Resuming after a crash will not work, but the install itself
            // can still proceed.
            tracing::warn!(
                game_id = request.game_id,
                "failed to persist download record: {}",
                err
            );
        }

        let picture_url = match request.picture_url.clone() {
            Some(url) => url,
            None => match self.catalog.get_game_by_id(request.game_id).await {
                Ok(game) => game.picture_url,
                Err(err) => {
                    tracing::warn!(
                        game_id = request.game_id,
                        "catalog lookup failed, transfer continues without artwork: {}",
                        err
                    );
                    String::new()
                }
            },
        };

        self.tracker.start_or_replace(ActiveTransfer {
            install_path: request.install_path.to_string_lossy().to_string(),
            game_id: request.game_id,
            game_title: request.game_title.clone(),
            picture_url,
            is_playing: true,
            progress_percent: 0,
            bytes_transferred: 0,
            total_size_to_download: total_to_download,
            game_binary_size: request.game_binary_size,
            speed_bps: 0,
            eta_seconds: 0,
            rate: RateState::Unmeasured,
        });

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let context = SessionContext {
            session_id: session_id.clone(),
            game_id: request.game_id,
            user_id: request.user_id,
            game_title: request.game_title.clone(),
            install_path: request.install_path.clone(),
            bucket: request.bucket.clone(),
            remote_prefix: request.remote_prefix.clone(),
            desktop_shortcut: request.desktop_shortcut,
        };
        let service = self.clone();
        tokio::spawn(async move {
            service.run_event_loop(context, events_rx).await;
        });

        self.executor.transfer(
            TransferRequest {
                session_id,
                game_id: request.game_id,
                bucket: request.bucket,
                remote_prefix: request.remote_prefix,
                install_path: request.install_path,
                files: to_fetch,
            },
            events_tx,
        )?;

        self.set_phase(request.game_id, InstallPhase::Transferring);
        Ok(InstallPhase::Transferring)
    }

    /// Single owner of one game's event stream: applies progress in arrival
    /// order and drives verification and commit when the executor reports
    /// completion.
    async fn run_event_loop(
        &self,
        context: SessionContext,
        mut events: mpsc::Receiver<TransferEvent>,
    ) {
        while let Some(event) = events.recv().await {
            match event {
                TransferEvent::Progress {
                    bytes_transferred,
                    speed_bps,
                    total_bytes,
                } => {
                    self.tracker.record_progress(
                        context.game_id,
                        bytes_transferred,
                        speed_bps,
                        total_bytes,
                    );
                }
                TransferEvent::Completed { manifest } => {
                    match self.handle_completed(&context, manifest).await {
                        Ok(FinalizeOutcome::Committed) => return,
                        Ok(FinalizeOutcome::Requeued(new_events)) => {
                            events = new_events;
                        }
                        Err(err) => {
                            tracing::error!(
                                game_id = context.game_id,
                                "finalize failed: {}",
                                err
                            );
                            self.set_phase(context.game_id, InstallPhase::Failed);
                            self.notifier.notify(
                                NOTIFY_TITLE,
                                &format!("Installation of {} failed", context.game_title),
                            );
                            return;
                        }
                    }
                }
                TransferEvent::Failed { message } => {
                    tracing::error!(game_id = context.game_id, "transfer failed: {}", message);
                    // The download record stays: a transient failure must be
                    // resumable.
                    self.set_phase(context.game_id, InstallPhase::Failed);
                    self.notifier.notify(
                        NOTIFY_TITLE,
                        &format!("Installation of {} failed", context.game_title),
                    );
                    return;
                }
            }
        }

        if self.status(context.game_id) != Some(InstallPhase::Cancelled) {
            tracing::debug!(
                game_id = context.game_id,
                session_id = %context.session_id,
                "transfer channel closed without a terminal event"
            );
        }
    }

    async fn handle_completed(
        &self,
        context: &SessionContext,
        manifest: LocalManifest,
    ) -> Result<FinalizeOutcome> {
        self.set_phase(context.game_id, InstallPhase::Verifying);

        let verify_path = context.install_path.clone();
        let verify_manifest = manifest.clone();
        let offenders = tokio::task::spawn_blocking(move || {
            ManifestService::verify_files(&verify_path, &verify_manifest)
        })
        .await
        .map_err(|err| LauncherError::Config(format!("verification task failed: {}", err)))?;

        if !offenders.is_empty() {
            let err = LauncherError::IntegrityMismatch {
                game_id: context.game_id,
                files: offenders.iter().map(|f| f.name.clone()).collect(),
            };
            tracing::warn!("{}, re-queueing for transfer", err);

            let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
            self.executor.transfer(
                TransferRequest {
                    session_id: context.session_id.clone(),
                    game_id: context.game_id,
                    bucket: context.bucket.clone(),
                    remote_prefix: context.remote_prefix.clone(),
                    install_path: context.install_path.clone(),
                    files: offenders,
                },
                events_tx,
            )?;
            self.set_phase(context.game_id, InstallPhase::Transferring);
            return Ok(FinalizeOutcome::Requeued(events_rx));
        }

        // Every enumerated file is present and hash-verified: commit.
        self.manifests.write_local(&manifest)?;
        self.library.save_installed(GameInstalled {
            user_id: context.user_id,
            game_manifest: manifest.clone(),
        })?;
        if let Err(err) = self.records.remove(context.game_id, context.user_id) {
            tracing::warn!(
                game_id = context.game_id,
                "failed to remove download record after finalize: {}",
                err
            );
        }
        if let Err(err) = self.tracker.finalize(context.game_id).await {
            tracing::warn!(
                game_id = context.game_id,
                "tracker finalize failed: {}",
                err
            );
        }
        if context.desktop_shortcut {
            if let Err(err) = self.executor.create_shortcut(&context.install_path) {
                tracing::warn!(
                    game_id = context.game_id,
                    "desktop shortcut creation failed: {}",
                    err
                );
            }
        }

        self.set_phase(context.game_id, InstallPhase::Installed);
        self.notifier.notify(
            NOTIFY_TITLE,
            &format!("{} has been successfully installed", manifest.game_title),
        );
        tracing::info!(
            game_id = context.game_id,
            version = %manifest.version,
            "install finalized"
        );
        Ok(FinalizeOutcome::Committed)
    }

    /// Pause the byte transfer. Valid only while transferring; tracked
    /// progress survives the pause untouched.
    pub fn pause(&self, game_id: i64) -> Result<InstallPhase> {
        let phase = self
            .status(game_id)
            .ok_or_else(|| LauncherError::NotFound(format!("no install for game {}", game_id)))?;
        if phase != InstallPhase::Transferring {
            return Err(LauncherError::Config(format!(
                "cannot pause install in {:?} state",
                phase
            )));
        }
        self.executor.pause(game_id)?;
        self.set_phase(game_id, InstallPhase::Paused);
        Ok(InstallPhase::Paused)
    }

    pub fn resume(&self, game_id: i64) -> Result<InstallPhase> {
        let phase = self
            .status(game_id)
            .ok_or_else(|| LauncherError::NotFound(format!("no install for game {}", game_id)))?;
        if phase != InstallPhase::Paused {
            return Err(LauncherError::Config(format!(
                "cannot resume install in {:?} state",
                phase
            )));
        }
        self.executor.resume(game_id)?;
        self.set_phase(game_id, InstallPhase::Transferring);
        Ok(InstallPhase::Transferring)
    }

    /// Abort an install. Safe to call twice; a game neither slotted nor
    /// tracked is a no-op. The executor is signalled cooperatively and the
    /// cancellation is reported as successful even when cleanup of partial
    /// artifacts fails — those failures are logged, never surfaced.
    pub async fn cancel(&self, game_id: i64, user_id: i64, install_path: &Path) -> Result<()> {
        let slot_phase = self.status(game_id);
        let tracked = self
            .tracker
            .active()
            .iter()
            .any(|transfer| transfer.game_id == game_id);

        if slot_phase.is_none() && !tracked {
            tracing::debug!(game_id, "cancel for unmanaged game is a no-op");
            return Ok(());
        }
        if slot_phase == Some(InstallPhase::Cancelled) {
            return Ok(());
        }

        if let Err(err) = self.executor.cancel(game_id) {
            tracing::warn!(game_id, "executor cancel signal failed: {}", err);
        }
        self.registry().insert(
            game_id,
            GameSlot::new(
                InstallPhase::Cancelled,
                Uuid::new_v4().to_string(),
                user_id,
                install_path.to_path_buf(),
            ),
        );

        self.tracker.remove(game_id, user_id);
        if let Err(err) = self.library.remove_installed(game_id) {
            tracing::warn!(game_id, "failed to drop installed-registry entry: {}", err);
        }
        match tokio::fs::remove_dir_all(install_path).await {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(
                    game_id,
                    "failed to remove partial install at {}: {}",
                    install_path.display(),
                    err
                );
            }
        }
        Ok(())
    }

    /// Remove an installed game and every trace of it.
    pub async fn uninstall(&self, game_id: i64, user_id: i64, install_path: &Path) -> Result<()> {
        self.library.remove_installed(game_id)?;
        self.tracker.remove(game_id, user_id);
        self.registry().remove(&game_id);
        match tokio::fs::remove_dir_all(install_path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn launch_installed(&self, install_path: &Path) -> Result<()> {
        self.executor.launch(install_path)
    }
}

fn available_disk_space(path: &Path) -> Option<u64> {
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|disk| path.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| disk.available_space())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;

    use async_trait::async_trait;
    use sha2::{Digest, Sha256};

    use crate::models::Game;
    use crate::utils::file::FileManager;

    struct StubCatalog;

    #[async_trait]
    impl CatalogSource for StubCatalog {
        async fn get_game_by_id(&self, game_id: i64) -> Result<Game> {
            Ok(Game {
                id: game_id,
                title: format!("Game {}", game_id),
                picture_url: format!("https://cdn.example.com/{}.png", game_id),
                binary_size: 1000,
            })
        }
    }

    #[derive(Default)]
    struct MockExecutor {
        calls: Mutex<Vec<String>>,
        requests: Mutex<Vec<TransferRequest>>,
        senders: Mutex<Vec<mpsc::Sender<TransferEvent>>>,
    }

    impl MockExecutor {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls lock").clone()
        }

        fn transfer_count(&self) -> usize {
            self.requests.lock().expect("requests lock").len()
        }

        fn request(&self, index: usize) -> TransferRequest {
            self.requests.lock().expect("requests lock")[index].clone()
        }

        fn sender(&self, index: usize) -> mpsc::Sender<TransferEvent> {
            self.senders.lock().expect("senders lock")[index].clone()
        }
    }

    impl TransferExecutor for MockExecutor {
        fn transfer(
            &self,
            request: TransferRequest,
            events: mpsc::Sender<TransferEvent>,
        ) -> Result<()> {
            self.calls
                .lock()
                .expect("calls lock")
                .push(format!("transfer:{}", request.game_id));
            self.requests.lock().expect("requests lock").push(request);
            self.senders.lock().expect("senders lock").push(events);
            Ok(())
        }

        fn pause(&self, game_id: i64) -> Result<()> {
            self.calls
                .lock()
                .expect("calls lock")
                .push(format!("pause:{}", game_id));
            Ok(())
        }

        fn resume(&self, game_id: i64) -> Result<()> {
            self.calls
                .lock()
                .expect("calls lock")
                .push(format!("resume:{}", game_id));
            Ok(())
        }

        fn cancel(&self, game_id: i64) -> Result<()> {
            self.calls
                .lock()
                .expect("calls lock")
                .push(format!("cancel:{}", game_id));
            Ok(())
        }

        fn create_shortcut(&self, _install_path: &Path) -> Result<()> {
            self.calls
                .lock()
                .expect("calls lock")
                .push("shortcut".to_string());
            Ok(())
        }

        fn launch(&self, _install_path: &Path) -> Result<()> {
            self.calls
                .lock()
                .expect("calls lock")
                .push("launch".to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        messages: Mutex<Vec<String>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, _title: &str, body: &str) {
            self.messages
                .lock()
                .expect("messages lock")
                .push(body.to_string());
        }
    }

    struct Harness {
        service: InstallService,
        executor: Arc<MockExecutor>,
        notifier: Arc<RecordingNotifier>,
        records: RecordStore,
        library: LibraryService,
        tracker: DownloadTracker,
        manifests: ManifestService,
        install_dir: PathBuf,
    }

    fn harness() -> Harness {
        let tag = Uuid::new_v4();
        let data_dir = std::env::temp_dir().join(format!("galleon-install-data-{}", tag));
        let install_dir = std::env::temp_dir().join(format!("galleon-install-game-{}", tag));
        fs::create_dir_all(&data_dir).expect("create data dir");
        fs::create_dir_all(&install_dir).expect("create install dir");

        let files = FileManager::new(data_dir);
        let records = RecordStore::new(files.clone());
        let manifests = ManifestService::new();
        let catalog: Arc<dyn CatalogSource> = Arc::new(StubCatalog);
        let tracker = DownloadTracker::new(records.clone(), manifests.clone(), catalog.clone());
        let library = LibraryService::new(files);
        let executor = Arc::new(MockExecutor::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let service = InstallService::new(
            executor.clone(),
            catalog,
            notifier.clone(),
            manifests.clone(),
            tracker.clone(),
            records.clone(),
            library.clone(),
        );

        Harness {
            service,
            executor,
            notifier,
            records,
            library,
            tracker,
            manifests,
            install_dir,
        }
    }

    fn sha256_hex(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    fn entry_for(name: &str, contents: &[u8]) -> FileEntry {
        FileEntry {
            name: name.to_string(),
            hash: sha256_hex(contents),
            size: contents.len() as u64,
        }
    }

    fn start_request(harness: &Harness, files: Vec<FileEntry>) -> StartInstall {
        StartInstall {
            game_id: 7,
            user_id: 1,
            game_title: "Nebula Drift".to_string(),
            picture_url: Some("https://cdn.example.com/7.png".to_string()),
            install_path: harness.install_dir.clone(),
            bucket: "game-builds".to_string(),
            remote_prefix: "nebula/v1.1.0/".to_string(),
            remote_manifest: RemoteManifest {
                version: "v1.1.0".to_string(),
                files,
            },
            game_binary_size: 9,
            desktop_shortcut: true,
        }
    }

    fn finished_manifest(harness: &Harness, files: Vec<FileEntry>) -> LocalManifest {
        LocalManifest {
            install_path: harness.install_dir.to_string_lossy().to_string(),
            game_id: 7,
            game_title: "Nebula Drift".to_string(),
            game_binary_size: files.iter().map(|f| f.size).sum(),
            version: "v1.1.0".to_string(),
            files,
        }
    }

    async fn wait_for<F: Fn() -> bool>(what: &str, condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {}", what);
    }

    #[tokio::test]
    async fn fresh_install_transfers_verifies_and_finalizes() {
        let h = harness();
        let alpha = entry_for("a.bin", b"alpha");
        let beta = entry_for("b.bin", b"beta");

        let phase = h
            .service
            .start(start_request(&h, vec![alpha.clone(), beta.clone()]))
            .await
            .expect("start install");
        assert_eq!(phase, InstallPhase::Transferring);
        assert_eq!(h.executor.transfer_count(), 1);
        assert_eq!(h.records.for_user(1).len(), 1);
        assert_eq!(h.tracker.active().len(), 1);

        let sender = h.executor.sender(0);
        sender
            .send(TransferEvent::Progress {
                bytes_transferred: 5,
                speed_bps: 100,
                total_bytes: 9,
            })
            .await
            .expect("send progress");
        {
            let tracker = h.tracker.clone();
            wait_for("progress applied", move || {
                tracker
                    .active()
                    .first()
                    .map(|t| t.bytes_transferred == 5)
                    .unwrap_or(false)
            })
            .await;
        }

        fs::write(h.install_dir.join("a.bin"), b"alpha").expect("write a.bin");
        fs::write(h.install_dir.join("b.bin"), b"beta").expect("write b.bin");
        sender
            .send(TransferEvent::Completed {
                manifest: finished_manifest(&h, vec![alpha, beta]),
            })
            .await
            .expect("send completed");

        {
            let service = h.service.clone();
            wait_for("install finalized", move || {
                service.status(7) == Some(InstallPhase::Installed)
            })
            .await;
        }

        let committed = h
            .manifests
            .read_local(&h.install_dir)
            .await
            .expect("local manifest written");
        assert_eq!(committed.version, "v1.1.0");
        assert_eq!(committed.files.len(), 2);

        assert!(h.records.for_user(1).is_empty());
        assert!(h.tracker.active().is_empty());
        assert_eq!(h.tracker.completed().len(), 1);
        assert!(h.library.find(7).is_some());
        assert!(h.executor.calls().contains(&"shortcut".to_string()));
        let messages = h.notifier.messages.lock().expect("messages lock").clone();
        assert!(messages
            .iter()
            .any(|m| m.contains("successfully installed")));
    }

    #[tokio::test]
    async fn up_to_date_install_never_contacts_the_executor() {
        let h = harness();
        let alpha = entry_for("a.bin", b"alpha");
        fs::write(h.install_dir.join("a.bin"), b"alpha").expect("write a.bin");
        h.manifests
            .write_local(&finished_manifest(&h, vec![alpha.clone()]))
            .expect("write prior manifest");

        let phase = h
            .service
            .start(start_request(&h, vec![alpha]))
            .await
            .expect("start install");

        assert_eq!(phase, InstallPhase::Installed);
        assert_eq!(h.executor.transfer_count(), 0);
        assert!(h.library.find(7).is_some());
        assert!(h.records.for_user(1).is_empty());
    }

    #[tokio::test]
    async fn second_start_is_a_benign_no_op() {
        let h = harness();
        let alpha = entry_for("a.bin", b"alpha");

        let first = h
            .service
            .start(start_request(&h, vec![alpha.clone()]))
            .await
            .expect("first start");
        assert_eq!(first, InstallPhase::Transferring);

        let second = h
            .service
            .start(start_request(&h, vec![alpha]))
            .await
            .expect("second start");
        assert_eq!(second, InstallPhase::Transferring);
        assert_eq!(h.executor.transfer_count(), 1);
    }

    #[tokio::test]
    async fn pause_and_resume_gate_on_the_current_phase() {
        let h = harness();
        assert!(matches!(
            h.service.pause(7),
            Err(LauncherError::NotFound(_))
        ));

        h.service
            .start(start_request(&h, vec![entry_for("a.bin", b"alpha")]))
            .await
            .expect("start install");

        assert_eq!(h.service.pause(7).expect("pause"), InstallPhase::Paused);
        assert!(matches!(h.service.pause(7), Err(LauncherError::Config(_))));
        assert!(h.executor.calls().contains(&"pause:7".to_string()));
        let (phase, at) = h.service.last_transition(7).expect("transition recorded");
        assert_eq!(phase, InstallPhase::Paused);
        assert!(at > 0);

        assert_eq!(
            h.service.resume(7).expect("resume"),
            InstallPhase::Transferring
        );
        assert!(matches!(h.service.resume(7), Err(LauncherError::Config(_))));
        assert!(h.executor.calls().contains(&"resume:7".to_string()));
    }

    #[tokio::test]
    async fn cancel_cleans_up_and_is_idempotent() {
        let h = harness();
        h.service
            .start(start_request(&h, vec![entry_for("a.bin", b"alpha")]))
            .await
            .expect("start install");
        fs::write(h.install_dir.join("partial.bin"), b"partial").expect("write partial file");

        h.service
            .cancel(7, 1, &h.install_dir)
            .await
            .expect("cancel");
        assert_eq!(h.service.status(7), Some(InstallPhase::Cancelled));
        assert!(h.records.for_user(1).is_empty());
        assert!(h.tracker.active().is_empty());
        assert!(!h.install_dir.exists());
        assert!(h.executor.calls().contains(&"cancel:7".to_string()));

        h.service
            .cancel(7, 1, &h.install_dir)
            .await
            .expect("cancel twice");
        assert_eq!(h.service.status(7), Some(InstallPhase::Cancelled));
    }

    #[tokio::test]
    async fn cancel_for_unknown_game_is_a_no_op() {
        let h = harness();
        h.service
            .cancel(404, 1, &h.install_dir)
            .await
            .expect("cancel unknown");
        assert!(h.service.status(404).is_none());
        assert!(h.executor.calls().is_empty());
    }

    #[tokio::test]
    async fn integrity_mismatch_requeues_only_the_offending_files() {
        let h = harness();
        let alpha = entry_for("a.bin", b"alpha");
        let beta = entry_for("b.bin", b"beta");

        h.service
            .start(start_request(&h, vec![alpha.clone(), beta.clone()]))
            .await
            .expect("start install");

        // Executor claims completion, but one file landed corrupted.
        fs::write(h.install_dir.join("a.bin"), b"alpha").expect("write a.bin");
        fs::write(h.install_dir.join("b.bin"), b"bxta").expect("write corrupt b.bin");
        let manifest = finished_manifest(&h, vec![alpha.clone(), beta.clone()]);
        h.executor
            .sender(0)
            .send(TransferEvent::Completed {
                manifest: manifest.clone(),
            })
            .await
            .expect("send completed");

        {
            let executor = h.executor.clone();
            wait_for("offenders re-queued", move || executor.transfer_count() == 2).await;
        }
        let requeued = h.executor.request(1);
        assert_eq!(requeued.files, vec![beta]);
        assert_eq!(h.service.status(7), Some(InstallPhase::Transferring));
        assert!(
            h.manifests.read_local(&h.install_dir).await.is_none(),
            "a corrupt install must never be committed"
        );

        // The repaired bytes arrive over the fresh channel.
        fs::write(h.install_dir.join("b.bin"), b"beta").expect("repair b.bin");
        h.executor
            .sender(1)
            .send(TransferEvent::Completed { manifest })
            .await
            .expect("send completed again");

        {
            let service = h.service.clone();
            wait_for("install finalized after repair", move || {
                service.status(7) == Some(InstallPhase::Installed)
            })
            .await;
        }
        assert!(h.manifests.read_local(&h.install_dir).await.is_some());
    }

    #[tokio::test]
    async fn transfer_failure_keeps_the_resumable_record() {
        let h = harness();
        h.service
            .start(start_request(&h, vec![entry_for("a.bin", b"alpha")]))
            .await
            .expect("start install");

        h.executor
            .sender(0)
            .send(TransferEvent::Failed {
                message: "connection reset".to_string(),
            })
            .await
            .expect("send failure");

        {
            let service = h.service.clone();
            wait_for("failure observed", move || {
                service.status(7) == Some(InstallPhase::Failed)
            })
            .await;
        }
        assert_eq!(h.records.for_user(1).len(), 1);

        // A failed install can be started again.
        let phase = h
            .service
            .start(start_request(&h, vec![entry_for("a.bin", b"alpha")]))
            .await
            .expect("restart after failure");
        assert_eq!(phase, InstallPhase::Transferring);
        assert_eq!(h.executor.transfer_count(), 2);
    }

    #[tokio::test]
    async fn stale_progress_after_finalize_changes_nothing() {
        let h = harness();
        let alpha = entry_for("a.bin", b"alpha");

        h.service
            .start(start_request(&h, vec![alpha.clone()]))
            .await
            .expect("start install");
        fs::write(h.install_dir.join("a.bin"), b"alpha").expect("write a.bin");

        let sender = h.executor.sender(0);
        sender
            .send(TransferEvent::Completed {
                manifest: finished_manifest(&h, vec![alpha]),
            })
            .await
            .expect("send completed");
        {
            let service = h.service.clone();
            wait_for("install finalized", move || {
                service.status(7) == Some(InstallPhase::Installed)
            })
            .await;
        }

        // A straggler progress event for the finalized game is dropped.
        let _ = sender
            .send(TransferEvent::Progress {
                bytes_transferred: 3,
                speed_bps: 10,
                total_bytes: 5,
            })
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.tracker.active().is_empty());
        assert_eq!(h.tracker.completed().len(), 1);
    }

    #[tokio::test]
    async fn launch_delegates_to_the_executor() {
        let h = harness();
        h.service
            .launch_installed(&h.install_dir)
            .expect("launch installed game");
        assert!(h.executor.calls().contains(&"launch".to_string()));
    }
}
