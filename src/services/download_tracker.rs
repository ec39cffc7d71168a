use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::errors::Result;
use crate::models::{ActiveTransfer, CompletedTransfer, DownloadRecord, RateState};
use crate::services::{CatalogSource, ManifestService};
use crate::utils::file::FileManager;

pub const PROGRESS_FILE: &str = "gameProgressDownload.json";

/// Durable store for [`DownloadRecord`]s, persisted as one JSON array in
/// `gameProgressDownload.json`. Every mutation rewrites the full collection
/// so concurrent installs for different games never interleave partial
/// edits. Read failures degrade to an empty collection: a corrupt progress
/// file must never block new downloads.
#[derive(Clone)]
pub struct RecordStore {
    files: FileManager,
}

impl RecordStore {
    pub fn new(files: FileManager) -> Self {
        Self { files }
    }

    pub fn load_all(&self) -> Vec<DownloadRecord> {
        match self.files.read_json::<Vec<DownloadRecord>>(PROGRESS_FILE) {
            Ok(Some(records)) => records,
            Ok(None) => Vec::new(),
            Err(err) => {
                tracing::warn!("unreadable download progress file, starting empty: {}", err);
                Vec::new()
            }
        }
    }

    pub fn for_user(&self, user_id: i64) -> Vec<DownloadRecord> {
        self.load_all()
            .into_iter()
            .filter(|record| record.user_id == user_id)
            .collect()
    }

    /// Upsert keyed by (game, user): any previous record for the pair is
    /// replaced, never duplicated.
    pub fn upsert(&self, record: DownloadRecord) -> Result<()> {
        let mut records = self.load_all();
        records
            .retain(|r| !(r.game_id == record.game_id && r.user_id == record.user_id));
        records.push(record);
        self.files.write_json(PROGRESS_FILE, &records)
    }

    pub fn remove(&self, game_id: i64, user_id: i64) -> Result<()> {
        let mut records = self.load_all();
        records.retain(|r| !(r.game_id == game_id && r.user_id == user_id));
        self.files.write_json(PROGRESS_FILE, &records)
    }
}

#[derive(Default)]
struct TrackerState {
    active: HashMap<i64, ActiveTransfer>,
    completed: Vec<CompletedTransfer>,
}

/// Process-wide registry of in-flight installs. One instance is constructed
/// at startup and handed to whichever component needs it; there is no global
/// state. Converts raw byte-transfer events into normalized progress, speed
/// and ETA, and restores un-finalized transfers from disk after a restart.
#[derive(Clone)]
pub struct DownloadTracker {
    state: Arc<Mutex<TrackerState>>,
    records: RecordStore,
    manifests: ManifestService,
    catalog: Arc<dyn CatalogSource>,
}

impl DownloadTracker {
    pub fn new(
        records: RecordStore,
        manifests: ManifestService,
        catalog: Arc<dyn CatalogSource>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(TrackerState::default())),
            records,
            manifests,
            catalog,
        }
    }

    fn state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Idempotent upsert keyed by game id. A game entering the active set is
    /// evicted from the completed list so it never appears in both.
    pub fn start_or_replace(&self, transfer: ActiveTransfer) {
        let mut state = self.state();
        state.completed.retain(|c| c.game_id != transfer.game_id);
        state.active.insert(transfer.game_id, transfer);
    }

    /// Apply one progress event. Untracked ids are ignored: a late or
    /// duplicate event for an already-finalized transfer must never
    /// resurrect state. Progress is always recomputed from the byte
    /// counters; a non-positive speed degrades the telemetry to the
    /// stalled sentinel instead of freezing progress or dividing by zero.
    pub fn record_progress(
        &self,
        game_id: i64,
        bytes_transferred: u64,
        speed_bps: i64,
        total_size_to_download: u64,
    ) {
        let mut state = self.state();
        let Some(entry) = state.active.get_mut(&game_id) else {
            return;
        };

        let bytes = bytes_transferred.min(total_size_to_download);
        entry.bytes_transferred = bytes;
        entry.total_size_to_download = total_size_to_download;
        entry.progress_percent = percent(bytes, total_size_to_download);

        if speed_bps <= 0 {
            entry.rate = RateState::Stalled;
            entry.speed_bps = 0;
            entry.eta_seconds = 0;
        } else {
            entry.rate = RateState::Measured;
            entry.speed_bps = speed_bps as u64;
            entry.eta_seconds = total_size_to_download.saturating_sub(bytes) / speed_bps as u64;
        }
    }

    /// Retire the active entry and append a completed marker. Idempotent: an
    /// already-completed game returns its existing marker. When no active
    /// entry exists (e.g. the process restarted mid-finalize), the marker is
    /// synthesized from the catalog.
    pub async fn finalize(&self, game_id: i64) -> Result<CompletedTransfer> {
        {
            let mut state = self.state();
            if let Some(existing) = state.completed.iter().find(|c| c.game_id == game_id) {
                return Ok(existing.clone());
            }
            if let Some(active) = state.active.remove(&game_id) {
                let done = CompletedTransfer {
                    game_id,
                    game_title: active.game_title,
                    picture_url: active.picture_url,
                };
                state.completed.push(done.clone());
                return Ok(done);
            }
        }

        let game = self.catalog.get_game_by_id(game_id).await?;
        let done = CompletedTransfer {
            game_id,
            game_title: game.title,
            picture_url: game.picture_url,
        };

        let mut state = self.state();
        if let Some(existing) = state.completed.iter().find(|c| c.game_id == game_id) {
            return Ok(existing.clone());
        }
        state.active.remove(&game_id);
        state.completed.push(done.clone());
        Ok(done)
    }

    /// Drop the active entry and its durable record.
    pub fn remove(&self, game_id: i64, user_id: i64) {
        self.state().active.remove(&game_id);
        if let Err(err) = self.records.remove(game_id, user_id) {
            tracing::warn!(game_id, "failed to remove download record: {}", err);
        }
    }

    /// Rebuild active transfers from the durable records found on disk.
    /// Byte progress is re-derived from the sizes enumerated by the on-disk
    /// local manifest rather than any stale persisted counter. Restored
    /// entries carry no transfer executor, so they come back paused
    /// (`is_playing = false`) with an unmeasured rate until the UI resumes
    /// them.
    pub async fn load_persisted(&self, user_id: i64) -> Vec<ActiveTransfer> {
        let mut restored = Vec::new();
        for record in self.records.for_user(user_id) {
            let install_path = Path::new(&record.install_path);
            let Some(manifest) = self.manifests.read_local(install_path).await else {
                tracing::warn!(
                    game_id = record.game_id,
                    "skipping resumable download without a readable local manifest"
                );
                continue;
            };

            let bytes_on_disk: u64 = manifest.files.iter().map(|f| f.size).sum();
            let picture_url = match self.catalog.get_game_by_id(record.game_id).await {
                Ok(game) => game.picture_url,
                Err(err) => {
                    tracing::warn!(
                        game_id = record.game_id,
                        "catalog lookup failed while restoring download: {}",
                        err
                    );
                    String::new()
                }
            };

            let transfer = ActiveTransfer {
                install_path: record.install_path.clone(),
                game_id: manifest.game_id,
                game_title: manifest.game_title.clone(),
                picture_url,
                is_playing: false,
                progress_percent: percent(bytes_on_disk, manifest.game_binary_size),
                bytes_transferred: bytes_on_disk,
                total_size_to_download: record.total_size_to_download,
                game_binary_size: manifest.game_binary_size,
                speed_bps: 0,
                eta_seconds: 0,
                rate: RateState::Unmeasured,
            };
            self.start_or_replace(transfer.clone());
            restored.push(transfer);
        }
        restored
    }

    pub fn active(&self) -> Vec<ActiveTransfer> {
        let state = self.state();
        let mut transfers: Vec<ActiveTransfer> = state.active.values().cloned().collect();
        transfers.sort_by_key(|t| t.game_id);
        transfers
    }

    pub fn completed(&self) -> Vec<CompletedTransfer> {
        self.state().completed.clone()
    }
}

fn percent(bytes: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let ratio = (bytes as f64 / total as f64) * 100.0;
    (ratio.round() as u64).min(100) as u8
}
