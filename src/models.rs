use serde::{Deserialize, Serialize};

use crate::utils::format::{format_remaining_time, format_speed};

/// One file of a game build. Identity is `name`; two entries describe the
/// same content exactly when their hashes match.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub hash: String,
    pub size: u64,
}

/// `manifest_local.json`, stored inside the install directory. Ground truth
/// for what is actually on disk for one installed game version. Fully
/// rewritten on every successful install or update, never patched in place.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocalManifest {
    #[serde(rename = "pathInstallLocation")]
    pub install_path: String,
    pub game_id: i64,
    pub game_title: String,
    pub game_binary_size: u64,
    pub version: String,
    pub files: Vec<FileEntry>,
}

impl LocalManifest {
    /// Stand-in manifest for a directory with no prior installation. Diffing
    /// against it selects every remote file.
    pub fn fresh(install_path: &str, game_id: i64) -> Self {
        Self {
            install_path: install_path.to_string(),
            game_id,
            game_title: String::new(),
            game_binary_size: 0,
            version: String::new(),
            files: Vec::new(),
        }
    }
}

/// `manifest.json` published per game in object storage. Read-only target
/// state for a sync.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteManifest {
    pub version: String,
    pub files: Vec<FileEntry>,
}

/// Durable progress-in-flight record, one per (user, game) pair, persisted
/// as an array in `gameProgressDownload.json`. This is the resumability
/// mechanism: its presence after a restart means the install never finalized.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRecord {
    pub user_id: i64,
    #[serde(rename = "pathInstallLocation")]
    pub install_path: String,
    pub game_id: i64,
    pub game_title: String,
    pub game_version: String,
    pub total_size_to_download: u64,
}

/// Entry of the `gamesInstalled.json` registry. The wire format keeps the
/// original snake_case `user_id` key.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct GameInstalled {
    pub user_id: i64,
    #[serde(rename = "gameManifest")]
    pub game_manifest: LocalManifest,
}

/// Throughput measurement state for an in-flight transfer. `Stalled` (the
/// executor reported non-positive throughput) and `Unmeasured` (no sample
/// yet, e.g. right after a restart) are distinct so the UI can render them
/// differently.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RateState {
    #[default]
    Unmeasured,
    Stalled,
    Measured,
}

/// In-memory view of an in-flight install: a [`DownloadRecord`] joined with
/// live transfer telemetry and catalog display fields. Rebuilt from the
/// persisted records on process start.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTransfer {
    #[serde(rename = "pathInstallLocation")]
    pub install_path: String,
    pub game_id: i64,
    pub game_title: String,
    pub picture_url: String,
    pub is_playing: bool,
    pub progress_percent: u8,
    pub bytes_transferred: u64,
    pub total_size_to_download: u64,
    pub game_binary_size: u64,
    pub speed_bps: u64,
    pub eta_seconds: u64,
    pub rate: RateState,
}

impl ActiveTransfer {
    pub fn speed_display(&self) -> String {
        match self.rate {
            RateState::Unmeasured => String::new(),
            _ => format_speed(self.speed_bps as f64),
        }
    }

    pub fn remaining_display(&self) -> String {
        match self.rate {
            RateState::Unmeasured => String::new(),
            _ => format_remaining_time(self.eta_seconds),
        }
    }
}

/// Terminal marker used only to render the "recently completed" list; the
/// local manifest is the real source of truth for "is installed".
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CompletedTransfer {
    pub game_id: i64,
    pub game_title: String,
    pub picture_url: String,
}

/// Catalog view of a game, as served by the REST API.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub picture_url: String,
    #[serde(default)]
    pub binary_size: u64,
}
