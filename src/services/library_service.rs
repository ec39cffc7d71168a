use crate::errors::Result;
use crate::models::GameInstalled;
use crate::utils::file::FileManager;

pub const INSTALLED_FILE: &str = "gamesInstalled.json";

/// Registry of fully installed games, persisted as one JSON array in
/// `gamesInstalled.json`. The per-install local manifest remains the source
/// of truth; this file exists so the library view can list installs without
/// walking every install directory.
#[derive(Clone)]
pub struct LibraryService {
    files: FileManager,
}

impl LibraryService {
    pub fn new(files: FileManager) -> Self {
        Self { files }
    }

    pub fn installed(&self) -> Vec<GameInstalled> {
        match self.files.read_json::<Vec<GameInstalled>>(INSTALLED_FILE) {
            Ok(Some(entries)) => entries,
            Ok(None) => Vec::new(),
            Err(err) => {
                tracing::warn!("unreadable installed-games registry, starting empty: {}", err);
                Vec::new()
            }
        }
    }

    pub fn find(&self, game_id: i64) -> Option<GameInstalled> {
        self.installed()
            .into_iter()
            .find(|entry| entry.game_manifest.game_id == game_id)
    }

    /// Upsert keyed by game id.
    pub fn save_installed(&self, entry: GameInstalled) -> Result<()> {
        let mut entries = self.installed();
        entries.retain(|e| e.game_manifest.game_id != entry.game_manifest.game_id);
        entries.push(entry);
        self.files.write_json(INSTALLED_FILE, &entries)
    }

    pub fn remove_installed(&self, game_id: i64) -> Result<()> {
        let mut entries = self.installed();
        entries.retain(|e| e.game_manifest.game_id != game_id);
        self.files.write_json(INSTALLED_FILE, &entries)
    }
}
