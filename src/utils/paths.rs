use std::path::{Path, PathBuf};

fn ensure_dir(path: &Path) -> Option<PathBuf> {
    if path.as_os_str().is_empty() {
        return None;
    }
    if std::fs::create_dir_all(path).is_ok() {
        return Some(path.to_path_buf());
    }
    None
}

fn is_portable_root(path: &Path) -> bool {
    path.join("portable.config.json").exists()
}

fn platform_app_data_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|base| PathBuf::from(base).join("galleon"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        if let Some(base) = std::env::var_os("XDG_DATA_HOME") {
            return Some(PathBuf::from(base).join("galleon"));
        }
        std::env::var_os("HOME").map(|home| {
            PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("galleon")
        })
    }
}

pub fn resolve_root_dir() -> PathBuf {
    if let Ok(value) = std::env::var("GALLEON_ROOT_DIR") {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            let path = PathBuf::from(trimmed);
            if let Some(dir) = ensure_dir(&path) {
                return dir;
            }
        }
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if is_portable_root(dir) {
                return dir.to_path_buf();
            }
        }
    }

    if let Some(app_data) = platform_app_data_dir() {
        if let Some(found) = ensure_dir(&app_data) {
            return found;
        }
    }

    PathBuf::from(".")
}

pub fn resolve_data_dir() -> PathBuf {
    let root = resolve_root_dir();
    let config = root.join("config");
    if let Some(dir) = ensure_dir(&config) {
        return dir;
    }
    root
}

pub fn resolve_log_dir() -> PathBuf {
    if let Ok(value) = std::env::var("GALLEON_LOG_DIR") {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            let path = PathBuf::from(trimmed);
            if let Some(dir) = ensure_dir(&path) {
                return dir;
            }
        }
    }

    let root = resolve_root_dir();
    let root_logs = root.join("logs");
    if let Some(found) = ensure_dir(&root_logs) {
        return found;
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let candidate = dir.join("logs");
            if let Some(found) = ensure_dir(&candidate) {
                return found;
            }
        }
    }

    PathBuf::from("logs")
}
