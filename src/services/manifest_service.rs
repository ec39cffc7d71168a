use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::errors::Result;
use crate::models::{FileEntry, LocalManifest, RemoteManifest};
use crate::utils::file::FileManager;

pub const LOCAL_MANIFEST_FILE: &str = "manifest_local.json";

/// Local manifest IO plus the reconciliation logic deciding which files a
/// sync has to fetch.
#[derive(Clone, Default)]
pub struct ManifestService;

impl ManifestService {
    pub fn new() -> Self {
        Self
    }

    pub fn local_manifest_path(install_path: &Path) -> PathBuf {
        install_path.join(LOCAL_MANIFEST_FILE)
    }

    /// Read `manifest_local.json` from an install directory. An absent,
    /// unreadable or unparsable manifest is treated as "no prior
    /// installation" so the caller falls back to a full sync.
    pub async fn read_local(&self, install_path: &Path) -> Option<LocalManifest> {
        let path = Self::local_manifest_path(install_path);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::warn!(
                    "unreadable local manifest {}: {}",
                    path.display(),
                    err
                );
                return None;
            }
        };

        match serde_json::from_str::<LocalManifest>(&raw) {
            Ok(manifest) => Some(manifest),
            Err(err) => {
                tracing::warn!(
                    "corrupt local manifest {}, treating as fresh install: {}",
                    path.display(),
                    err
                );
                None
            }
        }
    }

    /// Atomically replace `manifest_local.json`. Only called once every file
    /// the manifest enumerates has been verified on disk.
    pub fn write_local(&self, manifest: &LocalManifest) -> Result<()> {
        let path = Self::local_manifest_path(Path::new(&manifest.install_path));
        let raw = serde_json::to_vec_pretty(manifest)?;
        FileManager::write_atomic(&path, &raw)?;
        Ok(())
    }

    /// Probe the install directory for files the local manifest declares but
    /// which are absent, unreadable or of the wrong size. Read-only.
    pub async fn probe_missing_files(
        &self,
        install_path: &Path,
        manifest: &LocalManifest,
    ) -> Vec<FileEntry> {
        let mut missing = Vec::new();
        for file in &manifest.files {
            let path = install_path.join(&file.name);
            match tokio::fs::metadata(&path).await {
                Ok(metadata) if metadata.is_file() && metadata.len() == file.size => {}
                Ok(_) => missing.push(file.clone()),
                Err(_) => missing.push(file.clone()),
            }
        }
        missing
    }

    /// Pure reconciliation: select every remote file whose hash differs from
    /// the trusted local hash, plus every file reported missing on disk
    /// (whose recorded local hash cannot be trusted). Result preserves remote
    /// manifest order and contains no duplicate names. Files present locally
    /// but absent from the remote manifest are left alone.
    pub fn compute_files_to_fetch(
        local: &LocalManifest,
        remote: &RemoteManifest,
        missing: &[FileEntry],
    ) -> Vec<FileEntry> {
        let missing_names: HashSet<&str> = missing.iter().map(|f| f.name.as_str()).collect();
        let local_index: HashMap<&str, &str> = local
            .files
            .iter()
            .filter(|f| !missing_names.contains(f.name.as_str()))
            .map(|f| (f.name.as_str(), f.hash.as_str()))
            .collect();

        let mut seen = HashSet::new();
        let mut to_fetch = Vec::new();
        for file in &remote.files {
            if !seen.insert(file.name.as_str()) {
                continue;
            }
            if missing_names.contains(file.name.as_str())
                || local_index.get(file.name.as_str()).copied() != Some(file.hash.as_str())
            {
                to_fetch.push(file.clone());
            }
        }
        to_fetch
    }

    /// Probe the disk, then reconcile against the remote manifest.
    pub async fn files_to_fetch(
        &self,
        install_path: &Path,
        local: &LocalManifest,
        remote: &RemoteManifest,
    ) -> Vec<FileEntry> {
        let missing = self.probe_missing_files(install_path, local).await;
        if !missing.is_empty() {
            tracing::info!(
                game_id = local.game_id,
                missing = missing.len(),
                "local files missing or damaged, scheduling refetch"
            );
        }
        Self::compute_files_to_fetch(local, remote, &missing)
    }

    /// SHA-256 verification of every file the manifest enumerates. Returns
    /// the offending entries (missing, unreadable or hash-mismatched).
    /// Blocking; run under `spawn_blocking`.
    pub fn verify_files(install_path: &Path, manifest: &LocalManifest) -> Vec<FileEntry> {
        let mut offenders = Vec::new();
        for file in &manifest.files {
            let path = install_path.join(&file.name);
            match hash_file_sha256(&path) {
                Ok(digest) if digest.eq_ignore_ascii_case(&file.hash) => {}
                Ok(_) => offenders.push(file.clone()),
                Err(err) => {
                    tracing::warn!(
                        "cannot hash {} during verification: {}",
                        path.display(),
                        err
                    );
                    offenders.push(file.clone());
                }
            }
        }
        offenders
    }
}

pub fn hash_file_sha256(path: &Path) -> io::Result<String> {
    let metadata = fs::metadata(path)?;
    let mut hasher = Sha256::new();
    if metadata.len() > 0 {
        let mmap = FileManager::mmap_read(path)?;
        hasher.update(&mmap[..]);
    }
    Ok(hex::encode(hasher.finalize()))
}
