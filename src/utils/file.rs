use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapOptions};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::Result;

/// Durable JSON key-value store scoped to the application-private data
/// directory, plus a handful of filesystem helpers. Every persisted file is
/// replaced atomically so no reader can observe a half-written document.
#[derive(Clone)]
pub struct FileManager {
    data_dir: PathBuf,
}

impl FileManager {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn entry_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    /// Write to a `.tmp` sibling, flush to disk, then rename over the target.
    pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
        let temp_path = path.with_extension("tmp");
        if let Some(parent) = temp_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&temp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        drop(file);
        fs::rename(temp_path, path)?;
        Ok(())
    }

    pub fn mmap_read(path: &Path) -> io::Result<Mmap> {
        let file = File::open(path)?;
        unsafe { MmapOptions::new().map(&file) }
    }

    /// Read a named JSON document. An absent file is `None`, not an error.
    pub fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let path = self.entry_path(name);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    pub fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_vec(value)?;
        Self::write_atomic(&self.entry_path(name), &raw)?;
        Ok(())
    }

    pub fn exists(&self, name: &str) -> bool {
        self.entry_path(name).exists()
    }

    /// Remove a named document; removing an absent one is a no-op.
    pub fn remove(&self, name: &str) -> Result<()> {
        let path = self.entry_path(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn dir_size(path: &Path) -> io::Result<u64> {
        let mut total = 0;
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if metadata.is_dir() {
                total += Self::dir_size(&entry.path())?;
            } else {
                total += metadata.len();
            }
        }
        Ok(total)
    }
}
