//! Incremental install and update engine for the Galleon game launcher.
//!
//! Given the manifest of a previously installed game and the freshly
//! published remote manifest, the engine computes the minimal file set to
//! fetch, tracks transfer progress durably across process restarts, and
//! drives each installation to a verified, resumable, cancelable completion.
//! Byte transfer itself is delegated to an external
//! [`services::TransferExecutor`]; the launcher shell wires one in together
//! with its catalog client and notification sink.

pub mod errors;
pub mod logging;
pub mod models;
pub mod services;
pub mod utils;

pub use errors::{LauncherError, Result};
pub use models::{
    ActiveTransfer, CompletedTransfer, DownloadRecord, FileEntry, Game, GameInstalled,
    LocalManifest, RateState, RemoteManifest,
};
pub use services::{
    ApiClient, CatalogSource, CloudStorageService, DownloadTracker, GameService, InstallPhase,
    InstallService, LibraryService, LogNotifier, ManifestService, Notifier, RecordStore,
    StartInstall, TransferEvent, TransferExecutor, TransferRequest,
};
