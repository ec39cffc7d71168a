pub mod api_client;
pub mod download_tracker;
pub mod game_service;
pub mod install_service;
pub mod library_service;
pub mod manifest_service;
pub mod storage_service;

pub use api_client::ApiClient;
pub use download_tracker::{DownloadTracker, RecordStore};
pub use game_service::{CatalogSource, GameService};
pub use install_service::{
    InstallPhase, InstallService, LogNotifier, Notifier, StartInstall, TransferEvent,
    TransferExecutor, TransferRequest,
};
pub use library_service::LibraryService;
pub use manifest_service::ManifestService;
pub use storage_service::CloudStorageService;
