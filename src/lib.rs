pub(crate) mod atomic;
pub mod config;
pub mod episode;
pub mod error;
pub mod feed;
pub mod history;
pub mod http;
pub mod lock;
pub mod progress;
pub mod provider;
pub mod schedule;
pub mod state;
pub mod sync;

// Re-export main types for convenience
pub use config::{Config, MainConfig, MissingAudioPolicy, Show};
pub use episode::{TranscodeOptions, generate_filename};
pub use error::{
    ConfigError, FeedError, FetchError, HistoryError, LockError, ProviderError, ScheduleError,
    StateError, SyncError,
};
pub use feed::{FeedDocument, build_feed};
pub use history::{EpisodeRecord, HistoryStore};
pub use http::{HttpClient, MediaResponse, ReqwestClient};
pub use lock::RunLock;
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use provider::{MediaProvider, PlaylistItem, YtDlpProvider};
pub use schedule::is_due;
pub use sync::{RunSummary, ShowReport, SyncOptions, sync_all, sync_show};
