use std::sync::Arc;

/// Events emitted during a sync run for progress reporting
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A show is about to be processed
    ShowStarted { show_id: String, title: String },

    /// The show's schedule has not elapsed since its last check
    ShowNotDue { show_id: String },

    /// The playlist is being listed
    ListingPlaylist { show_id: String, url: String },

    /// Leftover partial files were removed from the show directory
    PartialFilesCleanedUp { show_id: String, count: usize },

    /// The playlist was diffed against history
    PlanReady {
        show_id: String,
        listed: usize,
        already_processed: usize,
        to_fetch: usize,
    },

    /// A fetch is starting
    FetchStarting {
        /// Identifies the fetch within the show
        download_id: usize,
        episode_title: String,
        /// Index of this item in the fetch queue
        episode_index: usize,
        total_to_fetch: usize,
        /// Expected size of the source stream, if known
        content_length: Option<u64>,
    },

    /// Source stream download progress
    FetchProgress {
        download_id: usize,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
    },

    /// The source stream is downloaded and is being re-encoded
    Transcoding { download_id: usize },

    /// An item was fetched and recorded
    FetchCompleted {
        download_id: usize,
        episode_title: String,
        bytes: u64,
    },

    /// An item could not be fetched; it will be retried next run
    FetchFailed {
        download_id: usize,
        episode_title: String,
        error: String,
    },

    /// The show's feed document was regenerated
    FeedWritten {
        show_id: String,
        episodes: usize,
        /// Recorded episodes whose audio file was not on disk
        missing_audio: usize,
    },

    /// The show could not be synced this run
    ShowFailed { show_id: String, error: String },

    /// The show finished syncing
    ShowCompleted {
        show_id: String,
        added: usize,
        failed: usize,
    },
}

/// Trait for reporting progress events during a sync run.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {}
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}
