// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use tracing::{debug, info, warn};

use crate::config::{Config, MainConfig, Show};
use crate::episode::{DownloadContext, generate_filename};
use crate::error::{FeedError, HistoryError, SyncError};
use crate::feed::{FeedDocument, build_feed, write_feed};
use crate::history::{EpisodeRecord, HistoryStore};
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::provider::MediaProvider;
use crate::schedule;
use crate::state::{OutputState, create_sync_plan, scan_show_dir};

/// Options for a sync run
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Check every show regardless of its schedule
    pub force: bool,
}

/// Outcome of one show in a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShowReport {
    /// The schedule did not elapse since the last check; nothing was touched
    NotDue,
    /// The playlist was checked
    Synced {
        /// Number of newly recorded episodes
        added: usize,
        /// Items that could not be fetched (item id, error message)
        failed: Vec<(String, String)>,
        /// Set when the feed document could not be regenerated
        feed_error: Option<String>,
    },
    /// The show could not be checked this run
    Failed { error: String },
}

/// Per-show outcomes of a run, in configuration order
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub shows: Vec<(String, ShowReport)>,
}

impl RunSummary {
    pub fn added(&self) -> usize {
        self.shows
            .iter()
            .map(|(_, report)| match report {
                ShowReport::Synced { added, .. } => *added,
                _ => 0,
            })
            .sum()
    }

    /// Whether any show, item or feed failed
    pub fn has_failures(&self) -> bool {
        self.shows.iter().any(|(_, report)| match report {
            ShowReport::NotDue => false,
            ShowReport::Synced {
                failed, feed_error, ..
            } => !failed.is_empty() || feed_error.is_some(),
            ShowReport::Failed { .. } => true,
        })
    }

    pub fn report(&self, show_id: &str) -> Option<&ShowReport> {
        self.shows
            .iter()
            .find(|(id, _)| id == show_id)
            .map(|(_, report)| report)
    }
}

/// Sync every configured show, one after the other
///
/// Failures are isolated per show. Only a history write failure aborts the
/// run, since continuing would fetch items that can no longer be recorded.
pub async fn sync_all<P: MediaProvider + ?Sized>(
    config: &Config,
    provider: &P,
    history: &mut HistoryStore,
    now: DateTime<Utc>,
    options: &SyncOptions,
    reporter: &SharedProgressReporter,
) -> Result<RunSummary, HistoryError> {
    let mut summary = RunSummary::default();

    for show in &config.shows {
        let report = sync_show(provider, history, show, &config.main, now, options, reporter).await?;
        summary.shows.push((show.id.clone(), report));
    }

    Ok(summary)
}

/// Sync a single show
///
/// 1. Checks the schedule (skipped when forced)
/// 2. Lists the playlist
/// 3. Diffs it against the history
/// 4. Fetches new items, recording each success immediately
/// 5. Advances the last check, regenerates the feed and persists the history
pub async fn sync_show<P: MediaProvider + ?Sized>(
    provider: &P,
    history: &mut HistoryStore,
    show: &Show,
    main: &MainConfig,
    now: DateTime<Utc>,
    options: &SyncOptions,
    reporter: &SharedProgressReporter,
) -> Result<ShowReport, HistoryError> {
    reporter.report(ProgressEvent::ShowStarted {
        show_id: show.id.clone(),
        title: show.title.clone(),
    });

    match run_show(provider, history, show, main, now, options, reporter).await {
        Ok(report) => Ok(report),
        Err(SyncError::History(e)) => Err(e),
        Err(e) => {
            warn!(show_id = %show.id, error = %e, "Show skipped for this run");
            reporter.report(ProgressEvent::ShowFailed {
                show_id: show.id.clone(),
                error: e.to_string(),
            });
            Ok(ShowReport::Failed {
                error: e.to_string(),
            })
        }
    }
}

async fn run_show<P: MediaProvider + ?Sized>(
    provider: &P,
    history: &mut HistoryStore,
    show: &Show,
    main: &MainConfig,
    now: DateTime<Utc>,
    options: &SyncOptions,
    reporter: &SharedProgressReporter,
) -> Result<ShowReport, SyncError> {
    if !options.force && !schedule::is_due(&show.cron, history.last_check(&show.id), now)? {
        debug!(show_id = %show.id, "Not due");
        reporter.report(ProgressEvent::ShowNotDue {
            show_id: show.id.clone(),
        });
        return Ok(ShowReport::NotDue);
    }

    reporter.report(ProgressEvent::ListingPlaylist {
        show_id: show.id.clone(),
        url: show.url.to_string(),
    });
    let items = provider.list_playlist(&show.url).await?;

    let show_dir = main.podcast_dir.join(&show.id);
    let mut inventory = scan_show_dir(&show_dir)?;
    if inventory.partial_files_cleaned > 0 {
        reporter.report(ProgressEvent::PartialFilesCleanedUp {
            show_id: show.id.clone(),
            count: inventory.partial_files_cleaned,
        });
    }

    let plan = create_sync_plan(items, show, history);
    info!(
        show_id = %show.id,
        listed = plan.total_items,
        processed = plan.already_processed,
        before_cutoff = plan.before_cutoff,
        filtered = plan.filtered_out,
        candidates = plan.to_fetch.len(),
        "Playlist diffed against history"
    );
    reporter.report(ProgressEvent::PlanReady {
        show_id: show.id.clone(),
        listed: plan.total_items,
        already_processed: plan.already_processed,
        to_fetch: plan.to_fetch.len(),
    });

    let total_to_fetch = plan.to_fetch.len();
    let slots = main.max_concurrent.max(1);

    // buffered() keeps at most `slots` consecutive items in flight and yields
    // them in order, so `index % slots` is unique among running fetches
    let mut fetches = stream::iter(plan.to_fetch.into_iter().enumerate())
        .map(|(index, item)| {
            let filename = generate_filename(&item.id, &item.published_at);
            let dest = show_dir.join(&filename);
            let context = DownloadContext {
                download_id: index % slots,
                episode_index: index,
                total_to_fetch,
                episode_title: item.title.clone(),
            };
            async move {
                let result = provider.fetch_item(&item, &dest, &context, reporter).await;
                (item, filename, context, result)
            }
        })
        .buffered(slots);

    let mut added = 0;
    let mut failed = Vec::new();

    while let Some((item, filename, context, result)) = fetches.next().await {
        match result {
            Ok(fetched) => {
                let record = EpisodeRecord {
                    item_id: item.id.clone(),
                    published_at: item.published_at,
                    title: item.title.clone(),
                    description: item.description.clone(),
                    audio_filename: filename.clone(),
                    processed_at: now,
                    content_hash: fetched.content_hash,
                };
                history.record_processed(&show.id, &item.id, record)?;
                history.save()?;

                inventory.audio_files.insert(filename, fetched.bytes);
                added += 1;

                info!(show_id = %show.id, item_id = %item.id, bytes = fetched.bytes, "Episode recorded");
                reporter.report(ProgressEvent::FetchCompleted {
                    download_id: context.download_id,
                    episode_title: item.title,
                    bytes: fetched.bytes,
                });
            }
            Err(e) => {
                warn!(show_id = %show.id, item_id = %item.id, error = %e, "Fetch failed, will retry next run");
                reporter.report(ProgressEvent::FetchFailed {
                    download_id: context.download_id,
                    episode_title: item.title,
                    error: e.to_string(),
                });
                failed.push((item.id, e.to_string()));
            }
        }
    }

    let all_failed = added == 0 && !failed.is_empty();
    if main.advance_on_failure || !all_failed {
        history.set_last_check(&show.id, now);
    } else {
        warn!(show_id = %show.id, "Every fetch failed, last check not advanced");
    }

    let feed_error = match rebuild_feed(show, main, history, &inventory, &show_dir) {
        Ok(document) => {
            reporter.report(ProgressEvent::FeedWritten {
                show_id: show.id.clone(),
                episodes: document.entries,
                missing_audio: document.missing_audio.len(),
            });
            None
        }
        Err(e) => {
            warn!(show_id = %show.id, error = %e, "Feed not regenerated");
            Some(e.to_string())
        }
    };

    history.save()?;

    reporter.report(ProgressEvent::ShowCompleted {
        show_id: show.id.clone(),
        added,
        failed: failed.len(),
    });

    Ok(ShowReport::Synced {
        added,
        failed,
        feed_error,
    })
}

fn rebuild_feed(
    show: &Show,
    main: &MainConfig,
    history: &HistoryStore,
    inventory: &OutputState,
    show_dir: &Path,
) -> Result<FeedDocument, FeedError> {
    let episodes = history.episodes(&show.id);
    let document = build_feed(
        show,
        &main.base_public_url,
        &episodes,
        inventory,
        main.missing_audio,
    )?;

    let path = write_feed(show_dir, &document)?;
    debug!(show_id = %show.id, path = %path.display(), entries = document.entries, "Feed written");
    Ok(document)
}
