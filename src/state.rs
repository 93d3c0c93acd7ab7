use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::config::Show;
use crate::error::StateError;
use crate::history::HistoryStore;
use crate::provider::PlaylistItem;

const PARTIAL_SUFFIX: &str = ".partial";

/// Audio inventory of a show directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputState {
    /// Sizes of complete audio files, keyed by filename
    pub audio_files: BTreeMap<String, u64>,
    /// Number of partial files that were cleaned up during scan
    pub partial_files_cleaned: usize,
}

impl OutputState {
    pub fn audio_size(&self, filename: &str) -> Option<u64> {
        self.audio_files.get(filename).copied()
    }
}

/// Which listed items a sync will fetch, and why the others are skipped
#[derive(Debug, Clone)]
pub struct SyncPlan {
    /// Items to fetch, oldest first
    pub to_fetch: Vec<PlaylistItem>,
    pub already_processed: usize,
    /// Items published before the show's start timestamp
    pub before_cutoff: usize,
    /// Items rejected by the show's title filters
    pub filtered_out: usize,
    /// Total number of items in the listing, duplicates included
    pub total_items: usize,
}

/// Scan a show directory, creating it when missing
///
/// Collects the size of every complete audio file and removes `.partial`
/// leftovers from interrupted fetches.
pub fn scan_show_dir(show_dir: &Path) -> Result<OutputState, StateError> {
    let mut state = OutputState::default();

    if !show_dir.exists() {
        std::fs::create_dir_all(show_dir).map_err(|e| StateError::CreateDirectoryFailed {
            path: show_dir.to_path_buf(),
            source: e,
        })?;
        return Ok(state);
    }

    let read_failed = |e: std::io::Error| StateError::ReadDirectoryFailed {
        path: show_dir.to_path_buf(),
        source: e,
    };

    for entry in std::fs::read_dir(show_dir).map_err(read_failed)? {
        let entry = entry.map_err(read_failed)?;
        let path = entry.path();
        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        if filename.ends_with(PARTIAL_SUFFIX) {
            if std::fs::remove_file(&path).is_ok() {
                state.partial_files_cleaned += 1;
            }
            continue;
        }

        if filename.ends_with(".mp3") {
            let metadata = entry.metadata().map_err(read_failed)?;
            if metadata.is_file() {
                state.audio_files.insert(filename.to_string(), metadata.len());
            }
        }
    }

    Ok(state)
}

/// Diff a playlist listing against the show's history
///
/// Candidates are items that pass the title filters, are not older than the
/// show's start timestamp and have not been processed yet. They are ordered
/// oldest to newest, independent of the provider's listing order.
pub fn create_sync_plan(items: Vec<PlaylistItem>, show: &Show, history: &HistoryStore) -> SyncPlan {
    let total_items = items.len();
    let mut seen = HashSet::new();
    let mut to_fetch = Vec::new();
    let mut already_processed = 0;
    let mut before_cutoff = 0;
    let mut filtered_out = 0;

    for item in items {
        if !seen.insert(item.id.clone()) {
            continue;
        }

        if item.published_at < show.start_timestamp {
            before_cutoff += 1;
        } else if history.is_processed(&show.id, &item.id) {
            already_processed += 1;
        } else if !show.accepts_title(&item.title) {
            filtered_out += 1;
        } else {
            to_fetch.push(item);
        }
    }

    to_fetch.sort_by(|a, b| a.published_at.cmp(&b.published_at));

    SyncPlan {
        to_fetch,
        already_processed,
        before_cutoff,
        filtered_out,
        total_items,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::history::EpisodeRecord;
    use chrono::{DateTime, TimeZone, Utc};
    use tempfile::tempdir;
    use url::Url;

    pub(crate) fn make_show(id: &str, start: DateTime<Utc>) -> Show {
        Show {
            id: id.to_string(),
            title: format!("Show {id}"),
            description: "A test show".to_string(),
            url: Url::parse("https://www.youtube.com/playlist?list=PL1").unwrap(),
            cron: "0 * * * *".to_string(),
            start_timestamp: start,
            image_url: Some(Url::parse("https://example.com/cover.png").unwrap()),
            filters: vec![],
        }
    }

    pub(crate) fn make_item(id: &str, day: u32) -> PlaylistItem {
        PlaylistItem {
            id: id.to_string(),
            title: format!("Video {id}"),
            description: None,
            published_at: Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap(),
            webpage_url: format!("https://www.youtube.com/watch?v={id}"),
        }
    }

    fn jan(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn scan_creates_nonexistent_dir() {
        let dir = tempdir().unwrap();
        let show_dir = dir.path().join("s1");

        let state = scan_show_dir(&show_dir).unwrap();
        assert!(show_dir.is_dir());
        assert!(state.audio_files.is_empty());
    }

    #[test]
    fn scan_collects_audio_sizes_and_ignores_other_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("2024-01-01-a.mp3"), b"12345").unwrap();
        std::fs::write(dir.path().join("feed.xml"), b"<rss/>").unwrap();

        let state = scan_show_dir(dir.path()).unwrap();
        assert_eq!(state.audio_size("2024-01-01-a.mp3"), Some(5));
        assert_eq!(state.audio_files.len(), 1);
    }

    #[test]
    fn scan_cleans_up_partial_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("2024-01-01-a.mp3.partial"), b"x").unwrap();
        std::fs::write(dir.path().join("2024-01-01-a.mp3.source.partial"), b"y").unwrap();
        std::fs::write(dir.path().join("2024-01-02-b.mp3"), b"complete").unwrap();

        let state = scan_show_dir(dir.path()).unwrap();

        assert_eq!(state.partial_files_cleaned, 2);
        assert!(!dir.path().join("2024-01-01-a.mp3.partial").exists());
        assert!(!dir.path().join("2024-01-01-a.mp3.source.partial").exists());
        assert!(dir.path().join("2024-01-02-b.mp3").exists());
        assert_eq!(state.audio_files.len(), 1);
    }

    #[test]
    fn plan_orders_candidates_oldest_first() {
        let show = make_show("s1", jan(1));
        let history = HistoryStore::in_memory();
        let items = vec![make_item("c", 3), make_item("a", 1), make_item("b", 2)];

        let plan = create_sync_plan(items, &show, &history);
        let ids: Vec<_> = plan.to_fetch.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(plan.total_items, 3);
    }

    #[test]
    fn plan_drops_items_before_cutoff() {
        let show = make_show("s1", jan(10));
        let history = HistoryStore::in_memory();
        let items = vec![make_item("new", 12), make_item("old", 9), make_item("edge", 10)];

        let plan = create_sync_plan(items, &show, &history);
        let ids: Vec<_> = plan.to_fetch.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["edge", "new"]);
        assert_eq!(plan.before_cutoff, 1);
    }

    #[test]
    fn plan_skips_processed_items() {
        let show = make_show("s1", jan(1));
        let mut history = HistoryStore::in_memory();
        let done = make_item("done", 2);
        history
            .record_processed(
                "s1",
                "done",
                EpisodeRecord {
                    item_id: done.id.clone(),
                    published_at: done.published_at,
                    title: done.title.clone(),
                    description: None,
                    audio_filename: "2024-01-02-done.mp3".to_string(),
                    processed_at: jan(3),
                    content_hash: None,
                },
            )
            .unwrap();

        let plan = create_sync_plan(vec![done, make_item("fresh", 4)], &show, &history);
        assert_eq!(plan.to_fetch.len(), 1);
        assert_eq!(plan.to_fetch[0].id, "fresh");
        assert_eq!(plan.already_processed, 1);
    }

    #[test]
    fn plan_applies_title_filters() {
        let mut show = make_show("s1", jan(1));
        show.filters = vec!["keynote".to_string()];
        let history = HistoryStore::in_memory();
        let mut keynote = make_item("k", 2);
        keynote.title = "Opening Keynote".to_string();

        let plan = create_sync_plan(vec![keynote, make_item("x", 3)], &show, &history);
        assert_eq!(plan.to_fetch.len(), 1);
        assert_eq!(plan.to_fetch[0].id, "k");
        assert_eq!(plan.filtered_out, 1);
    }

    #[test]
    fn plan_ignores_duplicate_listing_entries() {
        let show = make_show("s1", jan(1));
        let history = HistoryStore::in_memory();
        let items = vec![make_item("a", 2), make_item("a", 2)];

        let plan = create_sync_plan(items, &show, &history);
        assert_eq!(plan.to_fetch.len(), 1);
        assert_eq!(plan.total_items, 2);
    }
}
