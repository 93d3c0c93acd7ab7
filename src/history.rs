// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Durable record of processed playlist items, per show.
//!
//! The history is the single source of truth for "what has been fetched".
//! Records are append-only and the per-show last-check marker never moves
//! backwards. The file is plain pretty-printed JSON and is always replaced
//! atomically (write to a temporary sibling, then rename).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::atomic::write_atomically;
use crate::error::HistoryError;

/// One processed playlist item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    pub item_id: String,
    pub published_at: DateTime<Utc>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Audio filename relative to the show directory
    pub audio_filename: String,
    pub processed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

/// History partition owned by a single show
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowHistory {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check: Option<DateTime<Utc>>,
    /// Processed items keyed by item id
    #[serde(default)]
    pub episodes: BTreeMap<String, EpisodeRecord>,
}

/// Complete persisted history, keyed by show id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryState {
    #[serde(default)]
    pub shows: BTreeMap<String, ShowHistory>,
}

/// History state plus the file it is persisted to
///
/// An in-memory store (no backing file) behaves identically except that
/// [`HistoryStore::save`] is a no-op.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: Option<PathBuf>,
    state: HistoryState,
}

impl HistoryStore {
    /// Load the history from `path`; a missing file yields an empty history
    pub fn load(path: &Path) -> Result<Self, HistoryError> {
        let state = match std::fs::read_to_string(path) {
            Ok(content) => {
                serde_json::from_str(&content).map_err(|e| HistoryError::Corrupt {
                    path: path.to_path_buf(),
                    source: e,
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HistoryState::default(),
            Err(e) => {
                return Err(HistoryError::ReadFailed {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };

        Ok(Self {
            path: Some(path.to_path_buf()),
            state,
        })
    }

    /// Load the history, setting a corrupt file aside instead of failing
    ///
    /// The unreadable file is renamed to `<path>.corrupt` so nothing is lost;
    /// the returned store starts empty. Returns the backup path when a
    /// backup was made.
    pub fn load_or_set_aside(path: &Path) -> Result<(Self, Option<PathBuf>), HistoryError> {
        match Self::load(path) {
            Ok(store) => Ok((store, None)),
            Err(HistoryError::Corrupt { .. }) => {
                let mut backup = path.as_os_str().to_owned();
                backup.push(".corrupt");
                let backup = PathBuf::from(backup);

                std::fs::rename(path, &backup).map_err(|e| HistoryError::WriteFailed {
                    path: backup.clone(),
                    source: e,
                })?;

                let store = Self {
                    path: Some(path.to_path_buf()),
                    state: HistoryState::default(),
                };
                Ok((store, Some(backup)))
            }
            Err(e) => Err(e),
        }
    }

    /// Create a store that is never written to disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: HistoryState::default(),
        }
    }

    pub fn state(&self) -> &HistoryState {
        &self.state
    }

    pub fn show(&self, show_id: &str) -> Option<&ShowHistory> {
        self.state.shows.get(show_id)
    }

    pub fn is_processed(&self, show_id: &str, item_id: &str) -> bool {
        self.show(show_id)
            .is_some_and(|h| h.episodes.contains_key(item_id))
    }

    /// Add a record for `item_id`; recording an item twice is a logic error
    pub fn record_processed(
        &mut self,
        show_id: &str,
        item_id: &str,
        record: EpisodeRecord,
    ) -> Result<(), HistoryError> {
        let episodes = &mut self.state.shows.entry(show_id.to_string()).or_default().episodes;

        if episodes.contains_key(item_id) {
            return Err(HistoryError::DuplicateItem {
                show_id: show_id.to_string(),
                item_id: item_id.to_string(),
            });
        }

        episodes.insert(item_id.to_string(), record);
        Ok(())
    }

    /// Records of a show, in no particular order
    pub fn episodes(&self, show_id: &str) -> Vec<&EpisodeRecord> {
        self.show(show_id)
            .map(|h| h.episodes.values().collect())
            .unwrap_or_default()
    }

    pub fn last_check(&self, show_id: &str) -> Option<DateTime<Utc>> {
        self.show(show_id).and_then(|h| h.last_check)
    }

    /// Set the last-check marker; an earlier timestamp than the stored one is ignored
    pub fn set_last_check(&mut self, show_id: &str, timestamp: DateTime<Utc>) {
        let history = self.state.shows.entry(show_id.to_string()).or_default();
        history.last_check = Some(match history.last_check {
            Some(previous) if previous > timestamp => previous,
            _ => timestamp,
        });
    }

    /// Persist the full state atomically
    pub fn save(&self) -> Result<(), HistoryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let json = serde_json::to_string_pretty(&self.state)?;
        write_atomically(path, json.as_bytes()).map_err(|e| HistoryError::WriteFailed {
            path: path.clone(),
            source: e,
        })
    }
}
