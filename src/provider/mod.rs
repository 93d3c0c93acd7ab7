// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Playlist listing and media fetching capability.

mod ytdlp;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use url::Url;

use crate::episode::DownloadContext;
use crate::error::{FetchError, ProviderError};
use crate::progress::SharedProgressReporter;

pub use ytdlp::YtDlpProvider;

/// One entry of a playlist as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistItem {
    /// Provider-native id, unique within a playlist
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub published_at: DateTime<Utc>,
    /// Page the media is fetched from
    pub webpage_url: String,
}

/// Bound on how far back a playlist listing reads
///
/// Listing stops at the first entry published more than `days` ago, once at
/// least `min_items` entries have been collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingWindow {
    pub days: u32,
    pub min_items: usize,
}

/// A fetched and encoded item on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedAudio {
    /// Size of the encoded file
    pub bytes: u64,
    pub content_hash: Option<String>,
}

/// Source of playlist listings and media downloads
///
/// `fetch_item` must leave `dest` either absent or complete: on success the
/// encoded audio is at `dest`; on failure at most `*.partial` leftovers remain.
#[async_trait]
pub trait MediaProvider: Send + Sync {
    /// List the current items of a playlist, in provider order
    async fn list_playlist(&self, url: &Url) -> Result<Vec<PlaylistItem>, ProviderError>;

    /// Download and encode one item into `dest`
    async fn fetch_item(
        &self,
        item: &PlaylistItem,
        dest: &Path,
        context: &DownloadContext,
        reporter: &SharedProgressReporter,
    ) -> Result<FetchedAudio, FetchError>;
}
