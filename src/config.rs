// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Configuration loading and validation.
//!
//! The configuration is a TOML file with a `[main]` table holding the
//! run-wide settings and one `[shows.<id>]` table per playlist.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use url::Url;

use crate::error::ConfigError;
use crate::provider::ListingWindow;

/// What the feed builder does with a recorded episode whose audio file is gone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingAudioPolicy {
    /// Leave the episode out of the feed
    #[default]
    Omit,
    /// Keep the episode, with an enclosure length of zero
    Keep,
}

/// Run-wide settings from the `[main]` table
#[derive(Debug, Clone)]
pub struct MainConfig {
    /// Public URL under which the podcast directory is served (always ends with `/`)
    pub base_public_url: Url,
    pub podcast_dir: PathBuf,
    pub history_file: PathBuf,
    /// Advance a show's last check even when every candidate failed to fetch
    pub advance_on_failure: bool,
    pub missing_audio: MissingAudioPolicy,
    /// Maximum number of parallel fetches within one show
    pub max_concurrent: usize,
    /// Stop listing at entries older than this many days; 0 lists everything
    pub listing_window_days: u32,
    /// Entries always listed before the window applies
    pub listing_min_items: usize,
    pub yt_dlp: String,
    pub ffmpeg: String,
    pub audio_bitrate: String,
}

impl MainConfig {
    /// How far back playlists are listed, if bounded
    pub fn listing_window(&self) -> Option<ListingWindow> {
        (self.listing_window_days > 0).then(|| ListingWindow {
            days: self.listing_window_days,
            min_items: self.listing_min_items,
        })
    }
}

/// One configured playlist-to-podcast mapping
#[derive(Debug, Clone)]
pub struct Show {
    pub id: String,
    pub title: String,
    pub description: String,
    pub url: Url,
    pub cron: String,
    /// Items published before this instant are never processed
    pub start_timestamp: DateTime<Utc>,
    pub image_url: Option<Url>,
    /// Lowercased title keywords; empty means "accept everything"
    pub filters: Vec<String>,
}

impl Show {
    /// Whether a title passes the show's keyword filters
    pub fn accepts_title(&self, title: &str) -> bool {
        if self.filters.is_empty() {
            return true;
        }
        let title = title.to_lowercase();
        self.filters.iter().any(|f| title.contains(f.as_str()))
    }
}

/// Fully validated configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub main: MainConfig,
    /// Shows ordered by id
    pub shows: Vec<Show>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    main: RawMain,
    #[serde(default)]
    shows: BTreeMap<String, RawShow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawMain {
    base_public_url: String,
    podcast_dir: PathBuf,
    history_file: PathBuf,
    #[serde(default = "default_true")]
    advance_on_failure: bool,
    #[serde(default)]
    missing_audio: MissingAudioPolicy,
    #[serde(default = "default_max_concurrent")]
    max_concurrent: usize,
    #[serde(default = "default_listing_window_days")]
    listing_window_days: u32,
    #[serde(default = "default_listing_min_items")]
    listing_min_items: usize,
    #[serde(default = "default_yt_dlp")]
    yt_dlp: String,
    #[serde(default = "default_ffmpeg")]
    ffmpeg: String,
    #[serde(default = "default_audio_bitrate")]
    audio_bitrate: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawShow {
    title: String,
    description: String,
    url: String,
    cron: String,
    start_timestamp: toml::value::Datetime,
    image_url: Option<String>,
    #[serde(default)]
    filters: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_max_concurrent() -> usize {
    1
}

fn default_listing_window_days() -> u32 {
    30
}

fn default_listing_min_items() -> usize {
    10
}

fn default_yt_dlp() -> String {
    "yt-dlp".to_string()
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_audio_bitrate() -> String {
    "128k".to_string()
}

impl Config {
    /// Read and validate the configuration file at `path`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content, path)
    }

    /// Parse and validate configuration text; `path` is only used in errors
    pub fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(content).map_err(|e| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        let main = validate_main(raw.main)?;

        if raw.shows.is_empty() {
            return Err(ConfigError::NoShows);
        }

        let shows = raw
            .shows
            .into_iter()
            .map(|(id, show)| validate_show(id, show))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { main, shows })
    }

    /// Restrict the configuration to a single show
    pub fn select_show(&mut self, show_id: &str) -> Result<(), ConfigError> {
        if !self.shows.iter().any(|s| s.id == show_id) {
            return Err(ConfigError::UnknownShow(show_id.to_string()));
        }
        self.shows.retain(|s| s.id == show_id);
        Ok(())
    }
}

fn validate_main(raw: RawMain) -> Result<MainConfig, ConfigError> {
    // Without a trailing slash Url::join would replace the last path segment
    let mut base = raw.base_public_url.clone();
    if !base.ends_with('/') {
        base.push('/');
    }
    let base_public_url = Url::parse(&base).map_err(|e| ConfigError::InvalidBaseUrl {
        url: raw.base_public_url,
        source: e,
    })?;

    Ok(MainConfig {
        base_public_url,
        podcast_dir: raw.podcast_dir,
        history_file: raw.history_file,
        advance_on_failure: raw.advance_on_failure,
        missing_audio: raw.missing_audio,
        max_concurrent: raw.max_concurrent.max(1),
        listing_window_days: raw.listing_window_days,
        listing_min_items: raw.listing_min_items,
        yt_dlp: raw.yt_dlp,
        ffmpeg: raw.ffmpeg,
        audio_bitrate: raw.audio_bitrate,
    })
}

fn validate_show(id: String, raw: RawShow) -> Result<Show, ConfigError> {
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ConfigError::InvalidShowId(id));
    }

    let invalid = |field: &'static str, reason: String| ConfigError::InvalidShowField {
        show_id: id.clone(),
        field,
        reason,
    };

    let url = Url::parse(&raw.url).map_err(|e| invalid("url", e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("url", format!("unsupported scheme '{}'", url.scheme())));
    }

    let image_url = raw
        .image_url
        .as_deref()
        .map(Url::parse)
        .transpose()
        .map_err(|e| invalid("image-url", e.to_string()))?;

    let start_timestamp = parse_start_timestamp(&raw.start_timestamp.to_string())
        .ok_or_else(|| invalid("start-timestamp", raw.start_timestamp.to_string()))?;

    if raw.title.trim().is_empty() {
        return Err(invalid("title", "must not be empty".to_string()));
    }

    Ok(Show {
        title: raw.title,
        description: raw.description,
        url,
        cron: raw.cron,
        start_timestamp,
        image_url,
        filters: raw.filters.iter().map(|f| f.to_lowercase()).collect(),
        id,
    })
}

/// Interpret a TOML date or datetime; values without an offset are UTC
fn parse_start_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    let naive_formats = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
    ];
    for format in naive_formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt.and_utc());
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
