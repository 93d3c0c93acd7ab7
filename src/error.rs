// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading or validating the configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid base public URL '{url}': {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Bad show id '{0}' (must be alphanumeric)")]
    InvalidShowId(String),

    #[error("Show '{show_id}' has an invalid {field}: {reason}")]
    InvalidShowField {
        show_id: String,
        field: &'static str,
        reason: String,
    },

    #[error("No shows configured")]
    NoShows,

    #[error("Unknown show '{0}'")]
    UnknownShow(String),
}

/// Errors that can occur when loading, mutating or persisting the history file
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("History file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Item '{item_id}' is already recorded for show '{show_id}'")]
    DuplicateItem { show_id: String, item_id: String },

    #[error("Failed to read history file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write history file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize history: {0}")]
    SerializeFailed(#[from] serde_json::Error),
}

/// Errors produced by the cron-style schedule parser
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Invalid schedule '{expr}': {reason}")]
    InvalidSchedule { expr: String, reason: String },
}

/// Errors from listing a playlist (the provider is unavailable for this run)
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Failed to run {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Playlist {url} could not be listed: {reason}")]
    Unavailable { url: String, reason: String },
}

/// Errors that can occur while fetching and encoding a single playlist item
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Could not resolve an audio stream for {item_id}: {reason}")]
    ResolveFailed { item_id: String, reason: String },

    #[error("HTTP request failed for {url}: {source}")]
    HttpFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Stream error while downloading {url}: {source}")]
    StreamFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to write to file {path}: {source}")]
    FileWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to run {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Transcoding {path} failed: {stderr}")]
    TranscodeFailed { path: PathBuf, stderr: String },
}

/// Errors that can occur when rendering or writing a show's feed document
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Show '{show_id}' is missing required metadata: {field}")]
    MissingMetadata {
        show_id: String,
        field: &'static str,
    },

    #[error("Failed to build URL for '{path}': {source}")]
    InvalidUrl {
        path: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Failed to render feed: {0}")]
    RenderFailed(#[from] rss::Error),

    #[error("Failed to write feed file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur when scanning a show's output directory
#[derive(Error, Debug)]
pub enum StateError {
    #[error("Failed to read directory {path}: {source}")]
    ReadDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create directory {path}: {source}")]
    CreateDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the run-wide mutual exclusion guard
#[derive(Error, Debug)]
pub enum LockError {
    #[error("Failed to open lock file {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to lock {path}: {source}")]
    LockFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that abort the sync of one show
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("Provider unavailable: {0}")]
    Provider(#[from] ProviderError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("History error: {0}")]
    History(#[from] HistoryError),
}
