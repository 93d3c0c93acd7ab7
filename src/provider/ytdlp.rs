// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::ffi::OsString;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output, Stdio};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};
use url::Url;

use super::{FetchedAudio, ListingWindow, MediaProvider, PlaylistItem};
use crate::episode::{DownloadContext, TranscodeOptions, download_stream, transcode_to_mp3};
use crate::error::{FetchError, ProviderError};
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, SharedProgressReporter};

/// Prefer m4a so the direct stream is plain audio
const AUDIO_FORMAT: &str = "bestaudio[ext=m4a]/bestaudio";

const LISTING_ARGS: [&str; 4] = [
    "--skip-download",
    "--dump-json",
    "--ignore-errors",
    "--no-warnings",
];

/// Fields of a `yt-dlp --dump-json` line we care about
#[derive(Debug, Deserialize)]
struct RawEntry {
    id: String,
    title: Option<String>,
    description: Option<String>,
    timestamp: Option<i64>,
    release_timestamp: Option<i64>,
    /// YYYYMMDD
    upload_date: Option<String>,
    webpage_url: Option<String>,
}

impl RawEntry {
    fn published_at(&self) -> Option<DateTime<Utc>> {
        if let Some(ts) = self.timestamp.or(self.release_timestamp) {
            return DateTime::from_timestamp(ts, 0);
        }
        let date = NaiveDate::parse_from_str(self.upload_date.as_deref()?, "%Y%m%d").ok()?;
        Some(date.and_hms_opt(0, 0, 0)?.and_utc())
    }

    fn into_item(self) -> Option<PlaylistItem> {
        let Some(published_at) = self.published_at() else {
            warn!(item_id = %self.id, "Skipping playlist entry without a usable date");
            return None;
        };

        let webpage_url = self
            .webpage_url
            .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", self.id));

        Some(PlaylistItem {
            title: self
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| "Untitled Episode".to_string()),
            description: self.description.filter(|d| !d.trim().is_empty()),
            published_at,
            webpage_url,
            id: self.id,
        })
    }
}

fn parse_line(line: &str) -> Option<PlaylistItem> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<RawEntry>(line) {
        Ok(entry) => entry.into_item(),
        Err(e) => {
            debug!(error = %e, "Ignoring unparseable yt-dlp output line");
            None
        }
    }
}

/// Accumulates `yt-dlp --dump-json` lines (one JSON object each)
///
/// Lines that are not entries, or entries without a date, are skipped.
struct ListingCollector {
    not_before: Option<DateTime<Utc>>,
    min_items: usize,
    items: Vec<PlaylistItem>,
}

impl ListingCollector {
    fn new(window: Option<ListingWindow>, now: DateTime<Utc>) -> Self {
        Self {
            not_before: window.map(|w| now - Duration::days(i64::from(w.days))),
            min_items: window.map_or(0, |w| w.min_items),
            items: Vec::new(),
        }
    }

    /// Add one output line; `Break` means the rest of the listing is not needed
    fn push_line(&mut self, line: &str) -> ControlFlow<()> {
        let Some(item) = parse_line(line) else {
            return ControlFlow::Continue(());
        };

        if let Some(not_before) = self.not_before
            && item.published_at < not_before
            && self.items.len() >= self.min_items
        {
            debug!(item_id = %item.id, "Listing reached the end of its window");
            return ControlFlow::Break(());
        }

        self.items.push(item);
        ControlFlow::Continue(())
    }
}

/// [`MediaProvider`] that shells out to `yt-dlp` and `ffmpeg`
///
/// The direct audio stream is resolved by yt-dlp and downloaded through the
/// [`HttpClient`], then re-encoded to MP3.
pub struct YtDlpProvider<C> {
    client: C,
    yt_dlp: String,
    transcode: TranscodeOptions,
    window: Option<ListingWindow>,
}

impl<C: HttpClient> YtDlpProvider<C> {
    pub fn new(client: C, yt_dlp: impl Into<String>, transcode: TranscodeOptions) -> Self {
        Self {
            client,
            yt_dlp: yt_dlp.into(),
            transcode,
            window: None,
        }
    }

    /// Only list recent playlist entries
    pub fn with_listing_window(mut self, window: Option<ListingWindow>) -> Self {
        self.window = window;
        self
    }

    async fn run_yt_dlp(&self, args: &[&str], target: &str) -> std::io::Result<Output> {
        Command::new(&self.yt_dlp)
            .args(args)
            .arg(target)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
    }

    async fn resolve_stream_url(&self, item: &PlaylistItem) -> Result<String, FetchError> {
        let output = self
            .run_yt_dlp(
                &["--no-warnings", "--no-playlist", "-f", AUDIO_FORMAT, "-g"],
                &item.webpage_url,
            )
            .await
            .map_err(|e| FetchError::SpawnFailed {
                program: self.yt_dlp.clone(),
                source: e,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        match stdout.lines().map(str::trim).find(|l| !l.is_empty()) {
            Some(url) if output.status.success() => Ok(url.to_string()),
            _ => Err(FetchError::ResolveFailed {
                item_id: item.id.clone(),
                reason: failure_reason(&output.stderr, output.status),
            }),
        }
    }
}

#[async_trait]
impl<C: HttpClient> MediaProvider for YtDlpProvider<C> {
    /// Streams the listing and stops yt-dlp once the listing window is passed
    async fn list_playlist(&self, url: &Url) -> Result<Vec<PlaylistItem>, ProviderError> {
        let spawn_failed = |e: std::io::Error| ProviderError::SpawnFailed {
            program: self.yt_dlp.clone(),
            source: e,
        };

        let mut child = Command::new(&self.yt_dlp)
            .args(LISTING_ARGS)
            .arg(url.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_failed)?;

        // Drained on its own task so a chatty stderr cannot block stdout
        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_end(&mut buf).await;
            }
            buf
        });

        let mut collector = ListingCollector::new(self.window, Utc::now());
        let mut stopped_early = false;

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await.map_err(spawn_failed)? {
                if collector.push_line(&line).is_break() {
                    stopped_early = true;
                    break;
                }
            }
        }

        if stopped_early && let Err(e) = child.start_kill() {
            debug!(error = %e, "yt-dlp exited before it could be stopped");
        }
        let status = child.wait().await.map_err(spawn_failed)?;
        let stderr = if stopped_early {
            stderr_task.abort();
            Vec::new()
        } else {
            stderr_task.await.unwrap_or_default()
        };
        let items = collector.items;

        // With --ignore-errors a single unavailable video makes the exit code
        // non-zero; only treat the run as failed when nothing was listed
        if !stopped_early && !status.success() && items.is_empty() {
            return Err(ProviderError::Unavailable {
                url: url.to_string(),
                reason: failure_reason(&stderr, status),
            });
        }

        Ok(items)
    }

    async fn fetch_item(
        &self,
        item: &PlaylistItem,
        dest: &Path,
        context: &DownloadContext,
        reporter: &SharedProgressReporter,
    ) -> Result<FetchedAudio, FetchError> {
        let stream_url = self.resolve_stream_url(item).await?;

        let source_path = with_suffix(dest, ".source.partial");
        let encoded_path = with_suffix(dest, ".partial");

        let result = async {
            let download =
                download_stream(&self.client, &stream_url, &source_path, context, reporter)
                    .await?;

            reporter.report(ProgressEvent::Transcoding {
                download_id: context.download_id,
            });
            transcode_to_mp3(&self.transcode, &source_path, &encoded_path).await?;

            let bytes = encoded_size(&encoded_path).await?;
            tokio::fs::rename(&encoded_path, dest)
                .await
                .map_err(|e| FetchError::FileWriteFailed {
                    path: dest.to_path_buf(),
                    source: e,
                })?;

            Ok::<_, FetchError>(FetchedAudio {
                bytes,
                content_hash: Some(download.content_hash),
            })
        }
        .await;

        remove_leftover(&source_path).await;
        if result.is_err() {
            remove_leftover(&encoded_path).await;
        }

        result
    }
}

/// Size of the encoded file; an unreadable file fails the fetch
async fn encoded_size(path: &Path) -> Result<u64, FetchError> {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.len())
        .map_err(|e| FetchError::FileWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

async fn remove_leftover(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => debug!(path = %path.display(), error = %e, "Could not remove partial file"),
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn failure_reason(stderr: &[u8], status: ExitStatus) -> String {
    let stderr = String::from_utf8_lossy(stderr);
    let last_line = stderr.lines().map(str::trim).filter(|l| !l.is_empty()).last();
    match last_line {
        Some(line) => line.to_string(),
        None => format!("yt-dlp exited with {status}"),
    }
}
