use std::path::Path;

use futures::StreamExt;
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::FetchError;
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, SharedProgressReporter};

/// Identifies a fetch among the candidates of one show sync
#[derive(Debug, Clone)]
pub struct DownloadContext {
    /// Stable id for progress display (the candidate's index)
    pub download_id: usize,
    /// Index of this item in the fetch queue
    pub episode_index: usize,
    /// Total number of items to fetch for the show
    pub total_to_fetch: usize,
    pub episode_title: String,
}

/// Outcome of a streamed download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResult {
    pub bytes_downloaded: u64,
    /// `sha256:<hex>` of the downloaded bytes
    pub content_hash: String,
}

/// Stream `url` into `output_path`, hashing the bytes as they arrive
///
/// The caller owns `output_path` and is responsible for removing it on error.
pub async fn download_stream<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
    output_path: &Path,
    context: &DownloadContext,
    reporter: &SharedProgressReporter,
) -> Result<DownloadResult, FetchError> {
    let response = client
        .open_stream(url)
        .await
        .map_err(|e| FetchError::HttpFailed {
            url: url.to_string(),
            source: e,
        })?;

    if !response.is_success() {
        return Err(FetchError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    reporter.report(ProgressEvent::FetchStarting {
        download_id: context.download_id,
        episode_title: context.episode_title.clone(),
        episode_index: context.episode_index,
        total_to_fetch: context.total_to_fetch,
        content_length: response.content_length,
    });

    let write_failed = |e: std::io::Error| FetchError::FileWriteFailed {
        path: output_path.to_path_buf(),
        source: e,
    };

    let mut file = File::create(output_path).await.map_err(write_failed)?;
    let mut hasher = Sha256::new();
    let mut bytes_downloaded: u64 = 0;
    let mut stream = response.body;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| FetchError::StreamFailed {
            url: url.to_string(),
            source: e,
        })?;

        file.write_all(&chunk).await.map_err(write_failed)?;
        hasher.update(&chunk);
        bytes_downloaded += chunk.len() as u64;

        reporter.report(ProgressEvent::FetchProgress {
            download_id: context.download_id,
            bytes_downloaded,
            total_bytes: response.content_length,
        });
    }

    file.flush().await.map_err(write_failed)?;
    file.sync_all().await.map_err(write_failed)?;

    Ok(DownloadResult {
        bytes_downloaded,
        content_hash: format!("sha256:{:x}", hasher.finalize()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{ByteStream, MediaResponse};
    use crate::progress::NoopReporter;
    use async_trait::async_trait;
    use bytes::Bytes;
    use tempfile::tempdir;

    struct MockHttpClient {
        chunks: Vec<&'static [u8]>,
        status: u16,
    }

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn open_stream(&self, _url: &str) -> Result<MediaResponse, reqwest::Error> {
            let len = self.chunks.iter().map(|c| c.len() as u64).sum::<u64>();
            let chunks: Vec<Result<Bytes, reqwest::Error>> = self
                .chunks
                .iter()
                .map(|c| Ok(Bytes::from_static(*c)))
                .collect();
            let body: ByteStream = Box::pin(futures::stream::iter(chunks));

            Ok(MediaResponse {
                status: self.status,
                content_length: Some(len),
                body,
            })
        }
    }

    fn context() -> DownloadContext {
        DownloadContext {
            download_id: 0,
            episode_index: 0,
            total_to_fetch: 1,
            episode_title: "Test Episode".to_string(),
        }
    }

    #[tokio::test]
    async fn download_writes_all_chunks_and_hashes_them() {
        let dir = tempdir().unwrap();
        let output_path = dir.path().join("audio.m4a.partial");

        let client = MockHttpClient {
            chunks: vec![b"hello ".as_slice(), b"world".as_slice()],
            status: 200,
        };

        let result = download_stream(
            &client,
            "https://cdn.example.com/a",
            &output_path,
            &context(),
            &NoopReporter::shared(),
        )
        .await
        .unwrap();

        assert_eq!(result.bytes_downloaded, 11);
        assert_eq!(std::fs::read(&output_path).unwrap(), b"hello world");
        // sha256("hello world")
        assert_eq!(
            result.content_hash,
            "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[tokio::test]
    async fn download_fails_on_http_error() {
        let dir = tempdir().unwrap();
        let output_path = dir.path().join("audio.partial");

        let client = MockHttpClient {
            chunks: vec![b"Forbidden".as_slice()],
            status: 403,
        };

        let result = download_stream(
            &client,
            "https://cdn.example.com/a",
            &output_path,
            &context(),
            &NoopReporter::shared(),
        )
        .await;

        match result {
            Err(FetchError::HttpStatus { status, .. }) => assert_eq!(status, 403),
            other => panic!("Expected HttpStatus error, got {other:?}"),
        }
        assert!(!output_path.exists());
    }
}
