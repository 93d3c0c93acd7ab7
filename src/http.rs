// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Streaming HTTP access for resolved media URLs.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};

/// Media CDNs throttle or reject requests without a browser-like agent
const USER_AGENT: &str = concat!("Mozilla/5.0 (compatible; yt2pod/", env!("CARGO_PKG_VERSION"), ")");

/// Body of a media response, chunk by chunk
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// Status line, announced size and body of a media response
pub struct MediaResponse {
    pub status: u16,
    /// Content-Length header value, if present
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

impl MediaResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Opens streaming GET requests; faked in tests
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn open_stream(&self, url: &str) -> Result<MediaResponse, reqwest::Error>;
}

/// [`HttpClient`] backed by a shared `reqwest::Client`
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Build a client with the yt2pod user agent and a connect timeout
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn open_stream(&self, url: &str) -> Result<MediaResponse, reqwest::Error> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let content_length = response.content_length();

        Ok(MediaResponse {
            status,
            content_length,
            body: response.bytes_stream().boxed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16) -> MediaResponse {
        MediaResponse {
            status,
            content_length: None,
            body: futures::stream::empty::<Result<Bytes, reqwest::Error>>().boxed(),
        }
    }

    #[test]
    fn reqwest_client_can_be_built() {
        let client = ReqwestClient::new().unwrap();
        let _cloned = client.clone();
        let _custom = ReqwestClient::with_client(reqwest::Client::new());
    }

    #[test]
    fn only_2xx_is_success() {
        assert!(response(200).is_success());
        assert!(response(206).is_success());
        assert!(!response(302).is_success());
        assert!(!response(403).is_success());
    }
}
