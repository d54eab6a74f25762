//! Bounded HTTP(S) retrieval of link content.
//!
//! The body is streamed, counted and hashed chunk-by-chunk; the fetch aborts
//! as soon as the running total would pass the caller's ceiling, so memory
//! stays bounded by that ceiling rather than by what the server claims.

use crate::services::{
    error::{SnapshotError, SnapshotResult},
    hasher::ContentHasher,
    sniff::{MimeSniffer, SignatureSniffer, declared_mime},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::{
    Client, Url,
    header::{ACCEPT_ENCODING, CONTENT_TYPE, ETAG, HeaderMap, LAST_MODIFIED},
    redirect,
};
use std::{sync::Arc, time::Duration};
use tracing::debug;

const MAX_REDIRECTS: usize = 10;
const USER_AGENT: &str = concat!("leenkz-snapshot/", env!("CARGO_PKG_VERSION"));

/// Everything the capture pipeline needs from one fetch.
#[derive(Debug, Clone)]
pub struct FetchedContent {
    pub body: Bytes,
    pub mime_type: String,
    /// Hex SHA-256 computed while the body streamed in.
    pub content_hash: String,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
    sniffer: Arc<dyn MimeSniffer>,
}

impl HttpFetcher {
    /// `timeout` bounds the whole operation: connect, headers and body.
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .user_agent(USER_AGENT)
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(Self {
            client,
            timeout,
            sniffer: Arc::new(SignatureSniffer),
        })
    }

    /// Fetch `url`, failing once more than `max_size` bytes arrive.
    pub async fn fetch(&self, url: &str, max_size: u64) -> SnapshotResult<FetchedContent> {
        let parsed = parse_target(url)?;
        match tokio::time::timeout(self.timeout, self.fetch_bounded(parsed, max_size)).await {
            Ok(result) => result,
            Err(_) => Err(self.timeout_error(url)),
        }
    }

    async fn fetch_bounded(&self, url: Url, max_size: u64) -> SnapshotResult<FetchedContent> {
        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT_ENCODING, "identity")
            .send()
            .await
            .map_err(|err| self.request_error(&url, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SnapshotError::Fetch {
                url: url.to_string(),
                reason: format!("upstream responded {}", status),
            });
        }

        let declared_len = response.content_length();
        if let Some(len) = declared_len {
            if len > max_size {
                debug!("{} declares {} bytes, limit {}", url, len, max_size);
                return Err(SnapshotError::ContentTooLarge { limit: max_size });
            }
        }

        let headers = response.headers();
        let declared = declared_mime(header_str(headers, CONTENT_TYPE));
        let etag = header_str(headers, ETAG).map(str::to_string);
        let last_modified = header_str(headers, LAST_MODIFIED).and_then(parse_http_date);

        let mut body = Vec::with_capacity(declared_len.unwrap_or(0).min(max_size) as usize);
        let mut hasher = ContentHasher::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| self.request_error(&url, err))?;
            if body.len() as u64 + chunk.len() as u64 > max_size {
                debug!("{} exceeded {} bytes mid-stream", url, max_size);
                return Err(SnapshotError::ContentTooLarge { limit: max_size });
            }
            hasher.update(&chunk);
            body.extend_from_slice(&chunk);
        }

        let mime_type = declared.unwrap_or_else(|| self.sniffer.sniff(&body));
        debug!("fetched {} bytes of {} from {}", body.len(), mime_type, url);

        Ok(FetchedContent {
            body: Bytes::from(body),
            mime_type,
            content_hash: hasher.finalize_hex(),
            etag,
            last_modified,
        })
    }

    fn request_error(&self, url: &Url, err: reqwest::Error) -> SnapshotError {
        if err.is_timeout() {
            self.timeout_error(url.as_str())
        } else {
            SnapshotError::Fetch {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }

    fn timeout_error(&self, url: &str) -> SnapshotError {
        SnapshotError::FetchTimeout {
            url: url.to_string(),
            seconds: self.timeout.as_secs(),
        }
    }
}

/// Accept only absolute `http`/`https` URLs.
pub fn parse_target(url: &str) -> SnapshotResult<Url> {
    let parsed =
        Url::parse(url).map_err(|err| SnapshotError::Validation(format!("url `{}`: {}", url, err)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(SnapshotError::Validation(format!(
            "url scheme `{}` is not supported",
            other
        ))),
    }
}

fn header_str(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
