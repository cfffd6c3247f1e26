//! Content resolution
//!
//! Turns a [`ContentSource`] into its MIME type and size, and opens a byte
//! stream at an arbitrary offset. Nothing is cached: every call resolves the
//! source again so a file deleted mid-session is noticed by the next request.

use std::io::SeekFrom;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, RANGE};
use reqwest::StatusCode;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncSeekExt};
use tokio_util::io::StreamReader;

use crate::models::{ContentReference, ContentSource};

/// Readable byte stream positioned at the requested offset
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

/// Fallback MIME type for content nobody could identify
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Content resolution errors
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Content not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Unexpected status {status} from {url}")]
    BadStatus { url: String, status: u16 },
}

/// Resolves content references for the streaming server and the orchestrator
#[async_trait]
pub trait ContentResolver: Send + Sync {
    /// Resolve MIME type and size (size is `None` when not determinable)
    async fn resolve(&self, source: &ContentSource) -> Result<ContentReference, ResolveError>;

    /// Open the content positioned `offset` bytes from the start
    async fn open_stream(
        &self,
        source: &ContentSource,
        offset: u64,
    ) -> Result<ByteStream, ResolveError>;
}

/// Resolver for local files and HTTP URLs
pub struct MediaResolver {
    client: reqwest::Client,
}

impl MediaResolver {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
        }
    }

    async fn resolve_local(
        &self,
        source: &ContentSource,
        path: &std::path::Path,
    ) -> Result<ContentReference, ResolveError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| not_found_or_io(e, source))?;
        if !metadata.is_file() {
            return Err(ResolveError::NotFound(source.to_string()));
        }

        Ok(ContentReference {
            source: source.clone(),
            mime_type: guess_mime(source),
            size: Some(metadata.len()),
        })
    }

    /// Probe a remote URL with HEAD, tolerating servers that refuse it
    async fn resolve_remote(
        &self,
        source: &ContentSource,
        url: &str,
    ) -> Result<ContentReference, ResolveError> {
        let response = self.client.head(url).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                return Err(ResolveError::NotFound(url.to_string()))
            }
            status if !status.is_success() => {
                tracing::debug!(%url, %status, "HEAD not usable, guessing content type");
                return Ok(ContentReference {
                    source: source.clone(),
                    mime_type: guess_mime(source),
                    size: None,
                });
            }
            _ => {}
        }

        let headers = response.headers();
        let mime_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| !v.is_empty() && v != OCTET_STREAM)
            .unwrap_or_else(|| guess_mime(source));
        let size = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        Ok(ContentReference {
            source: source.clone(),
            mime_type,
            size,
        })
    }

    async fn open_remote(&self, url: &str, offset: u64) -> Result<ByteStream, ResolveError> {
        let mut request = self.client.get(url);
        if offset > 0 {
            request = request.header(RANGE, format!("bytes={}-", offset));
        }
        let response = request.send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Err(ResolveError::NotFound(url.to_string()));
        }
        // A server ignoring our Range answers 200 from byte zero
        if !status.is_success() || (offset > 0 && status != StatusCode::PARTIAL_CONTENT) {
            return Err(ResolveError::BadStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let stream = response.bytes_stream().map_err(std::io::Error::other);
        Ok(Box::pin(StreamReader::new(stream)))
    }
}

impl Default for MediaResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentResolver for MediaResolver {
    async fn resolve(&self, source: &ContentSource) -> Result<ContentReference, ResolveError> {
        match source {
            ContentSource::Local(path) => self.resolve_local(source, path).await,
            ContentSource::Remote(url) => self.resolve_remote(source, url).await,
        }
    }

    async fn open_stream(
        &self,
        source: &ContentSource,
        offset: u64,
    ) -> Result<ByteStream, ResolveError> {
        match source {
            ContentSource::Local(path) => {
                let mut file = tokio::fs::File::open(path)
                    .await
                    .map_err(|e| not_found_or_io(e, source))?;
                if offset > 0 {
                    file.seek(SeekFrom::Start(offset)).await?;
                }
                Ok(Box::pin(file))
            }
            ContentSource::Remote(url) => self.open_remote(url, offset).await,
        }
    }
}

/// Guess a MIME type from the file extension
pub fn guess_mime(source: &ContentSource) -> String {
    mime_guess::from_path(source.guess_path())
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

fn not_found_or_io(err: std::io::Error, source: &ContentSource) -> ResolveError {
    if err.kind() == std::io::ErrorKind::NotFound {
        ResolveError::NotFound(source.to_string())
    } else {
        ResolveError::Io(err)
    }
}
