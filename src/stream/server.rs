//! Local media streaming server
//!
//! Serves exactly one active content item at [`MEDIA_PATH`] so a renderer can
//! pull it. Renderers seek by re-requesting the same URL with a `Range`
//! header, so partial content support is mandatory.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;

use super::range::{content_range, unsatisfied_range, ByteRange, RangeOutcome};
use super::resolver::ContentResolver;
use crate::models::{ContentReference, ContentSource};

/// The single path content is served on
pub const MEDIA_PATH: &str = "/media";

/// Default listen port
pub const DEFAULT_PORT: u16 = 8080;

/// Streaming server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        source: std::io::Error,
    },
}

// =============================================================================
// Active Content
// =============================================================================

/// Slot holding the one item currently served
///
/// Requests take a snapshot when they start; swapping the item never affects
/// a response already in flight.
#[derive(Debug, Clone, Default)]
pub struct ActiveContent {
    slot: Arc<RwLock<Option<Arc<ContentSource>>>>,
}

impl ActiveContent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `source` from now on, returning what was served before
    pub fn set(&self, source: ContentSource) -> Option<Arc<ContentSource>> {
        self.slot.write().replace(Arc::new(source))
    }

    pub fn clear(&self) -> Option<Arc<ContentSource>> {
        self.slot.write().take()
    }

    pub fn current(&self) -> Option<Arc<ContentSource>> {
        self.slot.read().clone()
    }

    pub fn is_set(&self) -> bool {
        self.slot.read().is_some()
    }
}

// =============================================================================
// Router
// =============================================================================

#[derive(Clone)]
struct ServerState {
    active: ActiveContent,
    resolver: Arc<dyn ContentResolver>,
}

/// Build the router serving `active` (exposed for in-process testing)
pub fn router(active: ActiveContent, resolver: Arc<dyn ContentResolver>) -> Router {
    Router::new()
        .route(MEDIA_PATH, get(serve_media))
        .fallback(not_found)
        .with_state(ServerState { active, resolver })
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}

fn internal_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

async fn serve_media(
    State(state): State<ServerState>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    let Some(source) = state.active.current() else {
        return not_found().await;
    };

    let content = match state.resolver.resolve(&source).await {
        Ok(content) => content,
        Err(e) => {
            tracing::error!(%source, error = %e, "Failed to resolve active content");
            return internal_error();
        }
    };

    let range = headers
        .get(RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(ByteRange::parse);

    match (range, content.size) {
        (Some(range), Some(size)) => match range.resolve(size) {
            RangeOutcome::Unsatisfiable => {
                tracing::debug!(?range, size, "Range not satisfiable");
                Response::builder()
                    .status(StatusCode::RANGE_NOT_SATISFIABLE)
                    .header(CONTENT_RANGE, unsatisfied_range(size))
                    .header(ACCEPT_RANGES, "bytes")
                    .body(Body::empty())
                    .unwrap_or_else(|_| internal_error())
            }
            RangeOutcome::Partial { start, end } => {
                tracing::debug!(start, end, size, "Serving partial content");
                let len = end - start + 1;
                let response = Response::builder()
                    .status(StatusCode::PARTIAL_CONTENT)
                    .header(CONTENT_TYPE, content.mime_type.as_str())
                    .header(CONTENT_LENGTH, len)
                    .header(CONTENT_RANGE, content_range(start, end, size))
                    .header(ACCEPT_RANGES, "bytes");
                if method == Method::HEAD {
                    return response.body(Body::empty()).unwrap_or_else(|_| internal_error());
                }
                match stream_body(&state, &content, start, Some(len)).await {
                    Some(body) => response.body(body).unwrap_or_else(|_| internal_error()),
                    None => internal_error(),
                }
            }
        },
        _ => {
            tracing::debug!(size = ?content.size, "Serving full content");
            let mut response = Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, content.mime_type.as_str())
                .header(ACCEPT_RANGES, "bytes");
            if let Some(size) = content.size {
                response = response.header(CONTENT_LENGTH, size);
            }
            if method == Method::HEAD {
                return response.body(Body::empty()).unwrap_or_else(|_| internal_error());
            }
            match stream_body(&state, &content, 0, content.size).await {
                Some(body) => response.body(body).unwrap_or_else(|_| internal_error()),
                None => internal_error(),
            }
        }
    }
}

/// Open the content at `offset`, limited to `len` bytes when known
async fn stream_body(
    state: &ServerState,
    content: &ContentReference,
    offset: u64,
    len: Option<u64>,
) -> Option<Body> {
    let stream = match state.resolver.open_stream(&content.source, offset).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(source = %content.source, offset, error = %e, "Failed to open content stream");
            return None;
        }
    };

    let body = match len {
        Some(len) => Body::from_stream(ReaderStream::new(stream.take(len))),
        None => Body::from_stream(ReaderStream::new(stream)),
    };
    Some(body)
}

// =============================================================================
// Server
// =============================================================================

/// Running streaming server bound to a local port
pub struct MediaServer {
    local_addr: SocketAddr,
    active: ActiveContent,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl MediaServer {
    /// Bind `addr` and start serving in the background
    ///
    /// # Errors
    /// - `ServerError::Bind` - the port is taken or not bindable
    pub async fn bind(
        addr: SocketAddr,
        resolver: Arc<dyn ContentResolver>,
    ) -> Result<Self, ServerError> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                address: addr,
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            address: addr,
            source,
        })?;

        let active = ActiveContent::new();
        let app = router(active.clone(), resolver);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tracing::info!(%local_addr, "Media server listening");

        let task = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = server.await {
                tracing::error!("Media server error: {}", e);
            }
        });

        Ok(Self {
            local_addr,
            active,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Handle to the served item, shared with the orchestrator
    pub fn active(&self) -> &ActiveContent {
        &self.active
    }

    /// URL a renderer uses to reach the media through `host`
    pub fn media_url(&self, host: IpAddr) -> String {
        media_url(host, self.port())
    }

    /// Stop accepting requests; open streams get a short grace period
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(Duration::from_secs(2), &mut task).await.is_err() {
                tracing::debug!("Aborting media server with open streams");
                task.abort();
            }
        }
        tracing::info!(local_addr = %self.local_addr, "Media server stopped");
    }
}

impl Drop for MediaServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// `http://host:port/media`, with IPv6 hosts bracketed
pub fn media_url(host: IpAddr, port: u16) -> String {
    format!("http://{}{}", SocketAddr::new(host, port), MEDIA_PATH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};
    use std::path::PathBuf;

    #[test]
    fn test_media_url() {
        assert_eq!(
            media_url(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)), 8080),
            "http://192.168.1.10:8080/media"
        );
        assert_eq!(
            media_url(IpAddr::V6(Ipv6Addr::LOCALHOST), 9000),
            "http://[::1]:9000/media"
        );
    }

    #[test]
    fn test_active_content_swap() {
        let active = ActiveContent::new();
        assert!(!active.is_set());

        let first = ContentSource::Local(PathBuf::from("/a.mp4"));
        let second = ContentSource::Local(PathBuf::from("/b.mp4"));
        assert!(active.set(first.clone()).is_none());

        let snapshot = active.current().unwrap();
        let previous = active.set(second.clone()).unwrap();

        // The old snapshot stays valid after the swap
        assert_eq!(*snapshot, first);
        assert_eq!(*previous, first);
        assert_eq!(*active.current().unwrap(), second);

        active.clear();
        assert!(active.current().is_none());
    }
}
