//! Streaming infrastructure
//!
//! - Resolver: content size, MIME type and byte streams
//! - Range: `Range` header parsing and clamping
//! - Server: HTTP server exposing the active content to renderers
//! - Lock: reference-counted network lock held while discovery runs

pub mod lock;
pub mod range;
pub mod resolver;
pub mod server;

pub use lock::{NetworkLock, NetworkLockGuard};
pub use range::{ByteRange, RangeOutcome};
pub use resolver::{ByteStream, ContentResolver, MediaResolver, ResolveError};
pub use server::{ActiveContent, MediaServer, ServerError, MEDIA_PATH};
