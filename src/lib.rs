//! dlnacast - cast local files and URLs to DLNA media renderers
//!
//! Discovers renderers, serves the one active content item over HTTP with
//! byte-range support, and drives playback through a single cast session.
//!
//! # Modules
//!
//! - `models` - Devices, content references, session state, timecodes
//! - `stream` - Content resolution, the streaming server, the network lock
//! - `cast` - Device registry, cast orchestrator, position poller
//! - `app` - Subsystem lifetime
//! - `sim` - Simulated renderer network
//! - `cli`, `commands`, `config` - Command line surface

pub mod app;
pub mod cast;
pub mod cli;
pub mod commands;
pub mod config;
pub mod models;
pub mod sim;
pub mod stream;

// Re-export commonly used types
pub use models::{
    CastSession, Capability, ContentReference, ContentSource, PositionInfo, RendererDevice,
    SessionRecord, TransportState,
};

pub use app::{App, AppOptions};
pub use cast::{CastController, CastError, CastEvent, DeviceControl, DeviceRegistry, SessionWatch};
pub use sim::SimulatedNetwork;
pub use stream::{ActiveContent, ContentResolver, MediaResolver, MediaServer, NetworkLock};
