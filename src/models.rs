//! Data structures and types for dlnacast
//!
//! Contains the shared models used across the crate organized by domain:
//! - **Devices**: renderer devices and the UPnP services they expose
//! - **Content**: what gets cast and how it resolved
//! - **Session**: transport state machine and the persisted session record
//! - **Timecodes**: `HH:MM:SS` helpers used by seek and position replies

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

// =============================================================================
// Device Models
// =============================================================================

/// UPnP device type reported by media renderers
pub const MEDIA_RENDERER: &str = "MediaRenderer";

/// UPnP service a renderer may expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// Transport control: set source, play, pause, stop, seek, position
    AvTransport,
    /// Volume control
    RenderingControl,
    ConnectionManager,
}

impl Capability {
    /// UPnP service type name (`urn:schemas-upnp-org:service:<name>:1`)
    pub fn service_name(&self) -> &'static str {
        match self {
            Capability::AvTransport => "AVTransport",
            Capability::RenderingControl => "RenderingControl",
            Capability::ConnectionManager => "ConnectionManager",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.service_name())
    }
}

/// Renderer device discovered on the network
///
/// Two devices are equal when their ids are equal, whatever their names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererDevice {
    /// Stable unique device name (UDN)
    pub id: String,
    pub name: String,
    pub device_type: String,
    pub capabilities: BTreeSet<Capability>,
    pub model: Option<String>,
    pub address: Option<IpAddr>,
}

impl RendererDevice {
    /// Create a media renderer with no services
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            device_type: MEDIA_RENDERER.to_string(),
            capabilities: BTreeSet::new(),
            model: None,
            address: None,
        }
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    pub fn with_device_type(mut self, device_type: impl Into<String>) -> Self {
        self.device_type = device_type.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_address(mut self, address: IpAddr) -> Self {
        self.address = Some(address);
        self
    }

    /// Whether the device announced itself as a media renderer
    pub fn is_media_renderer(&self) -> bool {
        self.device_type == MEDIA_RENDERER
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Match a user-supplied selector against id or (case-insensitive) name
    pub fn matches(&self, selector: &str) -> bool {
        self.id == selector || self.name.eq_ignore_ascii_case(selector)
    }
}

impl PartialEq for RendererDevice {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RendererDevice {}

impl fmt::Display for RendererDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.model, &self.address) {
            (Some(model), Some(addr)) => write!(f, "{} ({}) - {}", self.name, model, addr),
            (Some(model), None) => write!(f, "{} ({})", self.name, model),
            (None, Some(addr)) => write!(f, "{} - {}", self.name, addr),
            (None, None) => write!(f, "{}", self.name),
        }
    }
}

// =============================================================================
// Content Models
// =============================================================================

/// Opaque handle to something castable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "location", rename_all = "lowercase")]
pub enum ContentSource {
    /// File on this machine, served by the streaming server
    Local(PathBuf),
    /// URL the renderer fetches by itself
    Remote(String),
}

impl ContentSource {
    /// Interpret CLI input: `http(s)://` is remote, anything else a path
    pub fn parse(input: &str) -> Self {
        let lower = input.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            ContentSource::Remote(input.to_string())
        } else {
            ContentSource::Local(PathBuf::from(input))
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, ContentSource::Local(_))
    }

    /// Human readable title: file name, or last URL path segment
    pub fn title(&self) -> String {
        match self {
            ContentSource::Local(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "unknown".to_string()),
            ContentSource::Remote(url) => {
                let without_query = url.split(['?', '#']).next().unwrap_or(url);
                let after_scheme = without_query
                    .split_once("://")
                    .map(|(_, rest)| rest)
                    .unwrap_or(without_query);
                after_scheme
                    .split_once('/')
                    .and_then(|(_, path)| path.trim_end_matches('/').rsplit('/').next())
                    .filter(|s| !s.is_empty())
                    .unwrap_or(url)
                    .to_string()
            }
        }
    }

    /// Path-like view used for MIME guessing
    pub fn guess_path(&self) -> &Path {
        match self {
            ContentSource::Local(path) => path,
            ContentSource::Remote(url) => {
                Path::new(url.split(['?', '#']).next().unwrap_or(url))
            }
        }
    }
}

impl fmt::Display for ContentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentSource::Local(path) => write!(f, "{}", path.display()),
            ContentSource::Remote(url) => f.write_str(url),
        }
    }
}

/// Content source with its resolved MIME type and size
///
/// An unknown size disables range support for the item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentReference {
    pub source: ContentSource,
    pub mime_type: String,
    pub size: Option<u64>,
}

impl ContentReference {
    pub fn supports_ranges(&self) -> bool {
        self.size.is_some()
    }
}

// =============================================================================
// Session Models
// =============================================================================

/// Transport state of the cast session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportState {
    #[default]
    Idle,
    /// Source sent to the renderer, waiting for set-source and play
    Setting,
    Playing,
    Paused,
    Stopping,
    Stopped,
    Error,
}

impl TransportState {
    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(self, next: TransportState) -> bool {
        use TransportState::*;
        match (self, next) {
            (Idle | Stopped | Error, Setting) => true,
            (Setting, Playing | Error) => true,
            (Playing, Paused) | (Paused, Playing) => true,
            (Playing | Paused, Error) => true,
            (Stopping, Stopped) => true,
            (_, Stopping) => true,
            _ => false,
        }
    }

    /// Playing or paused: a renderer holds our media
    pub fn is_active(self) -> bool {
        matches!(self, TransportState::Playing | TransportState::Paused)
    }

    /// No session exists or the last one ended (a new cast may start)
    pub fn accepts_new_cast(self) -> bool {
        matches!(
            self,
            TransportState::Idle | TransportState::Stopped | TransportState::Error
        )
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Idle => write!(f, "Idle"),
            TransportState::Setting => write!(f, "Connecting..."),
            TransportState::Playing => write!(f, "▶ Playing"),
            TransportState::Paused => write!(f, "⏸ Paused"),
            TransportState::Stopping => write!(f, "Stopping..."),
            TransportState::Stopped => write!(f, "⏹ Stopped"),
            TransportState::Error => write!(f, "Error"),
        }
    }
}

/// Snapshot of the active cast session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastSession {
    pub device: RendererDevice,
    /// Unknown for sessions rehydrated from a [`SessionRecord`]
    pub source: Option<ContentSource>,
    pub title: String,
    pub transport_state: TransportState,
    pub position_secs: u64,
    pub duration_secs: u64,
    pub volume_percent: Option<u8>,
    /// Last device-reported failure, set in the error state
    pub last_error: Option<String>,
}

impl CastSession {
    /// Fresh session in `Setting`
    pub fn new(device: RendererDevice, source: Option<ContentSource>, title: String) -> Self {
        Self {
            device,
            source,
            title,
            transport_state: TransportState::Setting,
            position_secs: 0,
            duration_secs: 0,
            volume_percent: None,
            last_error: None,
        }
    }

    /// Durable record needed to rehydrate this session elsewhere
    pub fn record(&self) -> SessionRecord {
        SessionRecord {
            device_id: self.device.id.clone(),
            title: self.title.clone(),
            device_name: self.device.name.clone(),
            paused: self.transport_state == TransportState::Paused,
        }
    }

    /// Progress as a fraction (0.0-1.0)
    pub fn progress(&self) -> f64 {
        if self.duration_secs == 0 {
            0.0
        } else {
            (self.position_secs as f64 / self.duration_secs as f64).min(1.0)
        }
    }

    pub fn format_position(&self) -> String {
        format_duration(self.position_secs)
    }

    pub fn format_duration(&self) -> String {
        format_duration(self.duration_secs)
    }
}

impl fmt::Display for CastSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on {} - {} / {}",
            self.transport_state,
            self.device.name,
            self.format_position(),
            self.format_duration()
        )?;
        if let Some(volume) = self.volume_percent {
            write!(f, " ({}%)", volume)?;
        }
        Ok(())
    }
}

/// What survives a process boundary: enough to find the device again
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub device_id: String,
    pub title: String,
    pub device_name: String,
    /// Transport was paused when last written
    #[serde(default)]
    pub paused: bool,
}

/// Reply to a position query, in UPnP timecode form
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PositionInfo {
    /// `RelTime`, e.g. `0:01:23`
    pub rel_time: String,
    /// `TrackDuration`, e.g. `1:30:00`
    pub track_duration: String,
}

impl PositionInfo {
    pub fn from_secs(elapsed: u64, duration: u64) -> Self {
        Self {
            rel_time: format_timecode(elapsed),
            track_duration: format_timecode(duration),
        }
    }

    pub fn elapsed_secs(&self) -> u64 {
        parse_timecode(&self.rel_time).unwrap_or(0)
    }

    pub fn duration_secs(&self) -> u64 {
        parse_timecode(&self.track_duration).unwrap_or(0)
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Format seconds as HH:MM:SS or MM:SS
pub fn format_duration(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{:02}:{:02}", mins, secs)
    }
}

/// Format seconds as the absolute `HH:MM:SS` timecode renderers expect
pub fn format_timecode(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;
    format!("{:02}:{:02}:{:02}", hours, mins, secs)
}

/// Parse a renderer timecode (`H+:MM:SS` with optional fraction)
///
/// Returns `None` for `NOT_IMPLEMENTED`, empty strings and garbage.
pub fn parse_timecode(s: &str) -> Option<u64> {
    let re = regex::Regex::new(r"^\+?(\d+):([0-5]?\d):([0-5]?\d)(?:\.\d+(?:/\d+)?)?$").ok()?;
    let caps = re.captures(s.trim())?;
    let hours: u64 = caps.get(1)?.as_str().parse().ok()?;
    let mins: u64 = caps.get(2)?.as_str().parse().ok()?;
    let secs: u64 = caps.get(3)?.as_str().parse().ok()?;
    hours.checked_mul(3600)?.checked_add(mins * 60 + secs)
}

// =============================================================================
// Unit Tests
// =============================================================================
