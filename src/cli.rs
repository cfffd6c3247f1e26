//! CLI - Command Line Interface for dlnacast
//!
//! Every cast action is scriptable. All output is JSON-parseable.
//!
//! # Examples
//!
//! ```bash
//! # Find renderers
//! dlnacast devices --json
//!
//! # Cast a file or a URL
//! dlnacast cast ~/Videos/movie.mp4 --device "Living Room TV"
//! dlnacast cast https://example.com/song.mp3
//!
//! # Playback control
//! dlnacast status
//! dlnacast pause
//! dlnacast seek 1:30:00
//! dlnacast volume +5
//! ```

use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::io::IsTerminal;
use std::path::PathBuf;

use crate::cast::CastError;
use crate::models::{CastSession, RendererDevice, TransportState};

// =============================================================================
// Exit Codes
// =============================================================================

/// Exit codes for CLI operations (semantic for scripting)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// General error
    Error = 1,
    /// Invalid arguments
    InvalidArgs = 2,
    /// Network error (no LAN address, port taken)
    NetworkError = 3,
    /// Device not found or lost
    DeviceNotFound = 4,
    /// Content not found
    ContentNotFound = 5,
    /// Cast failed (device rejected a command)
    CastFailed = 6,
    /// No session to control
    NoSession = 7,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> std::process::ExitCode {
        std::process::ExitCode::from(code as u8)
    }
}

impl From<&CastError> for ExitCode {
    fn from(err: &CastError) -> ExitCode {
        match err {
            CastError::NotFound(_) => ExitCode::ContentNotFound,
            CastError::UnsupportedDevice(_) | CastError::DeviceLost(_) => ExitCode::DeviceNotFound,
            CastError::NetworkUnavailable => ExitCode::NetworkError,
            CastError::CommandFailed { .. } => ExitCode::CastFailed,
            CastError::NoSession => ExitCode::NoSession,
            CastError::InvalidState { .. } | CastError::Busy => ExitCode::Error,
        }
    }
}

// =============================================================================
// Main CLI Structure
// =============================================================================

/// dlnacast - cast local files and URLs to network media renderers
#[derive(Parser, Debug)]
#[command(
    name = "dlnacast",
    version,
    author = "Gorka & Hermes",
    about = "Cast local files and URLs to DLNA media renderers",
    long_about = "Discovers media renderers on the local network, serves local \
                  files over HTTP with range support and controls playback.\n\n\
                  Use subcommands for automation and scripting.",
    after_help = "EXAMPLES:\n\
                  dlnacast devices                     List renderers\n\
                  dlnacast cast movie.mp4 -d TV        Cast a local file\n\
                  dlnacast serve movie.mp4             Only serve the file\n\
                  dlnacast status --json               Check playback status"
)]
pub struct Cli {
    /// Output format as JSON (default for non-TTY)
    #[arg(long, short = 'j', global = true)]
    pub json: bool,

    /// Target device (id or name)
    #[arg(long, short = 'd', global = true)]
    pub device: Option<String>,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Debug logging on stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Streaming server port (overrides config and DLNACAST_PORT)
    #[arg(long, short = 'p', global = true)]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Check if JSON output should be used
    pub fn should_json(&self) -> bool {
        self.json || !std::io::stdout().is_terminal()
    }

    /// Default `tracing` filter for the verbosity flags
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "dlnacast=debug"
        } else if self.quiet {
            "dlnacast=warn"
        } else {
            "dlnacast=info"
        }
    }
}

// =============================================================================
// Subcommands
// =============================================================================

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List media renderers on the network
    #[command(visible_alias = "dev")]
    Devices(DevicesCmd),

    /// Serve a local file over HTTP without casting it
    Serve(ServeCmd),

    /// Cast a local file or URL to a device
    Cast(CastCmd),

    /// Get current playback status
    Status(StatusCmd),

    /// Resume playback
    Play(PlayCmd),

    /// Pause playback
    Pause(PauseCmd),

    /// Stop playback and end the session
    Stop(StopCmd),

    /// Seek to a position
    Seek(SeekCmd),

    /// Set volume level
    #[command(visible_alias = "vol")]
    Volume(VolumeCmd),
}

/// List renderers that answer a discovery search
#[derive(Args, Debug)]
pub struct DevicesCmd {
    /// Search timeout in seconds (overrides config)
    #[arg(long, short = 't')]
    pub timeout: Option<u64>,
}

/// Serve a file at the fixed media path until interrupted
#[derive(Args, Debug)]
pub struct ServeCmd {
    /// File to serve
    #[arg(required = true)]
    pub file: PathBuf,
}

/// Cast content to a renderer
#[derive(Args, Debug)]
pub struct CastCmd {
    /// Local file path or http(s) URL
    #[arg(required = true)]
    pub source: String,

    /// Return once playback started instead of following it
    #[arg(long)]
    pub detach: bool,
}

#[derive(Args, Debug)]
pub struct StatusCmd {}

/// Resume playback
#[derive(Args, Debug)]
pub struct PlayCmd {}

/// Pause playback
#[derive(Args, Debug)]
pub struct PauseCmd {}

/// Stop playback and end the session
#[derive(Args, Debug)]
pub struct StopCmd {}

/// Seek to a position in playback
#[derive(Args, Debug)]
pub struct SeekCmd {
    /// Target position in seconds, HH:MM:SS, or relative (+/-) seconds
    #[arg(required = true, allow_hyphen_values = true)]
    pub position: String,
}

impl SeekCmd {
    /// Parse the position argument
    pub fn parse_position(&self) -> SeekPosition {
        let s = self.position.trim();
        if let Some(stripped) = s.strip_prefix('+') {
            if let Ok(secs) = stripped.parse::<i64>() {
                return SeekPosition::Forward(secs);
            }
        } else if let Some(stripped) = s.strip_prefix('-') {
            if let Ok(secs) = stripped.parse::<i64>() {
                return SeekPosition::Backward(secs);
            }
        } else if let Ok(secs) = s.parse::<u64>() {
            return SeekPosition::Absolute(secs);
        }
        // Try parsing as timestamp (HH:MM:SS or MM:SS)
        if let Some(secs) = parse_timestamp(s) {
            return SeekPosition::Absolute(secs);
        }
        SeekPosition::Invalid(self.position.clone())
    }
}

/// Parsed seek position
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeekPosition {
    /// Absolute position in seconds
    Absolute(u64),
    /// Seek forward by seconds
    Forward(i64),
    /// Seek backward by seconds
    Backward(i64),
    /// Invalid position string
    Invalid(String),
}

impl SeekPosition {
    /// Signed offset for relative seeks
    pub fn delta(&self) -> Option<i64> {
        match self {
            SeekPosition::Forward(secs) => Some(*secs),
            SeekPosition::Backward(secs) => Some(-*secs),
            _ => None,
        }
    }
}

/// Parse timestamp string (HH:MM:SS or MM:SS) to seconds
fn parse_timestamp(s: &str) -> Option<u64> {
    let parts: Vec<&str> = s.split(':').collect();
    match parts.len() {
        2 => {
            let mins: u64 = parts[0].parse().ok()?;
            let secs: u64 = parts[1].parse().ok()?;
            Some(mins * 60 + secs)
        }
        3 => crate::models::parse_timecode(s),
        _ => None,
    }
}

/// Set volume level
#[derive(Args, Debug)]
pub struct VolumeCmd {
    /// Volume level (0-100) or relative (+/- N)
    #[arg(required = true, allow_hyphen_values = true)]
    pub level: String,
}

impl VolumeCmd {
    /// Parse the volume argument
    pub fn parse_level(&self) -> VolumeLevel {
        let s = self.level.trim();
        if let Some(stripped) = s.strip_prefix('+') {
            if let Ok(delta) = stripped.parse::<i8>() {
                return VolumeLevel::Relative(delta);
            }
        } else if let Some(stripped) = s.strip_prefix('-') {
            if let Ok(delta) = stripped.parse::<i8>() {
                return VolumeLevel::Relative(-delta);
            }
        } else if let Ok(vol) = s.parse::<u8>() {
            return VolumeLevel::Absolute(vol.min(100));
        }
        VolumeLevel::Invalid(self.level.clone())
    }
}

/// Parsed volume level
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeLevel {
    /// Absolute volume (0-100)
    Absolute(u8),
    /// Relative volume change
    Relative(i8),
    /// Invalid level string
    Invalid(String),
}

// =============================================================================
// JSON Output Types
// =============================================================================

/// Generic JSON output wrapper with status
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonOutput<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "is_zero")]
    pub exit_code: i32,
}

fn is_zero(n: &i32) -> bool {
    *n == 0
}

impl<T: Serialize> JsonOutput<T> {
    /// Create success output with data
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            exit_code: 0,
        }
    }

    /// Create error output (no data)
    pub fn error_msg(msg: impl Into<String>, code: ExitCode) -> JsonOutput<()> {
        JsonOutput::<()> {
            data: None,
            error: Some(msg.into()),
            exit_code: code.into(),
        }
    }
}

/// Status OK response
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusOk {
    pub status: &'static str,
}

impl Default for StatusOk {
    fn default() -> Self {
        Self { status: "ok" }
    }
}

/// Renderer entry in `devices` output
#[derive(Debug, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub capabilities: Vec<String>,
}

impl From<&RendererDevice> for DeviceEntry {
    fn from(device: &RendererDevice) -> Self {
        Self {
            id: device.id.clone(),
            name: device.name.clone(),
            model: device.model.clone(),
            address: device.address.map(|a| a.to_string()),
            capabilities: device.capabilities.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Playback status response
#[derive(Debug, Serialize, Deserialize)]
pub struct PlaybackStatus {
    pub state: TransportState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for PlaybackStatus {
    fn default() -> Self {
        Self {
            state: TransportState::Idle,
            title: None,
            device: None,
            position: None,
            duration: None,
            progress: None,
            volume: None,
            error: None,
        }
    }
}

impl From<&CastSession> for PlaybackStatus {
    fn from(session: &CastSession) -> Self {
        Self {
            state: session.transport_state,
            title: Some(session.title.clone()),
            device: Some(session.device.name.clone()),
            position: Some(session.position_secs),
            duration: Some(session.duration_secs),
            progress: Some(session.progress()),
            volume: session.volume_percent,
            error: session.last_error.clone(),
        }
    }
}

/// Cast success response
#[derive(Debug, Serialize, Deserialize)]
pub struct CastResponse {
    pub status: &'static str,
    pub device: String,
    pub title: String,
    pub stream_url: String,
}

/// Serve response
#[derive(Debug, Serialize, Deserialize)]
pub struct ServeResponse {
    pub status: &'static str,
    pub url: String,
    pub file: String,
}

// =============================================================================
// Output Helpers
// =============================================================================

/// Output handler for consistent formatting
pub struct Output {
    pub json: bool,
    pub quiet: bool,
}

impl Output {
    pub fn new(cli: &Cli) -> Self {
        Self {
            json: cli.should_json(),
            quiet: cli.quiet,
        }
    }

    /// Print success data
    pub fn print<T: Serialize>(&self, data: T) -> anyhow::Result<()> {
        if self.json {
            let output = JsonOutput::success(data);
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            // For non-JSON, caller should handle formatting
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        Ok(())
    }

    /// Print raw JSON (already formatted)
    pub fn print_json<T: Serialize>(&self, data: &T) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(data)?);
        Ok(())
    }

    /// Print error and return exit code
    pub fn error(&self, msg: impl Into<String>, code: ExitCode) -> ExitCode {
        let msg = msg.into();
        if self.json {
            let output = JsonOutput::<()>::error_msg(&msg, code);
            if let Ok(json) = serde_json::to_string_pretty(&output) {
                eprintln!("{}", json);
            }
        } else if !self.quiet {
            eprintln!("Error: {}", msg);
        }
        code
    }

    /// Report a cast error with its semantic exit code
    pub fn cast_error(&self, err: &CastError) -> ExitCode {
        self.error(err.to_string(), ExitCode::from(err))
    }

    /// Print info message (suppressed in quiet mode)
    pub fn info(&self, msg: impl std::fmt::Display) {
        if !self.quiet && !self.json {
            eprintln!("{}", msg);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
