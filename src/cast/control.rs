//! Device control interface
//!
//! The UPnP control point (SSDP discovery, SOAP actions) lives behind
//! [`DeviceControl`]. Every command is asynchronous and either succeeds or
//! fails with the reason the device reported.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::models::{Capability, PositionInfo, RendererDevice};

/// Failure reported by a device or by the transport carrying the command
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct CommandError {
    pub reason: String,
}

impl CommandError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Appearance or disappearance of a device on the network
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    Added(RendererDevice),
    Removed(RendererDevice),
}

/// Opaque reference to one service on one device
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceHandle {
    pub device_id: String,
    pub capability: Capability,
}

/// Transport commands sent to renderers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    SetTransportUri,
    Play,
    Pause,
    Stop,
    Seek,
    GetPositionInfo,
    SetVolume,
    GetVolume,
}

impl Command {
    /// UPnP action name
    pub fn action(&self) -> &'static str {
        match self {
            Command::SetTransportUri => "SetAVTransportURI",
            Command::Play => "Play",
            Command::Pause => "Pause",
            Command::Stop => "Stop",
            Command::Seek => "Seek",
            Command::GetPositionInfo => "GetPositionInfo",
            Command::SetVolume => "SetVolume",
            Command::GetVolume => "GetVolume",
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.action())
    }
}

/// Control point collaborator: discovery plus transport/rendering commands
#[async_trait]
pub trait DeviceControl: Send + Sync {
    /// Send a discovery search; results arrive as [`DiscoveryEvent`]s
    async fn search(&self) -> Result<(), CommandError>;

    /// Stream of device add/remove callbacks
    fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent>;

    /// Look up a device the control point currently knows
    fn find_device(&self, id: &str) -> Option<RendererDevice>;

    /// Locate a service on a device
    fn find_capability(
        &self,
        device: &RendererDevice,
        capability: Capability,
    ) -> Option<ServiceHandle>;

    async fn set_transport_uri(
        &self,
        handle: &ServiceHandle,
        url: &str,
        metadata: &str,
    ) -> Result<(), CommandError>;

    async fn play(&self, handle: &ServiceHandle) -> Result<(), CommandError>;

    async fn pause(&self, handle: &ServiceHandle) -> Result<(), CommandError>;

    async fn stop(&self, handle: &ServiceHandle) -> Result<(), CommandError>;

    /// Seek to an absolute `HH:MM:SS` timecode
    async fn seek(&self, handle: &ServiceHandle, timecode: &str) -> Result<(), CommandError>;

    async fn get_position_info(&self, handle: &ServiceHandle)
        -> Result<PositionInfo, CommandError>;

    async fn set_volume(&self, handle: &ServiceHandle, percent: u8) -> Result<(), CommandError>;

    async fn get_volume(&self, handle: &ServiceHandle) -> Result<u8, CommandError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_action_names() {
        assert_eq!(Command::SetTransportUri.to_string(), "SetAVTransportURI");
        assert_eq!(Command::GetPositionInfo.action(), "GetPositionInfo");
    }

    #[test]
    fn test_command_error_display() {
        let err = CommandError::new("701 Transition not available");
        assert_eq!(err.to_string(), "701 Transition not available");
    }
}
