//! Simulated renderer network
//!
//! An in-process [`DeviceControl`] that behaves like a handful of renderers:
//! discovery announces them, transport commands move a virtual playhead, and
//! failures can be injected per command. The CLI drives it because the UPnP
//! wire protocol is not implemented here; tests use it for deterministic
//! scenarios (the playhead follows `tokio::time`, so paused-clock tests work).

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::cast::control::{Command, CommandError, DeviceControl, DiscoveryEvent, ServiceHandle};
use crate::models::{parse_timecode, Capability, PositionInfo, RendererDevice};

/// Length reported for anything cast to a simulated renderer
pub const DEFAULT_MEDIA_DURATION: u64 = 5400;

const TRANSITION_NOT_AVAILABLE: &str = "701 Transition not available";

/// Virtual playhead and mixer of one simulated renderer
#[derive(Debug)]
struct SimRenderer {
    device: RendererDevice,
    online: bool,
    uri: Option<String>,
    metadata: Option<String>,
    playing: bool,
    /// Position accumulated before the current play run
    offset: Duration,
    started_at: Option<Instant>,
    volume: u8,
}

impl SimRenderer {
    fn new(device: RendererDevice) -> Self {
        Self {
            device,
            online: true,
            uri: None,
            metadata: None,
            playing: false,
            offset: Duration::ZERO,
            started_at: None,
            volume: 30,
        }
    }

    fn position(&self, duration: u64) -> u64 {
        let running = self.started_at.map(|t| t.elapsed()).unwrap_or_default();
        (self.offset + running).as_secs().min(duration)
    }

    fn freeze(&mut self) {
        if let Some(started) = self.started_at.take() {
            self.offset += started.elapsed();
        }
        self.playing = false;
    }
}

/// Simulated control point with a few renderers on a fake LAN
pub struct SimulatedNetwork {
    renderers: Mutex<Vec<SimRenderer>>,
    events: broadcast::Sender<DiscoveryEvent>,
    failures: Mutex<HashMap<Command, String>>,
    log: Mutex<Vec<(String, Command)>>,
    latency: Duration,
    media_duration: u64,
}

impl Default for SimulatedNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedNetwork {
    /// Network with a TV, a speaker and a media server (which is not a renderer)
    pub fn new() -> Self {
        Self::empty()
            .with_device(
                RendererDevice::new("uuid:sim-living-room", "Living Room TV")
                    .with_model("Simulated Renderer")
                    .with_address(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 50)))
                    .with_capability(Capability::AvTransport)
                    .with_capability(Capability::RenderingControl)
                    .with_capability(Capability::ConnectionManager),
            )
            .with_device(
                RendererDevice::new("uuid:sim-kitchen", "Kitchen Speaker")
                    .with_model("Simulated Speaker")
                    .with_address(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 51)))
                    .with_capability(Capability::AvTransport)
                    .with_capability(Capability::RenderingControl),
            )
            .with_device(
                RendererDevice::new("uuid:sim-nas", "Home NAS")
                    .with_device_type("MediaServer")
                    .with_address(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)))
                    .with_capability(Capability::ConnectionManager),
            )
    }

    /// Network with no devices at all
    pub fn empty() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            renderers: Mutex::new(Vec::new()),
            events,
            failures: Mutex::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
            latency: Duration::ZERO,
            media_duration: DEFAULT_MEDIA_DURATION,
        }
    }

    pub fn with_device(self, device: RendererDevice) -> Self {
        self.renderers.lock().push(SimRenderer::new(device));
        self
    }

    /// Delay every command by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_media_duration(mut self, secs: u64) -> Self {
        self.media_duration = secs;
        self
    }

    /// Make the next `command` fail with `reason`
    pub fn fail_next(&self, command: Command, reason: impl Into<String>) {
        self.failures.lock().insert(command, reason.into());
    }

    /// Bring a device up or down, announcing the change
    pub fn set_online(&self, id: &str, online: bool) {
        let event = {
            let mut renderers = self.renderers.lock();
            let Some(renderer) = renderers.iter_mut().find(|r| r.device.id == id) else {
                return;
            };
            if renderer.online == online {
                return;
            }
            renderer.online = online;
            if online {
                DiscoveryEvent::Added(renderer.device.clone())
            } else {
                renderer.freeze();
                DiscoveryEvent::Removed(renderer.device.clone())
            }
        };
        let _ = self.events.send(event);
    }

    /// Pretend the device is already playing something
    ///
    /// Stands in for a renderer that kept playing while the process that
    /// started the cast went away.
    pub fn assume_playing(&self, id: &str, uri: &str) {
        let mut renderers = self.renderers.lock();
        if let Some(renderer) = renderers.iter_mut().find(|r| r.device.id == id) {
            renderer.uri = Some(uri.to_string());
            renderer.playing = true;
            renderer.started_at = Some(Instant::now());
        }
    }

    /// Pretend the device holds `uri` with playback paused at the start
    pub fn assume_paused(&self, id: &str, uri: &str) {
        let mut renderers = self.renderers.lock();
        if let Some(renderer) = renderers.iter_mut().find(|r| r.device.id == id) {
            renderer.uri = Some(uri.to_string());
            renderer.playing = false;
            renderer.started_at = None;
        }
    }

    /// Commands received so far, with the device they targeted
    pub fn commands(&self) -> Vec<(String, Command)> {
        self.log.lock().clone()
    }

    /// How many times `command` was received
    pub fn count(&self, command: Command) -> usize {
        self.log.lock().iter().filter(|(_, c)| *c == command).count()
    }

    /// URI the device was last told to play
    pub fn current_uri(&self, id: &str) -> Option<String> {
        self.with_renderer(id, |r| r.uri.clone()).flatten()
    }

    pub fn current_metadata(&self, id: &str) -> Option<String> {
        self.with_renderer(id, |r| r.metadata.clone()).flatten()
    }

    pub fn is_playing(&self, id: &str) -> bool {
        self.with_renderer(id, |r| r.playing).unwrap_or(false)
    }

    fn with_renderer<R>(&self, id: &str, f: impl FnOnce(&SimRenderer) -> R) -> Option<R> {
        self.renderers.lock().iter().find(|r| r.device.id == id).map(f)
    }

    /// Shared command path: latency, logging, reachability, injected failures
    async fn execute<R>(
        &self,
        handle: &ServiceHandle,
        command: Command,
        f: impl FnOnce(&mut SimRenderer, u64) -> Result<R, CommandError>,
    ) -> Result<R, CommandError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.log.lock().push((handle.device_id.clone(), command));
        tracing::debug!(device = %handle.device_id, %command, "Simulated command");

        if let Some(reason) = self.failures.lock().remove(&command) {
            return Err(CommandError::new(reason));
        }

        let mut renderers = self.renderers.lock();
        let renderer = renderers
            .iter_mut()
            .find(|r| r.device.id == handle.device_id && r.online)
            .ok_or_else(|| CommandError::new("Device unreachable"))?;
        f(renderer, self.media_duration)
    }
}

#[async_trait]
impl DeviceControl for SimulatedNetwork {
    async fn search(&self) -> Result<(), CommandError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let online: Vec<RendererDevice> = self
            .renderers
            .lock()
            .iter()
            .filter(|r| r.online)
            .map(|r| r.device.clone())
            .collect();
        tracing::debug!(count = online.len(), "Simulated search");
        for device in online {
            let _ = self.events.send(DiscoveryEvent::Added(device));
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.events.subscribe()
    }

    fn find_device(&self, id: &str) -> Option<RendererDevice> {
        self.renderers
            .lock()
            .iter()
            .find(|r| r.device.id == id && r.online)
            .map(|r| r.device.clone())
    }

    fn find_capability(
        &self,
        device: &RendererDevice,
        capability: Capability,
    ) -> Option<ServiceHandle> {
        self.with_renderer(&device.id, |r| r.device.supports(capability))
            .filter(|supported| *supported)
            .map(|_| ServiceHandle {
                device_id: device.id.clone(),
                capability,
            })
    }

    async fn set_transport_uri(
        &self,
        handle: &ServiceHandle,
        url: &str,
        metadata: &str,
    ) -> Result<(), CommandError> {
        self.execute(handle, Command::SetTransportUri, |r, _| {
            r.freeze();
            r.uri = Some(url.to_string());
            r.metadata = Some(metadata.to_string());
            r.offset = Duration::ZERO;
            Ok(())
        })
        .await
    }

    async fn play(&self, handle: &ServiceHandle) -> Result<(), CommandError> {
        self.execute(handle, Command::Play, |r, _| {
            if r.uri.is_none() {
                return Err(CommandError::new("716 Resource not found"));
            }
            if !r.playing {
                r.playing = true;
                r.started_at = Some(Instant::now());
            }
            Ok(())
        })
        .await
    }

    async fn pause(&self, handle: &ServiceHandle) -> Result<(), CommandError> {
        self.execute(handle, Command::Pause, |r, _| {
            if !r.playing {
                return Err(CommandError::new(TRANSITION_NOT_AVAILABLE));
            }
            r.freeze();
            Ok(())
        })
        .await
    }

    async fn stop(&self, handle: &ServiceHandle) -> Result<(), CommandError> {
        self.execute(handle, Command::Stop, |r, _| {
            r.freeze();
            r.offset = Duration::ZERO;
            r.uri = None;
            r.metadata = None;
            Ok(())
        })
        .await
    }

    async fn seek(&self, handle: &ServiceHandle, timecode: &str) -> Result<(), CommandError> {
        self.execute(handle, Command::Seek, |r, duration| {
            let target = parse_timecode(timecode)
                .ok_or_else(|| CommandError::new("711 Illegal seek target"))?;
            if r.uri.is_none() || target > duration {
                return Err(CommandError::new("711 Illegal seek target"));
            }
            r.offset = Duration::from_secs(target);
            if r.playing {
                r.started_at = Some(Instant::now());
            }
            Ok(())
        })
        .await
    }

    async fn get_position_info(
        &self,
        handle: &ServiceHandle,
    ) -> Result<PositionInfo, CommandError> {
        self.execute(handle, Command::GetPositionInfo, |r, duration| {
            if r.uri.is_none() {
                return Ok(PositionInfo::default());
            }
            Ok(PositionInfo::from_secs(r.position(duration), duration))
        })
        .await
    }

    async fn set_volume(&self, handle: &ServiceHandle, percent: u8) -> Result<(), CommandError> {
        self.execute(handle, Command::SetVolume, |r, _| {
            r.volume = percent.min(100);
            Ok(())
        })
        .await
    }

    async fn get_volume(&self, handle: &ServiceHandle) -> Result<u8, CommandError> {
        self.execute(handle, Command::GetVolume, |r, _| Ok(r.volume))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(capability: Capability) -> ServiceHandle {
        ServiceHandle {
            device_id: "uuid:sim-living-room".into(),
            capability,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_playhead_follows_clock() {
        let net = SimulatedNetwork::new();
        let av = handle(Capability::AvTransport);
        net.set_transport_uri(&av, "http://x/media", "").await.unwrap();
        net.play(&av).await.unwrap();

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(net.get_position_info(&av).await.unwrap().elapsed_secs(), 3);

        net.pause(&av).await.unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(net.get_position_info(&av).await.unwrap().elapsed_secs(), 3);
    }

    #[tokio::test]
    async fn test_injected_failure_fires_once() {
        let net = SimulatedNetwork::new();
        let av = handle(Capability::AvTransport);
        net.fail_next(Command::SetTransportUri, "714 Illegal MIME-type");

        let err = net.set_transport_uri(&av, "u", "").await.unwrap_err();
        assert_eq!(err.reason, "714 Illegal MIME-type");
        assert!(net.set_transport_uri(&av, "u", "").await.is_ok());
    }

    #[test]
    fn test_capability_lookup() {
        let net = SimulatedNetwork::new();
        let speaker = RendererDevice::new("uuid:sim-kitchen", "Kitchen Speaker");
        let nas = RendererDevice::new("uuid:sim-nas", "Home NAS");
        assert!(net.find_capability(&speaker, Capability::AvTransport).is_some());
        assert!(net.find_capability(&nas, Capability::AvTransport).is_none());
    }

    #[tokio::test]
    async fn test_offline_device_is_unreachable() {
        let net = SimulatedNetwork::new();
        let mut events = net.subscribe();
        net.set_online("uuid:sim-living-room", false);

        assert!(matches!(events.recv().await.unwrap(), DiscoveryEvent::Removed(_)));
        assert!(net.play(&handle(Capability::AvTransport)).await.is_err());
        assert!(net.find_device("uuid:sim-living-room").is_none());
    }
}
