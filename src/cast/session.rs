//! Cast session orchestrator
//!
//! Owns the one active [`CastSession`] and sequences transport commands
//! against its device. Commands are single-flight: while one is pending every
//! other command fails fast with [`CastError::Busy`], except `stop()` which
//! waits its turn so a session can always be ended.
//!
//! State only moves along [`TransportState::can_transition_to`]. Set-source
//! and play failures land in `Error`; seek and volume failures are logged and
//! reported as notices without touching the state.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{broadcast, Notify};
use tokio_util::sync::CancellationToken;

use super::control::{Command, CommandError, DeviceControl, ServiceHandle};
use super::didl;
use super::poller::{SessionWatch, DEFAULT_POLL_INTERVAL};
use super::registry::DeviceRegistry;
use super::store::{MemorySessionStore, SessionStore};
use crate::models::{
    format_timecode, CastSession, Capability, ContentReference, ContentSource, RendererDevice,
    TransportState,
};
use crate::stream::resolver::{guess_mime, ContentResolver, MediaResolver, ResolveError};
use crate::stream::server::{media_url, ActiveContent};

/// Cast errors surfaced to the presentation layer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CastError {
    #[error("Content not found: {0}")]
    NotFound(String),

    #[error("Unsupported device: {0}")]
    UnsupportedDevice(String),

    #[error("No usable local network address for streaming")]
    NetworkUnavailable,

    #[error("{command} failed: {reason}")]
    CommandFailed { command: Command, reason: String },

    #[error("Lost connection to {0}")]
    DeviceLost(String),

    #[error("Cannot {action} while {state:?}")]
    InvalidState {
        action: &'static str,
        state: TransportState,
    },

    #[error("Another command is still pending")]
    Busy,

    #[error("No active cast session")]
    NoSession,
}

impl CastError {
    fn command(command: Command, err: CommandError) -> Self {
        CastError::CommandFailed {
            command,
            reason: err.reason,
        }
    }
}

/// Updates pushed to whoever observes the session
#[derive(Debug, Clone, PartialEq)]
pub enum CastEvent {
    StateChanged(TransportState),
    PositionUpdated { position_secs: u64, duration_secs: u64 },
    VolumeUpdated(u8),
    /// Transient, non-fatal problem worth showing the user
    Notice(String),
}

/// Where the LAN address for streaming URLs comes from
pub type AddressSource = Arc<dyn Fn() -> Option<IpAddr> + Send + Sync>;

fn detect_address() -> Option<IpAddr> {
    local_ip_address::local_ip().ok()
}

/// Controls the UI reports as being dragged
#[derive(Debug, Default)]
struct DragState {
    position: AtomicBool,
    volume: AtomicBool,
}

struct ControllerInner {
    control: Arc<dyn DeviceControl>,
    registry: DeviceRegistry,
    resolver: Arc<dyn ContentResolver>,
    server: Option<(ActiveContent, u16)>,
    address: AddressSource,
    store: Arc<dyn SessionStore>,
    poll_interval: Duration,

    session: Mutex<Option<CastSession>>,
    gate: tokio::sync::Mutex<()>,
    events: broadcast::Sender<CastEvent>,
    drag: DragState,
    /// Parent of every poller's token; replaced on each stop
    pollers: Mutex<CancellationToken>,
    wake: Notify,
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`CastController`]
pub struct CastControllerBuilder {
    control: Arc<dyn DeviceControl>,
    registry: DeviceRegistry,
    resolver: Option<Arc<dyn ContentResolver>>,
    server: Option<(ActiveContent, u16)>,
    address: Option<AddressSource>,
    store: Option<Arc<dyn SessionStore>>,
    poll_interval: Duration,
}

impl CastControllerBuilder {
    pub fn resolver(mut self, resolver: Arc<dyn ContentResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Streaming server slot and port used for local content
    pub fn server(mut self, active: ActiveContent, port: u16) -> Self {
        self.server = Some((active, port));
        self
    }

    pub fn address_source(mut self, source: impl Fn() -> Option<IpAddr> + Send + Sync + 'static) -> Self {
        self.address = Some(Arc::new(source));
        self
    }

    /// Always advertise `ip` instead of detecting the LAN address
    pub fn advertise(self, ip: IpAddr) -> Self {
        self.address_source(move || Some(ip))
    }

    pub fn store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn build(self) -> CastController {
        let (events, _) = broadcast::channel(128);
        CastController {
            inner: Arc::new(ControllerInner {
                control: self.control,
                registry: self.registry,
                resolver: self
                    .resolver
                    .unwrap_or_else(|| Arc::new(MediaResolver::new()) as Arc<dyn ContentResolver>),
                server: self.server,
                address: self
                    .address
                    .unwrap_or_else(|| Arc::new(detect_address) as AddressSource),
                store: self
                    .store
                    .unwrap_or_else(|| Arc::new(MemorySessionStore::new()) as Arc<dyn SessionStore>),
                poll_interval: self.poll_interval,
                session: Mutex::new(None),
                gate: tokio::sync::Mutex::new(()),
                events,
                drag: DragState::default(),
                pollers: Mutex::new(CancellationToken::new()),
                wake: Notify::new(),
            }),
        }
    }
}

// =============================================================================
// Controller
// =============================================================================

/// Orchestrates the single cast session; clones share it
#[derive(Clone)]
pub struct CastController {
    inner: Arc<ControllerInner>,
}

impl CastController {
    pub fn builder(control: Arc<dyn DeviceControl>, registry: DeviceRegistry) -> CastControllerBuilder {
        CastControllerBuilder {
            control,
            registry,
            resolver: None,
            server: None,
            address: None,
            store: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Snapshot of the current session
    pub fn session(&self) -> Option<CastSession> {
        self.inner.session.lock().clone()
    }

    pub fn state(&self) -> TransportState {
        self.inner
            .session
            .lock()
            .as_ref()
            .map(|s| s.transport_state)
            .unwrap_or_default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CastEvent> {
        self.inner.events.subscribe()
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.inner.registry
    }

    /// Whether a command is in flight
    pub fn is_busy(&self) -> bool {
        self.inner.gate.try_lock().is_err()
    }

    /// Start observing the session; polling stops when the watch is dropped
    pub fn watch(&self) -> SessionWatch {
        let token = self.inner.pollers.lock().child_token();
        SessionWatch::spawn(self.clone(), token, self.inner.poll_interval)
    }

    // -------------------------------------------------------------------------
    // Transport
    // -------------------------------------------------------------------------

    /// Cast `source` to `device` and start playback
    ///
    /// # Errors
    /// - `UnsupportedDevice` - device unknown to the registry or without AVTransport
    /// - `NotFound` - the content does not resolve
    /// - `NetworkUnavailable` - local content but no LAN address to stream from
    /// - `CommandFailed` - the device rejected set-source or play (session is in `Error`)
    pub async fn start_cast(
        &self,
        device: &RendererDevice,
        source: ContentSource,
    ) -> Result<CastSession, CastError> {
        let _gate = self.inner.gate.try_lock().map_err(|_| CastError::Busy)?;

        let state = self.state();
        if !state.accepts_new_cast() {
            return Err(CastError::InvalidState {
                action: "start a cast",
                state,
            });
        }

        let device = self.inner.registry.get(&device.id).ok_or_else(|| {
            CastError::UnsupportedDevice(format!("{} is not a known renderer", device.name))
        })?;
        let transport = self
            .inner
            .control
            .find_capability(&device, Capability::AvTransport)
            .ok_or_else(|| {
                CastError::UnsupportedDevice(format!("{} has no AVTransport service", device.name))
            })?;

        let content = self.resolve(&source).await?;
        let url = self.stream_url(&source)?;
        let title = source.title();
        let metadata = didl::build_metadata(&title, &url, &content.mime_type, content.size);

        tracing::info!(device = %device.name, %url, mime = %content.mime_type, "Starting cast");

        *self.inner.session.lock() = Some(CastSession::new(device, Some(source), title));
        self.emit(CastEvent::StateChanged(TransportState::Setting));

        if let Err(e) = self
            .inner
            .control
            .set_transport_uri(&transport, &url, &metadata)
            .await
        {
            return Err(self.fail(Command::SetTransportUri, e));
        }
        if let Err(e) = self.inner.control.play(&transport).await {
            return Err(self.fail(Command::Play, e));
        }

        self.transition(TransportState::Playing);
        self.persist();
        // Volume is queried once up front, not polled
        self.refresh_volume().await;

        self.session().ok_or(CastError::NoSession)
    }

    /// Pause playback (only from `Playing`)
    pub async fn pause(&self) -> Result<(), CastError> {
        let _gate = self.inner.gate.try_lock().map_err(|_| CastError::Busy)?;
        let session = self.require("pause", &[TransportState::Playing])?;
        let transport = self.handle(&session.device, Capability::AvTransport)?;

        match self.inner.control.pause(&transport).await {
            Ok(()) => {
                self.transition(TransportState::Paused);
                self.persist();
                Ok(())
            }
            Err(e) => Err(self.fail(Command::Pause, e)),
        }
    }

    /// Resume playback (only from `Paused`)
    pub async fn resume(&self) -> Result<(), CastError> {
        let _gate = self.inner.gate.try_lock().map_err(|_| CastError::Busy)?;
        let session = self.require("resume", &[TransportState::Paused])?;
        let transport = self.handle(&session.device, Capability::AvTransport)?;

        match self.inner.control.play(&transport).await {
            Ok(()) => {
                self.transition(TransportState::Playing);
                self.persist();
                Ok(())
            }
            Err(e) => Err(self.fail(Command::Play, e)),
        }
    }

    /// Seek to an absolute position; a device failure is only a notice
    pub async fn seek(&self, target_secs: u64) -> Result<(), CastError> {
        let _gate = self.inner.gate.try_lock().map_err(|_| CastError::Busy)?;
        let session = self.require("seek", &[TransportState::Playing, TransportState::Paused])?;
        let transport = self.handle(&session.device, Capability::AvTransport)?;

        let timecode = format_timecode(target_secs);
        match self.inner.control.seek(&transport, &timecode).await {
            Ok(()) => {
                tracing::info!(%timecode, "Seeked");
                let duration = self.update(|s| {
                    s.position_secs = target_secs;
                    s.duration_secs
                });
                if let Some(duration_secs) = duration {
                    self.emit(CastEvent::PositionUpdated {
                        position_secs: target_secs,
                        duration_secs,
                    });
                }
            }
            Err(e) => self.notice(Command::Seek, e),
        }
        Ok(())
    }

    /// Seek relative to the last known position
    pub async fn seek_by(&self, delta_secs: i64) -> Result<(), CastError> {
        let current = self.session().ok_or(CastError::NoSession)?.position_secs;
        let target = current.saturating_add_signed(delta_secs);
        self.seek(target).await
    }

    /// Set the volume, clamped to `[0, 100]`; a device failure is only a notice
    pub async fn set_volume(&self, percent: i32) -> Result<(), CastError> {
        let _gate = self.inner.gate.try_lock().map_err(|_| CastError::Busy)?;
        let session = self.session().ok_or(CastError::NoSession)?;
        self.ensure_present(&session)?;
        self.apply_volume(&session, percent).await
    }

    /// Change the volume by `delta` steps from the device's current level
    pub async fn adjust_volume(&self, delta: i32) -> Result<(), CastError> {
        let _gate = self.inner.gate.try_lock().map_err(|_| CastError::Busy)?;
        let session = self.session().ok_or(CastError::NoSession)?;
        self.ensure_present(&session)?;

        let current = match session.volume_percent {
            Some(volume) => volume,
            None => {
                let rendering = self.handle(&session.device, Capability::RenderingControl)?;
                self.inner
                    .control
                    .get_volume(&rendering)
                    .await
                    .map_err(|e| CastError::command(Command::GetVolume, e))?
            }
        };
        self.apply_volume(&session, i32::from(current) + delta).await
    }

    async fn apply_volume(&self, session: &CastSession, percent: i32) -> Result<(), CastError> {
        let rendering = self.handle(&session.device, Capability::RenderingControl)?;
        let volume = percent.clamp(0, 100) as u8;

        match self.inner.control.set_volume(&rendering, volume).await {
            Ok(()) => {
                tracing::info!(volume, "Volume set");
                self.update(|s| s.volume_percent = Some(volume));
                self.emit(CastEvent::VolumeUpdated(volume));
            }
            Err(e) => self.notice(Command::SetVolume, e),
        }
        Ok(())
    }

    /// End the session from any state
    ///
    /// Waits for a pending command instead of failing with `Busy`. The stop
    /// command is best-effort; the session ends in `Stopped` either way.
    pub async fn stop(&self) -> Result<(), CastError> {
        let _gate = self.inner.gate.lock().await;
        self.cancel_pollers();

        let session = self.session();
        if let Some(session) = &session {
            self.force_state(TransportState::Stopping);
            match self
                .inner
                .control
                .find_capability(&session.device, Capability::AvTransport)
            {
                Some(transport) => {
                    if let Err(e) = self.inner.control.stop(&transport).await {
                        tracing::warn!(device = %session.device.name, error = %e, "Stop command failed");
                    }
                }
                None => tracing::debug!(device = %session.device.name, "No transport to stop"),
            }
            self.force_state(TransportState::Stopped);
        }

        self.release();
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Rehydration
    // -------------------------------------------------------------------------

    /// Rebuild the session from the persisted record
    ///
    /// Returns `Ok(None)` when nothing was persisted. The device is looked up
    /// in the registry and control resumes, playing or paused as last
    /// recorded, without re-sending set-source or play.
    ///
    /// # Errors
    /// - `DeviceLost` - the device is gone; the session is `Stopped` and the record cleared
    pub async fn restore(&self) -> Result<Option<CastSession>, CastError> {
        let _gate = self.inner.gate.try_lock().map_err(|_| CastError::Busy)?;

        if let Some(session) = self.session().filter(|s| s.transport_state.is_active()) {
            return Ok(Some(session));
        }

        let record = match self.inner.store.load() {
            Ok(Some(record)) => record,
            Ok(None) => return Ok(None),
            Err(e) => {
                tracing::warn!(error = %e, "Could not read session record");
                return Ok(None);
            }
        };

        match self.inner.registry.get(&record.device_id) {
            Some(device) => {
                tracing::info!(device = %device.name, title = %record.title, "Session restored");
                let state = if record.paused {
                    TransportState::Paused
                } else {
                    TransportState::Playing
                };
                let mut session = CastSession::new(device, None, record.title);
                session.transport_state = state;
                *self.inner.session.lock() = Some(session);
                self.emit(CastEvent::StateChanged(state));
                Ok(self.session())
            }
            None => {
                tracing::warn!(device = %record.device_name, "Persisted device is gone");
                let placeholder = RendererDevice::new(record.device_id, record.device_name.clone());
                let mut session = CastSession::new(placeholder, None, record.title);
                session.transport_state = TransportState::Stopped;
                *self.inner.session.lock() = Some(session);
                self.emit(CastEvent::StateChanged(TransportState::Stopped));
                self.release();
                Err(CastError::DeviceLost(record.device_name))
            }
        }
    }

    // -------------------------------------------------------------------------
    // Polling support
    // -------------------------------------------------------------------------

    /// The UI started or stopped dragging the position control
    pub fn set_position_drag(&self, dragging: bool) {
        let was = self.inner.drag.position.swap(dragging, Ordering::AcqRel);
        if was && !dragging {
            self.inner.wake.notify_waiters();
        }
    }

    /// The UI started or stopped dragging the volume control
    pub fn set_volume_drag(&self, dragging: bool) {
        self.inner.drag.volume.store(dragging, Ordering::Release);
    }

    pub(crate) fn wake(&self) -> &Notify {
        &self.inner.wake
    }

    /// Query the device position once and apply it to the session
    ///
    /// Returns `(position, duration)` when the device answered. Nothing is
    /// applied while the position control is being dragged.
    pub async fn poll_position(&self) -> Option<(u64, u64)> {
        let session = self.session().filter(|s| s.transport_state.is_active())?;
        let transport = self
            .inner
            .control
            .find_capability(&session.device, Capability::AvTransport)?;

        let info = match self.inner.control.get_position_info(&transport).await {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(device = %session.device.name, error = %e, "Position query failed");
                return None;
            }
        };
        let position_secs = info.elapsed_secs();
        let reported_duration = info.duration_secs();

        if self.inner.drag.position.load(Ordering::Acquire) {
            tracing::debug!(position_secs, "Position update suppressed while dragging");
            return Some((position_secs, reported_duration));
        }

        let duration_secs = self.update_if(&session.device.id, |s| {
            s.position_secs = position_secs;
            if reported_duration > 0 {
                s.duration_secs = reported_duration;
            }
            s.duration_secs
        })?;
        self.emit(CastEvent::PositionUpdated {
            position_secs,
            duration_secs,
        });
        Some((position_secs, duration_secs))
    }

    /// Query the device volume once (session start, volume control shown)
    pub async fn refresh_volume(&self) -> Option<u8> {
        let session = self.session()?;
        let rendering = self
            .inner
            .control
            .find_capability(&session.device, Capability::RenderingControl)?;

        let volume = match self.inner.control.get_volume(&rendering).await {
            Ok(volume) => volume.min(100),
            Err(e) => {
                tracing::warn!(device = %session.device.name, error = %e, "Volume query failed");
                return None;
            }
        };
        if self.inner.drag.volume.load(Ordering::Acquire) {
            return Some(volume);
        }

        self.update_if(&session.device.id, |s| s.volume_percent = Some(volume))?;
        self.emit(CastEvent::VolumeUpdated(volume));
        Some(volume)
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    async fn resolve(&self, source: &ContentSource) -> Result<ContentReference, CastError> {
        match self.inner.resolver.resolve(source).await {
            Ok(content) => Ok(content),
            Err(ResolveError::NotFound(what)) => Err(CastError::NotFound(what)),
            Err(e) if source.is_local() => Err(CastError::NotFound(format!("{}: {}", source, e))),
            // The renderer fetches remote URLs itself; a failed probe only costs metadata
            Err(e) => {
                tracing::debug!(%source, error = %e, "Probe failed, guessing content type");
                Ok(ContentReference {
                    source: source.clone(),
                    mime_type: guess_mime(source),
                    size: None,
                })
            }
        }
    }

    /// URL the renderer should fetch; publishes local content on the server
    fn stream_url(&self, source: &ContentSource) -> Result<String, CastError> {
        match source {
            ContentSource::Remote(url) => Ok(url.clone()),
            ContentSource::Local(_) => {
                let (active, port) = self.inner.server.as_ref().ok_or(CastError::NetworkUnavailable)?;
                let ip = (self.inner.address)()
                    .filter(|ip| !ip.is_loopback() && !ip.is_unspecified())
                    .ok_or(CastError::NetworkUnavailable)?;
                active.set(source.clone());
                Ok(media_url(ip, *port))
            }
        }
    }

    /// Session in one of `allowed`, whose device is still registered
    fn require(
        &self,
        action: &'static str,
        allowed: &[TransportState],
    ) -> Result<CastSession, CastError> {
        let session = self.session().ok_or(CastError::NoSession)?;
        self.ensure_present(&session)?;
        if !allowed.contains(&session.transport_state) {
            return Err(CastError::InvalidState {
                action,
                state: session.transport_state,
            });
        }
        Ok(session)
    }

    /// Treat a device missing from the registry as a lost connection
    fn ensure_present(&self, session: &CastSession) -> Result<(), CastError> {
        if self.inner.registry.contains(&session.device.id) {
            return Ok(());
        }
        tracing::warn!(device = %session.device.name, "Device disappeared, ending session");
        self.cancel_pollers();
        self.force_state(TransportState::Stopped);
        self.release();
        self.emit(CastEvent::Notice(format!("Lost connection to {}", session.device.name)));
        Err(CastError::DeviceLost(session.device.name.clone()))
    }

    fn handle(&self, device: &RendererDevice, capability: Capability) -> Result<ServiceHandle, CastError> {
        self.inner
            .control
            .find_capability(device, capability)
            .ok_or_else(|| CastError::UnsupportedDevice(format!("{} has no {} service", device.name, capability)))
    }

    /// Move along the state machine, ignoring transitions it does not allow
    fn transition(&self, next: TransportState) {
        let moved = {
            let mut guard = self.inner.session.lock();
            match guard.as_mut() {
                Some(s) if s.transport_state.can_transition_to(next) => {
                    s.transport_state = next;
                    if next != TransportState::Error {
                        s.last_error = None;
                    }
                    true
                }
                Some(s) => {
                    tracing::debug!(from = ?s.transport_state, to = ?next, "Ignoring invalid transition");
                    false
                }
                None => false,
            }
        };
        if moved {
            tracing::info!(state = ?next, "Transport state changed");
            self.emit(CastEvent::StateChanged(next));
        }
    }

    /// Stop path: `Stopping` is reachable from anywhere and `Stopped` follows it
    fn force_state(&self, next: TransportState) {
        let changed = {
            let mut guard = self.inner.session.lock();
            match guard.as_mut() {
                Some(s) if s.transport_state != next => {
                    s.transport_state = next;
                    true
                }
                _ => false,
            }
        };
        if changed {
            tracing::info!(state = ?next, "Transport state changed");
            self.emit(CastEvent::StateChanged(next));
        }
    }

    /// Enter `Error` with the device's reason and build the caller's error
    fn fail(&self, command: Command, err: CommandError) -> CastError {
        tracing::error!(%command, reason = %err, "Command failed");
        self.update(|s| s.last_error = Some(err.reason.clone()));
        self.transition(TransportState::Error);
        CastError::command(command, err)
    }

    /// Best-effort command failure: log and tell observers
    fn notice(&self, command: Command, err: CommandError) {
        tracing::warn!(%command, reason = %err, "Command failed");
        self.emit(CastEvent::Notice(format!("{} failed: {}", command, err)));
    }

    fn update<R>(&self, f: impl FnOnce(&mut CastSession) -> R) -> Option<R> {
        self.inner.session.lock().as_mut().map(f)
    }

    /// Apply `f` only if the session is still active on `device_id`
    fn update_if<R>(&self, device_id: &str, f: impl FnOnce(&mut CastSession) -> R) -> Option<R> {
        let mut guard = self.inner.session.lock();
        guard
            .as_mut()
            .filter(|s| s.device.id == device_id && s.transport_state.is_active())
            .map(f)
    }

    fn persist(&self) {
        if let Some(session) = self.session() {
            if let Err(e) = self.inner.store.save(&session.record()) {
                tracing::warn!(error = %e, "Could not persist session");
            }
        }
    }

    /// Stop serving content and forget the persisted record
    fn release(&self) {
        if let Some((active, _)) = &self.inner.server {
            if active.clear().is_some() {
                tracing::debug!("Active content cleared");
            }
        }
        if let Err(e) = self.inner.store.clear() {
            tracing::warn!(error = %e, "Could not clear session record");
        }
    }

    fn cancel_pollers(&self) {
        let previous = std::mem::replace(&mut *self.inner.pollers.lock(), CancellationToken::new());
        previous.cancel();
    }

    fn emit(&self, event: CastEvent) {
        let _ = self.inner.events.send(event);
    }
}
