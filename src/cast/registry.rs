//! Device registry
//!
//! Mirrors the discovery feed into an ordered, de-duplicated list of
//! renderers. Adding a known id or removing an unknown one changes nothing
//! and emits nothing; every effective change is broadcast to observers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use super::control::{CommandError, DeviceControl, DiscoveryEvent};
use crate::models::RendererDevice;

/// Default time a search keeps the "searching" indicator up
pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Change notification for device list observers
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    Added(RendererDevice),
    Removed(RendererDevice),
    /// A new search dropped every known device
    Cleared,
}

struct RegistryInner {
    devices: RwLock<Vec<RendererDevice>>,
    events: broadcast::Sender<RegistryEvent>,
    searching: watch::Sender<bool>,
    search_generation: AtomicU64,
}

/// Known renderer devices, shared between discovery and the orchestrator
#[derive(Clone)]
pub struct DeviceRegistry {
    inner: Arc<RegistryInner>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        let (searching, _) = watch::channel(false);
        Self {
            inner: Arc::new(RegistryInner {
                devices: RwLock::new(Vec::new()),
                events,
                searching,
                search_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Record a discovered device; `false` if its id was already known
    pub fn on_device_added(&self, device: RendererDevice) -> bool {
        {
            let mut devices = self.inner.devices.write();
            if devices.iter().any(|d| d.id == device.id) {
                return false;
            }
            devices.push(device.clone());
        }

        tracing::info!(id = %device.id, name = %device.name, "Device added");
        self.inner.searching.send_replace(false);
        let _ = self.inner.events.send(RegistryEvent::Added(device));
        true
    }

    /// Forget a device; `false` if it was not known
    pub fn on_device_removed(&self, device: &RendererDevice) -> bool {
        let removed = {
            let mut devices = self.inner.devices.write();
            match devices.iter().position(|d| d.id == device.id) {
                Some(idx) => devices.remove(idx),
                None => return false,
            }
        };

        tracing::info!(id = %removed.id, name = %removed.name, "Device removed");
        let _ = self.inner.events.send(RegistryEvent::Removed(removed));
        true
    }

    /// Drop every known device
    pub fn clear(&self) {
        let had_devices = {
            let mut devices = self.inner.devices.write();
            let had = !devices.is_empty();
            devices.clear();
            had
        };
        if had_devices {
            let _ = self.inner.events.send(RegistryEvent::Cleared);
        }
    }

    /// Devices in discovery order
    pub fn devices(&self) -> Vec<RendererDevice> {
        self.inner.devices.read().clone()
    }

    pub fn get(&self, id: &str) -> Option<RendererDevice> {
        self.inner.devices.read().iter().find(|d| d.id == id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.devices.read().iter().any(|d| d.id == id)
    }

    /// Find a device by id or display name
    pub fn find(&self, selector: &str) -> Option<RendererDevice> {
        self.inner
            .devices
            .read()
            .iter()
            .find(|d| d.matches(selector))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.devices.read().is_empty()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.inner.events.subscribe()
    }

    pub fn is_searching(&self) -> bool {
        *self.inner.searching.borrow()
    }

    /// Watch the "searching" indicator
    pub fn watch_searching(&self) -> watch::Receiver<bool> {
        self.inner.searching.subscribe()
    }

    /// Feed discovery callbacks into the registry until the feed closes
    ///
    /// Devices that are not media renderers are ignored.
    pub fn attach(&self, mut feed: broadcast::Receiver<DiscoveryEvent>) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            loop {
                match feed.recv().await {
                    Ok(DiscoveryEvent::Added(device)) => {
                        if device.is_media_renderer() {
                            registry.on_device_added(device);
                        } else {
                            tracing::debug!(id = %device.id, kind = %device.device_type, "Ignoring non-renderer device");
                        }
                    }
                    Ok(DiscoveryEvent::Removed(device)) => {
                        registry.on_device_removed(&device);
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Discovery feed lagged, some devices may be missing");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            tracing::debug!("Discovery feed closed");
        })
    }

    /// Forget known devices and start a new discovery search
    ///
    /// The searching indicator stays up until a device is added or
    /// `timeout` elapses, whichever comes first.
    pub async fn search(
        &self,
        control: &dyn DeviceControl,
        timeout: Duration,
    ) -> Result<(), CommandError> {
        self.clear();
        let generation = self.inner.search_generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.inner.searching.send_replace(true);

        if let Err(e) = control.search().await {
            self.inner.searching.send_replace(false);
            tracing::warn!(error = %e, "Discovery search failed");
            return Err(e);
        }

        let inner = Arc::clone(&self.inner);
        let mut searching = self.inner.searching.subscribe();
        tokio::spawn(async move {
            let _ = tokio::time::timeout(timeout, searching.wait_for(|s| !*s)).await;
            // A newer search owns the indicator now
            if inner.search_generation.load(Ordering::Acquire) == generation {
                inner.searching.send_replace(false);
            }
        });

        Ok(())
    }

    /// Wait until a device matching `selector` is known
    pub async fn wait_for_device(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Option<RendererDevice> {
        let mut events = self.subscribe();
        if let Some(device) = self.find(selector) {
            return Some(device);
        }

        let wait = async {
            loop {
                match events.recv().await {
                    Ok(RegistryEvent::Added(device)) if device.matches(selector) => {
                        return Some(device)
                    }
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        if let Some(device) = self.find(selector) {
                            return Some(device);
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        };
        tokio::time::timeout(timeout, wait).await.ok().flatten()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
