//! Casting subsystem lifetime
//!
//! [`App`] wires the pieces together for one process: it holds the network
//! lock, runs the streaming server, feeds discovery into the registry and owns
//! the cast orchestrator. Binding the streaming port is the only failure that
//! stops it from starting.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::cast::{
    CastController, CommandError, DeviceControl, DeviceRegistry, FileSessionStore,
    MemorySessionStore, SessionStore, DEFAULT_POLL_INTERVAL, DEFAULT_SEARCH_TIMEOUT,
};
use crate::config::Config;
use crate::models::RendererDevice;
use crate::stream::server::{media_url, DEFAULT_PORT};
use crate::stream::{ContentResolver, MediaResolver, MediaServer, NetworkLock, NetworkLockGuard, ServerError};

/// Time allowed for the rest of the devices to answer after the first one
const DISCOVERY_SETTLE: Duration = Duration::from_millis(300);

// =============================================================================
// Options
// =============================================================================

/// Everything [`App::start`] needs to know
#[derive(Debug, Clone)]
pub struct AppOptions {
    pub bind_ip: IpAddr,
    pub port: u16,
    pub advertise_ip: Option<IpAddr>,
    pub search_timeout: Duration,
    pub poll_interval: Duration,
    /// `None` keeps the session record in memory
    pub session_file: Option<PathBuf>,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            advertise_ip: None,
            search_timeout: DEFAULT_SEARCH_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            session_file: None,
        }
    }
}

impl From<&Config> for AppOptions {
    fn from(config: &Config) -> Self {
        Self {
            port: config.port(),
            advertise_ip: config.advertise_ip,
            search_timeout: config.search_timeout(),
            poll_interval: config.poll_interval(),
            session_file: config.session_file(),
            ..Default::default()
        }
    }
}

// =============================================================================
// App
// =============================================================================

/// Running casting subsystem
pub struct App {
    control: Arc<dyn DeviceControl>,
    registry: DeviceRegistry,
    controller: CastController,
    server: MediaServer,
    discovery: JoinHandle<()>,
    options: AppOptions,
    // Dropped last: the lock outlives everything that needs the network
    _lock: NetworkLockGuard,
}

impl App {
    /// Take the network lock, bind the streaming server and start discovery
    ///
    /// # Errors
    /// - `ServerError::Bind` - the streaming port is unavailable (fatal)
    pub async fn start(
        control: Arc<dyn DeviceControl>,
        lock: &NetworkLock,
        options: AppOptions,
    ) -> Result<Self, ServerError> {
        let guard = lock.acquire();
        let resolver: Arc<dyn ContentResolver> = Arc::new(MediaResolver::new());

        let server = MediaServer::bind(SocketAddr::new(options.bind_ip, options.port), Arc::clone(&resolver)).await?;

        let registry = DeviceRegistry::new();
        let discovery = registry.attach(control.subscribe());

        let store: Arc<dyn SessionStore> = match &options.session_file {
            Some(path) => Arc::new(FileSessionStore::new(path)),
            None => Arc::new(MemorySessionStore::new()),
        };

        let mut builder = CastController::builder(Arc::clone(&control), registry.clone())
            .resolver(resolver)
            .server(server.active().clone(), server.port())
            .store(store)
            .poll_interval(options.poll_interval);
        if let Some(ip) = options.advertise_ip {
            builder = builder.advertise(ip);
        }

        tracing::info!(port = server.port(), "Casting subsystem started");

        Ok(Self {
            control,
            registry,
            controller: builder.build(),
            server,
            discovery,
            options,
            _lock: guard,
        })
    }

    pub fn controller(&self) -> &CastController {
        &self.controller
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn server(&self) -> &MediaServer {
        &self.server
    }

    /// Start a fresh search; the registry fills in as devices answer
    pub async fn search(&self) -> Result<(), CommandError> {
        self.registry
            .search(self.control.as_ref(), self.options.search_timeout)
            .await
    }

    /// Search and collect what answers
    ///
    /// Returns once the first device has been settled on for a moment, or
    /// empty after the search timeout.
    pub async fn discover(&self) -> Result<Vec<RendererDevice>, CommandError> {
        let mut searching = self.registry.watch_searching();
        self.search().await?;

        let _ = tokio::time::timeout(
            self.options.search_timeout,
            searching.wait_for(|s| !*s),
        )
        .await;
        if !self.registry.is_empty() {
            tokio::time::sleep(DISCOVERY_SETTLE).await;
        }
        Ok(self.registry.devices())
    }

    /// Find a device by id or name, searching if it is not known yet
    ///
    /// Without a selector the first renderer found is used.
    pub async fn find_device(&self, selector: Option<&str>) -> Result<Option<RendererDevice>, CommandError> {
        match selector {
            Some(selector) => {
                if let Some(device) = self.registry.find(selector) {
                    return Ok(Some(device));
                }
                self.search().await?;
                Ok(self
                    .registry
                    .wait_for_device(selector, self.options.search_timeout)
                    .await)
            }
            None => Ok(self.discover().await?.into_iter().next()),
        }
    }

    /// URL of the served content as renderers see it
    pub fn media_url(&self) -> String {
        let host = self
            .options
            .advertise_ip
            .or_else(|| local_ip_address::local_ip().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        media_url(host, self.server.port())
    }

    /// Stop discovery and the server, then release the network lock
    ///
    /// A playing session is left alone; only an explicit stop ends it.
    pub async fn shutdown(self) {
        self.discovery.abort();
        self.server.shutdown().await;
        tracing::info!("Casting subsystem stopped");
    }
}
