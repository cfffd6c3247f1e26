//! Casting
//!
//! - Control: the device-control collaborator interface
//! - Registry: known renderers, fed by discovery
//! - Session: the cast orchestrator and its state machine
//! - Poller: position polling tied to an observer handle
//! - Store: persisted session record for cross-process hand-off
//! - Didl: DIDL-Lite metadata for set-source

pub mod control;
pub mod didl;
pub mod poller;
pub mod registry;
pub mod session;
pub mod store;

pub use control::{Command, CommandError, DeviceControl, DiscoveryEvent, ServiceHandle};
pub use poller::{SessionWatch, DEFAULT_POLL_INTERVAL};
pub use registry::{DeviceRegistry, RegistryEvent, DEFAULT_SEARCH_TIMEOUT};
pub use session::{CastController, CastControllerBuilder, CastError, CastEvent};
pub use store::{FileSessionStore, MemorySessionStore, SessionStore};
