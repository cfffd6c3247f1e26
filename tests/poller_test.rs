//! Position Poller Tests
//!
//! Runs on a paused clock so the simulated playhead and the poll interval
//! advance together and deterministically.

use std::io::Write;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use tempfile::NamedTempFile;
use tokio::time::sleep;

use dlnacast::cast::control::Command;
use dlnacast::cast::{CastController, CastEvent, DeviceControl, DeviceRegistry, SessionWatch};
use dlnacast::models::{ContentSource, TransportState};
use dlnacast::sim::SimulatedNetwork;
use dlnacast::stream::ActiveContent;

const TV: &str = "uuid:sim-living-room";

struct Fixture {
    network: Arc<SimulatedNetwork>,
    controller: CastController,
    file: NamedTempFile,
}

impl Fixture {
    async fn new() -> Self {
        let network = Arc::new(SimulatedNetwork::new());
        let registry = DeviceRegistry::new();
        // Detached feed task lives as long as the runtime
        registry.attach(network.subscribe());
        network.search().await.unwrap();
        settle().await;

        let controller = CastController::builder(network.clone(), registry)
            .server(ActiveContent::new(), 8080)
            .advertise(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)))
            .build();

        let mut file = tempfile::Builder::new().suffix(".mkv").tempfile().unwrap();
        file.write_all(&[7u8; 512]).unwrap();

        Self {
            network,
            controller,
            file,
        }
    }

    async fn cast(&self) {
        let device = self.controller.registry().get(TV).unwrap();
        let source = ContentSource::Local(self.file.path().to_path_buf());
        self.controller.start_cast(&device, source).await.unwrap();
    }

    fn position(&self) -> u64 {
        self.controller.session().unwrap().position_secs
    }
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

fn positions(watch: &mut SessionWatch) -> Vec<u64> {
    let mut seen = Vec::new();
    while let Some(event) = watch.try_next_event() {
        if let CastEvent::PositionUpdated { position_secs, .. } = event {
            seen.push(position_secs);
        }
    }
    seen
}

// =============================================================================
// Polling
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_position_advances_while_playing() {
    let f = Fixture::new().await;
    f.cast().await;
    let mut watch = f.controller.watch();

    sleep(Duration::from_millis(3500)).await;

    let seen = positions(&mut watch);
    assert!(seen.len() >= 3, "expected a poll per second, got {:?}", seen);
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(f.position(), 3);
    assert_eq!(f.controller.session().unwrap().duration_secs, 5400);
}

#[tokio::test(start_paused = true)]
async fn test_position_frozen_while_paused() {
    let f = Fixture::new().await;
    f.cast().await;
    let _watch = f.controller.watch();

    sleep(Duration::from_millis(2500)).await;
    f.controller.pause().await.unwrap();
    let paused_at = f.network.count(Command::GetPositionInfo);

    sleep(Duration::from_secs(3)).await;

    // Still polled while paused, but the playhead does not move
    assert!(f.network.count(Command::GetPositionInfo) > paused_at);
    assert_eq!(f.position(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_drag_suppresses_updates_until_release() {
    let f = Fixture::new().await;
    f.cast().await;
    let watch = f.controller.watch();

    sleep(Duration::from_millis(1500)).await;
    assert_eq!(f.position(), 1);

    watch.set_position_drag(true);
    sleep(Duration::from_secs(3)).await;
    assert_eq!(f.position(), 1);

    // Release polls right away, without waiting for the next tick
    let before = f.network.count(Command::GetPositionInfo);
    watch.set_position_drag(false);
    settle().await;

    assert_eq!(f.network.count(Command::GetPositionInfo), before + 1);
    assert_eq!(f.position(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_seek_lands_between_polls() {
    let f = Fixture::new().await;
    f.cast().await;
    let _watch = f.controller.watch();

    sleep(Duration::from_millis(1500)).await;
    f.controller.seek(600).await.unwrap();
    assert_eq!(f.position(), 600);

    sleep(Duration::from_millis(1700)).await;
    assert_eq!(f.position(), 601);
}

// =============================================================================
// Lifetime
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_dropping_watch_stops_polling_not_playback() {
    let f = Fixture::new().await;
    f.cast().await;
    let watch = f.controller.watch();

    sleep(Duration::from_millis(1500)).await;
    drop(watch);
    settle().await;
    let polls = f.network.count(Command::GetPositionInfo);

    sleep(Duration::from_secs(5)).await;

    assert_eq!(f.network.count(Command::GetPositionInfo), polls);
    assert_eq!(f.controller.state(), TransportState::Playing);
    assert!(f.network.is_playing(TV));
    assert_eq!(f.network.count(Command::Stop), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_every_watch() {
    let f = Fixture::new().await;
    f.cast().await;
    let first = f.controller.watch();
    let second = f.controller.watch();
    settle().await;
    assert!(first.is_polling());
    assert!(second.is_polling());

    f.controller.stop().await.unwrap();
    settle().await;

    assert!(!first.is_polling());
    assert!(!second.is_polling());
    assert!(first.cancellation().is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn test_watch_after_stop_polls_next_session() {
    let f = Fixture::new().await;
    f.cast().await;
    f.controller.stop().await.unwrap();

    // Stop replaced the parent token; new watches are live
    f.cast().await;
    let watch = f.controller.watch();
    sleep(Duration::from_millis(1500)).await;

    assert!(watch.is_polling());
    assert_eq!(f.position(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_cast_is_never_polled() {
    let f = Fixture::new().await;
    f.network.fail_next(Command::SetTransportUri, "714 Illegal MIME-type");
    let device = f.controller.registry().get(TV).unwrap();
    let source = ContentSource::Local(f.file.path().to_path_buf());
    assert!(f.controller.start_cast(&device, source).await.is_err());

    let _watch = f.controller.watch();
    sleep(Duration::from_secs(3)).await;

    assert_eq!(f.network.count(Command::GetPositionInfo), 0);
    assert_eq!(f.position(), 0);
    assert_eq!(f.controller.state(), TransportState::Error);
}

// =============================================================================
// Volume
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_volume_queried_on_demand_only() {
    let f = Fixture::new().await;
    f.cast().await;
    let watch = f.controller.watch();
    assert_eq!(f.network.count(Command::GetVolume), 1);

    sleep(Duration::from_secs(5)).await;
    assert_eq!(f.network.count(Command::GetVolume), 1);

    assert_eq!(watch.refresh_volume().await, Some(30));
    assert_eq!(f.network.count(Command::GetVolume), 2);
}

#[tokio::test(start_paused = true)]
async fn test_volume_drag_holds_displayed_level() {
    let f = Fixture::new().await;
    f.cast().await;
    let watch = f.controller.watch();
    f.controller.set_volume(55).await.unwrap();

    watch.set_volume_drag(true);
    let rendering = f
        .network
        .find_capability(&f.controller.session().unwrap().device, dlnacast::Capability::RenderingControl)
        .unwrap();
    f.network.set_volume(&rendering, 80).await.unwrap();

    // Device answers 80, but the dragged control keeps showing 55
    assert_eq!(watch.refresh_volume().await, Some(80));
    assert_eq!(f.controller.session().unwrap().volume_percent, Some(55));

    watch.set_volume_drag(false);
    assert_eq!(watch.refresh_volume().await, Some(80));
    assert_eq!(f.controller.session().unwrap().volume_percent, Some(80));
}

#[tokio::test(start_paused = true)]
async fn test_watch_sees_state_changes() {
    let f = Fixture::new().await;
    f.cast().await;
    let mut watch = f.controller.watch();

    f.controller.pause().await.unwrap();

    let mut states = Vec::new();
    while let Some(event) = watch.try_next_event() {
        if let CastEvent::StateChanged(state) = event {
            states.push(state);
        }
    }
    assert_eq!(states, vec![TransportState::Paused]);
}
