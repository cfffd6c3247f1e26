//! Device Registry Tests
//!
//! Discovery feed handling, search semantics and the searching indicator.

use std::sync::Arc;
use std::time::Duration;

use dlnacast::cast::{DeviceControl, DeviceRegistry, RegistryEvent};
use dlnacast::models::RendererDevice;
use dlnacast::sim::SimulatedNetwork;

/// Let spawned feed tasks catch up
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

// =============================================================================
// Add / Remove
// =============================================================================

#[test]
fn test_duplicate_add_keeps_one_entry() {
    let registry = DeviceRegistry::new();
    let tv = RendererDevice::new("uuid:tv", "TV");

    assert!(registry.on_device_added(tv.clone()));
    assert!(!registry.on_device_added(RendererDevice::new("uuid:tv", "TV (renamed)")));

    assert_eq!(registry.len(), 1);
    assert_eq!(registry.devices()[0].name, "TV");
}

#[test]
fn test_remove_absent_is_noop() {
    let registry = DeviceRegistry::new();
    registry.on_device_added(RendererDevice::new("uuid:tv", "TV"));

    assert!(!registry.on_device_removed(&RendererDevice::new("uuid:other", "Other")));
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_remove_keeps_order_of_the_rest() {
    let registry = DeviceRegistry::new();
    for (id, name) in [("a", "A"), ("b", "B"), ("c", "C")] {
        registry.on_device_added(RendererDevice::new(id, name));
    }
    registry.on_device_removed(&RendererDevice::new("b", "B"));

    let ids: Vec<_> = registry.devices().into_iter().map(|d| d.id).collect();
    assert_eq!(ids, vec!["a", "c"]);
}

// =============================================================================
// Discovery Feed
// =============================================================================

#[tokio::test]
async fn test_feed_adds_only_renderers() {
    let network = Arc::new(SimulatedNetwork::new());
    let registry = DeviceRegistry::new();
    let _feed = registry.attach(network.subscribe());

    network.search().await.unwrap();
    settle().await;

    let names: Vec<_> = registry.devices().into_iter().map(|d| d.name).collect();
    assert_eq!(names, vec!["Living Room TV", "Kitchen Speaker"]);
}

#[tokio::test]
async fn test_feed_follows_devices_going_away() {
    let network = Arc::new(SimulatedNetwork::new());
    let registry = DeviceRegistry::new();
    let _feed = registry.attach(network.subscribe());
    let mut events = registry.subscribe();

    network.search().await.unwrap();
    settle().await;
    network.set_online("uuid:sim-kitchen", false);
    settle().await;

    assert!(!registry.contains("uuid:sim-kitchen"));
    assert!(registry.contains("uuid:sim-living-room"));

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(matches!(seen.last(), Some(RegistryEvent::Removed(d)) if d.id == "uuid:sim-kitchen"));
}

#[tokio::test]
async fn test_search_clears_known_devices() {
    let network = Arc::new(SimulatedNetwork::empty());
    let registry = DeviceRegistry::new();
    registry.on_device_added(RendererDevice::new("uuid:stale", "Stale TV"));
    let mut events = registry.subscribe();

    registry
        .search(network.as_ref(), Duration::from_secs(10))
        .await
        .unwrap();

    assert!(registry.is_empty());
    assert_eq!(events.try_recv().unwrap(), RegistryEvent::Cleared);
}

// =============================================================================
// Searching Indicator
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_searching_ends_after_timeout_with_no_devices() {
    let network = SimulatedNetwork::empty();
    let registry = DeviceRegistry::new();

    registry
        .search(&network, Duration::from_secs(10))
        .await
        .unwrap();
    assert!(registry.is_searching());

    tokio::time::sleep(Duration::from_secs(9)).await;
    assert!(registry.is_searching());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!registry.is_searching());
    assert!(registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_searching_ends_on_first_device() {
    let network = Arc::new(SimulatedNetwork::new());
    let registry = DeviceRegistry::new();
    let _feed = registry.attach(network.subscribe());
    let mut searching = registry.watch_searching();

    registry
        .search(network.as_ref(), Duration::from_secs(10))
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(1), searching.wait_for(|s| !*s))
        .await
        .expect("indicator should drop once a device appears")
        .unwrap();
    assert!(!registry.is_empty());
}

#[tokio::test]
async fn test_wait_for_device_by_name() {
    let network = Arc::new(SimulatedNetwork::new());
    let registry = DeviceRegistry::new();
    let _feed = registry.attach(network.subscribe());

    let waiter = {
        let registry = registry.clone();
        tokio::spawn(async move {
            registry
                .wait_for_device("kitchen speaker", Duration::from_secs(5))
                .await
        })
    };
    settle().await;
    network.search().await.unwrap();

    let device = waiter.await.unwrap().expect("device should be found");
    assert_eq!(device.id, "uuid:sim-kitchen");
}
