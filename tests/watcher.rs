mod common;

use bluenet::{
    bus::{AdapterProperty, AdapterPropertyKind, ManagementBus, PropertyChange},
    gatt::service::Service,
    peripheral::{adapter::AdapterController, watcher::SignalWatcher},
    ErrorType,
};
use common::{adapter_path, MockBus, RecordingService};
use dbus::Path;
use std::sync::Arc;

async fn setup() -> (Arc<MockBus>, Arc<dyn ManagementBus>, AdapterController) {
    let mock = Arc::new(MockBus::new().with_adapter("hci0").with_adapter("hci1"));
    let bus: Arc<dyn ManagementBus> = mock.clone();
    let adapter = AdapterController::new(Arc::clone(&bus), "Senic Hub", Some("hci0"))
        .await
        .unwrap();
    (mock, bus, adapter)
}

fn device(connected: Option<bool>) -> PropertyChange {
    PropertyChange::Device {
        path: Path::from("/org/bluez/hci0/dev_C0_FF_EE_00_00_01"),
        connected,
    }
}

#[tokio::test]
async fn it_notifies_every_service_on_disconnect() {
    let (mock, _bus, adapter) = setup().await;
    let light = RecordingService::new("light", "f29b1523-cb19-40f3-be5c-7241ecb82fd2", mock.journal());
    let status = RecordingService::new("status", "6e400001-b5a3-f393-e0a9-e50e24dcca9e", mock.journal());
    let services: Vec<Arc<dyn Service>> = vec![light.clone(), status.clone()];
    let watcher = SignalWatcher::new();

    watcher.dispatch(device(Some(false)), &adapter, &services).await.unwrap();

    assert_eq!(light.disconnects(), 1);
    assert_eq!(status.disconnects(), 1);
}

#[tokio::test]
async fn it_ignores_other_device_changes() {
    let (mock, _bus, adapter) = setup().await;
    let light = RecordingService::new("light", "f29b1523-cb19-40f3-be5c-7241ecb82fd2", mock.journal());
    let services: Vec<Arc<dyn Service>> = vec![light.clone()];
    let watcher = SignalWatcher::new();

    watcher.dispatch(device(Some(true)), &adapter, &services).await.unwrap();
    watcher.dispatch(device(None), &adapter, &services).await.unwrap();

    assert_eq!(light.disconnects(), 0);
}

#[tokio::test]
async fn it_restores_policy_on_drift() {
    let (mock, _bus, adapter) = setup().await;
    let watcher = SignalWatcher::new();

    let change = PropertyChange::Adapter {
        path: adapter_path("hci0"),
        changed: vec![AdapterProperty::Discoverable(false)],
    };
    watcher.dispatch(change, &adapter, &[]).await.unwrap();

    assert_eq!(mock.count("set "), 4);
    assert_eq!(
        mock.adapter_value("hci0", AdapterPropertyKind::Discoverable),
        Some(AdapterProperty::Discoverable(true))
    );
}

#[tokio::test]
async fn it_leaves_the_adapter_alone_when_on_policy() {
    let (mock, _bus, adapter) = setup().await;
    let watcher = SignalWatcher::new();

    let change = PropertyChange::Adapter {
        path: adapter_path("hci0"),
        changed: vec![
            AdapterProperty::Powered(true),
            AdapterProperty::Discoverable(true),
            AdapterProperty::Alias("Kitchen".to_owned()),
        ],
    };
    watcher.dispatch(change, &adapter, &[]).await.unwrap();

    assert_eq!(mock.count("set "), 0);
}

#[tokio::test]
async fn it_ignores_other_adapters() {
    let (mock, _bus, adapter) = setup().await;
    let watcher = SignalWatcher::new();

    let change = PropertyChange::Adapter {
        path: adapter_path("hci1"),
        changed: vec![AdapterProperty::Powered(false)],
    };
    watcher.dispatch(change, &adapter, &[]).await.unwrap();

    assert_eq!(mock.count("set "), 0);
}

#[tokio::test]
async fn it_subscribes_and_unsubscribes_once() {
    let (mock, bus, _adapter) = setup().await;
    let mut watcher = SignalWatcher::new();

    watcher.unsubscribe(&bus).await;
    assert_eq!(mock.count("unsubscribe"), 0);

    watcher.subscribe(&bus).await.unwrap();
    assert!(watcher.is_subscribed());
    assert_eq!(mock.subscriptions(), 2);

    mock.disconnect_signal("hci0", "C0_FF_EE_00_00_01");
    assert_eq!(watcher.next_change().await, Some(device(Some(false))));

    watcher.unsubscribe(&bus).await;
    watcher.unsubscribe(&bus).await;
    assert!(!watcher.is_subscribed());
    assert_eq!(mock.subscriptions(), 0);
    assert_eq!(mock.count("unsubscribe"), 2);
}

#[tokio::test]
async fn it_ends_the_stream_when_the_bus_closes_it() {
    let (mock, bus, _adapter) = setup().await;
    let mut watcher = SignalWatcher::new();
    watcher.subscribe(&bus).await.unwrap();

    mock.close_subscriptions();

    assert_eq!(watcher.next_change().await, None);
    watcher.unsubscribe(&bus).await;
    assert_eq!(mock.count("unsubscribe"), 2);
}

#[tokio::test]
async fn it_reports_rejected_subscriptions() {
    let mock = Arc::new(MockBus::new().with_adapter("hci0").reject_subscriptions());
    let bus: Arc<dyn ManagementBus> = mock.clone();
    let mut watcher = SignalWatcher::new();

    let err = watcher.subscribe(&bus).await.unwrap_err();
    assert_eq!(err.error_type(), &ErrorType::Subscription);
    assert!(!watcher.is_subscribed());
}
