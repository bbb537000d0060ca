//! End-to-end behaviour of the store, queue and coordinator together.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use fieldsync::records::{EntityKind, FuelEntry, Trip};
use fieldsync::sync::{
    DrainOutcome, NetworkMonitor, NetworkStatus, RemoteEndpoint, RemoteError, StatusReporter,
    SyncAction, SyncCoordinator, SyncStatus,
};
use fieldsync::LocalStore;

/// Records every call; fails the record IDs listed in `failing`.
#[derive(Default)]
struct RecordingRemote {
    calls: Mutex<Vec<(EntityKind, SyncAction, String)>>,
    failing: Vec<String>,
}

impl RecordingRemote {
    fn failing(ids: &[&str]) -> Self {
        Self {
            failing: ids.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }

    fn ids(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(_, _, id)| id.clone()).collect()
    }
}

#[async_trait]
impl RemoteEndpoint for RecordingRemote {
    async fn apply(
        &self,
        kind: EntityKind,
        action: SyncAction,
        payload: &[u8],
    ) -> Result<(), RemoteError> {
        let value: serde_json::Value = serde_json::from_slice(payload).unwrap();
        let id = value["id"].as_str().unwrap().to_string();
        self.calls.lock().push((kind, action, id.clone()));
        if self.failing.contains(&id) {
            Err(RemoteError::Transient("connection reset".to_string()))
        } else {
            Ok(())
        }
    }
}

fn fuel(id: &str) -> FuelEntry {
    FuelEntry::new(id, "van-7", 40.0, 1.79)
}

#[tokio::test]
async fn queue_survives_restart_and_drains_after() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fieldsync.db");

    {
        let store = LocalStore::open_at(&path).unwrap();
        store.record_change(&fuel("f1"), SyncAction::Create).unwrap();
        store
            .record_change(&Trip::start("t1", "d1", "van-7"), SyncAction::Create)
            .unwrap();
        store.close().unwrap();
    }

    let store = LocalStore::open_at(&path).unwrap();
    assert_eq!(store.queue().open_count().unwrap(), 2);
    assert!(!store.get::<FuelEntry>("f1").unwrap().unwrap().synced_to_server);

    let remote = Arc::new(RecordingRemote::default());
    let monitor = NetworkMonitor::new(NetworkStatus::Online);
    let coordinator = SyncCoordinator::new(store.clone(), remote.clone(), monitor);

    let report = coordinator.drain_now().await;
    assert_eq!(report.outcome, DrainOutcome::Completed);
    assert_eq!(remote.ids(), vec!["f1", "t1"]);
    assert_eq!(store.queue().open_count().unwrap(), 0);
    assert!(store.get::<Trip>("t1").unwrap().unwrap().synced_to_server);
}

#[tokio::test]
async fn repeated_edits_collapse_to_one_item() {
    let store = LocalStore::open_in_memory().unwrap();
    let mut entry = fuel("f1");
    store.record_change(&entry, SyncAction::Create).unwrap();
    entry.liters = 42.0;
    store.record_change(&entry, SyncAction::Update).unwrap();
    entry.liters = 45.5;
    store.record_change(&entry, SyncAction::Update).unwrap();

    let items = store.queue().list_all().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].action, SyncAction::Create);
    assert_eq!(items[0].payload_json().unwrap()["liters"], 45.5);

    let remote = Arc::new(RecordingRemote::default());
    let coordinator = SyncCoordinator::new(
        store.clone(),
        remote.clone(),
        NetworkMonitor::new(NetworkStatus::Online),
    );
    coordinator.drain_now().await;

    let calls = remote.calls.lock().clone();
    assert_eq!(calls, vec![(EntityKind::Fuel, SyncAction::Create, "f1".to_string())]);
}

#[tokio::test]
async fn fifo_order_with_failure_in_the_middle() {
    let store = LocalStore::open_in_memory().unwrap();
    for id in ["f1", "f2", "f3"] {
        store.record_change(&fuel(id), SyncAction::Create).unwrap();
    }

    let remote = Arc::new(RecordingRemote::failing(&["f2"]));
    let coordinator = SyncCoordinator::new(
        store.clone(),
        remote.clone(),
        NetworkMonitor::new(NetworkStatus::Online),
    );

    let report = coordinator.drain_now().await;
    assert_eq!(remote.ids(), vec!["f1", "f2", "f3"]);
    assert_eq!((report.applied, report.failed), (2, 1));

    let left = store.queue().list_all().unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].record_id, "f2");
    assert_eq!(left[0].retry_count, 1);
    assert!(left[0].last_error.is_some());
}

/// Blocks each apply until released.
struct GatedRemote {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl RemoteEndpoint for GatedRemote {
    async fn apply(&self, _: EntityKind, _: SyncAction, _: &[u8]) -> Result<(), RemoteError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(())
    }
}

#[tokio::test]
async fn only_one_drain_runs_at_a_time() {
    let store = LocalStore::open_in_memory().unwrap();
    store.record_change(&fuel("f1"), SyncAction::Create).unwrap();

    let remote = Arc::new(GatedRemote {
        entered: Notify::new(),
        release: Notify::new(),
    });
    let coordinator = SyncCoordinator::new(
        store.clone(),
        remote.clone(),
        NetworkMonitor::new(NetworkStatus::Online),
    );

    let first = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.drain_now().await })
    };
    remote.entered.notified().await;

    let second = coordinator.drain_now().await;
    assert_eq!(second.outcome, DrainOutcome::AlreadyRunning);
    assert!(!second.ran());

    remote.release.notify_one();
    let first = first.await.unwrap();
    assert_eq!(first.outcome, DrainOutcome::Completed);
    assert_eq!(first.applied, 1);
}

#[tokio::test]
async fn offline_capture_then_reconnect() {
    let store = LocalStore::open_in_memory().unwrap();
    let monitor = NetworkMonitor::new(NetworkStatus::Offline);
    let reporter = StatusReporter::new(store.queue(), monitor.clone());

    store.record_change(&fuel("f1"), SyncAction::Create).unwrap();
    assert_eq!(reporter.status().unwrap(), SyncStatus::Offline);

    let remote = Arc::new(RecordingRemote::default());
    let coordinator = SyncCoordinator::new(store.clone(), remote.clone(), monitor.clone());

    let report = coordinator.drain_now().await;
    assert_eq!(report.outcome, DrainOutcome::Offline);
    assert!(remote.ids().is_empty());

    monitor.set_online(true);
    assert_eq!(reporter.status().unwrap(), SyncStatus::Pending(1));

    coordinator.drain_now().await;
    assert_eq!(reporter.status().unwrap(), SyncStatus::Synced);
    assert!(store.get::<FuelEntry>("f1").unwrap().unwrap().synced_to_server);
}

#[tokio::test]
async fn deletion_removes_local_copy_after_ack() {
    let store = LocalStore::open_in_memory().unwrap();
    store.put(&fuel("f1")).unwrap();
    store.record_deletion(EntityKind::Fuel, "f1").unwrap();

    let remote = Arc::new(RecordingRemote::default());
    let coordinator = SyncCoordinator::new(
        store.clone(),
        remote.clone(),
        NetworkMonitor::new(NetworkStatus::Online),
    );
    coordinator.drain_now().await;

    assert_eq!(
        remote.calls.lock().clone(),
        vec![(EntityKind::Fuel, SyncAction::Delete, "f1".to_string())]
    );
    assert!(store.get::<FuelEntry>("f1").unwrap().is_none());
}
