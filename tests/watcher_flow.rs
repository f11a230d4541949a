mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use trelay::remote::{Item, Status};
use trelay::settings::{JsonSettings, SettingsStore};
use trelay::watcher::FinishedWatcher;

#[tokio::test]
async fn finished_download_reaches_opted_in_masters_only() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Arc::new(JsonSettings::open(&dir.path().join("settings.json")).unwrap());
    settings.set_chat_id("alice", 42).unwrap();
    settings.set_notifications("alice", true).unwrap();
    settings.set_chat_id("bob", 43).unwrap();

    let remote = Arc::new(FakeRemote::with_items(vec![
        Item::new(1, "ubuntu.iso", Status::Downloading),
        Item::new(2, "debian.iso", Status::Stopped),
    ]));
    let sink = Arc::new(RecordingSink::default());

    let mut watcher = FinishedWatcher::new(
        remote.clone(),
        sink.clone(),
        settings,
        vec!["alice".into(), "bob".into(), "carol".into()],
        Duration::from_secs(2),
    );

    assert!(watcher.poll().await.is_empty());

    remote.set_items(vec![
        Item::new(1, "ubuntu.iso", Status::Seeding),
        Item::new(2, "debian.iso", Status::Seeding),
    ]);
    let finished = watcher.poll().await;
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].id, 1);

    assert_eq!(watcher.notify(&finished[0]).await, 1);
    assert_eq!(
        *sink.sent.lock().unwrap(),
        vec![(42, "*1* `ubuntu.iso` is finished!".to_string())]
    );

    // Nothing new happened since the last snapshot.
    assert!(watcher.poll().await.is_empty());
}
