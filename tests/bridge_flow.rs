mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::*;
use trelay::bridge::{Bridge, PANIC_REPLY};
use trelay::channel::ChannelEvent;
use trelay::remote::{Item, ItemAction, Status};
use trelay::settings::{JsonSettings, SettingsStore};

fn fleet() -> Vec<Item> {
    vec![
        Item::new(1, "ubuntu.iso", Status::Downloading),
        Item::new(2, "debian.iso", Status::Seeding),
    ]
}

#[tokio::test]
async fn panicking_command_does_not_stop_the_bridge() {
    let dir = tempfile::tempdir().unwrap();
    let settings_path = dir.path().join("settings.json");
    let settings = Arc::new(JsonSettings::open(&settings_path).unwrap());

    let remote = Arc::new(FakeRemote {
        panic_on_version: true,
        ..FakeRemote::with_items(fleet())
    });
    let sink = Arc::new(RecordingSink::default());
    let ctx = context(remote.clone(), sink.clone(), settings);

    let source = Arc::new(ScriptedSource::new(vec![
        message(7, "alice", "version"),
        message(7, "alice", "list"),
        ChannelEvent::Callback {
            chat_id: 7,
            user_name: "alice".into(),
            data: "stop 1".into(),
            callback_query_id: "cb-1".into(),
        },
        message(8, "Alice", "notifications on"),
    ]));

    Bridge::new(source, ctx, 4, None).run().await.unwrap();

    let texts = sink.texts();
    assert!(texts.iter().any(|t| t == PANIC_REPLY), "{texts:?}");
    assert!(texts.iter().any(|t| t.contains("<1> ubuntu.iso")), "{texts:?}");
    assert!(texts.iter().any(|t| t == "[success] stop: ubuntu.iso"), "{texts:?}");
    assert!(
        sink.texts_to(8)
            .iter()
            .any(|t| t == "*notifications*: notifications enabled")
    );

    assert_eq!(*sink.answered.lock().unwrap(), vec!["cb-1"]);
    assert_eq!(sink.typing.load(Ordering::SeqCst), 4);
    assert_eq!(*remote.applied.lock().unwrap(), vec![(ItemAction::Stop, 1)]);

    // Chat ids and preferences survive a restart.
    let reopened = JsonSettings::open(&settings_path).unwrap();
    assert_eq!(reopened.chat_id("alice").unwrap(), 8);
    assert!(reopened.notifications_enabled("ALICE").unwrap());
}

#[tokio::test]
async fn uploaded_file_is_added_by_url() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Arc::new(JsonSettings::open(&dir.path().join("settings.json")).unwrap());
    let remote = Arc::new(FakeRemote::default());
    let sink = Arc::new(RecordingSink::default());
    let ctx = context(remote.clone(), sink.clone(), settings);

    let source = Arc::new(ScriptedSource::new(vec![ChannelEvent::Document {
        chat_id: 7,
        user_name: "alice".into(),
        file_id: "abc".into(),
    }]));

    Bridge::new(source, ctx, 1, None).run().await.unwrap();

    assert_eq!(
        *remote.added.lock().unwrap(),
        vec!["https://files.example/abc.torrent"]
    );
    assert_eq!(sink.texts(), vec!["Added: <100> added.iso"]);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn shutdown_freezes_running_feeds() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Arc::new(JsonSettings::open(&dir.path().join("settings.json")).unwrap());
    let remote = Arc::new(FakeRemote::with_items(fleet()));
    let sink = Arc::new(RecordingSink::default());
    let ctx = context(remote, sink.clone(), settings);

    let source = Arc::new(ScriptedSource::new(vec![message(7, "alice", "progress")]));

    Bridge::new(source, ctx, 1, None).run().await.unwrap();

    let sent = sink.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1, "{sent:?}");
    assert!(sent[0].1.contains("ubuntu.iso"));

    let edits = sink.edits.lock().unwrap().clone();
    let (chat, message_id, _) = edits.last().cloned().unwrap();
    assert_eq!(chat, 7);
    assert_eq!(message_id, 1);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn shutdown_is_seen_while_waiting_for_a_command_slot() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Arc::new(JsonSettings::open(&dir.path().join("settings.json")).unwrap());
    let remote = Arc::new(FakeRemote {
        hang_on_list: true,
        ..FakeRemote::default()
    });
    let sink = Arc::new(RecordingSink::default());
    let ctx = context(remote.clone(), sink.clone(), settings);
    let cancel = ctx.cancel.clone();

    let source = Arc::new(ScriptedSource::new(vec![
        message(7, "alice", "list"),
        message(7, "alice", "list"),
    ]));

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
    });

    let finished = tokio::time::timeout(
        Duration::from_secs(60),
        Bridge::new(source, ctx, 1, None).run(),
    )
    .await;

    assert!(finished.is_ok(), "bridge kept waiting for a permit after shutdown");
    // The queued second command was dropped, never dispatched.
    assert_eq!(remote.list_calls.load(Ordering::SeqCst), 1);
    assert_eq!(sink.typing.load(Ordering::SeqCst), 1);
}
