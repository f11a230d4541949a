//! Hand-written fakes shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use color_eyre::eyre::{Result, eyre};
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use trelay::channel::{ChannelEvent, EventSource, MessageSink, SendOptions};
use trelay::handlers::Context;
use trelay::live::LiveSchedule;
use trelay::remote::{AddedItem, Item, ItemAction, RemoteClient, Sorting, Stats};
use trelay::settings::SettingsStore;

/// Message sink that remembers everything it was asked to do.
#[derive(Default)]
pub struct RecordingSink {
    next_id: AtomicI64,
    pub sent: Mutex<Vec<(i64, String)>>,
    pub edits: Mutex<Vec<(i64, i64, String)>>,
    pub answered: Mutex<Vec<String>>,
    pub typing: AtomicUsize,
}

impl RecordingSink {
    pub fn texts(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
    }

    pub fn texts_to(&self, chat_id: i64) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == chat_id)
            .map(|(_, t)| t.clone())
            .collect()
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn send_message(&self, chat_id: i64, text: &str, _opts: &SendOptions) -> Result<i64> {
        self.sent.lock().unwrap().push((chat_id, text.to_owned()));
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        _opts: &SendOptions,
    ) -> Result<()> {
        self.edits
            .lock()
            .unwrap()
            .push((chat_id, message_id, text.to_owned()));
        Ok(())
    }

    async fn answer_callback(&self, callback_query_id: &str) -> Result<()> {
        self.answered.lock().unwrap().push(callback_query_id.to_owned());
        Ok(())
    }

    async fn file_url(&self, file_id: &str) -> Result<String> {
        Ok(format!("https://files.example/{file_id}.torrent"))
    }

    async fn send_typing(&self, _chat_id: i64) {
        self.typing.fetch_add(1, Ordering::SeqCst);
    }
}

/// In-memory torrent daemon. `version` panics when `panic_on_version` is set;
/// `list_items` never answers when `hang_on_list` is set.
#[derive(Default)]
pub struct FakeRemote {
    pub items: Mutex<Vec<Item>>,
    pub added: Mutex<Vec<String>>,
    pub applied: Mutex<Vec<(ItemAction, i64)>>,
    pub list_calls: AtomicUsize,
    pub panic_on_version: bool,
    pub hang_on_list: bool,
}

impl FakeRemote {
    pub fn with_items(items: Vec<Item>) -> Self {
        Self {
            items: Mutex::new(items),
            ..Default::default()
        }
    }

    pub fn set_items(&self, items: Vec<Item>) {
        *self.items.lock().unwrap() = items;
    }
}

#[async_trait]
impl RemoteClient for FakeRemote {
    async fn list_items(&self) -> Result<Vec<Item>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_on_list {
            std::future::pending::<()>().await;
        }
        Ok(self.items.lock().unwrap().clone())
    }

    async fn get_item(&self, id: i64) -> Result<Item> {
        self.items
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.id == id)
            .cloned()
            .ok_or_else(|| eyre!("no torrent with id {id}"))
    }

    async fn session_stats(&self) -> Result<Stats> {
        Err(eyre!("stats unavailable"))
    }

    async fn version(&self) -> Result<String> {
        if self.panic_on_version {
            panic!("version exploded");
        }
        Ok("4.0.5".into())
    }

    async fn add(&self, source: &str) -> Result<AddedItem> {
        self.added.lock().unwrap().push(source.to_owned());
        Ok(AddedItem {
            id: 100,
            name: "added.iso".into(),
            hash_string: String::new(),
        })
    }

    async fn remove(&self, id: i64, _delete_data: bool) -> Result<String> {
        let mut items = self.items.lock().unwrap();
        let pos = items
            .iter()
            .position(|i| i.id == id)
            .ok_or_else(|| eyre!("no torrent with id {id}"))?;
        Ok(items.remove(pos).name)
    }

    async fn apply(&self, action: ItemAction, id: i64) -> Result<String> {
        self.applied.lock().unwrap().push((action, id));
        Ok("success".into())
    }

    async fn apply_all(&self, _action: ItemAction) -> Result<()> {
        Ok(())
    }

    fn set_sort(&self, _sorting: Sorting) {}
}

/// Event source that delivers a fixed script and then hangs up.
pub struct ScriptedSource {
    events: Mutex<Vec<ChannelEvent>>,
}

impl ScriptedSource {
    pub fn new(events: Vec<ChannelEvent>) -> Self {
        Self {
            events: Mutex::new(events),
        }
    }
}

#[async_trait]
impl EventSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn run(&self, tx: Sender<ChannelEvent>, _cancel: CancellationToken) {
        let events = std::mem::take(&mut *self.events.lock().unwrap());
        for event in events {
            if tx.send(event).await.is_err() {
                return;
            }
        }
    }
}

pub fn message(chat_id: i64, user: &str, text: &str) -> ChannelEvent {
    ChannelEvent::Message {
        chat_id,
        user_name: user.into(),
        text: text.into(),
    }
}

pub fn context(
    remote: Arc<FakeRemote>,
    sink: Arc<RecordingSink>,
    settings: Arc<dyn SettingsStore>,
) -> Context {
    Context {
        client: remote,
        sink,
        settings,
        schedule: LiveSchedule {
            iterations: 2,
            interval: Duration::from_secs(1),
        },
        cancel: CancellationToken::new(),
        tasks: TaskTracker::new(),
    }
}
