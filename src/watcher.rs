//! Finished-download watcher.
//!
//! Polls the daemon on a fixed interval, diffs each snapshot against the
//! previous one and tells every opted-in master when a download completes.
//! The previous snapshot lives only in memory, so a restart starts from
//! scratch and never repeats old notifications.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channel::{MessageSink, SendOptions};
use crate::format::{ellipsis, escape_markdown};
use crate::remote::{Item, RemoteClient, Status};
use crate::settings::SettingsStore;

/// Items that went from downloading to seeding between two snapshots.
///
/// Only ids present in both snapshots count; new or vanished items never do.
pub fn find_finished<'a>(before: &[Item], after: &'a [Item]) -> Vec<&'a Item> {
    let previous: HashMap<i64, Status> = before.iter().map(|i| (i.id, i.status)).collect();
    after
        .iter()
        .filter(|item| {
            previous.get(&item.id) == Some(&Status::Downloading) && item.status.is_seeding()
        })
        .collect()
}

/// Text of the notification for one finished item.
pub fn finished_message(item: &Item) -> String {
    format!(
        "*{}* `{}` is finished!",
        item.id,
        escape_markdown(&ellipsis(&item.name, 25))
    )
}

pub struct FinishedWatcher {
    client: Arc<dyn RemoteClient>,
    sink: Arc<dyn MessageSink>,
    settings: Arc<dyn SettingsStore>,
    recipients: Vec<String>,
    interval: Duration,
    previous: Option<Vec<Item>>,
}

impl FinishedWatcher {
    pub fn new(
        client: Arc<dyn RemoteClient>,
        sink: Arc<dyn MessageSink>,
        settings: Arc<dyn SettingsStore>,
        recipients: Vec<String>,
        interval: Duration,
    ) -> Self {
        Self {
            client,
            sink,
            settings,
            recipients,
            interval,
            previous: None,
        }
    }

    /// Fetch one snapshot and return what finished since the last one.
    ///
    /// A failed fetch returns nothing and keeps the old snapshot, so a
    /// transition spanning the outage is still seen next time.
    pub async fn poll(&mut self) -> Vec<Item> {
        let snapshot = match self.client.list_items().await {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "watcher: failed to fetch torrents");
                return Vec::new();
            }
        };

        let finished = match &self.previous {
            Some(before) => find_finished(before, &snapshot).into_iter().cloned().collect(),
            None => {
                info!(count = snapshot.len(), "watcher: initial snapshot");
                Vec::new()
            }
        };
        self.previous = Some(snapshot);
        finished
    }

    /// Tell every opted-in recipient about `item`. Returns how many were reached.
    ///
    /// Each recipient is independent: a failed lookup or send is logged and
    /// the next one is tried.
    pub async fn notify(&self, item: &Item) -> usize {
        let text = finished_message(item);
        let mut delivered = 0;

        for user in &self.recipients {
            match self.settings.notifications_enabled(user) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    warn!(user = %user, error = %e, "watcher: notification flag lookup failed");
                    continue;
                }
            }

            let chat_id = match self.settings.chat_id(user) {
                Ok(id) => id,
                Err(e) => {
                    warn!(user = %user, error = %e, "watcher: no chat to notify");
                    continue;
                }
            };

            match self
                .sink
                .send_message(chat_id, &text, &SendOptions::markdown())
                .await
            {
                Ok(_) => delivered += 1,
                Err(e) => warn!(user = %user, chat_id, error = %e, "watcher: notification send failed"),
            }
        }

        debug!(id = item.id, delivered, "watcher: finished notification sent");
        delivered
    }

    /// Poll until cancelled.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(interval = ?self.interval, recipients = self.recipients.len(), "watcher started");
        loop {
            for item in self.poll().await {
                info!(id = item.id, name = %item.name, "download finished");
                self.notify(&item).await;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        info!("watcher stopped");
    }
}
