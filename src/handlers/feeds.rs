//! Commands answered with a live message: `info`, `speed`, `progress`, `active`.

use std::sync::Arc;

use async_trait::async_trait;
use color_eyre::eyre::Result;

use super::Context;
use crate::channel::{Keyboard, SendOptions};
use crate::dispatch::Request;
use crate::format::{
    ellipsis, escape_markdown, format_bytes, format_eta, format_timestamp, progress_bar,
};
use crate::live::LiveView;
use crate::remote::{Item, RemoteClient, Status};

/// Rate and ETA cells, live or frozen.
fn rate(bytes: u64, live: bool) -> String {
    if live { format_bytes(bytes) } else { "- B".to_owned() }
}

pub fn format_info(item: &Item, live: bool) -> String {
    let trackers = item.tracker_hosts().join(" ");
    let eta = if live { format_eta(item.eta) } else { "-".to_owned() };
    format!(
        "`<{}>` *{}*\n{} *{}* of *{}* (*{:.1}%*) ↓ *{}*  ↑ *{}* R: *{}*\nDL: *{}* UP: *{}*\nAdded: *{}*, ETA: *{}*\nTrackers: `{}`",
        item.id,
        escape_markdown(&item.name),
        item.status_label(),
        format_bytes(item.have()),
        format_bytes(item.size_when_done),
        item.percent_done * 100.0,
        rate(item.rate_download, live),
        rate(item.rate_upload, live),
        item.ratio_label(),
        format_bytes(item.downloaded_ever),
        format_bytes(item.uploaded_ever),
        format_timestamp(item.added_date),
        eta,
        trackers,
    )
}

fn format_active(item: &Item, live: bool) -> String {
    let (down, up) = if live {
        (format_bytes(item.rate_download), format_bytes(item.rate_upload))
    } else {
        ("-".to_owned(), "-".to_owned())
    };
    format!(
        "`<{}>` *{}*\n{} *{}* of *{}* (*{:.1}%*) ↓ *{}*  ↑ *{}* R: *{}*\n\n",
        item.id,
        escape_markdown(&item.name),
        item.status_label(),
        format_bytes(item.have()),
        format_bytes(item.size_when_done),
        item.percent_done * 100.0,
        down,
        up,
        item.ratio_label(),
    )
}

fn format_progress(item: &Item, live: bool) -> String {
    let (eta, down) = if live {
        (format_eta(item.eta), format_bytes(item.rate_download))
    } else {
        ("-".to_owned(), "-".to_owned())
    };
    format!(
        "*{}* `{}`\n{} {:.1}% {} ↓{}\n",
        item.id,
        escape_markdown(&ellipsis(&item.name, 30)),
        progress_bar(item.percent_done, 10),
        item.percent_done * 100.0,
        eta,
        down,
    )
}

/// One item by id, with the per-item control keyboard.
pub struct InfoView {
    client: Arc<dyn RemoteClient>,
    id: i64,
}

#[async_trait]
impl LiveView for InfoView {
    fn name(&self) -> String {
        format!("info {}", self.id)
    }

    async fn render(&self) -> Result<String> {
        Ok(format_info(&self.client.get_item(self.id).await?, true))
    }

    async fn render_final(&self) -> Result<String> {
        Ok(format_info(&self.client.get_item(self.id).await?, false))
    }

    fn options(&self) -> SendOptions {
        SendOptions::markdown().with_keyboard(Keyboard::item_actions(self.id))
    }
}

/// Daemon-wide transfer rates.
pub struct SpeedView {
    client: Arc<dyn RemoteClient>,
}

#[async_trait]
impl LiveView for SpeedView {
    fn name(&self) -> String {
        "speed".into()
    }

    async fn render(&self) -> Result<String> {
        let stats = self.client.session_stats().await?;
        Ok(format!(
            "↓ *{}*  ↑ *{}*",
            format_bytes(stats.download_speed),
            format_bytes(stats.upload_speed)
        ))
    }

    async fn render_final(&self) -> Result<String> {
        Ok("↓ *- B*  ↑ *- B*".to_owned())
    }
}

/// Items matching a filter, one block each.
pub struct ListView {
    client: Arc<dyn RemoteClient>,
    label: &'static str,
    empty: &'static str,
    keep: fn(&Item) -> bool,
    render: fn(&Item, bool) -> String,
}

impl ListView {
    pub fn active(client: Arc<dyn RemoteClient>) -> Self {
        Self {
            client,
            label: "active",
            empty: "No active torrents",
            keep: Item::is_active,
            render: format_active,
        }
    }

    pub fn progress(client: Arc<dyn RemoteClient>) -> Self {
        Self {
            client,
            label: "progress",
            empty: "No downloads",
            keep: |item: &Item| item.status == Status::Downloading,
            render: format_progress,
        }
    }

    async fn frame(&self, live: bool) -> Result<String> {
        let items = self.client.list_items().await?;
        let text: String = items
            .iter()
            .filter(|&i| (self.keep)(i))
            .map(|i| (self.render)(i, live))
            .collect();
        if text.is_empty() {
            Ok(self.empty.to_owned())
        } else {
            Ok(text)
        }
    }

    /// Whether anything matches right now.
    async fn any(&self) -> Result<bool> {
        Ok(self.client.list_items().await?.iter().any(|i| (self.keep)(i)))
    }
}

#[async_trait]
impl LiveView for ListView {
    fn name(&self) -> String {
        self.label.into()
    }

    async fn render(&self) -> Result<String> {
        self.frame(true).await
    }

    async fn render_final(&self) -> Result<String> {
        self.frame(false).await
    }
}

/// One live feed per id. Unknown or malformed ids get an error line instead.
pub async fn info(ctx: &Context, req: &Request) {
    if req.args.is_empty() {
        ctx.reply(req.chat_id, "info: needs a torrent ID number").await;
        return;
    }

    for arg in &req.args {
        let Ok(id) = arg.parse::<i64>() else {
            ctx.reply(req.chat_id, &format!("info: {arg} is not a number")).await;
            continue;
        };

        if ctx.client.get_item(id).await.is_err() {
            ctx.reply(req.chat_id, &format!("info: Can't find a torrent with an ID of {id}"))
                .await;
            continue;
        }

        ctx.spawn_feed(
            req.chat_id,
            InfoView {
                client: ctx.client.clone(),
                id,
            },
        );
    }
}

pub async fn speed(ctx: &Context, req: &Request) {
    if let Err(e) = ctx.client.session_stats().await {
        ctx.reply(req.chat_id, &format!("speed: {e}")).await;
        return;
    }
    ctx.spawn_feed(req.chat_id, SpeedView { client: ctx.client.clone() });
}

pub async fn progress(ctx: &Context, req: &Request) {
    start_list(ctx, req, ListView::progress(ctx.client.clone())).await;
}

pub async fn active(ctx: &Context, req: &Request) {
    start_list(ctx, req, ListView::active(ctx.client.clone())).await;
}

/// Check once up front so an empty or failing list gets a plain reply
/// instead of a feed.
async fn start_list(ctx: &Context, req: &Request, view: ListView) {
    match view.any().await {
        Ok(true) => ctx.spawn_feed(req.chat_id, view),
        Ok(false) => {
            ctx.reply(req.chat_id, view.empty).await;
        }
        Err(e) => {
            ctx.reply(req.chat_id, &format!("{}: {e}", view.label)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MockMessageSink;
    use crate::dispatch::dispatch;
    use crate::handlers::testing::*;
    use crate::remote::{MockRemoteClient, Stats};
    use crate::settings::MockSettingsStore;
    use color_eyre::eyre::eyre;
    use std::sync::Mutex;

    fn downloading(id: i64, name: &str) -> Item {
        let mut item = Item::new(id, name, Status::Downloading);
        item.percent_done = 0.5;
        item.rate_download = 2_000_000;
        item.size_when_done = 10_000_000;
        item.left_until_done = 5_000_000;
        item.eta = 3_720;
        item
    }

    #[test]
    fn info_freezes_rates_and_eta() {
        let mut item = downloading(4, "[HD] movie_2024");
        item.upload_ratio = 0.25;
        item.trackers.push(crate::remote::Tracker {
            announce: "udp://tracker.example:80".into(),
        });

        let live = format_info(&item, true);
        assert!(live.starts_with("`<4>` *(HD) movie-2024*\nDownloading *5.0 MB* of *10 MB* (*50.0%*) ↓ *2.0 MB*  ↑ *0 B* R: *0.25*"));
        assert!(live.contains("ETA: *1h 2m*"));
        assert!(live.ends_with("Trackers: `tracker.example`"));

        let frozen = format_info(&item, false);
        assert!(frozen.contains("↓ *- B*  ↑ *- B*"));
        assert!(frozen.contains("ETA: *-*"));
    }

    #[test]
    fn progress_line_has_bar_and_truncated_name() {
        let item = downloading(9, "A.Very.Long.Release.Name.That.Keeps.Going.mkv");
        assert_eq!(
            format_progress(&item, true),
            "*9* `A.Very.Long.Release.Name.That…`\n█████░░░░░ 50.0% 1h 2m ↓2.0 MB\n"
        );
        assert!(format_progress(&item, false).ends_with("50.0% - ↓-\n"));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn info_spawns_a_feed_per_valid_id() {
        let mut client = MockRemoteClient::new();
        client
            .expect_get_item()
            .withf(|id: &i64| *id == 4)
            .returning(|id| Ok(downloading(id, "movie")));
        client
            .expect_get_item()
            .withf(|id: &i64| *id == 8)
            .returning(|id| Err(eyre!("no torrent with an ID of {id}")));

        let sent = Arc::new(Mutex::new(Vec::new()));
        let mut sink = recording_sink(sent.clone());
        // iterations = 1: one send, then the frozen frame.
        sink.expect_edit_message()
            .withf(|_, _, text: &str, opts: &SendOptions| {
                text.contains("↓ *- B*") && opts.keyboard == Keyboard::item_actions(4)
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let ctx = context(client, sink, MockSettingsStore::new());
        dispatch(&ctx, &request("info x 8 4")).await;
        ctx.tasks.close();
        ctx.tasks.wait().await;

        let sent = sent.lock().unwrap();
        assert_eq!(sent[0], "info: x is not a number");
        assert_eq!(sent[1], "info: Can't find a torrent with an ID of 8");
        assert!(sent[2].starts_with("`<4>` *movie*"));
        assert_eq!(sent.len(), 3);
    }

    #[tokio::test]
    async fn info_needs_an_id() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let ctx = context(MockRemoteClient::new(), recording_sink(sent.clone()), MockSettingsStore::new());
        dispatch(&ctx, &request("in")).await;
        assert_eq!(*sent.lock().unwrap(), vec!["info: needs a torrent ID number"]);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn speed_feed_ends_with_dashes() {
        let mut client = MockRemoteClient::new();
        client.expect_session_stats().returning(|| {
            Ok(Stats {
                download_speed: 1_234,
                upload_speed: 0,
                ..Stats::default()
            })
        });

        let sent = Arc::new(Mutex::new(Vec::new()));
        let mut sink = recording_sink(sent.clone());
        sink.expect_edit_message()
            .withf(|_, message_id: &i64, text: &str, _| *message_id == 1 && text == "↓ *- B*  ↑ *- B*")
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let ctx = context(client, sink, MockSettingsStore::new());
        dispatch(&ctx, &request("ss")).await;
        ctx.tasks.close();
        ctx.tasks.wait().await;
        assert_eq!(*sent.lock().unwrap(), vec!["↓ *1.2 kB*  ↑ *0 B*"]);
    }

    #[tokio::test]
    async fn speed_reports_fetch_error_without_a_feed() {
        let mut client = MockRemoteClient::new();
        client
            .expect_session_stats()
            .returning(|| Err(eyre!("connection refused")));
        let mut sink = MockMessageSink::new();
        sink.expect_send_message()
            .withf(|_, text: &str, _| text == "speed: connection refused")
            .times(1)
            .returning(|_, _, _| Ok(1));
        sink.expect_edit_message().never();

        let ctx = context(client, sink, MockSettingsStore::new());
        dispatch(&ctx, &request("speed")).await;
        assert!(ctx.tasks.is_empty());
    }

    #[tokio::test]
    async fn empty_lists_reply_instead_of_feeding() {
        let mut client = MockRemoteClient::new();
        client
            .expect_list_items()
            .returning(|| Ok(vec![Item::new(1, "idle", Status::Seeding)]));

        let sent = Arc::new(Mutex::new(Vec::new()));
        let ctx = context(client, recording_sink(sent.clone()), MockSettingsStore::new());
        dispatch(&ctx, &request("active")).await;
        dispatch(&ctx, &request("progress")).await;
        assert!(ctx.tasks.is_empty());
        assert_eq!(*sent.lock().unwrap(), vec!["No active torrents", "No downloads"]);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn active_feed_lists_moving_items() {
        let mut client = MockRemoteClient::new();
        client.expect_list_items().returning(|| {
            Ok(vec![
                downloading(1, "moving"),
                Item::new(2, "idle", Status::Seeding),
            ])
        });

        let sent = Arc::new(Mutex::new(Vec::new()));
        let mut sink = recording_sink(sent.clone());
        sink.expect_edit_message()
            .withf(|_, _, text: &str, _| text.contains("↓ *-*  ↑ *-*") && !text.contains("idle"))
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let ctx = context(client, sink, MockSettingsStore::new());
        dispatch(&ctx, &request("ac")).await;
        ctx.tasks.close();
        ctx.tasks.wait().await;

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("`<1>` *moving*"));
    }
}
