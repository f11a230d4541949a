//! Command handlers.
//!
//! Every handler takes the shared [`Context`] plus the parsed request and
//! reports its own errors back to the chat. `queries` reply once, `actions`
//! change daemon state, `feeds` start live messages.

pub mod actions;
pub mod feeds;
pub mod queries;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::channel::{Keyboard, MessageSink, SendOptions, send_text};
use crate::dispatch::Request;
use crate::live::{self, LiveSchedule, LiveView};
use crate::remote::RemoteClient;
use crate::settings::SettingsStore;

/// Collaborators shared by every handler and background task.
#[derive(Clone)]
pub struct Context {
    pub client: Arc<dyn RemoteClient>,
    pub sink: Arc<dyn MessageSink>,
    pub settings: Arc<dyn SettingsStore>,
    pub schedule: LiveSchedule,
    /// Cancelled on shutdown; live feeds watch it between frames.
    pub cancel: CancellationToken,
    pub tasks: TaskTracker,
}

impl Context {
    /// Plain-text reply with the commands keyboard.
    pub async fn reply(&self, chat_id: i64, text: &str) -> Option<i64> {
        let opts = SendOptions::plain().with_keyboard(Keyboard::Commands);
        send_text(self.sink.as_ref(), chat_id, text, &opts).await
    }

    /// Markdown reply with the commands keyboard.
    pub async fn reply_markdown(&self, chat_id: i64, text: &str) -> Option<i64> {
        let opts = SendOptions::markdown().with_keyboard(Keyboard::Commands);
        send_text(self.sink.as_ref(), chat_id, text, &opts).await
    }

    /// Start a live feed in the background. It stops on its own after the
    /// configured number of frames, or early on shutdown.
    pub fn spawn_feed<V: LiveView + 'static>(&self, chat_id: i64, view: V) {
        let sink = self.sink.clone();
        let schedule = self.schedule;
        let cancel = self.cancel.child_token();
        self.tasks.spawn(async move {
            let report = live::run_feed(sink.as_ref(), chat_id, &view, schedule, &cancel).await;
            debug!(feed = %view.name(), chat_id, ?report, "live feed finished");
        });
    }
}

pub const HELP: &str = "\
*list* or *ls* [tracker regex]
Lists all torrents, optionally only those whose tracker matches.

*downs* or *dl*
Lists torrents downloading or waiting to download.

*seeding* or *sd*
Lists torrents seeding or waiting to seed.

*paused* or *pa*
Lists paused torrents.

*checking* or *ch*
Lists torrents verifying or waiting to verify.

*active* or *ac*
Live list of torrents that are moving data.

*errors* or *er*
Lists torrents with errors along with the error message.

*sort* or *so*
Changes the order of the lists. Call it without arguments for more.

*trackers* or *tr*
Lists trackers and how many torrents each one has.

*add* or *ad*
Takes one or many URLs or magnets to add them. You can also send a .torrent file.

*search* or *se*
Takes a query and lists torrents with matching names.

*info* or *in*
Takes one or more torrent IDs and shows live info about them.

*stop* or *sp*
Takes one or more torrent IDs to stop them, or _all_ to stop all torrents.

*start* or *st*
Takes one or more torrent IDs to start them, or _all_ to start all torrents.

*check* or *ck*
Takes one or more torrent IDs to verify them, or _all_ to verify all torrents.

*del* or *rm*
Takes one or more torrent IDs to delete them.

*deldata*
Takes one or more torrent IDs to delete them and their data.

*stats* or *sa*
Shows Transmission's stats.

*speed* or *ss*
Shows the upload and download speeds, live.

*count* or *co*
Shows the torrent count per status.

*progress* or *pr*
Live progress of the torrents downloading.

*notifications* or *nt* [on|off]
Shows or toggles finished-download notifications for you.

*help*
Shows this help.

*version* or *ver*
Shows the Transmission and bot versions.";

pub async fn unknown(ctx: &Context, req: &Request) {
    let text = format!("no such command: {}, try help", req.word);
    ctx.reply(req.chat_id, &text).await;
}
