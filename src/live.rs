//! Live feeds: one chat message that is re-rendered in place on a timer and
//! finally frozen.

use std::time::Duration;

use async_trait::async_trait;
use color_eyre::eyre::Result;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::channel::{MessageSink, SendOptions, chunk_message};

/// Something worth watching change: an item, the daemon's speed, a filtered list.
#[async_trait]
pub trait LiveView: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> String;

    /// Current frame.
    async fn render(&self) -> Result<String>;

    /// Frame left behind when the feed ends, with live rates blanked out.
    async fn render_final(&self) -> Result<String>;

    fn options(&self) -> SendOptions {
        SendOptions::markdown()
    }
}

/// How many frames to show and how long to wait between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveSchedule {
    pub iterations: u32,
    pub interval: Duration,
}

impl Default for LiveSchedule {
    fn default() -> Self {
        Self {
            iterations: 60,
            interval: Duration::from_secs(2),
        }
    }
}

/// What a feed did, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedReport {
    pub message_id: Option<i64>,
    pub frames_shown: u32,
    pub frames_skipped: u32,
    pub cancelled: bool,
    pub finalized: bool,
}

/// Drive one live message to completion.
///
/// The first successful frame is sent, later frames edit it. A frame that
/// fails to render is skipped and the previous text stays up. Cancellation
/// cuts the loop short but the final frame is still attempted.
pub async fn run_feed(
    sink: &dyn MessageSink,
    chat_id: i64,
    view: &dyn LiveView,
    schedule: LiveSchedule,
    cancel: &CancellationToken,
) -> FeedReport {
    let opts = view.options();
    let mut report = FeedReport::default();

    for iteration in 0..schedule.iterations {
        match view.render().await {
            Ok(text) => {
                // A frame is one message; anything past the limit is cut.
                let frame = chunk_message(&text)[0];
                match report.message_id {
                    None => match sink.send_message(chat_id, frame, &opts).await {
                        Ok(id) => {
                            report.message_id = Some(id);
                            report.frames_shown += 1;
                        }
                        Err(e) => debug!(feed = %view.name(), iteration, error = %e, "send failed"),
                    },
                    Some(id) => match sink.edit_message(chat_id, id, frame, &opts).await {
                        Ok(()) => report.frames_shown += 1,
                        Err(e) => debug!(feed = %view.name(), iteration, error = %e, "edit failed"),
                    },
                }
            }
            Err(e) => {
                report.frames_skipped += 1;
                debug!(feed = %view.name(), iteration, error = %e, "render failed, keeping previous frame");
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                report.cancelled = true;
                break;
            }
            _ = tokio::time::sleep(schedule.interval) => {}
        }
    }

    let Some(id) = report.message_id else {
        return report;
    };

    match view.render_final().await {
        Ok(text) => {
            let frame = chunk_message(&text)[0];
            match sink.edit_message(chat_id, id, frame, &opts).await {
                Ok(()) => report.finalized = true,
                Err(e) => debug!(feed = %view.name(), error = %e, "final edit failed"),
            }
        }
        Err(e) => debug!(feed = %view.name(), error = %e, "final render failed, leaving last frame"),
    }

    report
}
