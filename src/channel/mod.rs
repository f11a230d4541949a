//! Chat channel abstraction.
//!
//! Inbound: an [`EventSource`] runs a receive loop and feeds [`ChannelEvent`]s
//! into the bridge. Outbound: everything that talks back to users goes through
//! [`MessageSink`], usually via [`send_text`] which handles chunking.

pub mod chunk;
pub mod telegram;

use async_trait::async_trait;
use color_eyre::eyre::Result;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub use chunk::{MAX_MESSAGE_CHARS, chunk_message};

/// An event received from a channel. Only events from masters get this far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A text message (new or edited).
    Message {
        chat_id: i64,
        user_name: String,
        text: String,
    },

    /// A file upload without a text command.
    Document {
        chat_id: i64,
        user_name: String,
        file_id: String,
    },

    /// An inline keyboard button press.
    Callback {
        chat_id: i64,
        user_name: String,
        data: String,
        callback_query_id: String,
    },
}

impl ChannelEvent {
    pub fn chat_id(&self) -> i64 {
        match self {
            Self::Message { chat_id, .. }
            | Self::Document { chat_id, .. }
            | Self::Callback { chat_id, .. } => *chat_id,
        }
    }

    pub fn user_name(&self) -> &str {
        match self {
            Self::Message { user_name, .. }
            | Self::Document { user_name, .. }
            | Self::Callback { user_name, .. } => user_name,
        }
    }
}

/// A button attached to a single message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Keyboard {
    #[default]
    None,
    /// The persistent reply keyboard with the common commands.
    Commands,
    Inline(Vec<Vec<InlineButton>>),
}

impl Keyboard {
    /// Per-item controls shown under an `info` message. Presses come back as
    /// callback data that reads like a typed command.
    pub fn item_actions(id: i64) -> Self {
        Self::Inline(vec![
            vec![
                InlineButton::new("stop", format!("stop {id}")),
                InlineButton::new("start", format!("start {id}")),
                InlineButton::new("del", format!("del {id}")),
            ],
            vec![
                InlineButton::new("check", format!("check {id}")),
                InlineButton::new("deldata", format!("deldata {id}")),
            ],
        ])
    }
}

/// How a message should be rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub markdown: bool,
    pub keyboard: Keyboard,
}

impl SendOptions {
    pub fn plain() -> Self {
        Self::default()
    }

    pub fn markdown() -> Self {
        Self {
            markdown: true,
            keyboard: Keyboard::None,
        }
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = keyboard;
        self
    }
}

/// Outbound side of a chat channel.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Send one message (already within the size limit). Returns its id.
    async fn send_message(&self, chat_id: i64, text: &str, opts: &SendOptions) -> Result<i64>;

    /// Replace the text of a message sent earlier.
    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        opts: &SendOptions,
    ) -> Result<()>;

    /// Dismiss the loading spinner on a pressed inline button.
    async fn answer_callback(&self, callback_query_id: &str) -> Result<()>;

    /// Resolve an uploaded file to a URL the torrent daemon can fetch.
    async fn file_url(&self, file_id: &str) -> Result<String>;

    /// Show the "typing" indicator. Best effort.
    async fn send_typing(&self, chat_id: i64);
}

/// Inbound side of a chat channel.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Run the receive loop, sending events to `tx` until `cancel` fires or
    /// the receiver goes away.
    async fn run(&self, tx: Sender<ChannelEvent>, cancel: CancellationToken);
}

/// Send `text`, split into as many messages as the size limit requires.
///
/// A chunk that fails is logged and skipped; the rest are still sent. The
/// keyboard goes on the last chunk only. Returns the id of the last chunk
/// that was delivered.
pub async fn send_text(
    sink: &dyn MessageSink,
    chat_id: i64,
    text: &str,
    opts: &SendOptions,
) -> Option<i64> {
    let chunks = chunk_message(text);
    let last = chunks.len().saturating_sub(1);
    let bare = SendOptions {
        markdown: opts.markdown,
        keyboard: Keyboard::None,
    };

    let mut delivered = None;
    for (i, chunk) in chunks.iter().enumerate() {
        let chunk_opts = if i == last { opts } else { &bare };
        match sink.send_message(chat_id, chunk, chunk_opts).await {
            Ok(id) => delivered = Some(id),
            Err(e) => warn!(chat_id, chunk = i, error = %e, "failed to send message chunk"),
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use color_eyre::eyre::eyre;
    use mockall::Sequence;

    #[test]
    fn item_keyboard_carries_commands_as_callback_data() {
        let Keyboard::Inline(rows) = Keyboard::item_actions(12) else {
            panic!("expected inline keyboard");
        };
        let data: Vec<_> = rows.iter().flatten().map(|b| b.callback_data.as_str()).collect();
        assert_eq!(data, vec!["stop 12", "start 12", "del 12", "check 12", "deldata 12"]);
    }

    #[tokio::test]
    async fn short_text_is_one_message_with_keyboard() {
        let mut sink = MockMessageSink::new();
        sink.expect_send_message()
            .withf(|chat_id: &i64, text: &str, opts: &SendOptions| {
                *chat_id == 5 && text == "hello" && opts.keyboard == Keyboard::Commands
            })
            .times(1)
            .returning(|_, _, _| Ok(77));

        let opts = SendOptions::plain().with_keyboard(Keyboard::Commands);
        assert_eq!(send_text(&sink, 5, "hello", &opts).await, Some(77));
    }

    #[tokio::test]
    async fn failed_chunk_does_not_stop_the_rest() {
        let line = "x".repeat(99);
        let text = vec![line; 60].join("\n");
        assert_eq!(chunk_message(&text).len(), 2);

        let mut seq = Sequence::new();
        let mut sink = MockMessageSink::new();
        sink.expect_send_message()
            .withf(|_, _, opts: &SendOptions| opts.keyboard == Keyboard::None)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Err(eyre!("flood control")));
        sink.expect_send_message()
            .withf(|_, _, opts: &SendOptions| opts.keyboard == Keyboard::Commands)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(9));

        let opts = SendOptions::markdown().with_keyboard(Keyboard::Commands);
        assert_eq!(send_text(&sink, 1, &text, &opts).await, Some(9));
    }

    #[tokio::test]
    async fn all_chunks_failing_returns_none() {
        let mut sink = MockMessageSink::new();
        sink.expect_send_message()
            .returning(|_, _, _| Err(eyre!("network down")));
        assert_eq!(send_text(&sink, 1, "hi", &SendOptions::plain()).await, None);
    }
}
