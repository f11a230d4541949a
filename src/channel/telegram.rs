//! Telegram Bot API client using raw reqwest (no framework).
//!
//! Uses long-polling via `getUpdates`; replies go out through `sendMessage`
//! and live feeds rewrite their message with `editMessageText`.

use std::time::Duration;

use async_trait::async_trait;
use color_eyre::eyre::{Result, WrapErr, bail, eyre};
use serde::Deserialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde_json::{Value, json};
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ChannelEvent, EventSource, Keyboard, MessageSink, SendOptions};

const API_BASE: &str = "https://api.telegram.org";

/// Long-poll timeout passed to `getUpdates`, in seconds.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Rows of the persistent reply keyboard.
const COMMAND_ROWS: [[&str; 4]; 2] = [
    ["list", "speed", "start all", "notifications on"],
    ["progress", "stats", "stop all", "notifications off"],
];

/// Telegram Bot API client.
pub struct TelegramChannel {
    bot_token: String,
    masters: Vec<String>,
    api_base: String,
    client: reqwest::Client,
}

/// Telegram's answer when the markup in a Markdown message does not parse.
const PARSE_ERROR: &str = "can't parse entities";

/// Telegram's answer to an edit that leaves the text as it was.
const NOT_MODIFIED: &str = "message is not modified";

// --- Telegram API response types ---

#[derive(Debug, Deserialize)]
struct TgResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgUpdate {
    update_id: i64,
    message: Option<TgMessage>,
    edited_message: Option<TgMessage>,
    callback_query: Option<TgCallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct TgCallbackQuery {
    id: String,
    from: TgUser,
    message: Option<TgMessage>,
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    chat: TgChat,
    from: Option<TgUser>,
    text: Option<String>,
    document: Option<TgDocument>,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgDocument {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct TgSentMessage {
    message_id: i64,
}

#[derive(Debug, Deserialize)]
struct TgFile {
    file_path: Option<String>,
}

impl TelegramChannel {
    /// `masters` must already be normalized (lower-case, no `@`).
    pub fn new(bot_token: String, masters: Vec<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 30))
            .build()
            .wrap_err("failed to build HTTP client")?;

        Ok(Self {
            bot_token,
            masters,
            api_base: API_BASE.to_owned(),
            client,
        })
    }

    /// Talk to another Bot API server, e.g. a self-hosted one.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_owned();
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }

    fn is_master(&self, user_name: &str) -> bool {
        !user_name.is_empty() && self.masters.iter().any(|m| m.eq_ignore_ascii_case(user_name))
    }

    fn user_name(user: Option<&TgUser>) -> String {
        user.and_then(|u| u.username.clone()).unwrap_or_default()
    }

    /// Parse a (new or edited) message into a ChannelEvent.
    fn parse_message(msg: &TgMessage) -> Option<ChannelEvent> {
        let user_name = Self::user_name(msg.from.as_ref());
        let text = msg.text.as_deref().map(str::trim).unwrap_or_default();

        if !text.is_empty() {
            return Some(ChannelEvent::Message {
                chat_id: msg.chat.id,
                user_name,
                text: text.to_owned(),
            });
        }

        let document = msg.document.as_ref()?;
        Some(ChannelEvent::Document {
            chat_id: msg.chat.id,
            user_name,
            file_id: document.file_id.clone(),
        })
    }

    fn parse_update(update: TgUpdate) -> Option<ChannelEvent> {
        if let Some(cq) = update.callback_query {
            let chat_id = cq.message.as_ref().map(|m| m.chat.id)?;
            return Some(ChannelEvent::Callback {
                chat_id,
                user_name: Self::user_name(Some(&cq.from)),
                data: cq.data?,
                callback_query_id: cq.id,
            });
        }

        let msg = update.message.or(update.edited_message)?;
        Self::parse_message(&msg)
    }

    /// Long-poll for updates from Telegram.
    async fn get_updates(&self, offset: i64) -> Result<Vec<TgUpdate>> {
        let resp = self
            .client
            .get(self.api_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", POLL_TIMEOUT_SECS.to_string()),
            ])
            .send()
            .await?;

        let body: TgResponse<Vec<TgUpdate>> = resp.json().await?;

        if !body.ok {
            let desc = body.description.unwrap_or_default();
            bail!("Telegram API error: {desc}");
        }

        Ok(body.result.unwrap_or_default())
    }

    /// One Bot API call. The outer error is transport or decoding, the inner
    /// one is Telegram's own rejection description.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: &Value,
    ) -> Result<std::result::Result<T, String>> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(payload)
            .send()
            .await
            .wrap_err_with(|| format!("{method} request failed"))?;

        let body: TgResponse<T> = resp
            .json()
            .await
            .wrap_err_with(|| format!("{method}: malformed response"))?;
        if !body.ok {
            return Ok(Err(body.description.unwrap_or_default()));
        }
        body.result
            .map(Ok)
            .ok_or_else(|| eyre!("{method}: empty result"))
    }

    async fn post<T: DeserializeOwned>(&self, method: &str, payload: &Value) -> Result<T> {
        self.call(method, payload)
            .await?
            .map_err(|desc| eyre!("{method}: {desc}"))
    }

    /// Post with `parse_mode: Markdown` when asked. Only a markup parse error
    /// is retried as plain text; any other failure is returned as is.
    async fn post_formatted<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: Value,
        markdown: bool,
    ) -> Result<T> {
        if markdown {
            let mut formatted = payload.clone();
            formatted["parse_mode"] = json!("Markdown");
            match self.call(method, &formatted).await? {
                Ok(result) => return Ok(result),
                Err(desc) if desc.contains(PARSE_ERROR) => {
                    debug!(method, error = %desc, "markdown rejected, retrying as plain text");
                }
                Err(desc) => bail!("{method}: {desc}"),
            }
        }
        self.post(method, &payload).await
    }

    /// Username of the bot itself (`getMe`).
    pub async fn bot_username(&self) -> Result<String> {
        let me: TgUser = self.post("getMe", &json!({})).await?;
        me.username.ok_or_else(|| eyre!("getMe returned no username"))
    }

    fn file_download_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{file_path}", self.api_base, self.bot_token)
    }
}

/// `reply_markup` payload for a keyboard, if any.
fn reply_markup(keyboard: &Keyboard) -> Option<Value> {
    match keyboard {
        Keyboard::None => None,
        Keyboard::Commands => {
            let rows: Vec<Vec<Value>> = COMMAND_ROWS
                .iter()
                .map(|row| row.iter().map(|label| json!({ "text": label })).collect())
                .collect();
            Some(json!({ "keyboard": rows, "resize_keyboard": true }))
        }
        Keyboard::Inline(rows) => {
            let rows: Vec<Vec<Value>> = rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|btn| json!({ "text": btn.text, "callback_data": btn.callback_data }))
                        .collect()
                })
                .collect();
            Some(json!({ "inline_keyboard": rows }))
        }
    }
}

#[async_trait]
impl MessageSink for TelegramChannel {
    async fn send_message(&self, chat_id: i64, text: &str, opts: &SendOptions) -> Result<i64> {
        let mut payload = json!({
            "chat_id": chat_id,
            "text": text,
            "disable_web_page_preview": true,
        });
        if let Some(markup) = reply_markup(&opts.keyboard) {
            payload["reply_markup"] = markup;
        }

        let sent: TgSentMessage = self
            .post_formatted("sendMessage", payload, opts.markdown)
            .await?;
        Ok(sent.message_id)
    }

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        opts: &SendOptions,
    ) -> Result<()> {
        let mut payload = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
        });
        // Only inline keyboards survive an edit.
        if let Keyboard::Inline(_) = opts.keyboard
            && let Some(markup) = reply_markup(&opts.keyboard)
        {
            payload["reply_markup"] = markup;
        }

        match self
            .post_formatted::<IgnoredAny>("editMessageText", payload, opts.markdown)
            .await
        {
            Ok(_) => Ok(()),
            // Same text as before: nothing to do.
            Err(e) if e.to_string().contains(NOT_MODIFIED) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn answer_callback(&self, callback_query_id: &str) -> Result<()> {
        let _: IgnoredAny = self
            .post(
                "answerCallbackQuery",
                &json!({ "callback_query_id": callback_query_id }),
            )
            .await?;
        Ok(())
    }

    async fn file_url(&self, file_id: &str) -> Result<String> {
        let file: TgFile = self.post("getFile", &json!({ "file_id": file_id })).await?;
        let path = file
            .file_path
            .ok_or_else(|| eyre!("getFile returned no path for {file_id}"))?;
        Ok(self.file_download_url(&path))
    }

    async fn send_typing(&self, chat_id: i64) {
        let payload = json!({ "chat_id": chat_id, "action": "typing" });
        if let Err(e) = self.post::<IgnoredAny>("sendChatAction", &payload).await {
            debug!(chat_id, error = %e, "sendChatAction failed");
        }
    }
}

#[async_trait]
impl EventSource for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn run(&self, tx: Sender<ChannelEvent>, cancel: CancellationToken) {
        let mut offset: i64 = 0;
        info!(masters = ?self.masters, "telegram poll loop started");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let updates = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.get_updates(offset) => {
                    match result {
                        Ok(updates) => updates,
                        Err(e) => {
                            warn!(error = %e, "telegram poll error");
                            tokio::select! {
                                _ = cancel.cancelled() => break,
                                _ = tokio::time::sleep(Duration::from_secs(5)) => {}
                            }
                            continue;
                        }
                    }
                }
            };

            for update in updates {
                offset = update.update_id + 1;

                let Some(event) = Self::parse_update(update) else {
                    continue;
                };

                if !self.is_master(event.user_name()) {
                    warn!(
                        user = event.user_name(),
                        chat_id = event.chat_id(),
                        "ignoring update from unauthorized user"
                    );
                    continue;
                }

                if tx.send(event).await.is_err() {
                    // Receiver dropped, shut down.
                    return;
                }
            }
        }
        info!("telegram poll loop stopped");
    }
}
