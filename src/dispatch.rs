//! Command parsing and routing.
//!
//! Text from a chat becomes a [`Request`]: the first word picks a [`Command`],
//! the rest are arguments. [`dispatch`] hands the request to its handler.

use crate::handlers::{self, Context, actions, feeds, queries};
use crate::remote::ItemAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    List,
    Downs,
    Seeding,
    Paused,
    Checking,
    Active,
    Errors,
    Sort,
    Trackers,
    Add,
    Search,
    Info,
    Stop,
    Start,
    Check,
    Del,
    DelData,
    Stats,
    Speed,
    Count,
    Progress,
    Notifications,
    Help,
    Version,
    /// A message with no text, e.g. an uploaded `.torrent` file.
    ReceiveFile,
    Unknown,
}

impl Command {
    /// Resolve a command word. Case-insensitive; accepts a leading `/` and a
    /// trailing `@botname`.
    pub fn parse(token: &str) -> Self {
        let token = token.trim();
        if token.is_empty() {
            return Self::ReceiveFile;
        }
        let token = token.strip_prefix('/').unwrap_or(token);
        let token = token.split('@').next().unwrap_or(token);

        match token.to_lowercase().as_str() {
            "list" | "ls" | "li" => Self::List,
            "downs" | "dl" => Self::Downs,
            "seeding" | "sd" => Self::Seeding,
            "paused" | "pa" => Self::Paused,
            "checking" | "ch" => Self::Checking,
            "active" | "ac" => Self::Active,
            "errors" | "er" => Self::Errors,
            "sort" | "so" => Self::Sort,
            "trackers" | "tr" => Self::Trackers,
            "add" | "ad" => Self::Add,
            "search" | "se" => Self::Search,
            "info" | "in" => Self::Info,
            "stop" | "sp" => Self::Stop,
            "start" | "st" => Self::Start,
            "check" | "ck" => Self::Check,
            "del" | "rm" => Self::Del,
            "deldata" => Self::DelData,
            "stats" | "sa" => Self::Stats,
            "speed" | "ss" => Self::Speed,
            "count" | "co" => Self::Count,
            "progress" | "pr" => Self::Progress,
            "notifications" | "notify" | "nt" => Self::Notifications,
            "help" => Self::Help,
            "version" | "ver" => Self::Version,
            _ => Self::Unknown,
        }
    }

    /// Whether the handler starts a live feed instead of replying once.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Active | Self::Info | Self::Speed | Self::Progress)
    }
}

/// One parsed inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub chat_id: i64,
    pub user_name: String,
    pub command: Command,
    /// The command word as typed, for error replies.
    pub word: String,
    pub args: Vec<String>,
    /// Uploaded file, for [`Command::ReceiveFile`].
    pub file_id: Option<String>,
}

impl Request {
    pub fn from_text(chat_id: i64, user_name: &str, text: &str) -> Self {
        let mut words = text.split_whitespace();
        let word = words.next().unwrap_or_default().to_owned();
        Self {
            chat_id,
            user_name: user_name.to_owned(),
            command: Command::parse(&word),
            word,
            args: words.map(str::to_owned).collect(),
            file_id: None,
        }
    }

    pub fn from_document(chat_id: i64, user_name: &str, file_id: &str) -> Self {
        Self {
            chat_id,
            user_name: user_name.to_owned(),
            command: Command::ReceiveFile,
            word: String::new(),
            args: Vec::new(),
            file_id: Some(file_id.to_owned()),
        }
    }
}

/// Run the handler for `req`. Every failure is reported to the chat inside
/// the handler; nothing is returned.
pub async fn dispatch(ctx: &Context, req: &Request) {
    match req.command {
        Command::List => queries::list(ctx, req).await,
        Command::Downs => queries::downs(ctx, req).await,
        Command::Seeding => queries::seeding(ctx, req).await,
        Command::Paused => queries::paused(ctx, req).await,
        Command::Checking => queries::checking(ctx, req).await,
        Command::Errors => queries::errors(ctx, req).await,
        Command::Sort => queries::sort(ctx, req).await,
        Command::Trackers => queries::trackers(ctx, req).await,
        Command::Search => queries::search(ctx, req).await,
        Command::Stats => queries::stats(ctx, req).await,
        Command::Count => queries::count(ctx, req).await,
        Command::Version => queries::version(ctx, req).await,
        Command::Help => queries::help(ctx, req).await,
        Command::Active => feeds::active(ctx, req).await,
        Command::Info => feeds::info(ctx, req).await,
        Command::Speed => feeds::speed(ctx, req).await,
        Command::Progress => feeds::progress(ctx, req).await,
        Command::Add => actions::add(ctx, req).await,
        Command::ReceiveFile => actions::receive_file(ctx, req).await,
        Command::Stop => actions::item_action(ctx, req, ItemAction::Stop).await,
        Command::Start => actions::item_action(ctx, req, ItemAction::Start).await,
        Command::Check => actions::item_action(ctx, req, ItemAction::Verify).await,
        Command::Del => actions::delete(ctx, req, false).await,
        Command::DelData => actions::delete(ctx, req, true).await,
        Command::Notifications => actions::notifications(ctx, req).await,
        Command::Unknown => handlers::unknown(ctx, req).await,
    }
}
