//! Read-only commands that answer with a single reply.

use std::collections::BTreeMap;

use regex::{Regex, RegexBuilder};

use super::{Context, HELP};
use crate::dispatch::Request;
use crate::format::{format_bytes, format_duration};
use crate::remote::{Item, SortKey, Sorting, Status};

fn line(item: &Item) -> String {
    format!("<{}> {}\n", item.id, item.name)
}

fn case_insensitive(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// Fetch the snapshot or report the failure under `word`.
async fn snapshot(ctx: &Context, req: &Request, word: &str) -> Option<Vec<Item>> {
    match ctx.client.list_items().await {
        Ok(items) => Some(items),
        Err(e) => {
            ctx.reply(req.chat_id, &format!("{word}: {e}")).await;
            None
        }
    }
}

/// Reply with one block per matching item, or `empty` when nothing matches.
async fn filtered(
    ctx: &Context,
    req: &Request,
    word: &str,
    empty: &str,
    keep: impl Fn(&Item) -> bool,
    render: impl Fn(&Item) -> String,
) {
    let Some(items) = snapshot(ctx, req, word).await else {
        return;
    };
    let text: String = items.iter().filter(|&i| keep(i)).map(render).collect();
    if text.is_empty() {
        ctx.reply(req.chat_id, empty).await;
    } else {
        ctx.reply(req.chat_id, &text).await;
    }
}

/// All items, or only those with a tracker matching the first argument.
pub async fn list(ctx: &Context, req: &Request) {
    let tracker_filter = match req.args.first() {
        Some(pattern) => match case_insensitive(pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                ctx.reply(req.chat_id, &format!("list: {e}")).await;
                return;
            }
        },
        None => None,
    };

    let Some(items) = snapshot(ctx, req, "list").await else {
        return;
    };

    let text: String = items
        .iter()
        .filter(|item| match &tracker_filter {
            Some(re) => item.trackers.iter().any(|t| re.is_match(&t.announce)),
            None => true,
        })
        .map(line)
        .collect();

    if !text.is_empty() {
        ctx.reply(req.chat_id, &text).await;
    } else if let Some(pattern) = req.args.first() {
        ctx.reply_markdown(req.chat_id, &format!("list: No tracker matches: *{pattern}*"))
            .await;
    } else {
        ctx.reply(req.chat_id, "list: No torrents").await;
    }
}

pub async fn downs(ctx: &Context, req: &Request) {
    filtered(ctx, req, "downs", "No downloads", |i| i.status.is_downloading(), line).await;
}

pub async fn seeding(ctx: &Context, req: &Request) {
    filtered(ctx, req, "seeding", "No torrents seeding", |i| i.status.is_seeding(), line).await;
}

pub async fn paused(ctx: &Context, req: &Request) {
    filtered(
        ctx,
        req,
        "paused",
        "No paused torrents",
        |i| i.status == Status::Stopped,
        |i| {
            format!(
                "<{}> {}\n{} ({:.1}%) DL: {} UL: {}  R: {}\n\n",
                i.id,
                i.name,
                i.status_label(),
                i.percent_done * 100.0,
                format_bytes(i.downloaded_ever),
                format_bytes(i.uploaded_ever),
                i.ratio_label()
            )
        },
    )
    .await;
}

pub async fn checking(ctx: &Context, req: &Request) {
    filtered(
        ctx,
        req,
        "checking",
        "No torrents verifying",
        |i| i.status.is_checking(),
        |i| {
            format!(
                "<{}> {}\n{} ({:.1}%)\n\n",
                i.id,
                i.name,
                i.status_label(),
                i.percent_done * 100.0
            )
        },
    )
    .await;
}

pub async fn errors(ctx: &Context, req: &Request) {
    filtered(
        ctx,
        req,
        "errors",
        "No errors",
        Item::has_error,
        |i| format!("<{}> {}\n{}\n", i.id, i.name, i.error_string),
    )
    .await;
}

const SORT_USAGE: &str = "\
sort takes one of:
(*id, name, age, size, progress, downspeed, upspeed, download, upload, ratio*)
optionally start with (*rev*) for reversed order
e.g. \"*sort rev size*\" to get biggest torrents first.";

pub async fn sort(ctx: &Context, req: &Request) {
    let mut args = req.args.iter().map(String::as_str);
    let mut word = args.next();
    let reversed = word.is_some_and(|w| w.eq_ignore_ascii_case("rev"));
    if reversed {
        word = args.next();
    }

    let Some(word) = word else {
        ctx.reply_markdown(req.chat_id, SORT_USAGE).await;
        return;
    };

    let Some(key) = SortKey::parse(word) else {
        ctx.reply(req.chat_id, "unknown sorting method").await;
        return;
    };

    let sorting = Sorting { key, reversed };
    ctx.client.set_sort(sorting);
    ctx.reply(req.chat_id, &format!("sort: {sorting}")).await;
}

/// Tracker host → number of items announcing to it.
pub async fn trackers(ctx: &Context, req: &Request) {
    let Some(items) = snapshot(ctx, req, "trackers").await else {
        return;
    };

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for item in &items {
        for host in item.tracker_hosts() {
            *counts.entry(host).or_default() += 1;
        }
    }

    if counts.is_empty() {
        ctx.reply(req.chat_id, "No trackers!").await;
        return;
    }
    let text: String = counts
        .iter()
        .map(|(host, n)| format!("{n} - {host}\n"))
        .collect();
    ctx.reply(req.chat_id, &text).await;
}

/// Names matching a case-insensitive regex built from all arguments.
pub async fn search(ctx: &Context, req: &Request) {
    if req.args.is_empty() {
        ctx.reply(req.chat_id, "search: needs an argument").await;
        return;
    }

    let re = match case_insensitive(&req.args.join(" ")) {
        Ok(re) => re,
        Err(e) => {
            ctx.reply(req.chat_id, &format!("search: {e}")).await;
            return;
        }
    };

    filtered(ctx, req, "search", "No matches!", |i| re.is_match(&i.name), line).await;
}

pub async fn count(ctx: &Context, req: &Request) {
    let Some(items) = snapshot(ctx, req, "count").await else {
        return;
    };

    let mut per_status: BTreeMap<&'static str, usize> = BTreeMap::new();
    for item in &items {
        *per_status.entry(item.status.label()).or_default() += 1;
    }
    let n = |status: Status| per_status.get(status.label()).copied().unwrap_or(0);

    let text = format!(
        "Downloading: {}\nSeeding: {}\nPaused: {}\nVerifying: {}\n\n- Waiting to -\nDownload: {}\nSeed: {}\nVerify: {}\n\nTotal: {}",
        n(Status::Downloading),
        n(Status::Seeding),
        n(Status::Stopped),
        n(Status::Checking),
        n(Status::DownloadPending),
        n(Status::SeedPending),
        n(Status::CheckPending),
        items.len()
    );
    ctx.reply(req.chat_id, &text).await;
}

pub async fn stats(ctx: &Context, req: &Request) {
    let stats = match ctx.client.session_stats().await {
        Ok(stats) => stats,
        Err(e) => {
            ctx.reply(req.chat_id, &format!("stats: {e}")).await;
            return;
        }
    };

    let text = format!(
        "Total: *{}*\nActive: *{}*\nPaused: *{}*\n\n\
         _Current Stats_\nDownloaded: *{}*\nUploaded: *{}*\nRunning time: *{}*\n\n\
         _Accumulative Stats_\nSessions: *{}*\nDownloaded: *{}*\nUploaded: *{}*\nTotal Running time: *{}*",
        stats.torrent_count,
        stats.active_torrent_count,
        stats.paused_torrent_count,
        format_bytes(stats.current.downloaded_bytes),
        format_bytes(stats.current.uploaded_bytes),
        format_duration(stats.current.seconds_active),
        stats.cumulative.session_count,
        format_bytes(stats.cumulative.downloaded_bytes),
        format_bytes(stats.cumulative.uploaded_bytes),
        format_duration(stats.cumulative.seconds_active),
    );
    ctx.reply_markdown(req.chat_id, &text).await;
}

pub async fn version(ctx: &Context, req: &Request) {
    match ctx.client.version().await {
        Ok(v) => {
            let text = format!(
                "Transmission *{v}*\ntrelay *{}*",
                env!("CARGO_PKG_VERSION")
            );
            ctx.reply_markdown(req.chat_id, &text).await;
        }
        Err(e) => {
            ctx.reply(req.chat_id, &format!("version: {e}")).await;
        }
    }
}

pub async fn help(ctx: &Context, req: &Request) {
    ctx.reply_markdown(req.chat_id, HELP).await;
}
