//! Commands that change daemon or user state.
//!
//! Multi-id commands handle each id on its own: a bad or failing id gets its
//! own error line and the rest are still processed.

use tracing::debug;

use super::Context;
use crate::dispatch::Request;
use crate::remote::ItemAction;

/// Add every argument as a URL or magnet link.
pub async fn add(ctx: &Context, req: &Request) {
    if req.args.is_empty() {
        ctx.reply(req.chat_id, "add: needs at least one URL").await;
        return;
    }
    for source in &req.args {
        add_source(ctx, req.chat_id, source).await;
    }
}

async fn add_source(ctx: &Context, chat_id: i64, source: &str) {
    let text = match ctx.client.add(source).await {
        Err(e) => format!("add: {e}"),
        // The daemon answered but did not name anything.
        Ok(added) if added.name.is_empty() => format!("add: error adding {source}"),
        Ok(added) => format!("Added: <{}> {}", added.id, added.name),
    };
    ctx.reply(chat_id, &text).await;
}

/// An uploaded `.torrent` file: resolve its download URL and add that.
pub async fn receive_file(ctx: &Context, req: &Request) {
    let Some(file_id) = req.file_id.as_deref() else {
        debug!(chat_id = req.chat_id, "message without text or document, ignoring");
        return;
    };

    match ctx.sink.file_url(file_id).await {
        Ok(url) => add_source(ctx, req.chat_id, &url).await,
        Err(e) => {
            ctx.reply(req.chat_id, &format!("receive: {e}")).await;
        }
    }
}

/// `stop`, `start` and `check`: a list of ids, or `all`.
pub async fn item_action(ctx: &Context, req: &Request, action: ItemAction) {
    let verb = action.verb();
    let Some(first) = req.args.first() else {
        ctx.reply(req.chat_id, &format!("{verb}: needs an argument")).await;
        return;
    };

    if first.eq_ignore_ascii_case("all") {
        let text = match ctx.client.apply_all(action).await {
            Ok(()) => action.all_done().to_owned(),
            Err(e) => {
                debug!(verb, error = %e, "whole-daemon action failed");
                format!("{verb}: error occurred while {} some torrents", action.gerund())
            }
        };
        ctx.reply(req.chat_id, &text).await;
        return;
    }

    for arg in &req.args {
        let Ok(id) = arg.parse::<i64>() else {
            ctx.reply(req.chat_id, &format!("{verb}: {arg} is not a number")).await;
            continue;
        };

        let status = match ctx.client.apply(action, id).await {
            Ok(status) => status,
            Err(e) => {
                ctx.reply(req.chat_id, &format!("{verb}: {e}")).await;
                continue;
            }
        };

        let text = match ctx.client.get_item(id).await {
            Ok(item) => format!("[{status}] {verb}: {}", item.name),
            Err(_) => format!("[fail] {verb}: No torrent with an ID of {id}"),
        };
        ctx.reply(req.chat_id, &text).await;
    }
}

/// `del` and `deldata`.
pub async fn delete(ctx: &Context, req: &Request, with_data: bool) {
    let verb = if with_data { "deldata" } else { "del" };
    if req.args.is_empty() {
        ctx.reply(req.chat_id, &format!("{verb}: needs an ID")).await;
        return;
    }

    for arg in &req.args {
        let Ok(id) = arg.parse::<i64>() else {
            ctx.reply(req.chat_id, &format!("{verb}: {arg} is not an ID")).await;
            continue;
        };

        let text = match ctx.client.remove(id, with_data).await {
            Ok(name) if with_data => format!("Deleted with data: {name}"),
            Ok(name) => format!("Deleted: {name}"),
            Err(e) => format!("{verb}: {e}"),
        };
        ctx.reply(req.chat_id, &text).await;
    }
}

/// Show or toggle the caller's finished-download notifications.
pub async fn notifications(ctx: &Context, req: &Request) {
    let user = req.user_name.as_str();

    let Some(arg) = req.args.first() else {
        let text = match ctx.settings.notifications_enabled(user) {
            Ok(true) => "*notifications* are enabled".to_owned(),
            Ok(false) => "*notifications* are disabled".to_owned(),
            Err(e) => format!("*notifications*: failed to read settings: {e}"),
        };
        ctx.reply_markdown(req.chat_id, &text).await;
        return;
    };

    let enable = match arg.to_lowercase().as_str() {
        "on" | "true" | "enable" => true,
        "off" | "false" | "disable" => false,
        _ => {
            let text = format!("*notifications*: Unknown argument `{}`", req.args.join(" "));
            ctx.reply_markdown(req.chat_id, &text).await;
            return;
        }
    };

    let text = match ctx.settings.set_notifications(user, enable) {
        Ok(()) if enable => "*notifications*: notifications enabled".to_owned(),
        Ok(()) => "*notifications*: notifications disabled".to_owned(),
        Err(e) => format!("*notifications*: failed to save settings: {e}"),
    };
    ctx.reply_markdown(req.chat_id, &text).await;
}
