//! Bridge event loop.
//!
//! Runs the chat receive loop and the finished-watcher in the background and
//! turns every inbound event into a command task. Command tasks are bounded
//! by a semaphore, isolated from each other's panics, and tracked so shutdown
//! can wait for them.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use color_eyre::eyre::Result;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::channel::{ChannelEvent, EventSource};
use crate::dispatch::{Request, dispatch};
use crate::handlers::Context;
use crate::watcher::FinishedWatcher;

/// How long shutdown waits for running commands and live feeds.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub const PANIC_REPLY: &str = "PANIC: something went wrong, check the logs";

pub struct Bridge {
    source: Arc<dyn EventSource>,
    ctx: Context,
    permits: Arc<Semaphore>,
    watcher: Option<FinishedWatcher>,
}

/// Cancel `cancel` on SIGINT or SIGTERM.
pub fn shutdown_on_signal(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {}
                        _ = sigterm.recv() => {}
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to install SIGTERM handler, only Ctrl-C will stop");
                    let _ = ctrl_c.await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        info!("shutdown signal received");
        cancel.cancel();
    });
}

impl Bridge {
    pub fn new(
        source: Arc<dyn EventSource>,
        ctx: Context,
        max_concurrent_commands: usize,
        watcher: Option<FinishedWatcher>,
    ) -> Self {
        Self {
            source,
            ctx,
            permits: Arc::new(Semaphore::new(max_concurrent_commands.max(1))),
            watcher,
        }
    }

    /// Run until the root token is cancelled or the event source stops.
    pub async fn run(mut self) -> Result<()> {
        let cancel = self.ctx.cancel.clone();

        let (tx, mut rx) = mpsc::channel::<ChannelEvent>(64);
        let source = self.source.clone();
        let poll_cancel = cancel.child_token();
        tokio::spawn(async move {
            source.run(tx, poll_cancel).await;
        });

        if let Some(watcher) = self.watcher.take() {
            self.ctx.tasks.spawn(watcher.run(cancel.child_token()));
        }

        info!(source = self.source.name(), "ready, listening for commands");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("shutting down");
                    break;
                }

                event = rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => {
                            info!("event source closed, shutting down");
                            break;
                        }
                    }
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    async fn shutdown(&self) {
        self.ctx.cancel.cancel();
        self.ctx.tasks.close();
        if tokio::time::timeout(SHUTDOWN_GRACE, self.ctx.tasks.wait())
            .await
            .is_err()
        {
            warn!(
                pending = self.ctx.tasks.len(),
                "tasks still running after grace period, exiting anyway"
            );
        } else {
            info!("all tasks finished");
        }
    }

    /// Record the sender's chat, then run the command on its own task once a
    /// permit is free. Shutdown while waiting drops the command.
    async fn handle_event(&self, event: ChannelEvent) {
        let chat_id = event.chat_id();
        let user = event.user_name().to_owned();

        if let Err(e) = self.ctx.settings.set_chat_id(&user, chat_id) {
            warn!(user = %user, chat_id, error = %e, "failed to record chat id");
        }

        let request = match event {
            ChannelEvent::Message { text, .. } => Request::from_text(chat_id, &user, &text),
            ChannelEvent::Document { file_id, .. } => {
                Request::from_document(chat_id, &user, &file_id)
            }
            ChannelEvent::Callback {
                data,
                callback_query_id,
                ..
            } => {
                if let Err(e) = self.ctx.sink.answer_callback(&callback_query_id).await {
                    debug!(error = %e, "answerCallbackQuery failed");
                }
                Request::from_text(chat_id, &user, &data)
            }
        };

        info!(
            user = %user,
            chat_id,
            command = ?request.command,
            args = ?request.args,
            live = request.command.is_live(),
            "command received"
        );

        let permit = tokio::select! {
            biased;
            _ = self.ctx.cancel.cancelled() => {
                info!(chat_id, command = ?request.command, "shutting down, dropping queued command");
                return;
            }
            permit = self.permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
        };

        let ctx = self.ctx.clone();
        self.ctx.tasks.spawn(async move {
            let _permit = permit;
            ctx.sink.send_typing(request.chat_id).await;
            run_isolated(ctx, request).await;
        });
    }
}

/// Run one command, turning a panic into a log line and a generic reply.
pub async fn run_isolated(ctx: Context, request: Request) {
    let chat_id = request.chat_id;
    let command = request.command;

    let inner = ctx.clone();
    let handle = tokio::spawn(async move { dispatch(&inner, &request).await });

    match handle.await {
        Ok(()) => {}
        Err(e) if e.is_panic() => {
            let message = panic_message(e.into_panic());
            error!(chat_id, ?command, panic = %message, "command panicked");
            ctx.reply(chat_id, PANIC_REPLY).await;
        }
        Err(e) => warn!(chat_id, ?command, error = %e, "command task cancelled"),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_are_readable() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("index out of range"))), "index out of range");
        assert_eq!(panic_message(Box::new(17_u8)), "unknown panic payload");
    }
}
