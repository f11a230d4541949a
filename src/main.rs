//! trelay: a Telegram bot for a Transmission daemon.

mod check;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

use trelay::bridge::{Bridge, shutdown_on_signal};
use trelay::channel::telegram::TelegramChannel;
use trelay::config::{Config, Overrides};
use trelay::handlers::Context;
use trelay::remote::transmission::TransmissionClient;
use trelay::settings::JsonSettings;
use trelay::watcher::FinishedWatcher;

/// Control Transmission from Telegram.
#[derive(Parser)]
#[command(name = "trelay", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the bot in the foreground.
    Run(ConnectArgs),

    /// Check the config, Transmission and Telegram, then exit.
    Check(ConnectArgs),
}

#[derive(Args, Debug, Default)]
struct ConnectArgs {
    /// Config file (defaults to ./trelay.toml when present).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Telegram bot token.
    #[arg(short, long)]
    token: Option<String>,

    /// Comma-separated Telegram usernames allowed to use the bot.
    #[arg(short, long, value_delimiter = ',')]
    masters: Option<Vec<String>>,

    /// Transmission RPC URL.
    #[arg(short, long)]
    url: Option<String>,

    /// Transmission RPC username (TR_AUTH=user:pass is used when unset).
    #[arg(long)]
    username: Option<String>,

    /// Transmission RPC password.
    #[arg(long)]
    password: Option<String>,

    /// Log to this file instead of stderr.
    #[arg(long)]
    logfile: Option<PathBuf>,

    /// Per-user settings file.
    #[arg(long)]
    settings: Option<PathBuf>,
}

impl ConnectArgs {
    fn resolve(self) -> Result<Config> {
        let tr_auth = std::env::var("TR_AUTH").ok();
        let overrides = Overrides {
            token: self.token,
            masters: self.masters,
            url: self.url,
            username: self.username,
            password: self.password,
            log_file: self.logfile,
            settings_path: self.settings,
        };
        Config::resolve(self.config.as_deref(), overrides, tr_auth.as_deref())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => cmd_run(args.resolve()?).await,
        Command::Check(args) => check::run(&args.resolve()?).await,
    }
}

async fn cmd_run(config: Config) -> Result<()> {
    let _log_guard = trelay::logging::init(config.log_file.as_deref())?;
    trelay::logging::install_panic_hook();

    let settings_path = config.ensure_settings_dir()?;
    let settings = Arc::new(JsonSettings::open(&settings_path)?);

    let rpc = &config.transmission;
    let client = Arc::new(
        TransmissionClient::new(&rpc.url, rpc.username.as_deref(), rpc.password.as_deref())
            .wrap_err("failed to set up Transmission client")?,
    );
    let telegram = Arc::new(
        TelegramChannel::new(config.telegram.bot_token.clone(), config.masters.clone())
            .wrap_err("failed to set up Telegram client")?,
    );

    info!(
        rpc = %rpc.url,
        masters = ?config.masters,
        settings = %settings_path.display(),
        "starting trelay {}",
        env!("CARGO_PKG_VERSION")
    );

    let cancel = CancellationToken::new();
    shutdown_on_signal(cancel.clone());

    let ctx = Context {
        client: client.clone(),
        sink: telegram.clone(),
        settings: settings.clone(),
        schedule: config.live_schedule(),
        cancel,
        tasks: TaskTracker::new(),
    };

    let watcher = FinishedWatcher::new(
        client,
        telegram.clone(),
        settings,
        config.masters.clone(),
        config.notify_interval(),
    );

    Bridge::new(
        telegram,
        ctx,
        config.max_concurrent_commands,
        Some(watcher),
    )
    .run()
    .await
}
