//! `trelay check`: connectivity checks for a resolved config.

use color_eyre::eyre::{Result, bail};

use trelay::channel::telegram::TelegramChannel;
use trelay::config::Config;
use trelay::remote::RemoteClient;
use trelay::remote::transmission::TransmissionClient;
use trelay::settings::JsonSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Pass,
    Fail,
}

struct Check {
    status: Status,
    message: String,
    hint: Option<String>,
}

impl Check {
    fn pass(msg: impl Into<String>) -> Self {
        Self {
            status: Status::Pass,
            message: msg.into(),
            hint: None,
        }
    }

    fn fail(msg: impl Into<String>) -> Self {
        Self {
            status: Status::Fail,
            message: msg.into(),
            hint: None,
        }
    }

    fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

pub async fn run(config: &Config) -> Result<()> {
    let mut checks = vec![Check::pass(format!(
        "Masters: {}",
        config.masters.join(", ")
    ))];

    checks.push(check_transmission(config).await);
    checks.push(check_telegram(config).await);
    checks.push(check_settings(config));

    print_report(&checks);

    let failures = checks.iter().filter(|c| c.status == Status::Fail).count();
    if failures > 0 {
        bail!("{failures} check(s) failed");
    }
    Ok(())
}

async fn check_transmission(config: &Config) -> Check {
    let rpc = &config.transmission;
    let client = match TransmissionClient::new(
        &rpc.url,
        rpc.username.as_deref(),
        rpc.password.as_deref(),
    ) {
        Ok(client) => client,
        Err(e) => return Check::fail(format!("Transmission client: {e}")),
    };
    match client.version().await {
        Ok(version) => Check::pass(format!("Transmission {version} at {}", rpc.url)),
        Err(e) => Check::fail(format!("Transmission at {}: {e}", rpc.url))
            .with_hint("Check --url, --username/--password or TR_AUTH"),
    }
}

async fn check_telegram(config: &Config) -> Check {
    let channel = match TelegramChannel::new(
        config.telegram.bot_token.clone(),
        config.masters.clone(),
    ) {
        Ok(channel) => channel,
        Err(e) => return Check::fail(format!("Telegram client: {e}")),
    };
    match channel.bot_username().await {
        Ok(name) => Check::pass(format!("Telegram bot @{name}")),
        Err(e) => Check::fail(format!("Telegram: {e}"))
            .with_hint("Check the token from @BotFather"),
    }
}

fn check_settings(config: &Config) -> Check {
    let path = config.resolved_settings_path();
    match JsonSettings::open(&path) {
        Ok(_) => Check::pass(format!("Settings at {}", path.display())),
        Err(e) => Check::fail(format!("Settings at {}: {e}", path.display()))
            .with_hint("Fix or remove the file, it is recreated on the next write"),
    }
}

fn print_report(checks: &[Check]) {
    let mut passed = 0u32;
    let mut failed = 0u32;

    for check in checks {
        let icon = match check.status {
            Status::Pass => "\x1b[32m\u{2713}\x1b[0m",
            Status::Fail => "\x1b[31m\u{2717}\x1b[0m",
        };
        println!("  {icon} {}", check.message);
        if let Some(ref hint) = check.hint {
            println!("    {hint}");
        }
        match check.status {
            Status::Pass => passed += 1,
            Status::Fail => failed += 1,
        }
    }

    println!();
    if failed > 0 {
        println!("{passed} passed, {failed} failure(s)");
    } else {
        println!("{passed} passed");
    }
}
