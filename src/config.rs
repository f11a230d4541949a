//! Configuration loaded from `trelay.toml` and merged with CLI flags.

use color_eyre::eyre::{WrapErr, bail, eyre};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::live::LiveSchedule;

/// File looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "trelay.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Telegram usernames allowed to use the bot.
    #[serde(default)]
    pub masters: Vec<String>,

    /// Upper bound on commands handled at the same time.
    #[serde(default = "default_max_concurrent_commands")]
    pub max_concurrent_commands: usize,

    /// How often the finished-watcher polls Transmission (seconds).
    #[serde(default = "default_notify_interval")]
    pub notify_interval_secs: u64,

    /// Where per-user settings are kept. See [`Config::resolved_settings_path`].
    #[serde(default)]
    pub settings_path: Option<PathBuf>,

    /// Log to this file instead of stderr.
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub transmission: TransmissionConfig,

    #[serde(default)]
    pub live: LiveConfig,
}

/// Telegram-specific configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    /// Bot API token from @BotFather.
    #[serde(default)]
    pub bot_token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransmissionConfig {
    #[serde(default = "default_rpc_url")]
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Live message cadence.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LiveConfig {
    #[serde(default = "default_live_iterations")]
    pub iterations: u32,
    #[serde(default = "default_live_interval")]
    pub interval_secs: u64,
}

/// Values given on the command line. `None` keeps the file value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub token: Option<String>,
    pub masters: Option<Vec<String>>,
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub log_file: Option<PathBuf>,
    pub settings_path: Option<PathBuf>,
}

fn default_max_concurrent_commands() -> usize {
    32
}

fn default_notify_interval() -> u64 {
    2
}

fn default_rpc_url() -> String {
    "http://localhost:9091/transmission/rpc".into()
}

fn default_live_iterations() -> u32 {
    60
}

fn default_live_interval() -> u64 {
    2
}

impl Default for Config {
    fn default() -> Self {
        Self {
            masters: Vec::new(),
            max_concurrent_commands: default_max_concurrent_commands(),
            notify_interval_secs: default_notify_interval(),
            settings_path: None,
            log_file: None,
            telegram: TelegramConfig::default(),
            transmission: TransmissionConfig::default(),
            live: LiveConfig::default(),
        }
    }
}

impl Default for TransmissionConfig {
    fn default() -> Self {
        Self {
            url: default_rpc_url(),
            username: None,
            password: None,
        }
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            iterations: default_live_iterations(),
            interval_secs: default_live_interval(),
        }
    }
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> color_eyre::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                eyre!(
                    "No config found at {}\n\n\
                     A minimal trelay.toml looks like:\n\n\
                     masters = [\"your_telegram_username\"]\n\n\
                     [telegram]\n\
                     bot_token = \"your-token-here\"\n",
                    path.display()
                )
            } else {
                eyre!("failed to read {}: {e}", path.display())
            }
        })?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| eyre!("failed to parse {}: {e}", path.display()))?;
        Ok(config)
    }

    /// Build the effective config: file (explicit, `./trelay.toml`, or
    /// defaults), then CLI overrides, then `TR_AUTH` when no username is set.
    /// Fails when the token or masters are missing.
    pub fn resolve(
        path: Option<&Path>,
        overrides: Overrides,
        tr_auth: Option<&str>,
    ) -> color_eyre::Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => {
                let local = Path::new(DEFAULT_CONFIG_FILE);
                if local.exists() {
                    Self::load(local)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply(overrides);

        if config.transmission.username.is_none()
            && let Some(auth) = tr_auth.filter(|a| !a.is_empty())
        {
            let (user, pass) = auth
                .split_once(':')
                .ok_or_else(|| eyre!("TR_AUTH must look like user:password"))?;
            config.transmission.username = Some(user.to_owned());
            config.transmission.password = Some(pass.to_owned());
        }

        config.masters = normalize_masters(&config.masters);
        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, overrides: Overrides) {
        if let Some(token) = overrides.token {
            self.telegram.bot_token = token;
        }
        if let Some(masters) = overrides.masters {
            self.masters = masters;
        }
        if let Some(url) = overrides.url {
            self.transmission.url = url;
        }
        if overrides.username.is_some() {
            self.transmission.username = overrides.username;
        }
        if overrides.password.is_some() {
            self.transmission.password = overrides.password;
        }
        if overrides.log_file.is_some() {
            self.log_file = overrides.log_file;
        }
        if overrides.settings_path.is_some() {
            self.settings_path = overrides.settings_path;
        }
    }

    fn validate(&self) -> color_eyre::Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            bail!("no Telegram bot token configured (use --token or [telegram] bot_token)");
        }
        if self.masters.is_empty() {
            bail!("no masters configured (use --masters or masters = [...])");
        }
        Ok(())
    }

    pub fn live_schedule(&self) -> LiveSchedule {
        LiveSchedule {
            iterations: self.live.iterations,
            interval: Duration::from_secs(self.live.interval_secs),
        }
    }

    pub fn notify_interval(&self) -> Duration {
        Duration::from_secs(self.notify_interval_secs.max(1))
    }

    /// Configured settings path, or `<config_dir>/trelay/settings.json`,
    /// or `.trelay/settings.json` when there is no config dir.
    pub fn resolved_settings_path(&self) -> PathBuf {
        if let Some(path) = &self.settings_path {
            return path.clone();
        }
        match dirs::config_dir() {
            Some(dir) => dir.join("trelay").join("settings.json"),
            None => PathBuf::from(".trelay/settings.json"),
        }
    }

    /// Make sure the settings directory exists.
    pub fn ensure_settings_dir(&self) -> color_eyre::Result<PathBuf> {
        let path = self.resolved_settings_path();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .wrap_err_with(|| format!("failed to create {}", parent.display()))?;
        }
        Ok(path)
    }
}

/// Lower-case, strip `@`, drop empties, sort and de-duplicate.
pub fn normalize_masters(masters: &[String]) -> Vec<String> {
    let mut out: Vec<String> = masters
        .iter()
        .map(|m| m.trim().trim_start_matches('@').to_lowercase())
        .filter(|m| !m.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}
