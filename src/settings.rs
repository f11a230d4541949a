//! Per-master settings with persistence.
//!
//! Remembers which chat each master last talked from and whether they want
//! "finished" notifications. Stored as a small JSON file so a restart keeps
//! both.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use color_eyre::eyre::{Result, WrapErr, eyre};
use serde::{Deserialize, Serialize};

/// Lookup and update of per-user settings. Usernames are case-insensitive.
#[cfg_attr(test, mockall::automock)]
pub trait SettingsStore: Send + Sync {
    /// Chat id recorded for `user`. Errors if the user never talked to the bot.
    fn chat_id(&self, user: &str) -> Result<i64>;

    fn set_chat_id(&self, user: &str, chat_id: i64) -> Result<()>;

    /// Whether `user` wants notifications. Unknown users default to `false`.
    fn notifications_enabled(&self, user: &str) -> Result<bool>;

    fn set_notifications(&self, user: &str, enabled: bool) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct UserSettings {
    #[serde(default)]
    chat_id: Option<i64>,
    #[serde(default)]
    notify: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SettingsState {
    #[serde(default)]
    users: BTreeMap<String, UserSettings>,
}

/// [`SettingsStore`] backed by a JSON file, rewritten after every change.
pub struct JsonSettings {
    path: PathBuf,
    state: Mutex<SettingsState>,
}

fn key(user: &str) -> String {
    user.trim_start_matches('@').to_lowercase()
}

impl JsonSettings {
    /// Load the store at `path`. A missing file starts empty; an unreadable or
    /// corrupt one is an error.
    pub fn open(path: &Path) -> Result<Self> {
        let state = match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw)
                .wrap_err_with(|| format!("corrupt settings file {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SettingsState::default(),
            Err(e) => {
                return Err(e).wrap_err_with(|| format!("failed to read {}", path.display()));
            }
        };

        Ok(Self {
            path: path.to_owned(),
            state: Mutex::new(state),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SettingsState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Write via a temp file and rename so a crash never leaves half a file.
    fn persist(&self, state: &SettingsState) -> Result<()> {
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)
                .wrap_err_with(|| format!("failed to create {}", dir.display()))?;
        }

        let json = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).wrap_err_with(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .wrap_err_with(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }

    fn update(&self, user: &str, f: impl FnOnce(&mut UserSettings)) -> Result<()> {
        let mut state = self.lock();
        let entry = state.users.entry(key(user)).or_default();
        let before = entry.clone();
        f(entry);
        if *entry == before {
            return Ok(());
        }
        self.persist(&state)
    }
}

impl SettingsStore for JsonSettings {
    fn chat_id(&self, user: &str) -> Result<i64> {
        self.lock()
            .users
            .get(&key(user))
            .and_then(|u| u.chat_id)
            .ok_or_else(|| eyre!("no chat recorded for {user}"))
    }

    fn set_chat_id(&self, user: &str, chat_id: i64) -> Result<()> {
        self.update(user, |u| u.chat_id = Some(chat_id))
    }

    fn notifications_enabled(&self, user: &str) -> Result<bool> {
        Ok(self
            .lock()
            .users
            .get(&key(user))
            .is_some_and(|u| u.notify))
    }

    fn set_notifications(&self, user: &str, enabled: bool) -> Result<()> {
        self.update(user, |u| u.notify = enabled)
    }
}
