//! Snapshot types returned by the torrent daemon.
//!
//! Field names follow the Transmission RPC wire format (camelCase), so the
//! structs deserialize straight out of `torrent-get` / `session-stats`.

use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

/// Lifecycle state of a torrent. Numeric values match the RPC `status` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "i64")]
pub enum Status {
    Stopped,
    CheckPending,
    Checking,
    DownloadPending,
    Downloading,
    SeedPending,
    Seeding,
}

impl TryFrom<i64> for Status {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Stopped),
            1 => Ok(Self::CheckPending),
            2 => Ok(Self::Checking),
            3 => Ok(Self::DownloadPending),
            4 => Ok(Self::Downloading),
            5 => Ok(Self::SeedPending),
            6 => Ok(Self::Seeding),
            other => Err(format!("unknown torrent status {other}")),
        }
    }
}

impl Status {
    pub fn label(self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::CheckPending => "Check waiting",
            Self::Checking => "Checking",
            Self::DownloadPending => "Download waiting",
            Self::Downloading => "Downloading",
            Self::SeedPending => "Seed waiting",
            Self::Seeding => "Seeding",
        }
    }

    pub fn is_downloading(self) -> bool {
        matches!(self, Self::Downloading | Self::DownloadPending)
    }

    pub fn is_seeding(self) -> bool {
        matches!(self, Self::Seeding | Self::SeedPending)
    }

    pub fn is_checking(self) -> bool {
        matches!(self, Self::Checking | Self::CheckPending)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Tracker {
    #[serde(default)]
    pub announce: String,
}

static TRACKER_HOST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\w+://([^:/]+)").expect("tracker host pattern is valid")
});

impl Tracker {
    /// Host part of the announce URL, if it has one.
    pub fn host(&self) -> Option<&str> {
        TRACKER_HOST
            .captures(&self.announce)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }
}

/// One torrent as seen in a single poll.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    pub status: Status,
    #[serde(default)]
    pub percent_done: f64,
    #[serde(default)]
    pub rate_download: u64,
    #[serde(default)]
    pub rate_upload: u64,
    #[serde(default)]
    pub downloaded_ever: u64,
    #[serde(default)]
    pub uploaded_ever: u64,
    #[serde(default)]
    pub upload_ratio: f64,
    #[serde(default)]
    pub size_when_done: u64,
    #[serde(default)]
    pub left_until_done: u64,
    #[serde(default)]
    pub added_date: i64,
    #[serde(default = "unknown_eta")]
    pub eta: i64,
    #[serde(default)]
    pub error: i64,
    #[serde(default)]
    pub error_string: String,
    #[serde(default)]
    pub trackers: Vec<Tracker>,
}

fn unknown_eta() -> i64 {
    -1
}

impl Item {
    /// Bare item with zeroed counters. Mostly useful for building snapshots by hand.
    pub fn new(id: i64, name: impl Into<String>, status: Status) -> Self {
        Self {
            id,
            name: name.into(),
            status,
            percent_done: 0.0,
            rate_download: 0,
            rate_upload: 0,
            downloaded_ever: 0,
            uploaded_ever: 0,
            upload_ratio: 0.0,
            size_when_done: 0,
            left_until_done: 0,
            added_date: 0,
            eta: -1,
            error: 0,
            error_string: String::new(),
            trackers: Vec::new(),
        }
    }

    /// Bytes already on disk.
    pub fn have(&self) -> u64 {
        self.size_when_done.saturating_sub(self.left_until_done)
    }

    pub fn has_error(&self) -> bool {
        self.error != 0
    }

    pub fn is_active(&self) -> bool {
        self.rate_download > 0 || self.rate_upload > 0
    }

    /// Status as shown to users; the error flag wins over the lifecycle state.
    pub fn status_label(&self) -> &'static str {
        if self.has_error() {
            "Error"
        } else {
            self.status.label()
        }
    }

    /// Upload ratio; the daemon reports -1 for "not available" and -2 for infinite.
    pub fn ratio_label(&self) -> String {
        if self.upload_ratio == -2.0 {
            "∞".to_owned()
        } else if self.upload_ratio < 0.0 {
            "-".to_owned()
        } else {
            format!("{:.2}", self.upload_ratio)
        }
    }

    pub fn tracker_hosts(&self) -> Vec<&str> {
        self.trackers.iter().filter_map(Tracker::host).collect()
    }
}

/// Totals for one accounting period (current session or all time).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransferTotals {
    pub downloaded_bytes: u64,
    pub uploaded_bytes: u64,
    pub files_added: u64,
    pub session_count: u64,
    pub seconds_active: u64,
}

/// Daemon-wide counters from `session-stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Stats {
    pub torrent_count: u64,
    pub active_torrent_count: u64,
    pub paused_torrent_count: u64,
    pub download_speed: u64,
    pub upload_speed: u64,
    #[serde(rename = "current-stats")]
    pub current: TransferTotals,
    #[serde(rename = "cumulative-stats")]
    pub cumulative: TransferTotals,
}

/// Result of `torrent-add`. An empty `name` means the daemon accepted the
/// request but reported nothing back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AddedItem {
    pub id: i64,
    pub name: String,
    pub hash_string: String,
}

/// Single-item or whole-daemon state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemAction {
    Start,
    Stop,
    Verify,
}

impl ItemAction {
    pub fn rpc_method(self) -> &'static str {
        match self {
            Self::Start => "torrent-start",
            Self::Stop => "torrent-stop",
            Self::Verify => "torrent-verify",
        }
    }

    /// The command word users type for this action.
    pub fn verb(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Verify => "check",
        }
    }

    /// Confirmation for a whole-daemon action: "stopped all torrents".
    pub fn all_done(self) -> &'static str {
        match self {
            Self::Start => "started all torrents",
            Self::Stop => "stopped all torrents",
            Self::Verify => "verifying all torrents",
        }
    }

    pub fn gerund(self) -> &'static str {
        match self {
            Self::Start => "starting",
            Self::Stop => "stopping",
            Self::Verify => "verifying",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Id,
    Name,
    Age,
    Size,
    Progress,
    DownSpeed,
    UpSpeed,
    Downloaded,
    Uploaded,
    Ratio,
}

impl SortKey {
    pub const ALL: [SortKey; 10] = [
        Self::Id,
        Self::Name,
        Self::Age,
        Self::Size,
        Self::Progress,
        Self::DownSpeed,
        Self::UpSpeed,
        Self::Downloaded,
        Self::Uploaded,
        Self::Ratio,
    ];

    pub fn parse(word: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|key| key.name().eq_ignore_ascii_case(word))
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Age => "age",
            Self::Size => "size",
            Self::Progress => "progress",
            Self::DownSpeed => "downspeed",
            Self::UpSpeed => "upspeed",
            Self::Downloaded => "download",
            Self::Uploaded => "upload",
            Self::Ratio => "ratio",
        }
    }

    fn compare(self, a: &Item, b: &Item) -> Ordering {
        match self {
            Self::Id => a.id.cmp(&b.id),
            Self::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            Self::Age => a.added_date.cmp(&b.added_date),
            Self::Size => a.size_when_done.cmp(&b.size_when_done),
            Self::Progress => a.percent_done.total_cmp(&b.percent_done),
            Self::DownSpeed => a.rate_download.cmp(&b.rate_download),
            Self::UpSpeed => a.rate_upload.cmp(&b.rate_upload),
            Self::Downloaded => a.downloaded_ever.cmp(&b.downloaded_ever),
            Self::Uploaded => a.uploaded_ever.cmp(&b.uploaded_ever),
            Self::Ratio => a.upload_ratio.total_cmp(&b.upload_ratio),
        }
    }
}

/// Order applied to every listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sorting {
    pub key: SortKey,
    pub reversed: bool,
}

impl Sorting {
    pub fn apply(&self, items: &mut [Item]) {
        items.sort_by(|a, b| {
            let ord = self.key.compare(a, b).then_with(|| a.id.cmp(&b.id));
            if self.reversed { ord.reverse() } else { ord }
        });
    }
}

impl fmt::Display for Sorting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reversed {
            write!(f, "reversed {}", self.key.name())
        } else {
            f.write_str(self.key.name())
        }
    }
}
