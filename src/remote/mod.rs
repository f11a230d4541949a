//! Torrent daemon access.
//!
//! Handlers, live feeds and the finished-watcher only ever see
//! [`RemoteClient`]; [`transmission::TransmissionClient`] is the production
//! implementation.

pub mod model;
pub mod transmission;

use async_trait::async_trait;
use color_eyre::eyre::Result;

pub use model::{AddedItem, Item, ItemAction, SortKey, Sorting, Stats, Status, Tracker};

/// Query and control surface of the torrent daemon.
///
/// Implementations are shared across every task, so they must be internally
/// synchronized.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Full snapshot, ordered by the current [`Sorting`].
    async fn list_items(&self) -> Result<Vec<Item>>;

    /// One item by id. Errors when the daemon has no such id.
    async fn get_item(&self, id: i64) -> Result<Item>;

    async fn session_stats(&self) -> Result<Stats>;

    /// Daemon version string.
    async fn version(&self) -> Result<String>;

    /// Add a torrent by URL, magnet link or daemon-side path.
    async fn add(&self, source: &str) -> Result<AddedItem>;

    /// Remove an item, optionally with its data. Returns the removed item's name.
    async fn remove(&self, id: i64, delete_data: bool) -> Result<String>;

    /// Apply `action` to one item. Returns the daemon's status string.
    async fn apply(&self, action: ItemAction, id: i64) -> Result<String>;

    /// Apply `action` to every item.
    async fn apply_all(&self, action: ItemAction) -> Result<()>;

    /// Order used by later [`RemoteClient::list_items`] calls.
    fn set_sort(&self, sorting: Sorting);
}
