//! trelay: drive a Transmission daemon from Telegram.
//!
//! The binary wires these modules together; integration tests use them
//! directly with fake channels and remotes.

pub mod bridge;
pub mod channel;
pub mod config;
pub mod dispatch;
pub mod format;
pub mod handlers;
pub mod live;
pub mod logging;
pub mod remote;
pub mod settings;
pub mod watcher;
