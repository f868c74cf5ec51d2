//! rsshub - group subscriptions to syndication feeds
//!
//! Channels (one per distinct feed path) are fetched through configurable
//! feed mirrors and stored with a snapshot of their items. Groups subscribe
//! to channels, and each sync reports to every subscribed group only the
//! items it has not been shown before.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod routes;
pub mod store;
pub mod sync;

pub use engine::{EngineOptions, Subscribed, SubscriptionEngine};
pub use error::{Error, Result};
pub use sync::SyncOutcome;
