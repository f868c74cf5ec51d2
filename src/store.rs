use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{Channel, ContentItem, NewChannel, Subscription};

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence for channels, subscriptions and content snapshots.
///
/// Implementations execute the requested reads and writes only; deciding
/// when to create, refresh or remove rows belongs to the
/// [`SubscriptionEngine`](crate::engine::SubscriptionEngine).
#[async_trait]
pub trait ChannelStore: Send + Sync {
    /// Insert or refresh a channel by `feed_path`, merge `contents` into its
    /// snapshot and stamp it as synced. Returns the stored row.
    async fn upsert_channel(
        &self,
        channel: &NewChannel,
        contents: &[ContentItem],
    ) -> StoreResult<Channel>;

    async fn get_channel_by_feed_path(&self, feed_path: &str) -> StoreResult<Option<Channel>>;

    async fn get_subscription(
        &self,
        group_id: i64,
        channel_id: i64,
    ) -> StoreResult<Option<Subscription>>;

    async fn create_subscription(&self, group_id: i64, channel_id: i64) -> StoreResult<()>;

    /// Returns whether a row was removed.
    async fn delete_subscription(&self, group_id: i64, channel_id: i64) -> StoreResult<bool>;

    /// The channel for `feed_path`, only if `group_id` is subscribed to it.
    async fn get_subscription_by_feed_path(
        &self,
        group_id: i64,
        feed_path: &str,
    ) -> StoreResult<Option<Channel>>;

    async fn get_subscribed_channels_by_group(&self, group_id: i64) -> StoreResult<Vec<Channel>>;

    async fn list_all_channels(&self) -> StoreResult<Vec<Channel>>;

    /// Group ids subscribed to a channel.
    async fn list_subscribers(&self, channel_id: i64) -> StoreResult<Vec<i64>>;

    /// Identifiers in a channel's dedup snapshot.
    async fn get_content_ids(&self, channel_id: i64) -> StoreResult<HashSet<String>>;

    async fn record_channel_error(&self, channel_id: i64, error: &str) -> StoreResult<()>;
}
