use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{error, info};

use crate::config::Config;
use crate::error::{Error, Result, StoreError};
use crate::fetcher::{FeedFetcher, MirrorSet};
use crate::models::{normalize_feed_path, ChannelView, NewChannel};
use crate::store::ChannelStore;

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub mirrors: MirrorSet,
    /// Upper bound on a single feed fetch
    pub fetch_timeout: Duration,
    /// Channels fetched at once during a sync
    pub sync_concurrency: usize,
}

impl From<&Config> for EngineOptions {
    fn from(config: &Config) -> Self {
        Self {
            mirrors: MirrorSet::new(config.mirrors.clone()),
            fetch_timeout: Duration::from_secs(config.fetch_timeout_secs),
            sync_concurrency: config.sync_concurrency,
        }
    }
}

/// Outcome of [`SubscriptionEngine::subscribe`].
#[derive(Debug, Clone)]
pub struct Subscribed {
    /// The channel as just fetched, including its current contents
    pub view: ChannelView,
    pub channel_existed: bool,
    pub subscription_existed: bool,
}

pub struct SubscriptionEngine<F, S> {
    pub(crate) fetcher: F,
    pub(crate) store: S,
    pub(crate) options: EngineOptions,
    pub(crate) sync_lock: Mutex<()>,
}

impl<F: FeedFetcher, S: ChannelStore> SubscriptionEngine<F, S> {
    pub fn new(fetcher: F, store: S, options: EngineOptions) -> Self {
        Self {
            fetcher,
            store,
            options,
            sync_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Subscribe `group_id` to the feed at `feed_path`.
    ///
    /// The channel's title and content snapshot are refreshed on every call,
    /// including repeat subscribes. A failed fetch leaves the store untouched.
    /// A storage failure may leave earlier steps applied; each step is
    /// idempotent, so retrying the whole call is safe.
    pub async fn subscribe(&self, group_id: i64, feed_path: &str) -> Result<Subscribed> {
        let feed_path = normalize_feed_path(feed_path)
            .ok_or_else(|| Error::InvalidFeedPath(feed_path.to_string()))?;

        let feed = self
            .options
            .mirrors
            .fetch(&self.fetcher, &feed_path, self.options.fetch_timeout)
            .await
            .map_err(|source| {
                error!("Subscribe fetch failed for '{}': {}", feed_path, source);
                Error::Fetch {
                    feed_path: feed_path.clone(),
                    source,
                }
            })?;
        info!(
            "Fetched '{}' for group {}: {} items",
            feed.title,
            group_id,
            feed.items.len()
        );

        let new_channel = NewChannel::from_feed(&feed_path, &feed);
        let mut view = ChannelView::from_feed(&feed_path, feed);

        let existing = self
            .store
            .get_channel_by_feed_path(&feed_path)
            .await
            .map_err(|e| storage_failure("looking up channel", &feed_path, e))?;
        let channel_existed = existing.is_some();

        view.channel = self
            .store
            .upsert_channel(&new_channel, &view.contents)
            .await
            .map_err(|e| storage_failure("saving channel", &feed_path, e))?;
        info!(
            "Saved channel {} ({}), existed: {}",
            view.channel.id, feed_path, channel_existed
        );

        let subscription = self
            .store
            .get_subscription(group_id, view.channel.id)
            .await
            .map_err(|e| storage_failure("looking up subscription", &feed_path, e))?;
        if subscription.is_some() {
            info!("Group {} already subscribed to '{}'", group_id, feed_path);
            return Ok(Subscribed {
                view,
                channel_existed,
                subscription_existed: true,
            });
        }

        self.store
            .create_subscription(group_id, view.channel.id)
            .await
            .map_err(|e| storage_failure("saving subscription", &feed_path, e))?;
        info!("Group {} subscribed to '{}'", group_id, feed_path);

        Ok(Subscribed {
            view,
            channel_existed,
            subscription_existed: false,
        })
    }

    /// Remove `group_id`'s subscription to `feed_path`.
    ///
    /// Fails with [`Error::NotFound`] when the channel is unknown or the group
    /// is not subscribed to it. Other groups' subscriptions and the channel
    /// itself are left in place.
    pub async fn unsubscribe(&self, group_id: i64, feed_path: &str) -> Result<()> {
        let feed_path = normalize_feed_path(feed_path)
            .ok_or_else(|| Error::InvalidFeedPath(feed_path.to_string()))?;

        let channel = self
            .store
            .get_subscription_by_feed_path(group_id, &feed_path)
            .await
            .map_err(|e| storage_failure("looking up subscription", &feed_path, e))?
            .ok_or_else(|| {
                info!("Group {} has no subscription to '{}'", group_id, feed_path);
                Error::NotFound {
                    group_id,
                    feed_path: feed_path.clone(),
                }
            })?;

        let removed = self
            .store
            .delete_subscription(group_id, channel.id)
            .await
            .map_err(|e| storage_failure("deleting subscription", &feed_path, e))?;
        if !removed {
            // Lost a race with a concurrent unsubscribe
            return Err(Error::NotFound {
                group_id,
                feed_path,
            });
        }

        info!("Group {} unsubscribed from '{}'", group_id, feed_path);
        Ok(())
    }

    /// Stored channels for a group, without contents. Never fetches.
    pub async fn get_subscribed_channels_by_group_id(
        &self,
        group_id: i64,
    ) -> Result<Vec<ChannelView>> {
        let channels = self
            .store
            .get_subscribed_channels_by_group(group_id)
            .await
            .map_err(|e| {
                error!("Listing subscriptions for group {} failed: {}", group_id, e);
                Error::storage(format!("listing subscriptions of group {}", group_id), e)
            })?;
        info!("Group {} has {} subscriptions", group_id, channels.len());

        Ok(channels.into_iter().map(ChannelView::without_contents).collect())
    }
}

fn storage_failure(action: &str, feed_path: &str, source: StoreError) -> Error {
    let action = format!("{} '{}'", action, feed_path);
    error!("Failed {}: {}", action, source);
    Error::storage(action, source)
}
