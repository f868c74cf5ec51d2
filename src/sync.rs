use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::engine::SubscriptionEngine;
use crate::error::{Error, Result};
use crate::fetcher::FeedFetcher;
use crate::models::{Channel, ChannelView, ContentItem, NewChannel};
use crate::store::ChannelStore;

/// A channel whose refresh failed during a sync run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelFailure {
    pub channel_id: i64,
    pub feed_path: String,
    pub error: String,
}

/// New items per group from one sync run.
///
/// Groups without anything new are absent from `groups`. Each group's views
/// are ordered by channel id, and each view holds only the new items,
/// oldest first.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncOutcome {
    pub groups: HashMap<i64, Vec<ChannelView>>,
    pub failures: Vec<ChannelFailure>,
}

impl SyncOutcome {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

struct ChannelUpdate {
    view: ChannelView,
    subscribers: Vec<i64>,
}

/// Items in `fetched` whose ids are not in `seen`, oldest first.
///
/// Undated items sort before dated ones; items with equal timestamps keep
/// their feed order. Repeated ids within one fetch are reported once.
pub fn diff_new_items(seen: &HashSet<String>, fetched: &[ContentItem]) -> Vec<ContentItem> {
    let mut reported = HashSet::new();
    let mut fresh = Vec::new();
    for item in fetched {
        if !seen.contains(&item.id) && reported.insert(item.id.as_str()) {
            fresh.push(item.clone());
        }
    }
    fresh.sort_by_key(|item| item.published);
    fresh
}

impl<F: FeedFetcher, S: ChannelStore> SubscriptionEngine<F, S> {
    /// Refresh every known channel and collect the items each subscribed
    /// group has not seen yet.
    ///
    /// Only a failure to enumerate channels fails the whole run; a channel
    /// that cannot be fetched or stored is reported in
    /// [`SyncOutcome::failures`] and the rest carry on. Runs are serialized,
    /// so overlapping calls cannot report the same item twice.
    pub async fn sync_job_trigger(&self) -> Result<SyncOutcome> {
        let _guard = self.sync_lock.lock().await;

        let channels = self.store.list_all_channels().await.map_err(|e| {
            error!("Listing channels for sync failed: {}", e);
            Error::storage("listing channels", e)
        })?;
        info!("Syncing {} channels", channels.len());

        let concurrency = self.options.sync_concurrency.max(1);
        let results: Vec<(Channel, Result<Option<ChannelUpdate>>)> =
            stream::iter(channels)
                .map(|channel| async move {
                    let result = self.sync_channel(&channel).await;
                    (channel, result)
                })
                .buffer_unordered(concurrency)
                .collect()
                .await;

        let mut updates = Vec::new();
        let mut outcome = SyncOutcome::default();
        for (channel, result) in results {
            match result {
                Ok(Some(update)) => updates.push(update),
                Ok(None) => {}
                Err(e) => outcome.failures.push(ChannelFailure {
                    channel_id: channel.id,
                    feed_path: channel.feed_path,
                    error: e.to_string(),
                }),
            }
        }

        updates.sort_by_key(|u| u.view.channel.id);
        outcome.failures.sort_by_key(|f| f.channel_id);
        for update in updates {
            for group_id in update.subscribers {
                outcome
                    .groups
                    .entry(group_id)
                    .or_default()
                    .push(update.view.clone());
            }
        }

        info!(
            "Sync complete: {} groups with new items, {} channels failed",
            outcome.groups.len(),
            outcome.failures.len()
        );
        Ok(outcome)
    }

    /// Fetch, diff and persist one channel. New items are only returned once
    /// the snapshot holding them has been written.
    async fn sync_channel(&self, channel: &Channel) -> Result<Option<ChannelUpdate>> {
        let feed = match self
            .options
            .mirrors
            .fetch(&self.fetcher, &channel.feed_path, self.options.fetch_timeout)
            .await
        {
            Ok(feed) => feed,
            Err(source) => {
                warn!("Failed to refresh channel '{}': {}", channel.feed_path, source);
                let message = source.to_string();
                if let Err(db_err) = self.store.record_channel_error(channel.id, &message).await {
                    warn!(
                        "Failed to record error for channel {}: {}",
                        channel.id, db_err
                    );
                }
                return Err(Error::Fetch {
                    feed_path: channel.feed_path.clone(),
                    source,
                });
            }
        };

        let seen = self
            .store
            .get_content_ids(channel.id)
            .await
            .map_err(|e| Error::storage("loading snapshot", e))?;

        let fresh = if channel.has_baseline() {
            diff_new_items(&seen, &feed.items)
        } else {
            info!("Establishing baseline for channel '{}'", channel.feed_path);
            Vec::new()
        };

        let subscribers = if fresh.is_empty() {
            Vec::new()
        } else {
            self.store
                .list_subscribers(channel.id)
                .await
                .map_err(|e| Error::storage("loading subscribers", e))?
        };

        let stored = self
            .store
            .upsert_channel(&NewChannel::from_feed(&channel.feed_path, &feed), &feed.items)
            .await
            .map_err(|e| {
                error!("Failed to save snapshot for '{}': {}", channel.feed_path, e);
                Error::storage("saving snapshot", e)
            })?;

        if fresh.is_empty() || subscribers.is_empty() {
            return Ok(None);
        }
        info!(
            "Channel '{}' has {} new items for {} groups",
            channel.feed_path,
            fresh.len(),
            subscribers.len()
        );

        Ok(Some(ChannelUpdate {
            view: ChannelView {
                channel: stored,
                contents: fresh,
            },
            subscribers,
        }))
    }
}

/// Run a sync now and then every `interval`, handing each group's new items
/// to `deliver`.
///
/// Every run advances the dedup snapshot, so items handed to `deliver` are
/// never reported by a later [`SubscriptionEngine::sync_job_trigger`] call.
/// Only start this when `deliver` is the one place items get delivered.
pub async fn start_background_sync<F, S, D>(
    engine: Arc<SubscriptionEngine<F, S>>,
    interval: Duration,
    deliver: D,
) where
    F: FeedFetcher,
    S: ChannelStore,
    D: Fn(i64, &[ChannelView]) + Send + Sync,
{
    info!("Starting initial sync");
    run_sync(&*engine, &deliver).await;

    loop {
        tokio::time::sleep(interval).await;
        info!("Starting scheduled sync");
        run_sync(&*engine, &deliver).await;
    }
}

async fn run_sync<F, S, D>(engine: &SubscriptionEngine<F, S>, deliver: &D)
where
    F: FeedFetcher,
    S: ChannelStore,
    D: Fn(i64, &[ChannelView]),
{
    match engine.sync_job_trigger().await {
        Ok(outcome) => {
            for (group_id, views) in &outcome.groups {
                deliver(*group_id, views);
            }
        }
        Err(e) => error!("Sync failed: {}", e),
    }
}
