use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// A parsed feed as returned by a [`FeedFetcher`](crate::fetcher::FeedFetcher).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Feed {
    pub title: String,
    pub link: Option<String>,
    pub description: Option<String>,
    pub items: Vec<ContentItem>,
}

/// A single feed entry.
///
/// `id` is the dedup identifier and is assumed unique within a channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContentItem {
    pub id: String,
    pub title: String,
    pub link: String,
    pub published: Option<DateTime<Utc>>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Channel {
    pub id: i64,
    pub feed_path: String,
    pub title: String,
    pub link: Option<String>,
    pub description: Option<String>,
    pub last_synced: Option<String>,
    pub last_error: Option<String>,
}

impl Channel {
    /// Whether a content snapshot has been stored to diff against.
    pub fn has_baseline(&self) -> bool {
        self.last_synced.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Subscription {
    pub group_id: i64,
    pub channel_id: i64,
    pub created_at: String,
}

/// Upsert payload for a channel, keyed by `feed_path`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChannel {
    pub feed_path: String,
    pub title: String,
    pub link: Option<String>,
    pub description: Option<String>,
}

impl NewChannel {
    pub fn from_feed(feed_path: &str, feed: &Feed) -> Self {
        Self {
            feed_path: feed_path.to_string(),
            title: feed.title.clone(),
            link: feed.link.clone(),
            description: feed.description.clone(),
        }
    }
}

/// A channel together with the content items relevant to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelView {
    pub channel: Channel,
    pub contents: Vec<ContentItem>,
}

impl ChannelView {
    /// Build a view for a freshly fetched feed. The channel id stays 0 until
    /// the channel has been persisted.
    pub fn from_feed(feed_path: &str, feed: Feed) -> Self {
        Self {
            channel: Channel {
                id: 0,
                feed_path: feed_path.to_string(),
                title: feed.title,
                link: feed.link,
                description: feed.description,
                last_synced: None,
                last_error: None,
            },
            contents: feed.items,
        }
    }

    pub fn without_contents(channel: Channel) -> Self {
        Self {
            channel,
            contents: Vec::new(),
        }
    }
}

/// Normalize a user-supplied feed path into the channel natural key.
///
/// Feed paths always resolve against a configured mirror, so the result
/// starts with `/`. Returns `None` for blank input and for anything carrying
/// a URL scheme.
pub fn normalize_feed_path(feed_path: &str) -> Option<String> {
    let trimmed = feed_path.trim();
    if trimmed.is_empty() || trimmed == "/" || trimmed.contains("://") {
        return None;
    }
    if trimmed.starts_with('/') {
        Some(trimmed.to_string())
    } else {
        Some(format!("/{}", trimmed))
    }
}
