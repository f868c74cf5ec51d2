use std::time::Duration;

use async_trait::async_trait;
use feed_rs::parser;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{ContentItem, Feed};

const USER_AGENT: &str = "rsshub/0.1 (Feed Subscriptions)";

#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("request timed out")]
    Timeout,
    /// Body could not be parsed as RSS or Atom
    #[error("parse error: {0}")]
    Parse(String),
    #[error("no feed mirrors configured")]
    NoMirrors,
}

/// Turns a mirror and feed path into a structured [`Feed`].
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch_feed(&self, mirror: &str, feed_path: &str) -> Result<Feed, FetchError>;
}

pub struct HttpFeedFetcher {
    client: Client,
}

impl HttpFeedFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { client })
    }

    pub fn feed_url(mirror: &str, feed_path: &str) -> String {
        format!("{}{}", mirror.trim_end_matches('/'), feed_path)
    }

    /// Convert raw RSS/Atom bytes into a [`Feed`]
    ///
    /// Item ids come from feed-rs: the guid when the entry has one, otherwise
    /// a hash feed-rs derives from the entry's link and title.
    pub fn parse_feed(bytes: &[u8]) -> Result<Feed, FetchError> {
        let parsed = parser::parse(bytes).map_err(|e| FetchError::Parse(e.to_string()))?;

        let mut items = Vec::with_capacity(parsed.entries.len());
        for entry in parsed.entries {
            let title = entry
                .title
                .as_ref()
                .map(|t| t.content.clone())
                .unwrap_or_else(|| "Untitled".to_string());

            let link = entry
                .links
                .first()
                .map(|l| l.href.clone())
                .unwrap_or_default();

            let id = entry.id.trim().to_string();
            if id.is_empty() {
                warn!("Skipping entry with no identifier: {}", title);
                continue;
            }

            let body = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body));

            items.push(ContentItem {
                id,
                title,
                link,
                published: entry.published.or(entry.updated),
                body,
            });
        }

        Ok(Feed {
            title: parsed
                .title
                .map(|t| t.content)
                .unwrap_or_else(|| "Untitled".to_string()),
            link: parsed.links.first().map(|l| l.href.clone()),
            description: parsed.description.map(|d| d.content),
            items,
        })
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch_feed(&self, mirror: &str, feed_path: &str) -> Result<Feed, FetchError> {
        let url = Self::feed_url(mirror, feed_path);
        debug!("Fetching feed: {}", url);

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Network(e)
            }
        })?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        let bytes = response.bytes().await?;
        Self::parse_feed(&bytes)
    }
}

/// Feed mirrors in priority order.
///
/// The first mirror is the primary; the rest are only tried when the ones
/// before them fail.
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorSet {
    mirrors: Vec<String>,
}

impl MirrorSet {
    pub fn new(mirrors: Vec<String>) -> Self {
        Self { mirrors }
    }

    /// Fetch `feed_path`, falling back through the mirrors in order.
    ///
    /// Each attempt is bounded by `timeout`.
    pub async fn fetch<F: FeedFetcher + ?Sized>(
        &self,
        fetcher: &F,
        feed_path: &str,
        timeout: Duration,
    ) -> Result<Feed, FetchError> {
        let mut last_error = FetchError::NoMirrors;
        for mirror in &self.mirrors {
            match fetch_with_timeout(fetcher, mirror, feed_path, timeout).await {
                Ok(feed) => return Ok(feed),
                Err(e) => {
                    warn!("Mirror {} failed for {}: {}", mirror, feed_path, e);
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}

async fn fetch_with_timeout<F: FeedFetcher + ?Sized>(
    fetcher: &F,
    mirror: &str,
    feed_path: &str,
    timeout: Duration,
) -> Result<Feed, FetchError> {
    tokio::time::timeout(timeout, fetcher.fetch_feed(mirror, feed_path))
        .await
        .map_err(|_| FetchError::Timeout)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
        <rss version="2.0">
            <channel>
                <title>Tech Blog</title>
                <link>https://blog.example.com</link>
                <description>Posts about things</description>
                <item>
                    <title>Second Post</title>
                    <link>https://blog.example.com/2</link>
                    <guid>post-2</guid>
                    <description>The second one</description>
                    <pubDate>Tue, 10 Dec 2024 12:00:00 GMT</pubDate>
                </item>
                <item>
                    <title>First Post</title>
                    <link>https://blog.example.com/1</link>
                    <guid>post-1</guid>
                    <pubDate>Mon, 09 Dec 2024 12:00:00 GMT</pubDate>
                </item>
            </channel>
        </rss>
    "#;

    /// Answers per mirror; records every mirror it was asked about.
    struct ScriptedFetcher {
        answers: HashMap<String, Result<Feed, u16>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedFetcher {
        fn new(answers: Vec<(&str, Result<Feed, u16>)>) -> Self {
            Self {
                answers: answers
                    .into_iter()
                    .map(|(m, a)| (m.to_string(), a))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FeedFetcher for ScriptedFetcher {
        async fn fetch_feed(&self, mirror: &str, _feed_path: &str) -> Result<Feed, FetchError> {
            self.calls.lock().unwrap().push(mirror.to_string());
            match self.answers.get(mirror) {
                Some(Ok(feed)) => Ok(feed.clone()),
                Some(Err(status)) => Err(FetchError::HttpStatus(*status)),
                None => Err(FetchError::HttpStatus(404)),
            }
        }
    }

    struct SlowFetcher;

    #[async_trait]
    impl FeedFetcher for SlowFetcher {
        async fn fetch_feed(&self, _mirror: &str, _feed_path: &str) -> Result<Feed, FetchError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Feed::default())
        }
    }

    fn titled(title: &str) -> Feed {
        Feed {
            title: title.to_string(),
            ..Default::default()
        }
    }

    mod parse_feed_tests {
        use super::*;

        #[test]
        fn test_parse_channel_metadata() {
            let feed = HttpFeedFetcher::parse_feed(RSS.as_bytes()).unwrap();
            assert_eq!(feed.title, "Tech Blog");
            assert_eq!(feed.description.as_deref(), Some("Posts about things"));
            assert_eq!(feed.items.len(), 2);
        }

        #[test]
        fn test_parse_items_keep_feed_order() {
            let feed = HttpFeedFetcher::parse_feed(RSS.as_bytes()).unwrap();
            assert_eq!(feed.items[0].id, "post-2");
            assert_eq!(feed.items[0].title, "Second Post");
            assert_eq!(feed.items[0].link, "https://blog.example.com/2");
            assert_eq!(feed.items[0].body.as_deref(), Some("The second one"));
            assert!(feed.items[0].published > feed.items[1].published);
        }

        #[test]
        fn test_entry_without_guid_gets_stable_id() {
            let rss = r#"<?xml version="1.0" encoding="UTF-8"?>
                <rss version="2.0"><channel><title>No Guids</title>
                    <item><title>Hello</title><link>https://blog.example.com/hello</link></item>
                    <item><title>World</title><link>https://blog.example.com/world</link></item>
                </channel></rss>"#;

            let first = HttpFeedFetcher::parse_feed(rss.as_bytes()).unwrap();
            let second = HttpFeedFetcher::parse_feed(rss.as_bytes()).unwrap();

            assert_eq!(first.items.len(), 2);
            assert!(!first.items[0].id.is_empty());
            assert_ne!(first.items[0].id, first.items[1].id);
            assert_eq!(first.items[0].id, second.items[0].id);
            assert_eq!(first.items[1].id, second.items[1].id);
        }

        #[test]
        fn test_parse_invalid_xml() {
            let result = HttpFeedFetcher::parse_feed(b"this is not a feed");
            assert!(matches!(result, Err(FetchError::Parse(_))));
        }
    }

    mod feed_url_tests {
        use super::*;

        #[test]
        fn test_joins_mirror_and_path() {
            assert_eq!(
                HttpFeedFetcher::feed_url("https://rsshub.app/", "/github/issue/a/b"),
                "https://rsshub.app/github/issue/a/b"
            );
        }
    }

    mod mirror_set_tests {
        use super::*;

        #[tokio::test]
        async fn test_primary_mirror_used_first() {
            let fetcher = ScriptedFetcher::new(vec![
                ("https://a.example", Ok(titled("From A"))),
                ("https://b.example", Ok(titled("From B"))),
            ]);
            let mirrors = MirrorSet::new(vec![
                "https://a.example".to_string(),
                "https://b.example".to_string(),
            ]);

            let feed = mirrors
                .fetch(&fetcher, "/feed", Duration::from_secs(5))
                .await
                .unwrap();
            assert_eq!(feed.title, "From A");
            assert_eq!(fetcher.calls(), vec!["https://a.example"]);
        }

        #[tokio::test]
        async fn test_falls_back_to_next_mirror() {
            let fetcher = ScriptedFetcher::new(vec![
                ("https://a.example", Err(503)),
                ("https://b.example", Ok(titled("From B"))),
            ]);
            let mirrors = MirrorSet::new(vec![
                "https://a.example".to_string(),
                "https://b.example".to_string(),
            ]);

            let feed = mirrors
                .fetch(&fetcher, "/feed", Duration::from_secs(5))
                .await
                .unwrap();
            assert_eq!(feed.title, "From B");
            assert_eq!(fetcher.calls().len(), 2);
        }

        #[tokio::test]
        async fn test_all_mirrors_fail_returns_last_error() {
            let fetcher = ScriptedFetcher::new(vec![
                ("https://a.example", Err(503)),
                ("https://b.example", Err(502)),
            ]);
            let mirrors = MirrorSet::new(vec![
                "https://a.example".to_string(),
                "https://b.example".to_string(),
            ]);

            let result = mirrors.fetch(&fetcher, "/feed", Duration::from_secs(5)).await;
            assert!(matches!(result, Err(FetchError::HttpStatus(502))));
        }

        #[tokio::test]
        async fn test_no_mirrors() {
            let fetcher = ScriptedFetcher::new(vec![]);
            let mirrors = MirrorSet::new(vec![]);

            let result = mirrors.fetch(&fetcher, "/feed", Duration::from_secs(5)).await;
            assert!(matches!(result, Err(FetchError::NoMirrors)));
            assert!(fetcher.calls().is_empty());
        }

        #[tokio::test(start_paused = true)]
        async fn test_slow_fetch_times_out() {
            let mirrors = MirrorSet::new(vec!["https://a.example".to_string()]);

            let result = mirrors
                .fetch(&SlowFetcher, "/feed", Duration::from_secs(1))
                .await;
            assert!(matches!(result, Err(FetchError::Timeout)));
        }
    }
}
