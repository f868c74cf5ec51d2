use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::models::{Channel, ContentItem, NewChannel, Subscription};
use crate::store::{ChannelStore, StoreResult};

const SELECT_CHANNEL: &str = r#"
    SELECT c.id, c.feed_path, c.title, c.link, c.description, c.last_synced, c.last_error
    FROM channels c
"#;

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn initialize(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS channels (
                id INTEGER PRIMARY KEY,
                feed_path TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                link TEXT,
                description TEXT,
                last_synced TEXT,
                last_error TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subscriptions (
                group_id INTEGER NOT NULL,
                channel_id INTEGER NOT NULL REFERENCES channels(id),
                created_at TEXT NOT NULL,
                PRIMARY KEY (group_id, channel_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS contents (
                channel_id INTEGER NOT NULL REFERENCES channels(id),
                guid TEXT NOT NULL,
                first_seen TEXT NOT NULL,
                PRIMARY KEY (channel_id, guid)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_subscriptions_channel
            ON subscriptions(channel_id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl ChannelStore for Database {
    async fn upsert_channel(
        &self,
        channel: &NewChannel,
        contents: &[ContentItem],
    ) -> StoreResult<Channel> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let stored = sqlx::query_as::<_, Channel>(
            r#"
            INSERT INTO channels (feed_path, title, link, description, last_synced, last_error)
            VALUES (?, ?, ?, ?, ?, NULL)
            ON CONFLICT(feed_path) DO UPDATE SET
                title = excluded.title,
                link = excluded.link,
                description = excluded.description,
                last_synced = excluded.last_synced,
                last_error = NULL
            RETURNING id, feed_path, title, link, description, last_synced, last_error
            "#,
        )
        .bind(&channel.feed_path)
        .bind(&channel.title)
        .bind(&channel.link)
        .bind(&channel.description)
        .bind(&now)
        .fetch_one(&mut *tx)
        .await?;

        // Only ids are kept; the snapshot exists for dedup
        for item in contents {
            sqlx::query(
                r#"
                INSERT INTO contents (channel_id, guid, first_seen)
                VALUES (?, ?, ?)
                ON CONFLICT(channel_id, guid) DO NOTHING
                "#,
            )
            .bind(stored.id)
            .bind(&item.id)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(stored)
    }

    async fn get_channel_by_feed_path(&self, feed_path: &str) -> StoreResult<Option<Channel>> {
        let query = format!("{} WHERE c.feed_path = ?", SELECT_CHANNEL);
        let channel = sqlx::query_as::<_, Channel>(&query)
            .bind(feed_path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(channel)
    }

    async fn get_subscription(
        &self,
        group_id: i64,
        channel_id: i64,
    ) -> StoreResult<Option<Subscription>> {
        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT group_id, channel_id, created_at FROM subscriptions
            WHERE group_id = ? AND channel_id = ?
            "#,
        )
        .bind(group_id)
        .bind(channel_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(subscription)
    }

    async fn create_subscription(&self, group_id: i64, channel_id: i64) -> StoreResult<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO subscriptions (group_id, channel_id, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(group_id, channel_id) DO NOTHING
            "#,
        )
        .bind(group_id)
        .bind(channel_id)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_subscription(&self, group_id: i64, channel_id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE group_id = ? AND channel_id = ?")
            .bind(group_id)
            .bind(channel_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_subscription_by_feed_path(
        &self,
        group_id: i64,
        feed_path: &str,
    ) -> StoreResult<Option<Channel>> {
        let query = format!(
            "{} JOIN subscriptions s ON s.channel_id = c.id WHERE s.group_id = ? AND c.feed_path = ?",
            SELECT_CHANNEL
        );
        let channel = sqlx::query_as::<_, Channel>(&query)
            .bind(group_id)
            .bind(feed_path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(channel)
    }

    async fn get_subscribed_channels_by_group(&self, group_id: i64) -> StoreResult<Vec<Channel>> {
        let query = format!(
            "{} JOIN subscriptions s ON s.channel_id = c.id WHERE s.group_id = ? ORDER BY c.id",
            SELECT_CHANNEL
        );
        let channels = sqlx::query_as::<_, Channel>(&query)
            .bind(group_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(channels)
    }

    async fn list_all_channels(&self) -> StoreResult<Vec<Channel>> {
        let query = format!("{} ORDER BY c.id", SELECT_CHANNEL);
        let channels = sqlx::query_as::<_, Channel>(&query)
            .fetch_all(&self.pool)
            .await?;
        Ok(channels)
    }

    async fn list_subscribers(&self, channel_id: i64) -> StoreResult<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT group_id FROM subscriptions WHERE channel_id = ? ORDER BY group_id",
        )
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(group_id,)| group_id).collect())
    }

    async fn get_content_ids(&self, channel_id: i64) -> StoreResult<HashSet<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT guid FROM contents WHERE channel_id = ?")
            .bind(channel_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(guid,)| guid).collect())
    }

    async fn record_channel_error(&self, channel_id: i64, error: &str) -> StoreResult<()> {
        sqlx::query("UPDATE channels SET last_error = ? WHERE id = ?")
            .bind(error)
            .bind(channel_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
