use thiserror::Error;

use crate::fetcher::FetchError;

/// Failure inside a [`ChannelStore`](crate::store::ChannelStore) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Errors surfaced by the subscription engine.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid feed path {0:?}")]
    InvalidFeedPath(String),

    #[error("failed to fetch feed '{feed_path}': {source}")]
    Fetch {
        feed_path: String,
        #[source]
        source: FetchError,
    },

    #[error("storage failure while {action}: {source}")]
    Storage {
        action: String,
        #[source]
        source: StoreError,
    },

    #[error("channel/subscription does not exist: group {group_id}, feed '{feed_path}'")]
    NotFound { group_id: i64, feed_path: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn storage(action: impl Into<String>, source: StoreError) -> Self {
        Error::Storage {
            action: action.into(),
            source,
        }
    }

    /// Short reason suitable for showing to the group that issued a command.
    pub fn user_message(&self) -> &'static str {
        match self {
            Error::InvalidFeedPath(_) => "invalid feed path",
            Error::Fetch { .. } => "failed to fetch feed",
            Error::Storage { .. } => "database error",
            Error::NotFound { .. } => "channel does not exist",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_names_group_and_feed() {
        let err = Error::NotFound {
            group_id: 42,
            feed_path: "/tech-blog".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("42"));
        assert!(msg.contains("/tech-blog"));
        assert_eq!(err.user_message(), "channel does not exist");
    }

    #[test]
    fn test_storage_error_keeps_source() {
        let err = Error::storage(
            "saving channel '/tech-blog'",
            StoreError::Database(sqlx::Error::PoolClosed),
        );
        assert!(err.to_string().contains("/tech-blog"));
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.user_message(), "database error");
    }

    #[test]
    fn test_fetch_error_message() {
        let err = Error::Fetch {
            feed_path: "/tech-blog".to_string(),
            source: FetchError::HttpStatus(503),
        };
        assert!(err.to_string().contains("503"));
        assert_eq!(err.user_message(), "failed to fetch feed");
    }
}
