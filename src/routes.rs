use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::engine::SubscriptionEngine;
use crate::error::Error;
use crate::fetcher::HttpFeedFetcher;
use crate::models::ChannelView;
use crate::sync::SyncOutcome;

pub type Engine = SubscriptionEngine<HttpFeedFetcher, Database>;

pub struct AppState {
    pub engine: Arc<Engine>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/groups/:group_id/subscriptions",
            get(list_subscriptions).post(subscribe).delete(unsubscribe),
        )
        .route("/sync", post(sync))
        .route("/health", get(health))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct FeedPathParams {
    pub feed_path: String,
}

#[derive(Debug, Serialize)]
pub struct SubscribeResponse {
    #[serde(flatten)]
    pub view: ChannelView,
    pub channel_existed: bool,
    pub subscription_existed: bool,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
}

pub struct AppError(Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::InvalidFeedPath(_) => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Fetch { .. } => StatusCode::BAD_GATEWAY,
            Error::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.0.user_message(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError(err)
    }
}

pub async fn subscribe(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<i64>,
    Json(params): Json<FeedPathParams>,
) -> Result<(StatusCode, Json<SubscribeResponse>), AppError> {
    let subscribed = state.engine.subscribe(group_id, &params.feed_path).await?;

    let status = if subscribed.subscription_existed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((
        status,
        Json(SubscribeResponse {
            view: subscribed.view,
            channel_existed: subscribed.channel_existed,
            subscription_existed: subscribed.subscription_existed,
        }),
    ))
}

pub async fn unsubscribe(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<i64>,
    params: Option<Query<FeedPathParams>>,
) -> Result<StatusCode, AppError> {
    let Query(params) = params.ok_or_else(|| Error::InvalidFeedPath(String::new()))?;
    state.engine.unsubscribe(group_id, &params.feed_path).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_subscriptions(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<i64>,
) -> Result<Json<Vec<ChannelView>>, AppError> {
    let views = state
        .engine
        .get_subscribed_channels_by_group_id(group_id)
        .await?;
    Ok(Json(views))
}

pub async fn sync(State(state): State<Arc<AppState>>) -> Result<Json<SyncOutcome>, AppError> {
    let outcome = state.engine.sync_job_trigger().await?;
    Ok(Json(outcome))
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::fetcher::FetchError;

    fn status_of(err: Error) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            status_of(Error::InvalidFeedPath(String::new())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(Error::NotFound {
                group_id: 1,
                feed_path: "/a".to_string()
            }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(Error::Fetch {
                feed_path: "/a".to_string(),
                source: FetchError::Timeout
            }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(Error::storage(
                "saving channel",
                StoreError::Database(sqlx::Error::PoolClosed)
            )),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_health() {
        let response = health().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
