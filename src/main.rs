use std::sync::Arc;
use std::time::Duration;

use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rsshub::config::Config;
use rsshub::db::Database;
use rsshub::fetcher::HttpFeedFetcher;
use rsshub::models::ChannelView;
use rsshub::routes::{self, AppState};
use rsshub::sync::start_background_sync;
use rsshub::{EngineOptions, SubscriptionEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rsshub=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("RSSHUB_CONFIG").unwrap_or_else(|_| "rsshub.toml".to_string());
    let config = Config::load(&config_path)?;
    info!(
        "Loaded configuration from {} ({} mirrors)",
        config_path,
        config.mirrors.len()
    );

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:rsshub.db?mode=rwc".to_string());
    let db = Database::new(&database_url).await?;
    db.initialize().await?;
    info!("Database initialized");

    let fetcher = HttpFeedFetcher::new(Duration::from_secs(config.fetch_timeout_secs))?;
    let engine = Arc::new(SubscriptionEngine::new(
        fetcher,
        db,
        EngineOptions::from(&config),
    ));

    match config.background_sync_interval() {
        Some(interval) => {
            warn!(
                "Background sync every {} minutes; new items are only logged and POST /sync will not report them",
                config.refresh_interval
            );
            let bg_engine = engine.clone();
            tokio::spawn(async move {
                start_background_sync(bg_engine, interval, log_delivery).await;
            });
        }
        None => info!("Background sync disabled; call POST /sync to collect new items"),
    }

    let state = Arc::new(AppState {
        engine: engine.clone(),
    });
    let app = routes::router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!("Server starting on http://{}", config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    engine.store().close().await;
    info!("Shut down");
    Ok(())
}

/// Delivery sink for the background scheduler: one log line per new item.
fn log_delivery(group_id: i64, views: &[ChannelView]) {
    for view in views {
        for item in &view.contents {
            info!(
                group_id,
                channel = %view.channel.title,
                "New item: {} <{}>",
                item.title,
                item.link
            );
        }
    }
}
