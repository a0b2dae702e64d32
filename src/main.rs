use anyhow::bail;
use axum::extract::DefaultBodyLimit;
use clap::Parser;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use catalogr::{
    Config,
    auth::TokenManager,
    catalog::MemoryCatalog,
    handlers::{AppState, Settings, create_router},
    storage::LocalContentStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if config.api_prefix().is_empty() {
        bail!("api version must not be empty");
    }
    if config.secret_key.len() < 32 {
        tracing::warn!("secret key is shorter than 32 bytes");
    }

    // Content store for uploaded files and job logs
    tokio::fs::create_dir_all(&config.data_dir).await?;
    let content = Arc::new(LocalContentStore::new(config.data_dir.clone()));

    let tokens = TokenManager::new(&config.secret_key, config.token_expiration);
    let catalog = Arc::new(MemoryCatalog::new(
        content,
        tokens,
        &config.admin_user,
        &config.admin_password,
    ));

    let state = AppState::new(
        catalog,
        Settings {
            api_version: config.api_prefix().to_string(),
            limits: config.limits(),
        },
    );

    let app = create_router(state).layer(DefaultBodyLimit::max(config.max_payload));
    let app = if config.cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    };

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Starting catalogr server on {}", addr);
    tracing::info!("Web services under /{}", config.api_prefix());
    tracing::info!("Data directory: {:?}", config.data_dir);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
