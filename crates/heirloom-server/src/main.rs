mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use heirloom_api::auth::{AppState, AppStateInner};
use heirloom_db::Database;
use heirloom_storage::LocalStore;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "heirloom=debug,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {e:#}");
            std::process::exit(1);
        }
    };

    let db = Database::open(&config.db_path)?;
    // Media links are signed with the JWT secret.
    let store = LocalStore::new(config.media_dir.clone(), &config.public_url, config.jwt_secret.as_bytes()).await?;

    let state: AppState = Arc::new(AppStateInner {
        db,
        store,
        jwt_secret: config.jwt_secret.clone(),
        signed_url_ttl: config.signed_url_ttl,
    });

    let app = heirloom_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Heirloom server listening on {}", addr);
    info!("Media served from {} as {}", config.media_dir.display(), config.public_url);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C, shutting down...");
}
