mod config;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use agora_api::state::{AppState, AppStateInner};
use agora_channel::ChannelTree;
use agora_db::Database;
use agora_message::MessageManager;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agora=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database and channel tree
    let db = Arc::new(Database::open(&config.db_path)?);
    let channels = Arc::new(ChannelTree::load(db.clone())?);
    let messages = MessageManager::new(db.clone(), channels.clone(), config.manager.clone())?;

    let state: AppState = Arc::new(AppStateInner {
        messages: messages.clone(),
        channels,
        db,
        jwt_secret: config.jwt_secret.clone(),
    });

    let app = agora_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("Agora server listening on {}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(
        pending = messages.pending_audit_writes(),
        "Draining channel event writes"
    );
    let deadline = CancellationToken::new();
    let timer = {
        let deadline = deadline.clone();
        let timeout = config.shutdown_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            deadline.cancel();
        })
    };
    match messages.drain(&deadline).await {
        Ok(()) => info!("Shutdown complete"),
        Err(e) => warn!("Shutdown drain incomplete: {}", e),
    }
    timer.abort();

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
