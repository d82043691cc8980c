use anyhow::{Context, Result};
use tgauth::api::create_app;
use tgauth::config::{load_config, AppConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tgauth=info,tower_http=info".into()),
        )
        .init();

    info!("tgauth starting...");

    // Config file first, environment on top
    let mut config = match std::env::var("TGAUTH_CONFIG") {
        Ok(path) => {
            info!(path = %path, "Loading config file");
            load_config(&path)?
        }
        Err(_) => AppConfig::default(),
    };
    config.apply_env(|key| std::env::var(key).ok())?;

    info!(
        port = config.server.port,
        bucket = %config.storage.bucket,
        bot_username = %config.telegram.bot_username,
        redirect_url = ?config.oauth.redirect_url,
        "Configuration loaded"
    );

    let app = create_app(&config)?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(addr = %addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("tgauth stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for ctrl_c signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
