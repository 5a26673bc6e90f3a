pub mod config;
pub mod functions;
pub mod llm;
pub mod server;
pub mod widget;

use config::Settings;
use functions::chat::ChatHandler;
use llm::gemini::GeminiProvider;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Build the chat endpoint from the environment and serve it until shutdown.
pub async fn run() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    init_tracing();

    if settings.gemini_api_key.is_none() {
        tracing::warn!("GEMINI_API_KEY is not set; chat requests will fail with 500");
    }

    let provider = Arc::new(GeminiProvider::new(settings.gemini.clone()));
    let handler = Arc::new(ChatHandler::new(settings.gemini_api_key.clone(), provider));
    let app = server::router(handler);

    let listener = tokio::net::TcpListener::bind(settings.bind_addr).await?;
    tracing::info!(
        addr = %settings.bind_addr,
        model = %settings.gemini.model,
        "chat endpoint listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
