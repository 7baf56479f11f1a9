//! # Chat Engine
//!
//! Entry point: loads configuration, initializes logging and serves the
//! HTTP API and WebSocket gateway.

use anyhow::Result;
use tracing::info;

use chat_engine::config::Settings;
use chat_engine::presentation::http::handlers::health;
use chat_engine::startup::Application;

#[tokio::main]
async fn main() -> Result<()> {
    // Settings come first: they choose the log format
    let settings = Settings::load()?;
    chat_engine::telemetry::init_tracing(&settings.log_format);
    health::init_server_start();

    info!(
        host = %settings.server.host,
        port = %settings.server.port,
        environment = %settings.environment,
        persistent = settings.database.url.is_some(),
        "Configuration loaded"
    );

    let application = Application::build(settings).await?;

    info!("Server ready to accept connections");
    application.run_until_stopped().await?;

    Ok(())
}
