//! dc-advisor - HTTP Server Entry Point
//!
//! Starts the HTTP server that exposes the session and chat API.

use dc_advisor::{api, config::Config};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dc_advisor=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Loaded configuration: oauth={}, agent_api={}, data_dir={}",
        config.oauth.base_url,
        config.agent.base_url,
        config.data_dir.display()
    );
    if config.agent.service_token.is_none() {
        warn!("AGENT_BEARER_TOKEN is not set; prompts will be rejected");
    }

    info!("Starting server on {}:{}", config.host, config.port);
    api::serve(config).await?;

    Ok(())
}
