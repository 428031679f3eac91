//! EcoNexus client core
//!
//! Starts the client services, prints the home screen snapshot as JSON and exits.

use econexus::{App, Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if config.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting EcoNexus client core");
    tracing::info!("Fallback policy: {}", config.fallback.as_str());

    let app = App::start(config).await?;

    let snapshot = app.dashboard().await;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    app.shutdown();
    Ok(())
}
