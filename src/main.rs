//! File Token Gateway - Main Application Entry Point
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Open the token store (PostgreSQL + migrations, or in memory)
//! 3. Build HTTP router with routes and middleware
//! 4. Start server on configured port

use file_token_gateway::{config, router, state::AppState, store};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with tracing subscriber.
    // Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env()?;
    tracing::info!(
        private_root = %config.private_files_root.display(),
        public_root = %config.public_files_root.display(),
        "Configuration loaded"
    );

    let store = store::connect(&config).await?;
    let app = router(AppState::new(store, &config));

    // Bind to network address and start server
    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
