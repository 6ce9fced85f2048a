//! Lodge Server - reservation streams and operation batches over TCP.

use std::sync::Arc;

use lodge_server::{server, Config, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lodge_server=debug,lodge_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting Lodge Server on {}:{}", config.host, config.port);

    let backend = server::memory_backend(&config)?;

    let server = Server::new(config, Arc::new(backend));
    let listener = server.bind().await?;
    let registry = server.registry();

    tokio::select! {
        _ = server.serve(listener) => {}
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("Shutdown signal received");
            registry.close_all();
        }
    }

    // Give sessions a moment to tear down before the runtime goes away.
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
    while registry.session_count() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }

    Ok(())
}
