use nodeflow_server::{config::ServerConfig, error::DaemonError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> nodeflow_core::Result<(), DaemonError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ServerConfig::load().map_err(|e| DaemonError::Config {
        details: e.to_string(),
    })?;
    tracing::info!(documents_dir = %config.documents_dir.display(), "loaded configuration");

    nodeflow_server::run(config).await
}
