use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use a3s_trail::config::TrailConfig;
use a3s_trail::queue::nats::NatsQueue;
use a3s_trail::queue::QueueClient;
use a3s_trail::{store, Pipeline};

const CONFIG_ENV: &str = "A3S_TRAIL_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "a3s-trail.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = TrailConfig::load(&path)?;
    config.validate()?;

    // Connection failures at startup are fatal
    let queue: Arc<dyn QueueClient> = Arc::new(NatsQueue::connect(config.queue.clone()).await?);
    let store = store::connect(&config.store).await?;

    let pipeline = Pipeline::new(queue, store, config.pipeline.clone())?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Shutdown signal received");
                    cancel.cancel();
                }
                Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
            }
        });
    }

    pipeline.run(cancel).await;
    Ok(())
}
