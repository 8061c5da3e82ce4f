//! Warden Node binary
//!
//! License lifecycle watcher, access gate and push notifications.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use warden_node::{WardenConfig, WardenNode};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warden_node=info,warden_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Warden Node");

    let config = WardenConfig::from_env()?;

    // Create and run node
    let node = WardenNode::new(config).await?;
    node.run().await?;

    Ok(())
}
