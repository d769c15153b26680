use clap::Parser;

use hotel_events::broker::BrokerListener;
use hotel_events::config::BrokerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BrokerConfig::parse();

    let filter = tracing_subscriber::EnvFilter::try_new(&config.log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let listener = BrokerListener::new();
    tracing::info!(port = config.port, "starting hotel-events broker");

    tokio::select! {
        result = listener.start(config.port) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
        }
    }

    Ok(())
}
