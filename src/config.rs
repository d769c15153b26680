//! Ambient configuration for the broker binary.

use clap::Parser;

/// CLI configuration for the broker process.
#[derive(Debug, Clone, Parser)]
#[command(name = "hotel-events-broker", about = "Binary pub/sub event bus broker")]
pub struct BrokerConfig {
    /// TCP port to listen on.
    #[arg(long, default_value_t = 5672)]
    pub port: u16,

    /// `tracing_subscriber::EnvFilter` directive, e.g. "info" or "debug".
    #[arg(long, default_value = "info")]
    pub log_level: String,
}
