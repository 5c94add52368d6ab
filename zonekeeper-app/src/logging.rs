//! Tracing subscriber setup for the daemon.
//!
//! Library crates log through the `log` facade; `tracing-subscriber`'s
//! `tracing-log` bridge picks those records up once `try_init` runs.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// sqlx 每条语句都会打 info
const QUIET_DEPENDENCIES: &str = "sqlx=warn,sea_orm_migration=warn,hickory_proto=warn";

/// `RUST_LOG` wins over the configured level when set.
fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},{QUIET_DEPENDENCIES}", config.level)))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(config: &LoggingConfig) -> Result<(), TryInitError> {
    let registry = tracing_subscriber::registry().with(build_filter(config));

    if config.json {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    }
}
