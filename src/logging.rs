//! Environment-aware structured logging for the caseflow engine.
//!
//! Console output in development, additional JSON formatting in production so
//! transition logs can be shipped to an aggregator.

use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging once per process.
///
/// `RUST_LOG` wins when set; otherwise the level is derived from
/// `CASEFLOW_ENV` (`production` -> info, everything else -> debug). Safe to
/// call repeatedly and safe when an embedding application has already
/// installed a global subscriber.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_log_level(&environment)));

        let initialized = if environment == "production" {
            tracing_subscriber::registry()
                .with(fmt::layer().json().with_target(true).with_filter(filter))
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_level(true)
                        .with_filter(filter),
                )
                .try_init()
        };

        if initialized.is_err() {
            // A global subscriber is already set by the host application.
            tracing::debug!("global tracing subscriber already initialized");
        } else {
            tracing::debug!(environment = %environment, "structured logging initialized");
        }
    });
}

fn get_environment() -> String {
    std::env::var("CASEFLOW_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn default_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}
