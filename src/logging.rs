use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_FILTER_ENV: &str = "GRADINGD_LOG";
pub const LOG_FORMAT_ENV: &str = "GRADINGD_LOG_FORMAT";

/// Logs go to stderr only; stdout carries the response stream.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new("gradingd=info"));
    let format = std::env::var(LOG_FORMAT_ENV).unwrap_or_else(|_| "text".to_string());

    let registry = tracing_subscriber::registry().with(filter);
    // A subscriber may already be installed by a test harness.
    let _ = match format.as_str() {
        "json" => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        _ => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init(),
    };
}
