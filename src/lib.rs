pub mod api; // HTTP surface: /api/analyze (NDJSON stream), /api/health
pub mod config;
pub mod pipeline;

use tracing_subscriber::EnvFilter;

/// Initialize tracing. Logs go to stderr so NDJSON on stdout stays clean.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
