pub mod config;
pub mod models;
pub mod storage;
pub mod db;
pub mod org_config;
pub mod pipeline;
pub mod llm;
pub mod rules;
pub mod report;
pub mod audit;

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over the default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();
}
