pub mod boxscore;
pub mod config;
pub mod dataset;
pub mod features;
pub mod games;
pub mod http_client;
pub mod model;
pub mod report;
pub mod rolling;
pub mod schedule;
pub mod stages;
pub mod store;

/// Installs the global `tracing` subscriber; `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
