pub mod config;
pub mod models;
pub mod pipeline;

use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber. `RUST_LOG` wins over the built-in filter.
///
/// Call once from a binary; the library never installs one itself.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
