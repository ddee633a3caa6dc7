use tracing_subscriber::EnvFilter;

/// Initialize structured logging with tracing-subscriber
///
/// `RUST_LOG` wins when set; otherwise `level` is used as the filter.
/// Safe to call more than once, later calls are ignored.
pub fn init(level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
