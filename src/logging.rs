use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. `RUST_LOG` overrides the default `info` level.
/// Calling this more than once is harmless.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
