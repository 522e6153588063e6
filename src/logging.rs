use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// Output goes to stderr only; stdout is reserved for the JSON-RPC stream.
/// `RUST_LOG` wins over `level` when set.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.trim().to_ascii_lowercase()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true)
        .try_init();
}
