use tracing_subscriber::{EnvFilter, Layer, filter::LevelFilter, layer::SubscriberExt};

/// Initialises the stdout tracer, filtered by the `RUST_LOG` environment variable.
/// Should be called once at the start of each binary.
pub fn init_tracing() {
    let stdout_tracer = tracing_subscriber::fmt::layer().with_writer(std::io::stdout);

    let log_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let subscriber =
        tracing_subscriber::Registry::default().with(stdout_tracer.with_filter(log_filter));

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Tracing subscriber already installed: {e}");
    }
}
