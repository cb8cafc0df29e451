use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` is used, raised to
/// `debug` for this crate when `verbose` is on. Logs go to stderr so they do
/// not interleave with the progress output on stdout.
pub fn init(default_filter: &str, verbose: bool) {
    let fallback = if verbose {
        format!("{default_filter},invoker=debug")
    } else {
        default_filter.to_string()
    };

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
