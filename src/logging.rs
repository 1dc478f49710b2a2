use tracing_subscriber::EnvFilter;

/// Install the tracing subscriber for the CLI. Row-level exclusions and
/// per-record failures are logged here; operator-facing summaries go to
/// stdout in the binary.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
