use tracing_subscriber::{fmt, EnvFilter};

/// Install a formatted `tracing` subscriber for hosts (and tests) that do
/// not bring their own. Filter via `RUST_LOG`, e.g.
/// `RUST_LOG=stocktake_engine=debug`. Safe to call more than once; only
/// the first call wins.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
