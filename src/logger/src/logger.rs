use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "BRANCH_LOG";
const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber. `log` records from the library crates are
/// forwarded to it. The filter comes from `BRANCH_LOG` (e.g. `debug`,
/// `server=debug,cluster=warn`) and defaults to `info`.
///
/// Calling it more than once is harmless.
pub fn setup_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
