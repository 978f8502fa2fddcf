pub mod persistence;

use std::{env, path::PathBuf, sync::Once};

use dirs::data_dir;

const DEFAULT_DIR_NAME: &str = "campus_market";
const HOME_ENV: &str = "CAMPUS_MARKET_HOME";
const DEFAULT_DIRECTIVE: &str = "campus_market=info";

static TRACING_INIT: Once = Once::new();

/// Initializes the global tracing subscriber with sensible defaults.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, EnvFilter};

        let directives = env::var(EnvFilter::DEFAULT_ENV).ok();
        let filter = log_filter(directives.as_deref());

        // A subscriber installed by the host process wins.
        let _ = fmt().with_env_filter(filter).try_init();
    });
}

/// `RUST_LOG` directives replace the crate default entirely when set and valid.
fn log_filter(directives: Option<&str>) -> tracing_subscriber::EnvFilter {
    use tracing_subscriber::EnvFilter;

    directives
        .filter(|value| !value.trim().is_empty())
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Returns the application data directory, defaulting to `<data_dir>/campus_market`.
pub fn app_data_dir() -> PathBuf {
    if let Some(custom) = env::var_os(HOME_ENV) {
        return PathBuf::from(custom);
    }
    data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_DIR_NAME)
}
