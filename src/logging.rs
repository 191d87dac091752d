use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "SLOTREE_LOG";
pub const DEFAULT_FILTER: &str = "warn";

/// Installs the stderr subscriber. `SLOTREE_LOG` wins over the configured
/// filter; an unparsable directive falls back to the default.
pub fn init(configured: Option<&str>) {
    let directive = resolve_filter(std::env::var(LOG_ENV).ok(), configured);
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .try_init();
}

fn resolve_filter(from_env: Option<String>, configured: Option<&str>) -> String {
    from_env
        .filter(|value| !value.trim().is_empty())
        .or_else(|| configured.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}
