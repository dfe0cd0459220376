use anyhow::anyhow;
use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// Filter used when `RUST_LOG` is unset: pipeline progress at info, sqlx
/// statement logging only when slow or failing.
pub const DEFAULT_LOG_FILTER: &str = "info,sqlx=warn";

/// Installs the global fmt subscriber. `verbose` adds source locations to
/// every line. A no-op when a subscriber is already installed.
pub fn init_tracing(default_filter: &str, verbose: bool) -> anyhow::Result<()> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_file(verbose)
        .with_line_number(verbose)
        .compact()
        .try_init()
        .map_err(|e| anyhow!("failed to initialize tracing: {e}"))
}
