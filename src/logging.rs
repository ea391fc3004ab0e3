//! Tracing subscriber setup.
//!
//! Logs go to stderr so stdout stays usable for reports and `--json`
//! output. `RUST_LOG` takes precedence over the configured level.

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. Calling it twice is harmless: the second
/// call leaves the first subscriber in place.
pub fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false).compact())
        .try_init();

    Ok(())
}
