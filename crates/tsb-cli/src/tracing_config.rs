//! Tracing setup for the CLI.
//!
//! Controlled by the `TSB_LOG` environment variable (`tracing_subscriber`
//! `EnvFilter` syntax, e.g. `TSB_LOG=tsb_checker=debug`). Silent when unset.

use tracing_subscriber::EnvFilter;

pub fn init() {
    let filter = EnvFilter::try_from_env("TSB_LOG").unwrap_or_else(|_| EnvFilter::new("off"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
