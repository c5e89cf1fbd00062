//! Logging prelude for the tracing macros used across the crate

pub use tracing::{debug, error, info, warn};

use tracing_subscriber::EnvFilter;

/// Install a stderr tracing subscriber.
///
/// Without `RUST_LOG` in the environment, only this crate's events at
/// info level and above are shown:
///
/// ```bash
/// RUST_LOG=blockr::puller=debug cargo test
/// RUST_LOG=trace cargo test
/// ```
pub fn init_tracing() {
	let filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("blockr=info"));

	tracing_subscriber::fmt()
		.compact()
		.with_writer(std::io::stderr)
		.with_env_filter(filter)
		.init();
}

// vim: ts=4
