//! Logging prelude module for convenient access to tracing macros.
//!
//! ```ignore
//! use crate::logging::*;
//!
//! info!("/apps/x/a.txt is uploaded");
//! debug!("Check if /apps exists...");
//! ```

pub use tracing::{debug, error, info, trace, warn};

/// Initialize the tracing subscriber with environment filter support.
///
/// By default, logs at INFO level and above are displayed. Control the log level
/// with the `RUST_LOG` environment variable:
///
/// ```bash
/// RUST_LOG=debug jcrsync sync
/// RUST_LOG=jcrsync::coordinator=trace jcrsync sync
/// ```
///
/// Calling it twice is harmless; the second subscriber is discarded.
pub fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
		)
		.with_writer(std::io::stderr)
		.try_init();
}

// vim: ts=4
