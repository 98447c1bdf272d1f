//! Tracing subscriber setup for embedding applications.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a global tracing subscriber with env-filter support.
///
/// Filtering follows `RUST_LOG` (e.g. `RUST_LOG=sagan_director=debug`).
/// Safe to call more than once; later calls are no-ops.
pub fn init_telemetry() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_telemetry();
        init_telemetry();
    }
}
