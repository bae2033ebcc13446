//! Logging setup shared by binaries and tests.

/// Initialize process-wide tracing with defaults (JSON, `info`, `RUST_LOG` override).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    self::tracing::init();
}

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use self::tracing::{TracingConfig, init_with};
