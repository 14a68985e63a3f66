//! Logging setup for the Lustre compiler backend
//!
//! The backend reports through the `log` facade: `error!` for internal
//! invariant violations, `warn!` for user diagnostics surfaced by the
//! default [`crate::diagnostics::LogSink`], `debug!` for per-pass CFG
//! traces, and `trace!` for SSA renaming and inliner remapping detail.
//!
//! Embeddings that want those records on stderr call one of the
//! initializers below once; both are no-ops after the first call. Filtering
//! works through `RUST_LOG` as usual:
//!
//! ```bash
//! RUST_LOG=debug cargo test                      # per-pass CFG traces
//! RUST_LOG=compiler::optimizers=trace cargo test # one module, full detail
//! ```

use env_logger::{Builder, Env};
use log::LevelFilter;
use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize from `RUST_LOG`, defaulting to warnings when it is unset.
/// Timestamps are suppressed; pass traces are read inline with build
/// output.
pub fn init() {
    INIT.call_once(|| {
        Builder::from_env(Env::default().default_filter_or("warn"))
            .format_timestamp(None)
            .init();
    });
}

/// Initialize at a fixed level, ignoring `RUST_LOG`. Meant for test entry
/// points that want deterministic trace output.
pub fn init_with_level(level: LevelFilter) {
    INIT.call_once(|| {
        Builder::new()
            .filter_level(level)
            .format_timestamp(None)
            .format_target(false)
            .init();
    });
}
