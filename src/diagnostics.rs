//! Diagnostic reporting seam between the optimizer and the embedding host
//!
//! The optimizer emits user-facing diagnostics (e.g. division by a constant
//! zero) through the [`DiagnosticSink`] trait so the embedding can route them
//! into its own reporting pipeline. The message format is opaque to the sink.
//!
//! [`LogSink`] is the default implementation and forwards everything to the
//! `log` crate, which is how the rest of this backend reports progress.

/// Receiver for user-facing diagnostics produced during optimization.
///
/// Implementations must be callable from the driver's parallel phase, hence
/// the `Send + Sync` bound.
pub trait DiagnosticSink: Send + Sync {
    /// A recoverable problem in the user's program. Optimization continues
    /// with the offending computation rewritten to a safe form.
    fn warning(&self, message: &str);

    /// A non-recoverable problem; the affected function is abandoned.
    fn error(&self, message: &str);
}

/// Default sink that forwards diagnostics to the `log` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn warning(&self, message: &str) {
        log::warn!("{}", message);
    }

    fn error(&self, message: &str) {
        log::error!("{}", message);
    }
}
