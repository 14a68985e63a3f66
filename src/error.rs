//! Error types for the IL optimization backend
//!
//! Errors fall into two kinds: contract violations inside the optimizer
//! (non-recoverable for the affected function) and structural cycles where a
//! DAG was required. User-facing diagnostics do not flow through these types;
//! they go through [`crate::diagnostics::DiagnosticSink`] and optimization
//! continues.

use std::fmt;

/// Non-recoverable optimizer failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimizerError {
    /// An internal invariant was violated (e.g. a callee variable with no
    /// renaming map entry, or a node removed while predecessors were live).
    /// The affected function is abandoned; sibling functions are unaffected.
    InternalInvariant(String),

    /// A cycle was found in a graph that must be a DAG (the SCC-condensed
    /// call graph). This indicates a bug in SCC condensation.
    CycleDetected(&'static str),
}

impl fmt::Display for OptimizerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizerError::InternalInvariant(msg) => {
                write!(f, "internal invariant violated: {}", msg)
            }
            OptimizerError::CycleDetected(what) => {
                write!(f, "cycle detected in {}", what)
            }
        }
    }
}

impl std::error::Error for OptimizerError {}

/// Shorthand used by the graph algorithms and the inliner.
pub type OptResult<T> = Result<T, OptimizerError>;
