//! Lustre Shading Language Compiler - IL optimization backend
//!
//! This crate implements the mid-level intermediate-representation pipeline of
//! the Lustre shader compiler: a per-function control-flow graph of
//! instructions is converted to SSA form, run through a fixed-point suite of
//! classical optimization passes, inlined across call-graph SCC boundaries,
//! and finally lowered back to a conventional register form for code
//! generation.
//!
//! The frontend (lexer, parser, semantic analysis, AST lowering) and the
//! target-code emitters are separate components; they communicate with this
//! crate purely through the in-memory [`il::IlModule`] produced by
//! [`il::FunctionBuilder`] and consumed by [`optimizers::IlOptimizer`].

#![allow(dead_code)]
#![allow(clippy::collapsible_if)]
#![allow(clippy::collapsible_else_if)]
#![allow(clippy::needless_range_loop)]
#![allow(clippy::too_many_arguments)]

pub mod diagnostics;
pub mod error;
pub mod il;
pub mod logging;
pub mod optimizers;

pub use diagnostics::{DiagnosticSink, LogSink};
pub use error::OptimizerError;
pub use il::*;
pub use optimizers::{IlOptimizer, OptimizerConfig, OptimizerPass, PassResult};
