//! IL optimization passes
//!
//! Each pass rewrites one function's [`IlContext`] in place and reports
//! whether anything changed. The driver ([`IlOptimizer`]) runs the pass list
//! to a bounded fixed point per function, then joins the functions through
//! the call graph for inter-procedural inlining.

pub mod algebraic_simplifier;
pub mod common_sub_expression;
pub mod constant_folder;
pub mod dead_code_eliminator;
pub mod function_inliner;
pub mod il_optimizer;
pub mod strength_reduction;

pub use algebraic_simplifier::AlgebraicSimplifier;
pub use common_sub_expression::CommonSubExpression;
pub use constant_folder::ConstantFolder;
pub use dead_code_eliminator::DeadCodeEliminator;
pub use function_inliner::FunctionInliner;
pub use il_optimizer::{IlOptimizer, OptimizerConfig};
pub use strength_reduction::StrengthReduction;

use crate::diagnostics::DiagnosticSink;
use crate::il::modules::IlContext;

/// Outcome of one pass execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassResult {
    /// The instruction stream is byte-identical to the input.
    None,
    /// Something changed; the fixed-point iteration continues.
    Changed,
    /// The CFG itself was rewritten; abort the remaining passes of this
    /// iteration and restart from the first pass.
    Rerun,
}

/// A per-function rewrite pass.
pub trait OptimizerPass {
    fn name(&self) -> &'static str;

    fn run(&mut self, ctx: &mut IlContext, sink: &dyn DiagnosticSink) -> PassResult;
}
