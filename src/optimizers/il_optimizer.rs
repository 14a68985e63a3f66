//! The IL optimizer driver
//!
//! Per-function phase (parallel): SSA build, then a bounded fixed point over
//! `ConstantFolder → AlgebraicSimplifier → CommonSubExpression →
//! DeadCodeEliminator`, then one strength-reduction sweep. A pass returning
//! `Rerun` aborts the remaining passes of the iteration; an iteration with no
//! change stops the loop.
//!
//! Module phase (serial): build the call graph over non-empty functions,
//! condense it into an SCC DAG, topologically walk it callers-first, and
//! inline every cross-SCC call site (re-optimizing the caller after each
//! inlined callee). Same-SCC edges are recursion and stay as calls.
//!
//! Finally every function is lowered out of SSA. Errors inside one function
//! (a failed inline, a cyclic condensation) are reported through the
//! diagnostic sink and do not poison its siblings; every function still
//! reaches SSA reduction.

use super::{
    AlgebraicSimplifier, CommonSubExpression, ConstantFolder, DeadCodeEliminator,
    FunctionInliner, OptimizerPass, PassResult, StrengthReduction,
};
use crate::diagnostics::DiagnosticSink;
use crate::error::OptResult;
use crate::il::call_graph::{compute_inline_cost, FuncCallGraph};
use crate::il::dump::dump_cfg;
use crate::il::modules::{FunctionLayout, IlModule};
use crate::il::ssa::{SsaBuilder, SsaReducer};
use crate::il::DagGraph;
use log::{debug, error};
use rayon::prelude::*;

/// Tuning knobs for the driver.
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Upper bound on fixed-point iterations per function.
    pub max_pass_iterations: usize,
    /// Callees with a precomputed inline cost above this are not inlined.
    pub inline_threshold: u32,
    /// Emit a CFG dump (at `debug!`) after every effective pass.
    pub trace_cfg: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_pass_iterations: 10,
            inline_threshold: 250,
            trace_cfg: false,
        }
    }
}

/// Optimizes every non-empty function of a module in place.
pub struct IlOptimizer<'a> {
    module: &'a mut IlModule,
    config: OptimizerConfig,
    sink: &'a dyn DiagnosticSink,
}

impl<'a> IlOptimizer<'a> {
    pub fn new(module: &'a mut IlModule, sink: &'a dyn DiagnosticSink) -> Self {
        Self {
            module,
            config: OptimizerConfig::default(),
            sink,
        }
    }

    pub fn with_config(mut self, config: OptimizerConfig) -> Self {
        self.config = config;
        self
    }

    /// Run the whole pipeline: SSA build + per-function fixed point,
    /// cross-SCC inlining, SSA reduction. Per-function failures are
    /// reported through the sink and skipped, never returned.
    pub fn optimize(&mut self) -> OptResult<()> {
        let config = &self.config;
        let sink = self.sink;

        // Phase 1: every function is optimized independently; each context
        // is owned by exactly one worker.
        self.module
            .functions
            .par_iter_mut()
            .filter(|f| !f.context.is_empty())
            .for_each(|function| {
                SsaBuilder::new(&mut function.context).build();
                if config.trace_cfg {
                    debug!(
                        "{} converted to SSA:\n{}",
                        function.name,
                        dump_cfg(&function.context.cfg)
                    );
                }
                Self::run_passes(function, config, sink);
            });

        // Phase 2: join through the call graph and inline bottom-up edges.
        self.run_inliner();

        // Phase 3: lower out of SSA.
        for function in &mut self.module.functions {
            if function.context.is_empty() {
                continue;
            }
            SsaReducer::new(&mut function.context).reduce();
            if self.config.trace_cfg {
                debug!(
                    "{} lowered out of SSA:\n{}",
                    function.name,
                    dump_cfg(&function.context.cfg)
                );
            }
        }

        Ok(())
    }

    /// The per-function bounded fixed point, plus the strength-reduction
    /// sweep once it settles.
    fn run_passes(function: &mut FunctionLayout, config: &OptimizerConfig, sink: &dyn DiagnosticSink) {
        let mut passes: Vec<Box<dyn OptimizerPass>> = vec![
            Box::new(ConstantFolder::new()),
            Box::new(AlgebraicSimplifier::new()),
            Box::new(CommonSubExpression::new()),
            Box::new(DeadCodeEliminator::new()),
        ];

        for _ in 0..config.max_pass_iterations {
            let mut changed = false;
            for pass in &mut passes {
                match pass.run(&mut function.context, sink) {
                    PassResult::Rerun => {
                        changed = true;
                        if config.trace_cfg {
                            debug!(
                                "{} after {} (rerun):\n{}",
                                function.name,
                                pass.name(),
                                dump_cfg(&function.context.cfg)
                            );
                        }
                        break;
                    }
                    PassResult::Changed => {
                        changed = true;
                        if config.trace_cfg {
                            debug!(
                                "{} after {}:\n{}",
                                function.name,
                                pass.name(),
                                dump_cfg(&function.context.cfg)
                            );
                        }
                    }
                    PassResult::None => {}
                }
            }
            if !changed {
                break;
            }
        }

        let mut reducer = StrengthReduction::new();
        if reducer.run(&mut function.context, sink) == PassResult::Changed && config.trace_cfg {
            debug!(
                "{} after {}:\n{}",
                function.name,
                reducer.name(),
                dump_cfg(&function.context.cfg)
            );
        }
    }

    fn run_inliner(&mut self) {
        let mut graph = FuncCallGraph::new();
        for function in &self.module.functions {
            if !function.context.is_empty() {
                graph.add_function(function.id, compute_inline_cost(&function.context));
            }
        }
        for function in &self.module.functions {
            if function.context.is_empty() {
                continue;
            }
            for record in &function.context.metadata.calls {
                // Calls to declarations have no body to inline and stay out
                // of the graph.
                if graph.node_index(record.callee).is_none() {
                    debug!(
                        "{} calls declaration {}; not part of the call graph",
                        function.name, record.callee
                    );
                    continue;
                }
                if let Err(err) = graph.add_call(function.id, record.callee) {
                    let message = format!(
                        "dropping call edge {} -> {}: {}",
                        function.name, record.callee, err
                    );
                    error!("{}", message);
                    self.sink.error(&message);
                }
            }
        }

        graph.update_sccs();
        let dag: DagGraph<usize> = graph.build_scc_dag();
        let scc_order = match dag.topological_sort() {
            Ok(order) => order,
            Err(err) => {
                // A cycle in the condensation means SCC construction went
                // wrong. Fall back to the condensation order Tarjan already
                // produced (reverse topological, walked backwards, so
                // callers still come first) and keep going; the same-SCC
                // guard below still blocks every recursive pair, and the
                // rest of the module must still optimize and lower.
                let message = format!("call-graph condensation is cyclic: {}", err);
                error!("{}", message);
                self.sink.error(&message);
                (0..graph.sccs().len()).rev().collect()
            }
        };

        for &caller_scc in &scc_order {
            for &caller_node in &graph.sccs()[caller_scc] {
                let caller_id = graph.node(caller_node).function;
                if self.module.function(caller_id).context.is_empty() {
                    continue;
                }

                let records = self.module.function(caller_id).context.metadata.calls.clone();
                for record in records {
                    let Some(callee_node) = graph.node_index(record.callee) else {
                        continue;
                    };
                    // A same-SCC edge is a recursive cycle; never inlined.
                    if graph.node(callee_node).scc_index == caller_scc {
                        continue;
                    }
                    if graph.node(callee_node).inline_cost > self.config.inline_threshold {
                        debug!(
                            "not inlining {} into {}: cost {} over threshold",
                            record.callee,
                            caller_id,
                            graph.node(callee_node).inline_cost
                        );
                        continue;
                    }

                    // Snapshot the callee; it is read-only during inlining.
                    let callee = self.module.function(record.callee).clone();

                    let result = {
                        let caller = self.module.function_mut(caller_id);
                        FunctionInliner::new(caller, &callee).inline_all()
                    };
                    let inlined = match result {
                        Ok(count) => count,
                        Err(err) => {
                            let caller_name = &self.module.function(caller_id).name;
                            let message = format!(
                                "inlining {} into {} failed: {}",
                                callee.name, caller_name, err
                            );
                            error!("{}", message);
                            self.sink.error(&message);
                            continue;
                        }
                    };

                    if inlined > 0 {
                        let caller = self.module.function_mut(caller_id);
                        caller.context.metadata.remove_call_record(callee.id);
                        if self.config.trace_cfg {
                            debug!(
                                "{} after inlining {}:\n{}",
                                caller.name,
                                callee.name,
                                dump_cfg(&caller.context.cfg)
                            );
                        }
                        Self::run_passes(caller, &self.config, self.sink);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::test_support::CapturingSink;
    use crate::il::validation::verify_no_phis;
    use crate::il::{
        FunctionBuilder, FunctionId, FunctionSignature, IlTypeId, Number, NumberKind, OpCode,
        Operand,
    };

    fn i32_ty() -> IlTypeId {
        IlTypeId::of(NumberKind::Int32)
    }

    /// `v0 = move 5; v1 = move v0; v2 = add v1, 3; return v2`
    /// collapses to `return 8`.
    #[test]
    fn test_constant_chain_collapses_to_return() {
        let mut b = FunctionBuilder::new(FunctionId(0), "f", FunctionSignature::default());
        b.create_block();
        let v0 = b.declare_var(i32_ty());
        let v1 = b.declare_var(i32_ty());
        let v2 = b.declare_var(i32_ty());
        b.mov_imm(v0, Number::Int32(5));
        b.mov(v1, Operand::Var(v0));
        b.binary(OpCode::Add, v2, Operand::Var(v1), Operand::Imm(Number::Int32(3)));
        b.ret(Operand::Var(v2));

        let mut module = IlModule::new();
        module.add_function(b.finish());

        let sink = CapturingSink::default();
        IlOptimizer::new(&mut module, &sink).optimize().unwrap();

        let ctx = &module.function(FunctionId(0)).context;
        let instrs = &ctx.cfg.block(ctx.cfg.entry).instructions;
        assert_eq!(instrs.len(), 1);
        assert_eq!(instrs[0].opcode, OpCode::Return);
        assert_eq!(instrs[0].lhs.as_imm(), Some(Number::Int32(8)));
    }

    /// The fixed point is idempotent: a second full run changes nothing.
    #[test]
    fn test_optimizer_is_idempotent() {
        let mut b = FunctionBuilder::new(FunctionId(0), "f", FunctionSignature::default());
        b.create_block();
        let x = b.load_param(0, i32_ty());
        let t0 = b.make_temp(i32_ty());
        let t1 = b.make_temp(i32_ty());
        b.binary(OpCode::Multiply, t0, Operand::Var(x), Operand::Imm(Number::Int32(8)));
        b.binary(OpCode::Add, t1, Operand::Var(t0), Operand::Imm(Number::Int32(0)));
        b.ret(Operand::Var(t1));

        let mut module = IlModule::new();
        module.add_function(b.finish());

        let sink = CapturingSink::default();
        IlOptimizer::new(&mut module, &sink).optimize().unwrap();
        let once = crate::il::dump::dump_module(&module);
        IlOptimizer::new(&mut module, &sink).optimize().unwrap();
        let twice = crate::il::dump::dump_module(&module);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_no_phis_survive_the_pipeline() {
        let mut b = FunctionBuilder::new(FunctionId(0), "f", FunctionSignature::default());
        let entry = b.create_block();
        let then_b = b.create_block();
        let else_b = b.create_block();
        let join = b.create_block();

        let v = b.declare_var(i32_ty());
        let p = b.load_param(0, i32_ty());
        let cond = b.make_temp(IlTypeId::of(NumberKind::Bool));
        b.set_block(entry);
        b.binary(OpCode::GreaterThan, cond, Operand::Var(p), Operand::Imm(Number::Int32(0)));
        b.branch(OpCode::JumpNotZero, cond, then_b, else_b);
        b.set_block(then_b);
        b.mov_imm(v, Number::Int32(1));
        b.jump(join);
        b.set_block(else_b);
        b.mov_imm(v, Number::Int32(2));
        b.jump(join);
        b.set_block(join);
        b.ret(Operand::Var(v));

        let mut module = IlModule::new();
        module.add_function(b.finish());

        let sink = CapturingSink::default();
        IlOptimizer::new(&mut module, &sink).optimize().unwrap();

        let ctx = &module.function(FunctionId(0)).context;
        assert_eq!(verify_no_phis(ctx), Vec::<String>::new());
    }
}
