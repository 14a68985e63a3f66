//! Function call graph
//!
//! One node per non-empty function; an edge per outgoing call record. After
//! [`FuncCallGraph::update_sccs`] the graph knows each node's SCC, and
//! [`FuncCallGraph::build_scc_dag`] condenses it into the DAG the inliner
//! walks in topological order (callers before their callees' SCCs).

use super::graph::{compute_sccs, DagGraph, DependencyNode};
use super::modules::IlContext;
use super::{FunctionId, OpCode};
use crate::error::{OptResult, OptimizerError};
use fxhash::FxHashMap;

/// A call-graph node.
#[derive(Debug, Clone)]
pub struct FcgNode {
    pub function: FunctionId,
    /// Callees, as node indices.
    pub dependencies: Vec<usize>,
    /// Callers, as node indices.
    pub dependants: Vec<usize>,
    /// SCC this node belongs to; valid after `update_sccs`.
    pub scc_index: usize,
    /// Precomputed inlining heuristic weight for this function as a callee.
    pub inline_cost: u32,
}

impl DependencyNode for FcgNode {
    fn dependencies(&self) -> &[usize] {
        &self.dependencies
    }
}

/// Call graph over the non-empty functions of a module.
#[derive(Debug, Clone, Default)]
pub struct FuncCallGraph {
    nodes: Vec<FcgNode>,
    index: FxHashMap<FunctionId, usize>,
    sccs: Vec<Vec<usize>>,
}

impl FuncCallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_function(&mut self, function: FunctionId, inline_cost: u32) -> usize {
        let index = self.nodes.len();
        self.nodes.push(FcgNode {
            function,
            dependencies: Vec::new(),
            dependants: Vec::new(),
            scc_index: 0,
            inline_cost,
        });
        self.index.insert(function, index);
        index
    }

    /// Add the edge `caller → callee`. Both must already be registered.
    pub fn add_call(&mut self, caller: FunctionId, callee: FunctionId) -> OptResult<()> {
        let caller_idx = *self.index.get(&caller).ok_or_else(|| {
            OptimizerError::InternalInvariant(format!("caller {} not in call graph", caller))
        })?;
        let callee_idx = *self.index.get(&callee).ok_or_else(|| {
            OptimizerError::InternalInvariant(format!("callee {} not in call graph", callee))
        })?;
        self.nodes[caller_idx].dependencies.push(callee_idx);
        self.nodes[callee_idx].dependants.push(caller_idx);
        Ok(())
    }

    pub fn node_index(&self, function: FunctionId) -> Option<usize> {
        self.index.get(&function).copied()
    }

    pub fn node(&self, index: usize) -> &FcgNode {
        &self.nodes[index]
    }

    pub fn nodes(&self) -> &[FcgNode] {
        &self.nodes
    }

    /// Compute SCCs (reverse-topological order) and stamp each node with its
    /// component index.
    pub fn update_sccs(&mut self) {
        self.sccs = compute_sccs(&self.nodes);
        for (scc_index, scc) in self.sccs.iter().enumerate() {
            for &node in scc {
                self.nodes[node].scc_index = scc_index;
            }
        }
    }

    pub fn sccs(&self) -> &[Vec<usize>] {
        &self.sccs
    }

    /// Condense into a DAG over SCC indices. Same-SCC edges (recursion) are
    /// dropped; they are never inlined.
    pub fn build_scc_dag(&self) -> DagGraph<usize> {
        let mut dag = DagGraph::new();
        for scc_index in 0..self.sccs.len() {
            dag.add_node(scc_index);
        }
        for node in &self.nodes {
            let from = node.scc_index;
            for &dep in &node.dependencies {
                let to = self.nodes[dep].scc_index;
                if from != to {
                    dag.add_edge(from, to);
                }
            }
        }
        dag
    }
}

/// Heuristic weight of inlining a function: the sum of its instruction
/// weights scaled by its block count. Calls and divisions weigh more than
/// simple ALU traffic.
pub fn compute_inline_cost(ctx: &IlContext) -> u32 {
    let mut weight: u32 = 0;
    for block in ctx.cfg.blocks() {
        for instr in &block.instructions {
            weight += match instr.opcode {
                OpCode::Call => 5,
                OpCode::Divide | OpCode::Modulus => 3,
                _ => 1,
            };
        }
    }
    weight.saturating_mul(ctx.cfg.block_count().max(1) as u32)
}
