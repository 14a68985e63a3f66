//! SSA construction
//!
//! Standard minimal SSA over the dominance frontiers:
//!
//! 1. Collect `def_sites[v]` for every non-temp variable `v`.
//! 2. Worklist φ-insertion: for each block that defines `v`, place a φ for
//!    `v` in every frontier block that lacks one, and treat that block as a
//!    new definition site.
//! 3. Rename with a DFS over the dominator tree maintaining per-variable
//!    version stacks; φ results get fresh versions on block entry, and each
//!    successor's φ operands are completed with the version current at the
//!    end of this block.
//!
//! The DFS is iterative; shader CFGs can exceed the default stack depth.

use crate::il::instructions::{Instruction, OpCode, Operand};
use crate::il::modules::IlContext;
use crate::il::{BlockId, IlVarId};
use fxhash::{FxHashMap, FxHashSet};
use indexmap::IndexMap;

/// Converts one function to SSA form in place.
pub struct SsaBuilder<'a> {
    ctx: &'a mut IlContext,
    /// Version stacks per variable base index; top is the current version.
    version_stacks: FxHashMap<u32, Vec<u32>>,
    /// Next fresh version per variable base index.
    version_counters: FxHashMap<u32, u32>,
}

impl<'a> SsaBuilder<'a> {
    pub fn new(ctx: &'a mut IlContext) -> Self {
        Self {
            ctx,
            version_stacks: FxHashMap::default(),
            version_counters: FxHashMap::default(),
        }
    }

    /// Build SSA: insert φs, rename operands and results.
    pub fn build(&mut self) {
        if self.ctx.cfg.is_empty() {
            return;
        }
        self.ctx.cfg.rebuild_dom_tree();

        let def_sites = self.collect_def_sites();
        self.insert_phis(&def_sites);
        self.rename();
    }

    /// Blocks defining each non-temp variable, in first-definition order.
    fn collect_def_sites(&self) -> IndexMap<IlVarId, FxHashSet<BlockId>> {
        let mut def_sites: IndexMap<IlVarId, FxHashSet<BlockId>> = IndexMap::new();
        for block in self.ctx.cfg.blocks() {
            for instr in &block.instructions {
                if let Some(result) = instr.result {
                    if !result.is_temp() {
                        def_sites.entry(result.base()).or_default().insert(block.id);
                    }
                }
            }
        }
        def_sites
    }

    fn insert_phis(&mut self, def_sites: &IndexMap<IlVarId, FxHashSet<BlockId>>) {
        for (&var, sites) in def_sites {
            let mut worklist: Vec<BlockId> = sites.iter().copied().collect();
            worklist.sort();
            let mut has_phi: FxHashSet<BlockId> = FxHashSet::default();

            while let Some(block) = worklist.pop() {
                let frontier: Vec<BlockId> = self.ctx.cfg.dom_frontier(block).collect();
                for join in frontier {
                    if !has_phi.insert(join) {
                        continue;
                    }
                    let ty = self.ctx.metadata.var_type(var);
                    let phi_id = self.ctx.metadata.add_phi(var);
                    let phi_index = self.ctx.cfg.block(join).phi_count();
                    self.ctx.cfg.block_mut(join).instructions.insert(
                        phi_index,
                        Instruction::new(
                            OpCode::Phi,
                            ty,
                            Operand::Phi(phi_id),
                            Operand::None,
                            Some(var),
                        ),
                    );
                    // The φ is itself a definition of `var`.
                    if !sites.contains(&join) {
                        worklist.push(join);
                    }
                }
            }
        }
    }

    fn current_version(&self, var: IlVarId) -> u32 {
        self.version_stacks
            .get(&(var.index() as u32))
            .and_then(|s| s.last())
            .copied()
            .unwrap_or(0)
    }

    fn fresh_version(&mut self, var: IlVarId) -> u32 {
        let counter = self.version_counters.entry(var.index() as u32).or_insert(0);
        *counter += 1;
        let version = *counter;
        self.version_stacks
            .entry(var.index() as u32)
            .or_default()
            .push(version);
        version
    }

    fn rename(&mut self) {
        enum Step {
            Enter(BlockId),
            Leave,
        }

        // Per-frame list of bases whose stacks were pushed in that block.
        let mut pushed_stack: Vec<Vec<u32>> = Vec::new();
        let mut walk = vec![Step::Enter(self.ctx.cfg.entry)];

        while let Some(step) = walk.pop() {
            match step {
                Step::Enter(block_id) => {
                    let mut pushed: Vec<u32> = Vec::new();

                    let instr_count = self.ctx.cfg.block(block_id).instructions.len();
                    for index in 0..instr_count {
                        let (opcode, lhs, rhs, result) = {
                            let instr = &self.ctx.cfg.block(block_id).instructions[index];
                            (instr.opcode, instr.lhs, instr.rhs, instr.result)
                        };

                        let mut new_lhs = lhs;
                        let mut new_rhs = rhs;
                        if opcode != OpCode::Phi {
                            new_lhs = self.rename_operand(lhs);
                            new_rhs = self.rename_operand(rhs);
                        }

                        let new_result = result.map(|r| {
                            if r.is_temp() {
                                r
                            } else {
                                let version = self.fresh_version(r);
                                pushed.push(r.index() as u32);
                                let versioned = r.with_version(version);
                                if opcode == OpCode::Phi {
                                    if let Operand::Phi(phi_id) = lhs {
                                        self.ctx.metadata.phi_mut(phi_id).result = versioned;
                                    }
                                }
                                versioned
                            }
                        });

                        let instr = &mut self.ctx.cfg.block_mut(block_id).instructions[index];
                        instr.lhs = new_lhs;
                        instr.rhs = new_rhs;
                        instr.result = new_result;
                    }

                    // Complete successor φ operands for the edge block → succ.
                    let succs: Vec<BlockId> =
                        self.ctx.cfg.block(block_id).successors.iter().copied().collect();
                    for succ in succs {
                        let phi_ids: Vec<_> = self
                            .ctx
                            .cfg
                            .block(succ)
                            .instructions
                            .iter()
                            .take_while(|i| i.opcode == OpCode::Phi)
                            .filter_map(|i| match i.lhs {
                                Operand::Phi(id) => Some(id),
                                _ => None,
                            })
                            .collect();
                        for phi_id in phi_ids {
                            let base = self.ctx.metadata.phi(phi_id).result.base();
                            let version = self.current_version(base);
                            self.ctx
                                .metadata
                                .phi_mut(phi_id)
                                .incoming
                                .push((base.with_version(version), block_id));
                        }
                    }

                    pushed_stack.push(pushed);
                    walk.push(Step::Leave);
                    for &child in self.ctx.cfg.dom_children(block_id) {
                        walk.push(Step::Enter(child));
                    }
                }
                Step::Leave => {
                    for base in pushed_stack.pop().unwrap_or_default() {
                        if let Some(stack) = self.version_stacks.get_mut(&base) {
                            stack.pop();
                        }
                    }
                }
            }
        }
    }

    fn rename_operand(&self, operand: Operand) -> Operand {
        match operand {
            Operand::Var(v) if !v.is_temp() => {
                Operand::Var(v.base().with_version(self.current_version(v)))
            }
            other => other,
        }
    }
}
