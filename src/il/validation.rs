//! IL structural validation
//!
//! Callable checkers for the representation invariants: CFG edge symmetry,
//! SSA dominance of uses, and φ-absence after SSA reduction. Each checker
//! collects human-readable problems rather than failing on the first one, so
//! tests can assert on the whole picture.

use super::instructions::OpCode;
use super::modules::IlContext;
use super::{BlockId, IlVarId};
use fxhash::{FxHashMap, FxHashSet};

/// Verify `u ∈ predecessors[v] ⇔ v ∈ successors[u]` plus basic referential
/// integrity of the cached edge lists.
pub fn verify_cfg(ctx: &IlContext) -> Vec<String> {
    let cfg = &ctx.cfg;
    let mut problems = Vec::new();

    for block in cfg.blocks() {
        for &succ in &block.successors {
            match cfg.get_block(succ) {
                None => problems.push(format!("{} lists removed successor {}", block.id, succ)),
                Some(s) if !s.predecessors.contains(&block.id) => problems.push(format!(
                    "{} -> {} present in successors but not predecessors",
                    block.id, succ
                )),
                _ => {}
            }
        }
        for &pred in &block.predecessors {
            match cfg.get_block(pred) {
                None => problems.push(format!("{} lists removed predecessor {}", block.id, pred)),
                Some(p) if !p.successors.contains(&block.id) => problems.push(format!(
                    "{} -> {} present in predecessors but not successors",
                    pred, block.id
                )),
                _ => {}
            }
        }
    }

    problems
}

/// Verify the SSA invariants after `SsaBuilder::build`:
/// - every variable (by versioned id) has at most one definition;
/// - every non-φ use of `v@k` is dominated by the definition of `v@k`;
/// - every φ operand arrives through an actual predecessor edge.
///
/// The dominator tree must be current. The check walks the tree with an
/// explicit stack carrying the visible definition set.
pub fn verify_ssa(ctx: &IlContext) -> Vec<String> {
    let cfg = &ctx.cfg;
    let mut problems = Vec::new();
    if cfg.is_empty() {
        return problems;
    }

    // Definition counts per versioned id.
    let mut def_count: FxHashMap<IlVarId, usize> = FxHashMap::default();
    for block in cfg.blocks() {
        for instr in &block.instructions {
            if let Some(result) = instr.result {
                *def_count.entry(result).or_insert(0) += 1;
            }
        }
    }
    for (var, count) in &def_count {
        if *count > 1 && !var.is_temp() {
            problems.push(format!("{} defined {} times", var, count));
        }
    }

    // φ operands must flow through predecessor edges.
    for block in cfg.blocks() {
        for instr in &block.instructions {
            if instr.opcode != OpCode::Phi {
                continue;
            }
            let phi_id = match instr.lhs {
                super::Operand::Phi(id) => id,
                _ => {
                    problems.push(format!("{}: phi without pool reference", block.id));
                    continue;
                }
            };
            for &(_, pred) in &ctx.metadata.phi(phi_id).incoming {
                if !block.predecessors.contains(&pred) {
                    problems.push(format!(
                        "{}: phi operand through non-predecessor {}",
                        block.id, pred
                    ));
                }
            }
        }
    }

    // Dominance of uses: DFS over the dominator tree carrying visible defs.
    enum Step {
        Enter(BlockId),
        Leave,
    }

    let mut visible: FxHashSet<IlVarId> = FxHashSet::default();
    let mut def_stack: Vec<Vec<IlVarId>> = Vec::new();
    let mut stack = vec![Step::Enter(cfg.entry)];
    while let Some(step) = stack.pop() {
        match step {
            Step::Enter(block_id) => {
                let block = cfg.block(block_id);
                let mut defined_here = Vec::new();
                for instr in &block.instructions {
                    if instr.opcode != OpCode::Phi {
                        for used in instr.var_uses() {
                            // Version 0 is the unversioned initial state
                            // (e.g. parameters before their first def).
                            if used.version() != 0 && !used.is_temp() && !visible.contains(&used)
                            {
                                problems.push(format!(
                                    "{}: use of {} not dominated by its definition",
                                    block_id, used
                                ));
                            }
                        }
                    }
                    if let Some(result) = instr.result {
                        if visible.insert(result) {
                            defined_here.push(result);
                        }
                    }
                }
                def_stack.push(defined_here);
                stack.push(Step::Leave);
                for &child in cfg.dom_children(block_id) {
                    stack.push(Step::Enter(child));
                }
            }
            Step::Leave => {
                for var in def_stack.pop().unwrap_or_default() {
                    visible.remove(&var);
                }
            }
        }
    }

    problems
}

/// Verify that no `Phi` instruction survives SSA reduction.
pub fn verify_no_phis(ctx: &IlContext) -> Vec<String> {
    let mut problems = Vec::new();
    for block in ctx.cfg.blocks() {
        for instr in &block.instructions {
            if instr.opcode == OpCode::Phi {
                problems.push(format!("{}: phi survived reduction", block.id));
            }
        }
    }
    problems
}
