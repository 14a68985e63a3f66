//! Dead-code elimination
//!
//! Mark-then-sweep, walking blocks in postorder and each block's
//! instructions from last to first. The used set is seeded with every
//! φ-operand in the function; operands are marked as each instruction is
//! visited, and a result-producing instruction whose result was never marked
//! is discarded.
//!
//! The instruction immediately preceding a conditional jump is
//! branch-protected: its result feeds the branch even though the use follows
//! it lexically.

use super::{OptimizerPass, PassResult};
use crate::diagnostics::DiagnosticSink;
use crate::il::instructions::{Instruction, OpCode, Operand};
use crate::il::metadata::IlMetadata;
use crate::il::modules::IlContext;
use crate::il::IlVarId;
use fxhash::FxHashSet;

/// Removes instructions whose results are never used.
#[derive(Debug, Default)]
pub struct DeadCodeEliminator {
    used: FxHashSet<IlVarId>,
    changed: bool,
}

impl DeadCodeEliminator {
    pub fn new() -> Self {
        Self::default()
    }

    fn mark_operand(&mut self, operand: Operand) {
        if let Operand::Var(v) = operand {
            self.used.insert(v);
        }
    }

    /// Mark the instruction's reads; discard it when it defines an unused
    /// result and is not protected.
    fn process_instr(
        &mut self,
        instr: &Instruction,
        metadata: &IlMetadata,
        protected: bool,
    ) -> bool {
        if instr.opcode == OpCode::Phi {
            if let Operand::Phi(phi_id) = instr.lhs {
                for &(incoming, _) in &metadata.phi(phi_id).incoming {
                    self.used.insert(incoming);
                }
            }
        }

        self.mark_operand(instr.lhs);
        self.mark_operand(instr.rhs);

        if protected {
            return true;
        }
        match instr.result {
            Some(result) => self.used.contains(&result),
            None => true,
        }
    }
}

impl OptimizerPass for DeadCodeEliminator {
    fn name(&self) -> &'static str {
        "dead-code-elimination"
    }

    fn run(&mut self, ctx: &mut IlContext, _sink: &dyn DiagnosticSink) -> PassResult {
        self.changed = false;
        self.used.clear();

        // Values flowing into φs stay live regardless of block order.
        for phi in &ctx.metadata.phi_nodes {
            for &(incoming, _) in &phi.incoming {
                self.used.insert(incoming);
            }
        }

        // Postorder: uses in dominated blocks are seen before the defs that
        // feed them.
        let mut order = ctx.cfg.reverse_postorder();
        order.reverse();

        for block_id in order {
            let mut instructions = std::mem::take(&mut ctx.cfg.block_mut(block_id).instructions);
            let mut keep = vec![true; instructions.len()];

            let mut protected = false;
            for (index, instr) in instructions.iter().enumerate().rev() {
                // Stores write through; they are never discarded and their
                // operands always count as reads.
                protected |= instr.opcode == OpCode::Store;

                if !self.process_instr(instr, &ctx.metadata, protected) {
                    keep[index] = false;
                    self.changed = true;
                }

                // Protect the instruction lexically preceding a conditional
                // jump; it produces the branch flag.
                protected = instr.opcode.is_conditional_jump();
            }

            if keep.iter().any(|&k| !k) {
                let mut index = 0;
                instructions.retain(|_| {
                    let retained = keep[index];
                    index += 1;
                    retained
                });
            }
            ctx.cfg.block_mut(block_id).instructions = instructions;
        }

        if self.changed {
            PassResult::Changed
        } else {
            PassResult::None
        }
    }
}
