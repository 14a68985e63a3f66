//! Common-subexpression elimination
//!
//! Per block: pure instructions are keyed by `(opcode, lhs, rhs, type)`. A
//! duplicate's result is renamed to the earlier result in all subsequent
//! reads and the duplicate is discarded. `Move`, the memory opcodes, calls,
//! and control instructions never participate.

use super::{OptimizerPass, PassResult};
use crate::diagnostics::DiagnosticSink;
use crate::il::instructions::{OpCode, Operand};
use crate::il::modules::IlContext;
use crate::il::{IlTypeId, IlVarId};
use fxhash::FxHashMap;

type ExprKey = (OpCode, Operand, Operand, IlTypeId);

/// Eliminates duplicate pure computations within each block.
#[derive(Debug, Default)]
pub struct CommonSubExpression {
    expressions: FxHashMap<ExprKey, IlVarId>,
    rename: FxHashMap<IlVarId, IlVarId>,
    changed: bool,
}

impl CommonSubExpression {
    pub fn new() -> Self {
        Self::default()
    }

    fn try_map_operand(&mut self, operand: &mut Operand) {
        if let Operand::Var(v) = *operand {
            if let Some(&replacement) = self.rename.get(&v) {
                *operand = Operand::Var(replacement);
                self.changed = true;
            }
        }
    }
}

impl OptimizerPass for CommonSubExpression {
    fn name(&self) -> &'static str {
        "common-subexpression-elimination"
    }

    fn run(&mut self, ctx: &mut IlContext, _sink: &dyn DiagnosticSink) -> PassResult {
        self.changed = false;

        for block_id in ctx.cfg.block_ids() {
            self.expressions.clear();
            self.rename.clear();

            let instructions = &mut ctx.cfg.block_mut(block_id).instructions;
            let mut keep = vec![true; instructions.len()];

            for (index, instr) in instructions.iter_mut().enumerate() {
                self.try_map_operand(&mut instr.lhs);
                self.try_map_operand(&mut instr.rhs);

                if !instr.opcode.is_cse_candidate() {
                    continue;
                }
                let Some(result) = instr.result else { continue };

                let key = (instr.opcode, instr.lhs, instr.rhs, instr.ty);
                match self.expressions.get(&key) {
                    Some(&existing) => {
                        self.rename.insert(result, existing);
                        keep[index] = false;
                        self.changed = true;
                    }
                    None => {
                        self.expressions.insert(key, result);
                    }
                }
            }

            if keep.iter().any(|&k| !k) {
                let mut index = 0;
                instructions.retain(|_| {
                    let retained = keep[index];
                    index += 1;
                    retained
                });
            }
        }

        if self.changed {
            PassResult::Changed
        } else {
            PassResult::None
        }
    }
}
