//! Algebraic simplification
//!
//! Identity and annihilator rewrites (`x*0`, `x*1`, `x+0`, `x-x`, `x^x`, …)
//! plus short-circuit folding: an `AndAnd` with a constant-false right
//! operand statically resolves the conditional branch that follows it. The
//! branch resolution edits the CFG (unlink the dead edge, mark and sweep the
//! blocks that strands, merge a linear pair), rebuilds the dominator tree,
//! and asks the driver to rerun the pipeline.
//!
//! Division by a constant zero is reported through the diagnostic sink and
//! rewritten to a `Move` of the dividend.

use super::{OptimizerPass, PassResult};
use crate::diagnostics::DiagnosticSink;
use crate::il::cfg::BlockKind;
use crate::il::instructions::{Instruction, OpCode, Operand};
use crate::il::modules::IlContext;
use crate::il::{BlockId, Number};

/// Pattern-rewrites arithmetic identities per block.
#[derive(Debug, Default)]
pub struct AlgebraicSimplifier {
    changed: bool,
}

impl AlgebraicSimplifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_zero(operand: &Operand) -> bool {
        operand.as_imm().map(|n| n.is_zero()).unwrap_or(false)
    }

    fn is_one(operand: &Operand) -> bool {
        operand.as_imm().map(|n| n.is_one()).unwrap_or(false)
    }

    fn move_imm(instr: &mut Instruction, value: Number) {
        let value = match instr.ty.as_kind() {
            Some(kind) => value.cast(kind),
            None => value,
        };
        instr.convert_to_move(Operand::Imm(value));
    }

    fn move_zero(instr: &mut Instruction) {
        Self::move_imm(instr, Number::Int64(0));
    }

    /// Rewrite one instruction; returns true when a rule fired.
    fn simplify_instr(&mut self, instr: &mut Instruction, sink: &dyn DiagnosticSink) -> bool {
        match instr.opcode {
            OpCode::Multiply => {
                if Self::is_zero(&instr.lhs) || Self::is_zero(&instr.rhs) {
                    Self::move_zero(instr);
                } else if Self::is_one(&instr.lhs) {
                    let rhs = instr.rhs;
                    instr.convert_to_move(rhs);
                } else if Self::is_one(&instr.rhs) {
                    let lhs = instr.lhs;
                    instr.convert_to_move(lhs);
                } else {
                    return false;
                }
                true
            }
            OpCode::Divide => {
                if Self::is_zero(&instr.lhs) {
                    Self::move_zero(instr);
                } else if Self::is_zero(&instr.rhs) {
                    sink.warning("division by constant zero; operand kept unchanged");
                    let lhs = instr.lhs;
                    instr.convert_to_move(lhs);
                } else if Self::is_one(&instr.rhs) {
                    let lhs = instr.lhs;
                    instr.convert_to_move(lhs);
                } else if instr.lhs == instr.rhs && !instr.lhs.is_none() {
                    Self::move_imm(instr, Number::Int64(1));
                } else {
                    return false;
                }
                true
            }
            OpCode::Subtract => {
                if Self::is_zero(&instr.lhs) {
                    let rhs = instr.rhs;
                    instr.convert_to_move(rhs);
                } else if Self::is_zero(&instr.rhs) {
                    let lhs = instr.lhs;
                    instr.convert_to_move(lhs);
                } else if instr.lhs == instr.rhs && !instr.lhs.is_none() {
                    Self::move_zero(instr);
                } else {
                    return false;
                }
                true
            }
            OpCode::Add => {
                if Self::is_zero(&instr.lhs) {
                    let rhs = instr.rhs;
                    instr.convert_to_move(rhs);
                } else if Self::is_zero(&instr.rhs) {
                    let lhs = instr.lhs;
                    instr.convert_to_move(lhs);
                } else {
                    return false;
                }
                true
            }
            OpCode::Modulus => {
                if Self::is_zero(&instr.lhs) {
                    Self::move_zero(instr);
                    true
                } else {
                    false
                }
            }
            OpCode::BitwiseAnd => {
                if Self::is_zero(&instr.rhs) {
                    Self::move_zero(instr);
                    true
                } else {
                    false
                }
            }
            OpCode::BitwiseOr => {
                if Self::is_zero(&instr.rhs) {
                    let lhs = instr.lhs;
                    instr.convert_to_move(lhs);
                    true
                } else {
                    false
                }
            }
            OpCode::BitwiseXor => {
                if Self::is_zero(&instr.rhs) {
                    let lhs = instr.lhs;
                    instr.convert_to_move(lhs);
                } else if instr.lhs == instr.rhs && !instr.lhs.is_none() {
                    Self::move_zero(instr);
                } else {
                    return false;
                }
                true
            }
            _ => false,
        }
    }

    /// `AndAnd` with a constant right operand next to a conditional branch:
    /// resolve the branch statically. Returns true when the CFG was edited.
    fn fold_short_circuit(
        &mut self,
        ctx: &mut IlContext,
        block_id: BlockId,
        sink: &dyn DiagnosticSink,
    ) -> bool {
        let _ = sink;
        let count = ctx.cfg.block(block_id).instructions.len();

        for index in 0..count {
            let (opcode, lhs, rhs_imm) = {
                let instr = &ctx.cfg.block(block_id).instructions[index];
                (instr.opcode, instr.lhs, instr.rhs.as_imm())
            };
            if opcode != OpCode::AndAnd {
                continue;
            }
            let Some(imm) = rhs_imm else { continue };

            if imm.to_bool() {
                // x && true == x.
                ctx.cfg.block_mut(block_id).instructions[index].convert_to_move(lhs);
                self.changed = true;
                return false;
            }

            // The result is statically false; resolve a following branch.
            if index + 1 >= count {
                continue;
            }
            let (next_opcode, next_target) = {
                let next = &ctx.cfg.block(block_id).instructions[index + 1];
                (next.opcode, next.rhs.as_block())
            };
            let is_true_branch = next_opcode == OpCode::JumpNotZero;
            if !is_true_branch && next_opcode != OpCode::JumpZero {
                continue;
            }
            let Some(target) = next_target else { continue };

            let condition = false;
            let will_jump = (is_true_branch && condition) || (!is_true_branch && !condition);

            if will_jump {
                // Keep only the edge to the branch target; everything the
                // unlink strands is marked unreachable and swept.
                let others: Vec<BlockId> = ctx
                    .cfg
                    .block(block_id)
                    .successors
                    .iter()
                    .copied()
                    .filter(|&s| s != target)
                    .collect();
                for succ in others {
                    ctx.cfg.unlink(block_id, succ);
                }
                let block = ctx.cfg.block_mut(block_id);
                block.instructions.truncate(index);
                block.kind = BlockKind::Normal;
                ctx.cfg.remove_unreachable();

                let single_pred = ctx.cfg.block(target).predecessors.as_slice() == [block_id];
                if single_pred {
                    ctx.cfg.merge_nodes(block_id, target);
                }
            } else {
                // The branch never fires; drop its edge and sweep whatever
                // that stranded.
                ctx.cfg.unlink(block_id, target);
                let block = ctx.cfg.block_mut(block_id);
                block.instructions.truncate(index);
                block.kind = BlockKind::Normal;
                ctx.cfg.remove_unreachable();
            }

            self.changed = true;
            ctx.cfg.rebuild_dom_tree();
            return true;
        }

        false
    }
}

impl OptimizerPass for AlgebraicSimplifier {
    fn name(&self) -> &'static str {
        "algebraic-simplification"
    }

    fn run(&mut self, ctx: &mut IlContext, sink: &dyn DiagnosticSink) -> PassResult {
        self.changed = false;

        for block_id in ctx.cfg.block_ids() {
            // A prior surgery in this run may have removed the block.
            if ctx.cfg.get_block(block_id).is_none() {
                continue;
            }

            let count = ctx.cfg.block(block_id).instructions.len();
            for index in 0..count {
                let instr = &mut ctx.cfg.block_mut(block_id).instructions[index];
                if instr.opcode == OpCode::AndAnd {
                    continue;
                }
                if self.simplify_instr(instr, sink) {
                    self.changed = true;
                }
            }

            if self.fold_short_circuit(ctx, block_id, sink) {
                return PassResult::Rerun;
            }
        }

        if self.changed {
            PassResult::Changed
        } else {
            PassResult::None
        }
    }
}
