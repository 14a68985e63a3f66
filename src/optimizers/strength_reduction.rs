//! Strength reduction
//!
//! Replaces multiplications and divisions by power-of-two immediates with
//! cheaper operations: `x * 2` becomes `x + x`, `x * 2^k` becomes `x << k`,
//! and `x / 2^k` becomes `x >> k`. Only non-negative integer immediates
//! qualify, and the division rewrite is restricted to unsigned operand types
//! (an arithmetic shift rounds differently for negative dividends).
//!
//! Runs as a single sweep after the per-function fixed point; its outputs
//! (adds and shifts) are not further reducible by the other passes.

use super::{OptimizerPass, PassResult};
use crate::diagnostics::DiagnosticSink;
use crate::il::instructions::{Instruction, OpCode, Operand};
use crate::il::modules::IlContext;
use crate::il::Number;

/// Rewrites power-of-two multiplications and divisions.
#[derive(Debug, Default)]
pub struct StrengthReduction {
    changed: bool,
}

impl StrengthReduction {
    pub fn new() -> Self {
        Self::default()
    }

    fn reduce_mul_div(&mut self, instr: &mut Instruction) {
        let Some(imm) = instr.rhs.as_imm() else { return };

        if instr.opcode == OpCode::Multiply && imm == Number::Int32(2).cast(imm.kind()) {
            if imm.kind().is_integer() {
                instr.opcode = OpCode::Add;
                instr.rhs = instr.lhs;
                self.changed = true;
                return;
            }
        }

        let Some(value) = imm.as_unsigned() else { return };
        if value <= 1 || !value.is_power_of_two() {
            return;
        }
        let shift = value.trailing_zeros();
        let shift_imm = match instr.ty.as_kind() {
            Some(kind) if kind.is_integer() => Number::UInt64(shift as u64).cast(kind),
            _ => return,
        };

        match instr.opcode {
            OpCode::Multiply => {
                instr.opcode = OpCode::ShiftLeft;
                instr.rhs = Operand::Imm(shift_imm);
                self.changed = true;
            }
            OpCode::Divide => {
                // Signed dividends may be negative; only unsigned types are
                // safe to shift.
                if instr.ty.as_kind().map(|k| k.is_unsigned_int()).unwrap_or(false) {
                    instr.opcode = OpCode::ShiftRight;
                    instr.rhs = Operand::Imm(shift_imm);
                    self.changed = true;
                }
            }
            _ => {}
        }
    }
}

impl OptimizerPass for StrengthReduction {
    fn name(&self) -> &'static str {
        "strength-reduction"
    }

    fn run(&mut self, ctx: &mut IlContext, _sink: &dyn DiagnosticSink) -> PassResult {
        self.changed = false;

        for block_id in ctx.cfg.block_ids() {
            for instr in &mut ctx.cfg.block_mut(block_id).instructions {
                if matches!(instr.opcode, OpCode::Multiply | OpCode::Divide) {
                    self.reduce_mul_div(instr);
                }
            }
        }

        if self.changed {
            PassResult::Changed
        } else {
            PassResult::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::test_support::CapturingSink;
    use crate::il::{
        FunctionBuilder, FunctionId, FunctionSignature, IlTypeId, IlVarId, NumberKind,
    };

    fn reduce(opcode: OpCode, ty: IlTypeId, rhs: Number) -> Instruction {
        let mut b = FunctionBuilder::new(FunctionId(0), "f", FunctionSignature::default());
        b.create_block();
        let v = b.declare_var(ty);
        b.binary(opcode, v, Operand::Var(IlVarId::new(9)), Operand::Imm(rhs));
        b.ret(Operand::Var(v));
        let mut ctx = b.finish().context;

        let sink = CapturingSink::default();
        StrengthReduction::new().run(&mut ctx, &sink);
        ctx.cfg.block(ctx.cfg.entry).instructions[0].clone()
    }

    #[test]
    fn test_mul_by_two_becomes_add() {
        let instr = reduce(
            OpCode::Multiply,
            IlTypeId::of(NumberKind::Int32),
            Number::Int32(2),
        );
        assert_eq!(instr.opcode, OpCode::Add);
        assert_eq!(instr.lhs, instr.rhs);
    }

    #[test]
    fn test_mul_by_eight_becomes_shift() {
        let instr = reduce(
            OpCode::Multiply,
            IlTypeId::of(NumberKind::Int32),
            Number::Int32(8),
        );
        assert_eq!(instr.opcode, OpCode::ShiftLeft);
        assert_eq!(instr.rhs.as_imm(), Some(Number::Int32(3)));
    }

    #[test]
    fn test_unsigned_div_becomes_shift() {
        let instr = reduce(
            OpCode::Divide,
            IlTypeId::of(NumberKind::UInt32),
            Number::UInt32(16),
        );
        assert_eq!(instr.opcode, OpCode::ShiftRight);
        assert_eq!(instr.rhs.as_imm(), Some(Number::UInt32(4)));
    }

    #[test]
    fn test_signed_div_is_left_alone() {
        let instr = reduce(
            OpCode::Divide,
            IlTypeId::of(NumberKind::Int32),
            Number::Int32(4),
        );
        assert_eq!(instr.opcode, OpCode::Divide);
    }

    #[test]
    fn test_non_power_of_two_is_left_alone() {
        let instr = reduce(
            OpCode::Multiply,
            IlTypeId::of(NumberKind::Int32),
            Number::Int32(6),
        );
        assert_eq!(instr.opcode, OpCode::Multiply);
    }

    #[test]
    fn test_negative_immediate_is_left_alone() {
        let instr = reduce(
            OpCode::Multiply,
            IlTypeId::of(NumberKind::Int32),
            Number::Int32(-8),
        );
        assert_eq!(instr.opcode, OpCode::Multiply);
    }

    #[test]
    fn test_float_mul_is_left_alone() {
        let instr = reduce(
            OpCode::Multiply,
            IlTypeId::of(NumberKind::Float),
            Number::Float(2.0),
        );
        assert_eq!(instr.opcode, OpCode::Multiply);
    }
}
