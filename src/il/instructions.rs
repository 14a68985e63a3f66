//! IL instructions
//!
//! An instruction is a tagged record with an opcode, a result type, two
//! operand slots, and an optional result variable. Operands are a small sum
//! type: a versioned variable id, an immediate [`Number`], a function
//! reference, a branch-target block, or a φ-pool reference.
//!
//! Conditional branches name their condition variable in the left slot and
//! their target block in the right slot; an unconditional `Jump` carries only
//! the target. Successor/predecessor edges cached on the CFG are the
//! authoritative control flow; the jump instructions exist for code
//! generation and are kept in sync by whoever rewrites terminators.

use super::number::Number;
use super::{BlockId, FunctionId, IlTypeId, IlVarId, PhiId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// IL opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpCode {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulus,
    Negate,

    // Bitwise
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    BitwiseNot,
    ShiftLeft,
    ShiftRight,

    // Logical
    AndAnd,
    OrOr,
    LogicalNot,

    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,

    // Memory / dataflow
    Move,
    Load,
    Store,
    LoadParam,
    StoreParam,

    // Control
    Jump,
    JumpZero,
    JumpNotZero,
    Return,

    // Call
    Call,

    // Conversion
    Cast,

    // SSA
    Phi,
}

impl OpCode {
    /// Binary operations with two value operands and a result.
    pub fn is_binary(self) -> bool {
        matches!(
            self,
            OpCode::Add
                | OpCode::Subtract
                | OpCode::Multiply
                | OpCode::Divide
                | OpCode::Modulus
                | OpCode::BitwiseAnd
                | OpCode::BitwiseOr
                | OpCode::BitwiseXor
                | OpCode::ShiftLeft
                | OpCode::ShiftRight
                | OpCode::AndAnd
                | OpCode::OrOr
                | OpCode::Equal
                | OpCode::NotEqual
                | OpCode::LessThan
                | OpCode::LessThanOrEqual
                | OpCode::GreaterThan
                | OpCode::GreaterThanOrEqual
        )
    }

    pub fn is_unary(self) -> bool {
        matches!(self, OpCode::Negate | OpCode::BitwiseNot | OpCode::LogicalNot)
    }

    pub fn is_jump(self) -> bool {
        matches!(self, OpCode::Jump | OpCode::JumpZero | OpCode::JumpNotZero)
    }

    pub fn is_conditional_jump(self) -> bool {
        matches!(self, OpCode::JumpZero | OpCode::JumpNotZero)
    }

    pub fn is_control(self) -> bool {
        self.is_jump() || self == OpCode::Return
    }

    /// Operand order does not change the value.
    pub fn is_commutative(self) -> bool {
        matches!(self, OpCode::Add | OpCode::Multiply)
    }

    /// Eligible for common-subexpression elimination. `Move`, the memory
    /// opcodes, and control instructions are representational or impure and
    /// never participate.
    pub fn is_cse_candidate(self) -> bool {
        !matches!(
            self,
            OpCode::Move
                | OpCode::Load
                | OpCode::Store
                | OpCode::LoadParam
                | OpCode::StoreParam
                | OpCode::Jump
                | OpCode::JumpZero
                | OpCode::JumpNotZero
                | OpCode::Return
                | OpCode::Call
                | OpCode::Phi
        )
    }
}

/// One operand slot of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Operand {
    /// Empty slot.
    #[default]
    None,
    /// A versioned variable.
    Var(IlVarId),
    /// An immediate constant.
    Imm(Number),
    /// A function reference (callee of a `Call`).
    Func(FunctionId),
    /// A branch target.
    Block(BlockId),
    /// A φ-pool reference (left slot of a `Phi`).
    Phi(PhiId),
}

impl Operand {
    pub fn is_none(&self) -> bool {
        matches!(self, Operand::None)
    }

    pub fn is_var(&self) -> bool {
        matches!(self, Operand::Var(_))
    }

    pub fn is_imm(&self) -> bool {
        matches!(self, Operand::Imm(_))
    }

    pub fn as_var(&self) -> Option<IlVarId> {
        match self {
            Operand::Var(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_imm(&self) -> Option<Number> {
        match self {
            Operand::Imm(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<BlockId> {
        match self {
            Operand::Block(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_func(&self) -> Option<FunctionId> {
        match self {
            Operand::Func(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => write!(f, "_"),
            Operand::Var(v) => write!(f, "{}", v),
            Operand::Imm(n) => write!(f, "{}", n),
            Operand::Func(id) => write!(f, "@{}", id),
            Operand::Block(b) => write!(f, "{}", b),
            Operand::Phi(p) => write!(f, "{}", p),
        }
    }
}

/// A single IL instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: OpCode,
    /// Result type (and, for `Cast`, the conversion target).
    pub ty: IlTypeId,
    pub lhs: Operand,
    pub rhs: Operand,
    pub result: Option<IlVarId>,
}

impl Instruction {
    pub fn new(
        opcode: OpCode,
        ty: IlTypeId,
        lhs: Operand,
        rhs: Operand,
        result: Option<IlVarId>,
    ) -> Self {
        Self {
            opcode,
            ty,
            lhs,
            rhs,
            result,
        }
    }

    /// A `Move` of `src` into `result`.
    pub fn mov(ty: IlTypeId, result: IlVarId, src: Operand) -> Self {
        Self::new(OpCode::Move, ty, src, Operand::None, Some(result))
    }

    pub fn has_result(&self) -> bool {
        self.result.is_some()
    }

    pub fn is_var_imm(&self) -> bool {
        self.lhs.is_var() && self.rhs.is_imm()
    }

    pub fn is_imm_var(&self) -> bool {
        self.lhs.is_imm() && self.rhs.is_var()
    }

    pub fn is_op(&self, opcode: OpCode) -> bool {
        self.opcode == opcode
    }

    /// Variable ids read by this instruction (result excluded).
    pub fn var_uses(&self) -> impl Iterator<Item = IlVarId> + '_ {
        [self.lhs, self.rhs]
            .into_iter()
            .filter_map(|op| op.as_var())
    }

    /// Rewrite this instruction into `Move result, src` in place.
    pub fn convert_to_move(&mut self, src: Operand) {
        self.opcode = OpCode::Move;
        self.lhs = src;
        self.rhs = Operand::None;
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = format!("{:?}", self.opcode).to_lowercase();
        if let Some(result) = self.result {
            write!(f, "{} = {}", result, name)?;
        } else {
            write!(f, "{}", name)?;
        }
        if !self.lhs.is_none() {
            write!(f, " {}", self.lhs)?;
        }
        if !self.rhs.is_none() {
            write!(f, ", {}", self.rhs)?;
        }
        Ok(())
    }
}
