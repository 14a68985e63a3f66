//! Programmatic IL construction
//!
//! [`FunctionBuilder`] is the surface the AST lowering drives to produce a
//! [`FunctionLayout`], and the construction API the optimizer tests use. It
//! keeps an insertion block, allocates variables through the function's
//! metadata, and wires CFG edges whenever it emits a branch.

use super::cfg::BlockKind;
use super::instructions::{Instruction, OpCode, Operand};
use super::modules::{FunctionLayout, FunctionSignature};
use super::number::Number;
use super::{BlockId, FunctionId, IlTypeId, IlVarId};

/// Builds one function's blocks and instructions in program order.
#[derive(Debug)]
pub struct FunctionBuilder {
    layout: FunctionLayout,
    current: Option<BlockId>,
}

impl FunctionBuilder {
    pub fn new(id: FunctionId, name: impl Into<String>, signature: FunctionSignature) -> Self {
        Self {
            layout: FunctionLayout::new(id, name, signature),
            current: None,
        }
    }

    /// Allocate a block; the first one becomes the entry and the insertion
    /// point.
    pub fn create_block(&mut self) -> BlockId {
        let id = self.layout.context.cfg.create_block();
        if self.current.is_none() {
            self.current = Some(id);
        }
        id
    }

    /// Move the insertion point.
    pub fn set_block(&mut self, block: BlockId) {
        self.current = Some(block);
    }

    pub fn current_block(&self) -> BlockId {
        self.current.expect("no insertion block; call create_block first")
    }

    pub fn declare_var(&mut self, ty: IlTypeId) -> IlVarId {
        self.layout.context.metadata.register_var(ty)
    }

    pub fn make_temp(&mut self, ty: IlTypeId) -> IlVarId {
        self.layout.context.metadata.register_temp(ty)
    }

    /// Append a raw instruction to the insertion block.
    pub fn push(&mut self, instr: Instruction) {
        let block = self.current_block();
        self.layout
            .context
            .cfg
            .block_mut(block)
            .instructions
            .push(instr);
    }

    pub fn mov(&mut self, dst: IlVarId, src: Operand) {
        let ty = self.layout.context.metadata.var_type(dst);
        self.push(Instruction::mov(ty, dst, src));
    }

    pub fn mov_imm(&mut self, dst: IlVarId, value: Number) {
        self.mov(dst, Operand::Imm(value));
    }

    pub fn unary(&mut self, opcode: OpCode, dst: IlVarId, src: Operand) {
        let ty = self.layout.context.metadata.var_type(dst);
        self.push(Instruction::new(opcode, ty, src, Operand::None, Some(dst)));
    }

    pub fn binary(&mut self, opcode: OpCode, dst: IlVarId, lhs: Operand, rhs: Operand) {
        let ty = self.layout.context.metadata.var_type(dst);
        self.push(Instruction::new(opcode, ty, lhs, rhs, Some(dst)));
    }

    pub fn cast(&mut self, dst: IlVarId, src: Operand) {
        let ty = self.layout.context.metadata.var_type(dst);
        self.push(Instruction::new(
            OpCode::Cast,
            ty,
            src,
            Operand::None,
            Some(dst),
        ));
    }

    /// Declare a variable for parameter `index` and load it.
    pub fn load_param(&mut self, index: u32, ty: IlTypeId) -> IlVarId {
        let dst = self.declare_var(ty);
        self.push(Instruction::new(
            OpCode::LoadParam,
            ty,
            Operand::Imm(Number::UInt32(index)),
            Operand::None,
            Some(dst),
        ));
        dst
    }

    /// Store an outgoing argument for the next `Call`.
    pub fn store_param(&mut self, index: u32, src: Operand) {
        self.push(Instruction::new(
            OpCode::StoreParam,
            IlTypeId::VOID,
            src,
            Operand::Imm(Number::UInt32(index)),
            None,
        ));
    }

    /// Emit a call and record the outgoing edge in the metadata.
    pub fn call(&mut self, callee: FunctionId, result: Option<IlVarId>) {
        let block = self.current_block();
        let ty = result
            .map(|r| self.layout.context.metadata.var_type(r))
            .unwrap_or(IlTypeId::VOID);
        self.push(Instruction::new(
            OpCode::Call,
            ty,
            Operand::Func(callee),
            Operand::None,
            result,
        ));
        self.layout.context.metadata.record_call(callee, block);
    }

    pub fn ret(&mut self, value: Operand) {
        let block = self.current_block();
        self.push(Instruction::new(
            OpCode::Return,
            IlTypeId::VOID,
            value,
            Operand::None,
            None,
        ));
        self.layout.context.cfg.block_mut(block).kind = BlockKind::Return;
    }

    /// Unconditional jump; links the edge.
    pub fn jump(&mut self, target: BlockId) {
        let block = self.current_block();
        self.push(Instruction::new(
            OpCode::Jump,
            IlTypeId::VOID,
            Operand::Block(target),
            Operand::None,
            None,
        ));
        self.layout.context.cfg.link(block, target);
    }

    /// Conditional terminator: `opcode cond, then_target` followed by
    /// `jump else_target`. Links both edges and marks the block conditional.
    pub fn branch(
        &mut self,
        opcode: OpCode,
        cond: IlVarId,
        then_target: BlockId,
        else_target: BlockId,
    ) {
        debug_assert!(opcode.is_conditional_jump());
        let block = self.current_block();
        self.push(Instruction::new(
            opcode,
            IlTypeId::VOID,
            Operand::Var(cond),
            Operand::Block(then_target),
            None,
        ));
        self.push(Instruction::new(
            OpCode::Jump,
            IlTypeId::VOID,
            Operand::Block(else_target),
            Operand::None,
            None,
        ));
        let cfg = &mut self.layout.context.cfg;
        cfg.link(block, then_target);
        cfg.link(block, else_target);
        cfg.block_mut(block).kind = BlockKind::Conditional;
    }

    /// Finish construction and hand back the layout.
    pub fn finish(self) -> FunctionLayout {
        self.layout
    }
}
