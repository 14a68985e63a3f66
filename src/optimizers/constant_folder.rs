//! Constant folding and propagation
//!
//! Per block, in source order: tracked constants and copy sources substitute
//! into operands, `Move`/`Cast`/unary/binary instructions over immediates
//! fold, and a second sweep re-associates chained operations against
//! immediates (`(x op imm1) op imm2` fuses into one operation with a folded
//! immediate).
//!
//! An instruction immediately followed by a jump keeps its original shape:
//! the branch consumes the flag-producing result, so the producer must stay
//! syntactically present.

use super::{OptimizerPass, PassResult};
use crate::diagnostics::DiagnosticSink;
use crate::il::instructions::{Instruction, OpCode, Operand};
use crate::il::modules::IlContext;
use crate::il::{IlVarId, Number};
use fxhash::{FxHashMap, FxHashSet};

/// Folds constants within each block.
#[derive(Debug, Default)]
pub struct ConstantFolder {
    constants: FxHashMap<IlVarId, Number>,
    var_to_var: FxHashMap<IlVarId, IlVarId>,
    changed: bool,
}

impl ConstantFolder {
    pub fn new() -> Self {
        Self::default()
    }

    fn try_fold_operand(&mut self, operand: &mut Operand) {
        if let Operand::Var(v) = *operand {
            if let Some(&imm) = self.constants.get(&v) {
                *operand = Operand::Imm(imm);
                self.changed = true;
                return;
            }
            if let Some(&src) = self.var_to_var.get(&v) {
                *operand = Operand::Var(src);
                self.changed = true;
            }
        }
    }

    /// The next instruction is a jump, so `instructions[index]` feeds a
    /// branch and must not be collapsed away.
    fn is_jump_condition(instructions: &[Instruction], index: usize) -> bool {
        instructions
            .get(index + 1)
            .map(|next| next.opcode.is_jump())
            .unwrap_or(false)
    }

    fn fold_block(&mut self, instructions: &mut [Instruction]) {
        for index in 0..instructions.len() {
            let jump_guard = Self::is_jump_condition(instructions, index);
            let instr = &mut instructions[index];

            self.try_fold_operand(&mut instr.lhs);
            self.try_fold_operand(&mut instr.rhs);

            match instr.opcode {
                OpCode::Move => {
                    let Some(result) = instr.result else { continue };
                    match instr.lhs {
                        Operand::Var(src) => {
                            if let Some(&imm) = self.constants.get(&src) {
                                self.constants.insert(result, imm);
                            } else {
                                self.var_to_var.insert(result, src);
                            }
                        }
                        Operand::Imm(imm) => {
                            self.constants.insert(result, imm);
                        }
                        _ => {}
                    }
                }
                OpCode::Cast => {
                    let (Some(result), Some(imm), Some(kind)) =
                        (instr.result, instr.lhs.as_imm(), instr.ty.as_kind())
                    else {
                        continue;
                    };
                    let folded = imm.cast(kind);
                    instr.opcode = OpCode::Move;
                    instr.lhs = Operand::Imm(folded);
                    self.constants.insert(result, folded);
                    self.changed = true;
                }
                OpCode::Negate | OpCode::LogicalNot | OpCode::BitwiseNot => {
                    let (Some(result), Some(imm)) = (instr.result, instr.lhs.as_imm()) else {
                        continue;
                    };
                    let Some(folded) = imm.fold_unary(instr.opcode) else {
                        continue;
                    };
                    if jump_guard {
                        continue;
                    }
                    self.constants.insert(result, folded);
                }
                OpCode::Store | OpCode::StoreParam | OpCode::Phi => {}
                _ => {
                    let (Some(result), Some(lhs), Some(rhs)) =
                        (instr.result, instr.lhs.as_imm(), instr.rhs.as_imm())
                    else {
                        continue;
                    };
                    let Some(folded) = Number::fold_binary(lhs, rhs, instr.opcode) else {
                        continue;
                    };
                    if jump_guard {
                        continue;
                    }
                    self.constants.insert(result, folded);
                    instr.convert_to_move(Operand::Imm(folded));
                    self.changed = true;
                }
            }
        }
    }

    /// Constant re-association: when a prior instruction computed
    /// `base op imm1` and the current one combines that result with `imm2`
    /// using the same (or a mul/div-inverse) operation, fuse both into one
    /// operation against `base` with the folded immediate and drop the prior
    /// instruction.
    fn reassociate_block(&mut self, instructions: &mut Vec<Instruction>) {
        let mut def_map: FxHashMap<IlVarId, usize> = FxHashMap::default();
        let mut discarded: FxHashSet<usize> = FxHashSet::default();

        for index in 0..instructions.len() {
            let instr = instructions[index].clone();

            if instr.opcode.is_binary() {
                let var_imm = instr.is_var_imm();
                let imm_var = instr.is_imm_var();
                let commutative = instr.opcode.is_commutative();

                if var_imm || imm_var {
                    let chain_var = if var_imm {
                        instr.lhs.as_var().unwrap()
                    } else {
                        instr.rhs.as_var().unwrap()
                    };
                    let mut cur_imm = if var_imm {
                        instr.rhs.as_imm().unwrap()
                    } else {
                        instr.lhs.as_imm().unwrap()
                    };

                    if let Some(&def_index) = def_map.get(&chain_var) {
                        if !discarded.contains(&def_index) {
                            let def = instructions[def_index].clone();

                            let mul_then_div = def.is_op(OpCode::Multiply)
                                && instr.is_op(OpCode::Divide);
                            let div_then_mul =
                                def.is_op(OpCode::Divide) && instr.is_op(OpCode::Multiply);
                            let fuse_mul_div = mul_then_div || div_then_mul;

                            if def.opcode == instr.opcode || fuse_mul_div {
                                let def_var_imm = def.lhs.is_var() && def.rhs.is_imm();
                                let def_imm_var = (commutative || fuse_mul_div)
                                    && def.lhs.is_imm()
                                    && def.rhs.is_var();

                                let (base, mut def_imm) = if def_var_imm {
                                    (def.lhs.as_var().unwrap(), def.rhs.as_imm().unwrap())
                                } else if def_imm_var {
                                    (def.rhs.as_var().unwrap(), def.lhs.as_imm().unwrap())
                                } else {
                                    if let Some(result) = instr.result {
                                        def_map.insert(result, index);
                                    }
                                    continue;
                                };

                                if div_then_mul {
                                    std::mem::swap(&mut def_imm, &mut cur_imm);
                                }

                                let fold_op = if fuse_mul_div {
                                    OpCode::Divide
                                } else {
                                    instr.opcode
                                };
                                if let Some(total) =
                                    Number::fold_binary(def_imm, cur_imm, fold_op)
                                {
                                    discarded.insert(def_index);
                                    let target = &mut instructions[index];
                                    target.lhs = Operand::Var(base);
                                    target.rhs = Operand::Imm(total);
                                    target.opcode = if fuse_mul_div {
                                        OpCode::Multiply
                                    } else {
                                        def.opcode
                                    };
                                    self.changed = true;
                                    continue;
                                }
                            }
                        }
                    }
                }
            }

            if let Some(result) = instructions[index].result {
                def_map.insert(result, index);
            }
        }

        if !discarded.is_empty() {
            let mut index = 0;
            instructions.retain(|_| {
                let keep = !discarded.contains(&index);
                index += 1;
                keep
            });
        }
    }
}

impl OptimizerPass for ConstantFolder {
    fn name(&self) -> &'static str {
        "constant-folding"
    }

    fn run(&mut self, ctx: &mut IlContext, _sink: &dyn DiagnosticSink) -> PassResult {
        self.changed = false;

        for block_id in ctx.cfg.block_ids() {
            let mut instructions = std::mem::take(&mut ctx.cfg.block_mut(block_id).instructions);

            self.fold_block(&mut instructions);
            self.constants.clear();
            self.var_to_var.clear();

            self.reassociate_block(&mut instructions);

            ctx.cfg.block_mut(block_id).instructions = instructions;
        }

        if self.changed {
            PassResult::Changed
        } else {
            PassResult::None
        }
    }
}
