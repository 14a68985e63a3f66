//! Function inlining
//!
//! Splices an optimized callee body into a caller at a `Call` site. The
//! callee must have collapsed to a single block with at most one `Return`
//! (the guaranteed shape after the per-function fixed point for inlinable
//! functions); callers skip callees that kept control flow.
//!
//! The contract per site:
//! 1. Scan backward from the site, capturing each `StoreParam`'s constant or
//!    source variable into the parameter table and removing the instruction.
//! 2. Remap callee variables through two maps: base id → freshly cloned
//!    caller base id, and full versioned id → caller versioned id.
//! 3. `LoadParam` becomes a `Move` (constant argument) or a pure renaming
//!    (variable argument); `Return` becomes a `Move` into the call result;
//!    everything else is cloned with operands and result rewritten.
//! 4. The `Call` instruction is deleted.
//!
//! The callee is read-only throughout; the driver hands in a snapshot.

use crate::error::{OptResult, OptimizerError};
use crate::il::instructions::{Instruction, OpCode, Operand};
use crate::il::modules::FunctionLayout;
use crate::il::{BlockId, IlVarId, Number};
use fxhash::FxHashMap;
use log::trace;

/// Captured argument for one callee parameter.
#[derive(Debug, Clone, Copy)]
enum ParamInfo {
    Unset,
    Imm(Number),
    Var(IlVarId),
}

/// Inlines one callee into one caller, site by site.
pub struct FunctionInliner<'a> {
    caller: &'a mut FunctionLayout,
    callee: &'a FunctionLayout,
    params: Vec<ParamInfo>,
    /// Callee base id → caller base id.
    base_var_map: FxHashMap<IlVarId, IlVarId>,
    /// Callee versioned id → caller versioned id.
    var_id_map: FxHashMap<IlVarId, IlVarId>,
}

impl<'a> FunctionInliner<'a> {
    pub fn new(caller: &'a mut FunctionLayout, callee: &'a FunctionLayout) -> Self {
        Self {
            caller,
            callee,
            params: Vec::new(),
            base_var_map: FxHashMap::default(),
            var_id_map: FxHashMap::default(),
        }
    }

    /// Whether the callee has the single-block, at-most-one-return shape the
    /// splice requires.
    pub fn callee_is_inlinable(callee: &FunctionLayout) -> bool {
        callee.context.cfg.block_count() == 1
            && callee.context.count_opcode(OpCode::Return) <= 1
            && callee.context.count_opcode(OpCode::Phi) == 0
    }

    /// Inline every call site of the callee found in the caller. Returns the
    /// number of sites inlined.
    pub fn inline_all(&mut self) -> OptResult<usize> {
        if !Self::callee_is_inlinable(self.callee) {
            trace!(
                "skipping inline of {} into {}: callee kept control flow",
                self.callee.name,
                self.caller.name
            );
            return Ok(0);
        }

        let mut inlined = 0;
        // Instruction positions shift with every splice; re-locate the next
        // site from scratch each time.
        while let Some((block, index)) = self.find_call_site() {
            self.inline_at(block, index)?;
            inlined += 1;
        }
        Ok(inlined)
    }

    fn find_call_site(&self) -> Option<(BlockId, usize)> {
        for block in self.caller.context.cfg.blocks() {
            for (index, instr) in block.instructions.iter().enumerate() {
                if instr.opcode == OpCode::Call
                    && instr.lhs.as_func() == Some(self.callee.id)
                {
                    return Some((block.id, index));
                }
            }
        }
        None
    }

    /// Inline the callee at one `Call` site.
    pub fn inline_at(&mut self, block: BlockId, site_index: usize) -> OptResult<()> {
        self.params = vec![ParamInfo::Unset; self.callee.signature.params.len()];
        self.base_var_map.clear();
        self.var_id_map.clear();

        let site_result = self.caller.context.cfg.block(block).instructions[site_index].result;

        let site_index = self.capture_and_remove_args(block, site_index)?;
        let spliced = self.clone_callee_body(block, site_result)?;

        let instructions = &mut self.caller.context.cfg.block_mut(block).instructions;
        instructions.splice(site_index..=site_index, spliced);
        Ok(())
    }

    /// Walk backward from the call site collecting `StoreParam`s; each is
    /// captured into the parameter table and removed. Returns the site's
    /// index after the removals.
    fn capture_and_remove_args(
        &mut self,
        block: BlockId,
        site_index: usize,
    ) -> OptResult<usize> {
        let instructions = &self.caller.context.cfg.block(block).instructions;
        let mut removed: Vec<usize> = Vec::new();

        for index in (0..site_index).rev() {
            let instr = &instructions[index];
            if instr.opcode != OpCode::StoreParam {
                continue;
            }
            let param_index = instr
                .rhs
                .as_imm()
                .and_then(|n| n.as_unsigned())
                .ok_or_else(|| {
                    OptimizerError::InternalInvariant(
                        "store-param without a parameter index".to_string(),
                    )
                })? as usize;
            if param_index >= self.params.len() {
                // An argument for a later call to the same callee, or stale.
                continue;
            }
            if !matches!(self.params[param_index], ParamInfo::Unset) {
                continue;
            }
            self.params[param_index] = match instr.lhs {
                Operand::Imm(imm) => ParamInfo::Imm(imm),
                Operand::Var(v) => ParamInfo::Var(v),
                ref other => {
                    return Err(OptimizerError::InternalInvariant(format!(
                        "unhandled store-param source {:?}",
                        other
                    )))
                }
            };
            removed.push(index);
            if removed.len() == self.params.len() {
                break;
            }
        }

        let instructions = &mut self.caller.context.cfg.block_mut(block).instructions;
        // Highest index first, so earlier positions stay valid.
        for &index in &removed {
            instructions.remove(index);
        }
        Ok(site_index - removed.len())
    }

    /// Remap a callee variable id into the caller, registering a cloned
    /// descriptor on first contact with the base id.
    fn remap_var_id(&mut self, var: IlVarId) -> IlVarId {
        let stripped = var.base();
        let new_base = match self.base_var_map.get(&stripped) {
            Some(&mapped) => mapped,
            None => {
                let cloned = self
                    .caller
                    .context
                    .metadata
                    .clone_var_from(&self.callee.context.metadata, stripped);
                self.base_var_map.insert(stripped, cloned);
                cloned
            }
        };
        let new_id = new_base.with_version(var.version());
        self.var_id_map.insert(var, new_id);
        new_id
    }

    fn mapped_operand(&self, operand: Operand) -> OptResult<Operand> {
        match operand {
            Operand::Var(v) => {
                let mapped = self.var_id_map.get(&v).ok_or_else(|| {
                    OptimizerError::InternalInvariant(format!(
                        "callee variable {} has no renaming map entry",
                        v
                    ))
                })?;
                Ok(Operand::Var(*mapped))
            }
            other => Ok(other),
        }
    }

    /// Produce the instruction sequence replacing the `Call`.
    fn clone_callee_body(
        &mut self,
        caller_block: BlockId,
        site_result: Option<IlVarId>,
    ) -> OptResult<Vec<Instruction>> {
        let mut spliced: Vec<Instruction> = Vec::new();

        // Copy the reference out of the field so the block iterator does not
        // pin `self` while the renaming maps are updated.
        let callee: &FunctionLayout = self.callee;
        for callee_block in callee.context.cfg.blocks() {
            for instr in &callee_block.instructions {
                match instr.opcode {
                    OpCode::LoadParam => {
                        let param_index = instr
                            .lhs
                            .as_imm()
                            .and_then(|n| n.as_unsigned())
                            .ok_or_else(|| {
                                OptimizerError::InternalInvariant(
                                    "load-param without a parameter index".to_string(),
                                )
                            })? as usize;
                        let dst = instr.result.ok_or_else(|| {
                            OptimizerError::InternalInvariant(
                                "load-param without a result".to_string(),
                            )
                        })?;
                        match self.params.get(param_index).copied() {
                            Some(ParamInfo::Imm(imm)) => {
                                let new_dst = self.remap_var_id(dst);
                                spliced.push(Instruction::mov(
                                    instr.ty,
                                    new_dst,
                                    Operand::Imm(imm),
                                ));
                            }
                            Some(ParamInfo::Var(arg)) => {
                                // The argument variable stands in directly;
                                // no instruction is emitted.
                                self.var_id_map.insert(dst, arg);
                            }
                            _ => {
                                return Err(OptimizerError::InternalInvariant(format!(
                                    "no argument captured for parameter {} of {}",
                                    param_index, self.callee.name
                                )))
                            }
                        }
                    }
                    OpCode::Return => {
                        let Some(result) = site_result else { continue };
                        match instr.lhs {
                            Operand::Var(_) => {
                                let mapped = self.mapped_operand(instr.lhs)?;
                                spliced.push(Instruction::mov(instr.ty, result, mapped));
                            }
                            Operand::Imm(imm) => {
                                spliced.push(Instruction::mov(
                                    instr.ty,
                                    result,
                                    Operand::Imm(imm),
                                ));
                            }
                            Operand::None => {}
                            ref other => {
                                return Err(OptimizerError::InternalInvariant(format!(
                                    "unhandled return value {:?} in inliner",
                                    other
                                )))
                            }
                        }
                    }
                    _ => {
                        let mut clone = instr.clone();
                        if let Some(result) = clone.result {
                            clone.result = Some(self.remap_var_id(result));
                        }
                        clone.lhs = self.mapped_operand(clone.lhs)?;
                        clone.rhs = self.mapped_operand(clone.rhs)?;

                        // A call carried along from the callee becomes an
                        // outgoing call of the caller.
                        if clone.opcode == OpCode::Call {
                            if let Some(callee) = clone.lhs.as_func() {
                                self.caller
                                    .context
                                    .metadata
                                    .record_call(callee, caller_block);
                            }
                        }
                        spliced.push(clone);
                    }
                }
            }
        }

        Ok(spliced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::{
        FunctionBuilder, FunctionId, FunctionSignature, IlTypeId, NumberKind,
    };

    fn i32_ty() -> IlTypeId {
        IlTypeId::of(NumberKind::Int32)
    }

    /// callee(x) { return x*x }
    fn square_callee(id: FunctionId) -> FunctionLayout {
        let mut b = FunctionBuilder::new(
            id,
            "square",
            FunctionSignature {
                params: vec![i32_ty()],
                return_type: i32_ty(),
            },
        );
        b.create_block();
        let x = b.load_param(0, i32_ty());
        let t = b.make_temp(i32_ty());
        b.binary(OpCode::Multiply, t, Operand::Var(x), Operand::Var(x));
        b.ret(Operand::Var(t));
        b.finish()
    }

    /// caller(y) { return square(y) }
    fn simple_caller(id: FunctionId, callee: FunctionId) -> FunctionLayout {
        let mut b = FunctionBuilder::new(
            id,
            "caller",
            FunctionSignature {
                params: vec![i32_ty()],
                return_type: i32_ty(),
            },
        );
        b.create_block();
        let y = b.load_param(0, i32_ty());
        let r = b.declare_var(i32_ty());
        b.store_param(0, Operand::Var(y));
        b.call(callee, Some(r));
        b.ret(Operand::Var(r));
        b.finish()
    }

    #[test]
    fn test_inline_variable_argument() {
        let callee = square_callee(FunctionId(1));
        let mut caller = simple_caller(FunctionId(0), FunctionId(1));

        let inlined = FunctionInliner::new(&mut caller, &callee)
            .inline_all()
            .unwrap();
        assert_eq!(inlined, 1);

        let ctx = &caller.context;
        assert_eq!(ctx.count_calls(), 0);
        assert_eq!(ctx.count_opcode(OpCode::StoreParam), 0);

        let instrs = &ctx.cfg.block(ctx.cfg.entry).instructions;
        // load-param y; t' = mul y, y; r = move t'; return r
        assert_eq!(instrs.len(), 4);
        assert_eq!(instrs[1].opcode, OpCode::Multiply);
        let y = instrs[0].result.unwrap();
        assert_eq!(instrs[1].lhs.as_var(), Some(y));
        assert_eq!(instrs[1].rhs.as_var(), Some(y));
        assert_eq!(instrs[2].opcode, OpCode::Move);
        assert_eq!(instrs[2].lhs.as_var(), instrs[1].result);
    }

    #[test]
    fn test_inline_constant_argument_emits_move() {
        let callee = square_callee(FunctionId(1));
        let mut b = FunctionBuilder::new(
            FunctionId(0),
            "caller",
            FunctionSignature {
                params: vec![],
                return_type: i32_ty(),
            },
        );
        b.create_block();
        let r = b.declare_var(i32_ty());
        b.store_param(0, Operand::Imm(Number::Int32(3)));
        b.call(FunctionId(1), Some(r));
        b.ret(Operand::Var(r));
        let mut caller = b.finish();

        FunctionInliner::new(&mut caller, &callee)
            .inline_all()
            .unwrap();

        let instrs = &caller.context.cfg.block(caller.context.cfg.entry).instructions;
        // x' = move 3; t' = mul x', x'; r = move t'; return r
        assert_eq!(instrs.len(), 4);
        assert_eq!(instrs[0].opcode, OpCode::Move);
        assert_eq!(instrs[0].lhs.as_imm(), Some(Number::Int32(3)));
        let x = instrs[0].result.unwrap();
        assert_eq!(instrs[1].lhs.as_var(), Some(x));
    }

    #[test]
    fn test_multi_block_callee_is_skipped() {
        let mut b = FunctionBuilder::new(
            FunctionId(1),
            "branchy",
            FunctionSignature {
                params: vec![i32_ty()],
                return_type: i32_ty(),
            },
        );
        let entry = b.create_block();
        let other = b.create_block();
        let x = b.load_param(0, i32_ty());
        b.set_block(entry);
        b.jump(other);
        b.set_block(other);
        b.ret(Operand::Var(x));
        let callee = b.finish();

        let mut caller = simple_caller(FunctionId(0), FunctionId(1));
        let inlined = FunctionInliner::new(&mut caller, &callee)
            .inline_all()
            .unwrap();
        assert_eq!(inlined, 0);
        assert_eq!(caller.context.count_calls(), 1);
    }

    #[test]
    fn test_inlined_metadata_descriptors_are_cloned() {
        let callee = square_callee(FunctionId(1));
        let mut caller = simple_caller(FunctionId(0), FunctionId(1));
        let vars_before = caller.context.metadata.var_count();
        let temps_before = caller.context.metadata.temp_count();

        FunctionInliner::new(&mut caller, &callee)
            .inline_all()
            .unwrap();

        // Only the callee's temp was cloned; its parameter variable was
        // substituted by the caller's argument.
        assert_eq!(caller.context.metadata.var_count(), vars_before);
        assert_eq!(caller.context.metadata.temp_count(), temps_before + 1);
    }
}
