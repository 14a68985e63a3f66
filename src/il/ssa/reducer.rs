//! SSA reduction
//!
//! Erases φ nodes and reuses temp storage. Every incoming version of a φ is
//! renamed to the φ result, which collapses each merge family back to one
//! register. Temps are then coalesced through a per-type free pool: a temp id
//! returns to the pool at its last use and later temp definitions draw from
//! the pool before allocating new ids.

use crate::il::instructions::{OpCode, Operand};
use crate::il::modules::IlContext;
use crate::il::{IlTypeId, IlVarId};
use fxhash::FxHashMap;
use std::collections::VecDeque;

/// Lowers one function out of SSA form in place.
pub struct SsaReducer<'a> {
    ctx: &'a mut IlContext,
    /// Incoming φ version → φ result.
    phi_map: FxHashMap<IlVarId, IlVarId>,
    /// Original temp id → coalesced temp id.
    temp_map: FxHashMap<IlVarId, IlVarId>,
    /// Reusable temp ids, keyed by type.
    free_temps: FxHashMap<IlTypeId, VecDeque<IlVarId>>,
}

impl<'a> SsaReducer<'a> {
    pub fn new(ctx: &'a mut IlContext) -> Self {
        Self {
            ctx,
            phi_map: FxHashMap::default(),
            temp_map: FxHashMap::default(),
            free_temps: FxHashMap::default(),
        }
    }

    /// Drop φs, merge their operand versions into the φ results, and coalesce
    /// temps. Afterwards no `Phi` remains and every non-temp variable has a
    /// single live definition at any point.
    pub fn reduce(&mut self) {
        for phi in &self.ctx.metadata.phi_nodes {
            for &(incoming, _) in &phi.incoming {
                self.phi_map.insert(incoming, phi.result);
            }
        }

        let block_ids = self.ctx.cfg.block_ids();
        for block_id in block_ids {
            let mut instructions =
                std::mem::take(&mut self.ctx.cfg.block_mut(block_id).instructions);

            instructions.retain(|instr| instr.opcode != OpCode::Phi);

            for instr in &mut instructions {
                instr.lhs = self.resolve_phi(instr.lhs);
                instr.rhs = self.resolve_phi(instr.rhs);
                if let Some(result) = instr.result {
                    if let Some(&merged) = self.phi_map.get(&result) {
                        instr.result = Some(merged);
                    }
                }
            }

            self.coalesce_temps(&mut instructions);
            self.ctx.cfg.block_mut(block_id).instructions = instructions;
        }

        self.ctx.metadata.phi_nodes.clear();
    }

    fn resolve_phi(&self, operand: Operand) -> Operand {
        match operand {
            Operand::Var(v) => match self.phi_map.get(&v) {
                Some(&merged) => Operand::Var(merged),
                None => operand,
            },
            other => other,
        }
    }

    /// Within one block, free each temp at its last use and satisfy later
    /// temp definitions from the pool.
    fn coalesce_temps(&mut self, instructions: &mut [crate::il::Instruction]) {
        let mut last_use: FxHashMap<IlVarId, usize> = FxHashMap::default();
        for (index, instr) in instructions.iter().enumerate() {
            for used in instr.var_uses() {
                if used.is_temp() {
                    last_use.insert(used, index);
                }
            }
        }

        for index in 0..instructions.len() {
            // Rename both operand slots, then free temps dying here; a temp
            // freed at its last use may be reused by this very instruction's
            // own result. Dying ids are deduplicated so `add t0, t0` frees
            // t0 once.
            let mut dying: Vec<IlVarId> = Vec::new();
            for slot in [0, 1] {
                let operand = if slot == 0 {
                    instructions[index].lhs
                } else {
                    instructions[index].rhs
                };
                if let Operand::Var(v) = operand {
                    if v.is_temp() {
                        let final_id = self.temp_map.get(&v).copied().unwrap_or(v);
                        let renamed = Operand::Var(final_id);
                        if slot == 0 {
                            instructions[index].lhs = renamed;
                        } else {
                            instructions[index].rhs = renamed;
                        }
                        if last_use.get(&v) == Some(&index) && !dying.contains(&v) {
                            dying.push(v);
                        }
                    }
                }
            }
            for v in dying {
                let final_id = self.temp_map.get(&v).copied().unwrap_or(v);
                let ty = self.ctx.metadata.var_type(v);
                self.free_temps.entry(ty).or_default().push_back(final_id);
            }

            if let Some(result) = instructions[index].result {
                if result.is_temp() {
                    let ty = self.ctx.metadata.var_type(result);
                    let final_id = match self.free_temps.get_mut(&ty).and_then(|q| q.pop_front())
                    {
                        Some(free) => free,
                        None => result,
                    };
                    self.temp_map.insert(result, final_id);
                    instructions[index].result = Some(final_id);
                    // A result that is never read frees immediately.
                    if !last_use.contains_key(&result) {
                        self.free_temps.entry(ty).or_default().push_back(final_id);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::ssa::SsaBuilder;
    use crate::il::validation::verify_no_phis;
    use crate::il::{
        FunctionBuilder, FunctionId, FunctionSignature, IlTypeId, Number, NumberKind,
    };
    use crate::il::{BlockId, OpCode};

    fn i32_ty() -> IlTypeId {
        IlTypeId::of(NumberKind::Int32)
    }

    #[test]
    fn test_phis_erased_and_versions_merged() {
        let mut b = FunctionBuilder::new(FunctionId(0), "f", FunctionSignature::default());
        let entry = b.create_block();
        let then_b = b.create_block();
        let else_b = b.create_block();
        let join = b.create_block();

        let v = b.declare_var(i32_ty());
        let cond = b.make_temp(IlTypeId::of(NumberKind::Bool));

        b.set_block(entry);
        b.binary(
            OpCode::Equal,
            cond,
            Operand::Imm(Number::Int32(1)),
            Operand::Imm(Number::Int32(1)),
        );
        b.branch(OpCode::JumpNotZero, cond, then_b, else_b);

        b.set_block(then_b);
        b.mov_imm(v, Number::Int32(1));
        b.jump(join);

        b.set_block(else_b);
        b.mov_imm(v, Number::Int32(2));
        b.jump(join);

        b.set_block(join);
        b.ret(Operand::Var(v));

        let mut ctx = b.finish().context;
        SsaBuilder::new(&mut ctx).build();
        assert_eq!(ctx.count_opcode(OpCode::Phi), 1);

        SsaReducer::new(&mut ctx).reduce();
        assert_eq!(verify_no_phis(&ctx), Vec::<String>::new());
        assert!(ctx.metadata.phi_nodes.is_empty());

        // Both arm definitions now write the same merged register, which the
        // return reads.
        let then_def = ctx.cfg.block(then_b).instructions[0].result.unwrap();
        let else_def = ctx.cfg.block(else_b).instructions[0].result.unwrap();
        let ret = ctx.cfg.block(join).instructions.last().unwrap();
        assert_eq!(then_def, else_def);
        assert_eq!(ret.lhs.as_var(), Some(then_def));
    }

    #[test]
    fn test_temp_pool_reuse() {
        let mut b = FunctionBuilder::new(FunctionId(0), "f", FunctionSignature::default());
        b.create_block();
        // t0 dies at its single use; t1 should reuse its id.
        let t0 = b.make_temp(i32_ty());
        let t1 = b.make_temp(i32_ty());
        let v = b.declare_var(i32_ty());
        b.binary(
            OpCode::Add,
            t0,
            Operand::Imm(Number::Int32(1)),
            Operand::Imm(Number::Int32(2)),
        );
        b.mov(v, Operand::Var(t0));
        b.binary(
            OpCode::Multiply,
            t1,
            Operand::Var(v),
            Operand::Var(v),
        );
        b.ret(Operand::Var(t1));

        let mut ctx = b.finish().context;
        SsaBuilder::new(&mut ctx).build();
        SsaReducer::new(&mut ctx).reduce();

        let entry = BlockId(0);
        let instrs = &ctx.cfg.block(entry).instructions;
        let first = instrs[0].result.unwrap();
        let third = instrs[2].result.unwrap();
        assert_eq!(first, t0);
        // t1's definition drew t0 from the pool.
        assert_eq!(third, t0);
        assert_eq!(instrs[3].lhs.as_var(), Some(t0));
    }

    #[test]
    fn test_double_use_frees_temp_once() {
        let mut b = FunctionBuilder::new(FunctionId(0), "f", FunctionSignature::default());
        b.create_block();
        // t0 dies at `add t0, t0`; afterwards t1 and t2 are live at the same
        // time and must not share a register.
        let t0 = b.make_temp(i32_ty());
        let t1 = b.make_temp(i32_ty());
        let t2 = b.make_temp(i32_ty());
        let t3 = b.make_temp(i32_ty());
        let v = b.declare_var(i32_ty());
        b.binary(
            OpCode::Add,
            t0,
            Operand::Imm(Number::Int32(1)),
            Operand::Imm(Number::Int32(2)),
        );
        b.binary(OpCode::Add, t1, Operand::Var(t0), Operand::Var(t0));
        b.binary(
            OpCode::Multiply,
            t2,
            Operand::Imm(Number::Int32(4)),
            Operand::Imm(Number::Int32(5)),
        );
        b.binary(OpCode::Add, t3, Operand::Var(t1), Operand::Var(t2));
        b.mov(v, Operand::Var(t3));
        b.ret(Operand::Var(v));

        let mut ctx = b.finish().context;
        SsaBuilder::new(&mut ctx).build();
        SsaReducer::new(&mut ctx).reduce();

        let instrs = &ctx.cfg.block(BlockId(0)).instructions;
        let def_t1 = instrs[1].result.unwrap();
        let def_t2 = instrs[2].result.unwrap();
        // t1 reused t0's freed id; t2 must get a different register because
        // t1 is still live.
        assert_eq!(def_t1, t0);
        assert_ne!(def_t2, def_t1);
        assert_eq!(instrs[3].lhs.as_var(), Some(def_t1));
        assert_eq!(instrs[3].rhs.as_var(), Some(def_t2));
    }

    #[test]
    fn test_build_then_reduce_is_identity_without_merges() {
        let mut b = FunctionBuilder::new(FunctionId(0), "f", FunctionSignature::default());
        b.create_block();
        let v = b.declare_var(i32_ty());
        b.mov_imm(v, Number::Int32(5));
        b.binary(
            OpCode::Add,
            v,
            Operand::Var(v),
            Operand::Imm(Number::Int32(3)),
        );
        b.ret(Operand::Var(v));
        let mut ctx = b.finish().context;
        let before = ctx.clone();

        SsaBuilder::new(&mut ctx).build();
        SsaReducer::new(&mut ctx).reduce();

        // Straight-line code with no φs: opcodes and operand shapes are
        // unchanged, only version suffixes differ (and bases match).
        let old = &before.cfg.block(before.cfg.entry).instructions;
        let new = &ctx.cfg.block(ctx.cfg.entry).instructions;
        assert_eq!(old.len(), new.len());
        for (a, b) in old.iter().zip(new.iter()) {
            assert_eq!(a.opcode, b.opcode);
            assert_eq!(
                a.result.map(|r| r.base()),
                b.result.map(|r| r.base())
            );
        }
    }
}
