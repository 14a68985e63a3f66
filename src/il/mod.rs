//! Intermediate Language (IL) for the Lustre compiler backend
//!
//! This module defines the mid-level, target-independent representation that
//! the frontend lowers into and the optimizer transforms. The IL is designed
//! to be:
//! - Simple and explicit (two operand slots, optional result)
//! - Strongly typed with explicit numeric kinds
//! - Cheap to rewrite in place (vector arenas, index-based edges)
//! - Convertible to and from SSA form

pub mod builder;
pub mod call_graph;
pub mod cfg;
pub mod dominance;
pub mod dump;
pub mod graph;
pub mod instructions;
pub mod metadata;
pub mod modules;
pub mod number;
pub mod ssa;
pub mod validation;

pub use builder::FunctionBuilder;
pub use call_graph::{FcgNode, FuncCallGraph};
pub use cfg::{BasicBlock, BlockKind, ControlFlowGraph};
pub use dominance::DomTree;
pub use dump::{dump_cfg, dump_function, dump_module};
pub use graph::{compute_sccs, DagGraph, DependencyNode};
pub use instructions::{Instruction, OpCode, Operand};
pub use metadata::{CallRecord, IlMetadata, PhiNode, VarDescriptor};
pub use modules::{FunctionLayout, FunctionSignature, IlContext, IlModule};
pub use number::{Number, NumberKind};
pub use ssa::{SsaBuilder, SsaReducer};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Low 32 bits of an [`IlVarId`]: the base variable id including the temp
/// flag, with the SSA version stripped.
pub const VERSION_STRIP_MASK: u64 = 0xFFFF_FFFF;

/// Flag bit distinguishing compiler-generated temp variables from user
/// variables. Temps are single-assignment and exempt from φ construction.
pub const VARIABLE_TEMP_FLAG: u64 = 1 << 31;

const VERSION_SHIFT: u32 = 32;

/// Identifier of an IL variable.
///
/// Packed `u64`: the low 32 bits are the base id (bit 31 is the temp flag,
/// the rest index the descriptor arena in [`IlMetadata`]); the high 32 bits
/// carry the SSA version. Version 0 means "unversioned", the state of all
/// variables before SSA construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IlVarId(u64);

impl IlVarId {
    /// A user variable with the given descriptor index, version 0.
    pub fn new(index: u32) -> Self {
        debug_assert_eq!(index as u64 & VARIABLE_TEMP_FLAG, 0);
        Self(index as u64)
    }

    /// A temp variable with the given descriptor index, version 0.
    pub fn temp(index: u32) -> Self {
        debug_assert_eq!(index as u64 & VARIABLE_TEMP_FLAG, 0);
        Self(index as u64 | VARIABLE_TEMP_FLAG)
    }

    /// The base id: same variable, version stripped to 0.
    pub fn base(self) -> Self {
        Self(self.0 & VERSION_STRIP_MASK)
    }

    /// Index into the owning descriptor arena (temp flag removed).
    pub fn index(self) -> usize {
        (self.0 & VERSION_STRIP_MASK & !VARIABLE_TEMP_FLAG) as usize
    }

    /// The SSA version (0 before SSA construction).
    pub fn version(self) -> u32 {
        (self.0 >> VERSION_SHIFT) as u32
    }

    /// The same base variable with a different version.
    pub fn with_version(self, version: u32) -> Self {
        Self((self.0 & VERSION_STRIP_MASK) | ((version as u64) << VERSION_SHIFT))
    }

    pub fn is_temp(self) -> bool {
        self.0 & VARIABLE_TEMP_FLAG != 0
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for IlVarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if self.is_temp() { "t" } else { "v" };
        if self.version() == 0 {
            write!(f, "{}{}", prefix, self.index())
        } else {
            write!(f, "{}{}.{}", prefix, self.index(), self.version())
        }
    }
}

/// Identifier of a basic block inside one function's CFG.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// Identifier of a function layout inside an [`IlModule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionId(pub u32);

impl FunctionId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn{}", self.0)
    }
}

/// Identifier of a φ-node descriptor in the per-function φ pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhiId(pub u32);

impl PhiId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PhiId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "phi{}", self.0)
    }
}

/// Opaque type id carried by variables and instructions.
///
/// Id 0 is "unknown/void"; ids `1..=12` are the scalar numeric kinds, which
/// is all the optimizer itself ever needs to look through. Aggregate types
/// used by the embedding occupy higher ids and are treated opaquely.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct IlTypeId(pub u32);

impl IlTypeId {
    pub const VOID: IlTypeId = IlTypeId(0);

    /// The type id of a scalar numeric kind.
    pub fn of(kind: NumberKind) -> Self {
        Self(kind as u32 + 1)
    }

    /// The numeric kind of this type, if it is a scalar.
    pub fn as_kind(self) -> Option<NumberKind> {
        NumberKind::from_index(self.0.checked_sub(1)? as usize)
    }
}

impl fmt::Display for IlTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_kind() {
            Some(kind) => write!(f, "{}", kind),
            None if *self == Self::VOID => write!(f, "void"),
            None => write!(f, "ty{}", self.0),
        }
    }
}
