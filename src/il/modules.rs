//! IL modules and function layouts
//!
//! An [`IlModule`] is the unit the optimizer consumes and produces: a vector
//! of [`FunctionLayout`]s, each pairing a calling signature with the
//! per-function [`IlContext`] (CFG + metadata). A layout whose context has no
//! blocks is a declaration and is skipped by every phase.

use super::cfg::ControlFlowGraph;
use super::metadata::IlMetadata;
use super::{FunctionId, IlTypeId, OpCode};
use serde::{Deserialize, Serialize};

/// Calling signature of a function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSignature {
    pub params: Vec<IlTypeId>,
    pub return_type: IlTypeId,
}

/// Per-function state: the CFG and its metadata arenas.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IlContext {
    pub cfg: ControlFlowGraph,
    pub metadata: IlMetadata,
}

impl IlContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declarations have no body and are skipped by the optimizer.
    pub fn is_empty(&self) -> bool {
        self.cfg.is_empty()
    }

    /// Total number of `Call` instructions in the body.
    pub fn count_calls(&self) -> usize {
        self.count_opcode(OpCode::Call)
    }

    pub fn count_opcode(&self, opcode: OpCode) -> usize {
        self.cfg
            .blocks()
            .flat_map(|b| b.instructions.iter())
            .filter(|i| i.opcode == opcode)
            .count()
    }
}

/// A function: signature plus body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionLayout {
    pub id: FunctionId,
    pub name: String,
    pub signature: FunctionSignature,
    pub context: IlContext,
}

impl FunctionLayout {
    pub fn new(id: FunctionId, name: impl Into<String>, signature: FunctionSignature) -> Self {
        Self {
            id,
            name: name.into(),
            signature,
            context: IlContext::new(),
        }
    }
}

/// A compilation unit: the functions, in id order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IlModule {
    pub functions: Vec<FunctionLayout>,
}

impl IlModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a layout; its id must equal its position.
    pub fn add_function(&mut self, layout: FunctionLayout) -> FunctionId {
        debug_assert_eq!(layout.id.index(), self.functions.len());
        let id = layout.id;
        self.functions.push(layout);
        id
    }

    pub fn function(&self, id: FunctionId) -> &FunctionLayout {
        &self.functions[id.index()]
    }

    pub fn function_mut(&mut self, id: FunctionId) -> &mut FunctionLayout {
        &mut self.functions[id.index()]
    }

    /// Total number of `Call` instructions across the module.
    pub fn count_calls(&self) -> usize {
        self.functions.iter().map(|f| f.context.count_calls()).sum()
    }
}
