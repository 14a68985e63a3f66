//! Per-function IL metadata
//!
//! [`IlMetadata`] owns everything about a function that is not the
//! instruction stream itself: the variable and temp descriptor arenas
//! (indexed by the base id of an [`IlVarId`]), the φ-node pool referenced by
//! `Phi` instructions, and the outgoing call records the call-graph build
//! consumes.

use super::{BlockId, FunctionId, IlTypeId, IlVarId, PhiId};
use serde::{Deserialize, Serialize};

/// Descriptor of one variable (user or temp).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarDescriptor {
    pub type_id: IlTypeId,
}

/// One φ node: the merged result and the incoming versions, one per
/// predecessor edge of the φ's block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhiNode {
    pub result: IlVarId,
    pub incoming: Vec<(IlVarId, BlockId)>,
}

/// An outgoing call edge: the callee plus the blocks holding call sites at
/// record time. Instruction positions shift as passes splice blocks, so the
/// inliner re-locates the actual `Call` instructions when it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    pub callee: FunctionId,
    pub sites: Vec<BlockId>,
}

/// Arena of variable descriptors, φ nodes, and call records for one function.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IlMetadata {
    variables: Vec<VarDescriptor>,
    temps: Vec<VarDescriptor>,
    pub phi_nodes: Vec<PhiNode>,
    pub calls: Vec<CallRecord>,
}

impl IlMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new user variable and return its id (version 0).
    pub fn register_var(&mut self, type_id: IlTypeId) -> IlVarId {
        let index = self.variables.len() as u32;
        self.variables.push(VarDescriptor { type_id });
        IlVarId::new(index)
    }

    /// Register a new temp variable and return its id.
    pub fn register_temp(&mut self, type_id: IlTypeId) -> IlVarId {
        let index = self.temps.len() as u32;
        self.temps.push(VarDescriptor { type_id });
        IlVarId::temp(index)
    }

    /// The descriptor of a variable, routed by the temp flag. Panics when the
    /// base id does not refer to a registered descriptor (IL invariant 1).
    pub fn var(&self, id: IlVarId) -> &VarDescriptor {
        if id.is_temp() {
            &self.temps[id.index()]
        } else {
            &self.variables[id.index()]
        }
    }

    pub fn get_var(&self, id: IlVarId) -> Option<&VarDescriptor> {
        if id.is_temp() {
            self.temps.get(id.index())
        } else {
            self.variables.get(id.index())
        }
    }

    /// The type of a variable.
    pub fn var_type(&self, id: IlVarId) -> IlTypeId {
        self.var(id).type_id
    }

    /// Clone a descriptor from another function's metadata into this one,
    /// preserving temp-ness. Used by the inliner.
    pub fn clone_var_from(&mut self, other: &IlMetadata, id: IlVarId) -> IlVarId {
        let type_id = other.var(id).type_id;
        if id.is_temp() {
            self.register_temp(type_id)
        } else {
            self.register_var(type_id)
        }
    }

    pub fn var_count(&self) -> usize {
        self.variables.len()
    }

    pub fn temp_count(&self) -> usize {
        self.temps.len()
    }

    /// Base ids of all registered user variables.
    pub fn var_ids(&self) -> impl Iterator<Item = IlVarId> + '_ {
        (0..self.variables.len()).map(|i| IlVarId::new(i as u32))
    }

    /// Allocate a φ node with no incoming edges yet.
    pub fn add_phi(&mut self, result: IlVarId) -> PhiId {
        let id = PhiId(self.phi_nodes.len() as u32);
        self.phi_nodes.push(PhiNode {
            result,
            incoming: Vec::new(),
        });
        id
    }

    pub fn phi(&self, id: PhiId) -> &PhiNode {
        &self.phi_nodes[id.index()]
    }

    pub fn phi_mut(&mut self, id: PhiId) -> &mut PhiNode {
        &mut self.phi_nodes[id.index()]
    }

    /// Record an outgoing call site, merging into an existing record for the
    /// same callee.
    pub fn record_call(&mut self, callee: FunctionId, block: BlockId) {
        if let Some(record) = self.calls.iter_mut().find(|r| r.callee == callee) {
            record.sites.push(block);
        } else {
            self.calls.push(CallRecord {
                callee,
                sites: vec![block],
            });
        }
    }

    /// Drop the call record for a callee (all of its sites were inlined).
    pub fn remove_call_record(&mut self, callee: FunctionId) {
        self.calls.retain(|r| r.callee != callee);
    }
}
