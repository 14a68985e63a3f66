//! Control-flow graph
//!
//! Blocks live in a vector arena and are addressed by [`BlockId`]; removed
//! blocks leave a tombstone so ids stay stable across structural edits.
//! Predecessor/successor lists are cached on each block and maintained by the
//! edge operations here; `u ∈ predecessors[v] ⇔ v ∈ successors[u]` at all
//! times.
//!
//! The graph also caches the dominator tree and dominance frontiers
//! ([`super::dominance::DomTree`]); any pass that rewrites edges or removes
//! blocks must call [`ControlFlowGraph::rebuild_dom_tree`] afterwards.

use super::dominance::DomTree;
use super::instructions::{Instruction, OpCode};
use super::BlockId;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Classification of a block by its terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BlockKind {
    /// Falls through or ends in an unconditional jump; at most one successor.
    #[default]
    Normal,
    /// Ends in a conditional jump; two successors.
    Conditional,
    /// Ends in a `Return`; no successors.
    Return,
    /// No longer reachable from the entry; marked by [`ControlFlowGraph::mark_unreachable`]
    /// and swept by [`ControlFlowGraph::remove_unreachable`].
    Unreachable,
}

/// A basic block: a straight-line instruction sequence with cached CFG edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicBlock {
    pub id: BlockId,
    pub kind: BlockKind,
    pub instructions: Vec<Instruction>,
    pub predecessors: SmallVec<[BlockId; 2]>,
    pub successors: SmallVec<[BlockId; 2]>,
}

impl BasicBlock {
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            kind: BlockKind::Normal,
            instructions: Vec::new(),
            predecessors: SmallVec::new(),
            successors: SmallVec::new(),
        }
    }

    /// Number of leading `Phi` instructions.
    pub fn phi_count(&self) -> usize {
        self.instructions
            .iter()
            .take_while(|i| i.opcode == OpCode::Phi)
            .count()
    }
}

/// Directed graph of basic blocks with a single entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlFlowGraph {
    blocks: Vec<Option<BasicBlock>>,
    /// Entry block; meaningful only when the graph is non-empty.
    pub entry: BlockId,
    #[serde(skip)]
    dom: DomTree,
}

impl ControlFlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new block. The first block created becomes the entry.
    pub fn create_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Some(BasicBlock::new(id)));
        if self.blocks.len() == 1 {
            self.entry = id;
        }
        id
    }

    /// A live block. Panics on a removed or out-of-range id; callers hold
    /// ids only for live blocks.
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        self.blocks[id.index()]
            .as_ref()
            .unwrap_or_else(|| panic!("block {} was removed", id))
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        self.blocks[id.index()]
            .as_mut()
            .unwrap_or_else(|| panic!("block {} was removed", id))
    }

    pub fn get_block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.index()).and_then(|b| b.as_ref())
    }

    /// Live blocks in arena (source) order.
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.iter().filter_map(|b| b.as_ref())
    }

    /// Ids of live blocks in arena order.
    pub fn block_ids(&self) -> Vec<BlockId> {
        self.blocks().map(|b| b.id).collect()
    }

    pub fn block_count(&self) -> usize {
        self.blocks().count()
    }

    pub fn is_empty(&self) -> bool {
        self.block_count() == 0
    }

    /// Add the edge `u → v`, keeping both cached lists in sync.
    pub fn link(&mut self, u: BlockId, v: BlockId) {
        let succs = &mut self.block_mut(u).successors;
        if !succs.contains(&v) {
            succs.push(v);
        }
        let preds = &mut self.block_mut(v).predecessors;
        if !preds.contains(&u) {
            preds.push(u);
        }
    }

    /// Remove the edge `u → v` from both cached lists.
    pub fn unlink(&mut self, u: BlockId, v: BlockId) {
        self.block_mut(u).successors.retain(|&mut s| s != v);
        self.block_mut(v).predecessors.retain(|&mut p| p != u);
    }

    /// Remove a block. Legal only once no predecessors remain; outgoing
    /// edges are unlinked here.
    pub fn remove_node(&mut self, v: BlockId) {
        assert!(
            self.block(v).predecessors.is_empty(),
            "remove_node({}) with live predecessors",
            v
        );
        let succs: SmallVec<[BlockId; 2]> = self.block(v).successors.clone();
        for s in succs {
            self.unlink(v, s);
        }
        self.blocks[v.index()] = None;
    }

    /// Fuse the linear pair `u → v`: legal only when `v` is `u`'s sole
    /// successor and `u` is `v`'s sole predecessor. `v`'s instructions are
    /// appended to `u` (dropping `u`'s trailing jump, if any) and `v` is
    /// removed. The caller must rebuild the dominator tree afterwards.
    pub fn merge_nodes(&mut self, u: BlockId, v: BlockId) {
        assert!(
            self.block(u).successors.as_slice() == [v]
                && self.block(v).predecessors.as_slice() == [u],
            "merge_nodes({}, {}) on a non-linear pair",
            u,
            v
        );

        let mut moved = std::mem::take(&mut self.block_mut(v).instructions);
        let v_kind = self.block(v).kind;
        let v_succs: SmallVec<[BlockId; 2]> = self.block(v).successors.clone();

        let u_block = self.block_mut(u);
        if u_block
            .instructions
            .last()
            .map(|i| i.opcode == OpCode::Jump)
            .unwrap_or(false)
        {
            u_block.instructions.pop();
        }
        u_block.instructions.append(&mut moved);
        u_block.kind = v_kind;
        u_block.successors.clear();

        for s in v_succs {
            self.unlink(v, s);
            self.link(u, s);
        }
        self.block_mut(v).predecessors.clear();
        self.blocks[v.index()] = None;
    }

    /// Mark live blocks that are no longer reachable from the entry as
    /// [`BlockKind::Unreachable`]. Returns their ids in arena order.
    pub fn mark_unreachable(&mut self) -> Vec<BlockId> {
        if self.is_empty() {
            return Vec::new();
        }

        let mut reachable = vec![false; self.blocks.len()];
        let mut stack = vec![self.entry];
        reachable[self.entry.index()] = true;
        while let Some(block) = stack.pop() {
            for &succ in &self.block(block).successors {
                if !reachable[succ.index()] {
                    reachable[succ.index()] = true;
                    stack.push(succ);
                }
            }
        }

        let stranded: Vec<BlockId> = self
            .blocks()
            .map(|b| b.id)
            .filter(|b| !reachable[b.index()])
            .collect();
        for &block in &stranded {
            self.block_mut(block).kind = BlockKind::Unreachable;
        }
        stranded
    }

    /// Remove every block marked by [`mark_unreachable`], cascading through
    /// stranded chains. All edges of a stranded block are unlinked before
    /// any removal, so [`remove_node`] never observes a live predecessor.
    /// Returns the number of blocks removed.
    ///
    /// [`mark_unreachable`]: ControlFlowGraph::mark_unreachable
    /// [`remove_node`]: ControlFlowGraph::remove_node
    pub fn remove_unreachable(&mut self) -> usize {
        let stranded = self.mark_unreachable();
        for &block in &stranded {
            let preds: SmallVec<[BlockId; 2]> = self.block(block).predecessors.clone();
            for pred in preds {
                self.unlink(pred, block);
            }
            let succs: SmallVec<[BlockId; 2]> = self.block(block).successors.clone();
            for succ in succs {
                self.unlink(block, succ);
            }
        }
        for &block in &stranded {
            self.remove_node(block);
        }
        stranded.len()
    }

    /// Reverse postorder over live blocks reachable from the entry.
    /// Iterative: CFG depth can exceed the default stack.
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let mut postorder = Vec::with_capacity(self.block_count());
        if self.is_empty() {
            return postorder;
        }

        let mut visited = vec![false; self.blocks.len()];
        // (block, next successor index)
        let mut stack: Vec<(BlockId, usize)> = Vec::new();
        visited[self.entry.index()] = true;
        stack.push((self.entry, 0));

        while let Some(&(block, succ_idx)) = stack.last() {
            let succs = &self.block(block).successors;
            if succ_idx < succs.len() {
                let next = succs[succ_idx];
                stack.last_mut().unwrap().1 += 1;
                if !visited[next.index()] {
                    visited[next.index()] = true;
                    stack.push((next, 0));
                }
            } else {
                postorder.push(block);
                stack.pop();
            }
        }

        postorder.reverse();
        postorder
    }

    /// Recompute the dominator tree and dominance frontiers. Mandatory after
    /// any edge rewrite or block removal.
    pub fn rebuild_dom_tree(&mut self) {
        self.dom = DomTree::compute(self);
    }

    pub fn dom(&self) -> &DomTree {
        &self.dom
    }

    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        self.dom.idom(block)
    }

    pub fn dom_children(&self, block: BlockId) -> &[BlockId] {
        self.dom.children(block)
    }

    pub fn dom_frontier(&self, block: BlockId) -> impl Iterator<Item = BlockId> + '_ {
        self.dom.frontier(block)
    }

    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        self.dom.dominates(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_symmetry() {
        let mut cfg = ControlFlowGraph::new();
        let b0 = cfg.create_block();
        let b1 = cfg.create_block();
        let b2 = cfg.create_block();

        cfg.link(b0, b1);
        cfg.link(b0, b2);
        cfg.link(b1, b2);

        assert_eq!(cfg.entry, b0);
        assert!(cfg.block(b1).predecessors.contains(&b0));
        assert!(cfg.block(b0).successors.contains(&b1));
        assert_eq!(cfg.block(b2).predecessors.len(), 2);

        cfg.unlink(b0, b2);
        assert!(!cfg.block(b0).successors.contains(&b2));
        assert_eq!(cfg.block(b2).predecessors.as_slice(), [b1]);
    }

    #[test]
    fn test_remove_node_unlinks_successors() {
        let mut cfg = ControlFlowGraph::new();
        let b0 = cfg.create_block();
        let b1 = cfg.create_block();
        let b2 = cfg.create_block();
        cfg.link(b0, b2);
        cfg.link(b1, b2);

        // b1 has no predecessors; removing it must drop its edge into b2.
        cfg.remove_node(b1);
        assert_eq!(cfg.block(b2).predecessors.as_slice(), [b0]);
        assert_eq!(cfg.block_count(), 2);
        assert!(cfg.get_block(b1).is_none());
    }

    #[test]
    #[should_panic(expected = "live predecessors")]
    fn test_remove_node_with_predecessors_panics() {
        let mut cfg = ControlFlowGraph::new();
        let b0 = cfg.create_block();
        let b1 = cfg.create_block();
        cfg.link(b0, b1);
        cfg.remove_node(b1);
    }

    #[test]
    fn test_merge_nodes() {
        use crate::il::{IlTypeId, Operand};

        let mut cfg = ControlFlowGraph::new();
        let b0 = cfg.create_block();
        let b1 = cfg.create_block();
        let b2 = cfg.create_block();
        cfg.link(b0, b1);
        cfg.link(b1, b2);

        cfg.block_mut(b0).instructions.push(Instruction::new(
            OpCode::Jump,
            IlTypeId::VOID,
            Operand::Block(b1),
            Operand::None,
            None,
        ));
        cfg.block_mut(b1).instructions.push(Instruction::new(
            OpCode::Return,
            IlTypeId::VOID,
            Operand::None,
            Operand::None,
            None,
        ));
        cfg.block_mut(b1).kind = BlockKind::Return;

        cfg.merge_nodes(b0, b1);

        // The trailing jump is gone, b1's body and kind moved into b0.
        assert_eq!(cfg.block(b0).instructions.len(), 1);
        assert_eq!(cfg.block(b0).instructions[0].opcode, OpCode::Return);
        assert_eq!(cfg.block(b0).kind, BlockKind::Return);
        assert_eq!(cfg.block(b0).successors.as_slice(), [b2]);
        assert_eq!(cfg.block(b2).predecessors.as_slice(), [b0]);
        assert!(cfg.get_block(b1).is_none());
    }

    #[test]
    fn test_mark_and_remove_unreachable() {
        let mut cfg = ControlFlowGraph::new();
        let entry = cfg.create_block();
        let live = cfg.create_block();
        let dead = cfg.create_block();
        let dead_tail = cfg.create_block();
        cfg.link(entry, live);
        // A stranded chain that still points back into the live graph.
        cfg.link(dead, dead_tail);
        cfg.link(dead_tail, live);

        let marked = cfg.mark_unreachable();
        assert_eq!(marked, vec![dead, dead_tail]);
        assert_eq!(cfg.block(dead).kind, BlockKind::Unreachable);
        assert_eq!(cfg.block(dead_tail).kind, BlockKind::Unreachable);
        assert_eq!(cfg.block(entry).kind, BlockKind::Normal);

        let removed = cfg.remove_unreachable();
        assert_eq!(removed, 2);
        assert!(cfg.get_block(dead).is_none());
        assert!(cfg.get_block(dead_tail).is_none());
        assert_eq!(cfg.block(live).predecessors.as_slice(), [entry]);
    }

    #[test]
    fn test_reverse_postorder_diamond() {
        let mut cfg = ControlFlowGraph::new();
        let b0 = cfg.create_block();
        let b1 = cfg.create_block();
        let b2 = cfg.create_block();
        let b3 = cfg.create_block();
        cfg.link(b0, b1);
        cfg.link(b0, b2);
        cfg.link(b1, b3);
        cfg.link(b2, b3);

        let rpo = cfg.reverse_postorder();
        assert_eq!(rpo.len(), 4);
        assert_eq!(rpo[0], b0);
        assert_eq!(rpo[3], b3);
    }
}
