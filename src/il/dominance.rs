//! Dominator tree and dominance frontiers
//!
//! The tree is computed with the classical iterative dataflow algorithm
//! (Cooper, Harvey, Kennedy): initialize `idom[entry] = entry`, then iterate
//! over the blocks in reverse postorder intersecting predecessor dominators
//! until a fixed point. Frontiers follow Cytron et al.: for each join block,
//! walk every predecessor up the idom chain, collecting the join into each
//! walked block's frontier.

use super::cfg::ControlFlowGraph;
use super::BlockId;
use fxhash::FxHashSet;

/// Dominator tree plus dominance frontiers for one CFG.
///
/// Indexed by block arena index; tombstoned and unreachable blocks have no
/// idom and empty children/frontier.
#[derive(Debug, Clone, Default)]
pub struct DomTree {
    /// Immediate dominator per block. The entry's idom is the entry itself.
    idom: Vec<Option<BlockId>>,
    children: Vec<Vec<BlockId>>,
    frontiers: Vec<FxHashSet<BlockId>>,
    rpo: Vec<BlockId>,
    entry: Option<BlockId>,
}

impl DomTree {
    /// Compute the tree and frontiers for a CFG. All traversal is iterative;
    /// block counts can exceed the default stack depth.
    pub fn compute(cfg: &ControlFlowGraph) -> Self {
        let arena_len = cfg
            .block_ids()
            .iter()
            .map(|b| b.index() + 1)
            .max()
            .unwrap_or(0);

        let mut tree = DomTree {
            idom: vec![None; arena_len],
            children: vec![Vec::new(); arena_len],
            frontiers: vec![FxHashSet::default(); arena_len],
            rpo: Vec::new(),
            entry: None,
        };

        if cfg.is_empty() {
            return tree;
        }

        let entry = cfg.entry;
        tree.entry = Some(entry);
        tree.rpo = cfg.reverse_postorder();

        let mut rpo_index = vec![usize::MAX; arena_len];
        for (i, &b) in tree.rpo.iter().enumerate() {
            rpo_index[b.index()] = i;
        }

        tree.idom[entry.index()] = Some(entry);

        let mut changed = true;
        while changed {
            changed = false;
            for &block in &tree.rpo {
                if block == entry {
                    continue;
                }

                let mut new_idom: Option<BlockId> = None;
                for &pred in &cfg.block(block).predecessors {
                    if pred.index() >= arena_len || tree.idom[pred.index()].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(current) => Self::intersect(current, pred, &tree.idom, &rpo_index),
                    });
                }

                if new_idom != tree.idom[block.index()] {
                    tree.idom[block.index()] = new_idom;
                    changed = true;
                }
            }
        }

        for &block in &tree.rpo {
            if block == entry {
                continue;
            }
            if let Some(dom) = tree.idom[block.index()] {
                tree.children[dom.index()].push(block);
            }
        }

        tree.compute_frontiers(cfg);
        tree
    }

    /// Walk two candidate dominators up the idom chain until they meet.
    fn intersect(
        mut b1: BlockId,
        mut b2: BlockId,
        idom: &[Option<BlockId>],
        rpo_index: &[usize],
    ) -> BlockId {
        while b1 != b2 {
            while rpo_index[b1.index()] > rpo_index[b2.index()] {
                b1 = idom[b1.index()].expect("processed block without idom");
            }
            while rpo_index[b2.index()] > rpo_index[b1.index()] {
                b2 = idom[b2.index()].expect("processed block without idom");
            }
        }
        b1
    }

    fn compute_frontiers(&mut self, cfg: &ControlFlowGraph) {
        for &block in &self.rpo {
            let preds = &cfg.block(block).predecessors;
            if preds.len() < 2 {
                continue;
            }
            let idom_b = match self.idom[block.index()] {
                Some(d) => d,
                None => continue,
            };
            for &pred in preds {
                // Unreachable predecessors carry no frontier.
                if pred.index() >= self.idom.len() || self.idom[pred.index()].is_none() {
                    continue;
                }
                let mut runner = pred;
                while runner != idom_b {
                    self.frontiers[runner.index()].insert(block);
                    match self.idom[runner.index()] {
                        Some(next) if next != runner => runner = next,
                        _ => break,
                    }
                }
            }
        }
    }

    /// The immediate dominator; the entry maps to itself, unreachable blocks
    /// to `None`.
    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        self.idom.get(block.index()).copied().flatten()
    }

    /// Children in the dominator tree.
    pub fn children(&self, block: BlockId) -> &[BlockId] {
        self.children
            .get(block.index())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// The dominance frontier of a block.
    pub fn frontier(&self, block: BlockId) -> impl Iterator<Item = BlockId> + '_ {
        self.frontiers
            .get(block.index())
            .into_iter()
            .flat_map(|s| s.iter().copied())
    }

    /// Blocks in reverse postorder, as computed.
    pub fn rpo(&self) -> &[BlockId] {
        &self.rpo
    }

    /// Whether `a` dominates `b` (reflexive).
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let entry = match self.entry {
            Some(e) => e,
            None => return false,
        };
        let mut current = b;
        loop {
            if current == a {
                return true;
            }
            if current == entry {
                return a == entry;
            }
            match self.idom(current) {
                Some(next) => current = next,
                None => return false,
            }
        }
    }
}
