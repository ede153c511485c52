//! Dominator tree and dominance frontiers.
//!
//! Iterative Cooper-Harvey-Kennedy over the reverse postorder of the
//! reachable blocks. Unreachable blocks are outside the tree:
//! `dominates` answers `false` for them and `idom` returns `None`.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::ir::{BlockId, FuncId, Module};

pub struct DomTree {
    entry: BlockId,
    rpo: Vec<BlockId>,
    rpo_index: FxHashMap<BlockId, usize>,
    idom: FxHashMap<BlockId, BlockId>,
    children: FxHashMap<BlockId, Vec<BlockId>>,
}

/// Build the dominator tree of `func`.
///
/// # Panics
///
/// Panics if `func` is a declaration.
#[must_use]
pub fn dominator_tree(module: &Module, func: FuncId) -> DomTree {
    let entry = module.func(func).entry().expect("function has a body");

    // Postorder DFS from the entry, then reverse.
    let mut postorder = Vec::new();
    let mut visited = FxHashSet::default();
    let mut stack = vec![(entry, 0_usize)];
    visited.insert(entry);
    while let Some(&(block, next)) = stack.last() {
        let succs = module.successors(block);
        if next < succs.len() {
            if let Some(frame) = stack.last_mut() {
                frame.1 += 1;
            }
            let succ = succs[next];
            if visited.insert(succ) {
                stack.push((succ, 0));
            }
        } else {
            postorder.push(block);
            stack.pop();
        }
    }
    let rpo: Vec<BlockId> = postorder.into_iter().rev().collect();
    let rpo_index: FxHashMap<BlockId, usize> =
        rpo.iter().enumerate().map(|(i, &b)| (b, i)).collect();

    let preds = module.predecessors(func);
    let mut idom: FxHashMap<BlockId, BlockId> = FxHashMap::default();
    idom.insert(entry, entry);

    let intersect = |idom: &FxHashMap<BlockId, BlockId>, mut a: BlockId, mut b: BlockId| {
        while a != b {
            while rpo_index[&a] > rpo_index[&b] {
                a = idom[&a];
            }
            while rpo_index[&b] > rpo_index[&a] {
                b = idom[&b];
            }
        }
        a
    };

    let mut changed = true;
    while changed {
        changed = false;
        for &block in rpo.iter().skip(1) {
            let mut new_idom = None;
            for &pred in preds.get(&block).map_or(&[][..], Vec::as_slice) {
                if !idom.contains_key(&pred) {
                    continue;
                }
                new_idom = Some(match new_idom {
                    None => pred,
                    Some(cur) => intersect(&idom, pred, cur),
                });
            }
            if let Some(new_idom) = new_idom
                && idom.get(&block) != Some(&new_idom)
            {
                idom.insert(block, new_idom);
                changed = true;
            }
        }
    }

    let mut children: FxHashMap<BlockId, Vec<BlockId>> = FxHashMap::default();
    for &block in &rpo {
        if block != entry {
            children.entry(idom[&block]).or_default().push(block);
        }
    }

    DomTree {
        entry,
        rpo,
        rpo_index,
        idom,
        children,
    }
}

impl DomTree {
    #[must_use]
    pub fn entry(&self) -> BlockId {
        self.entry
    }

    #[must_use]
    pub fn is_reachable(&self, block: BlockId) -> bool {
        self.rpo_index.contains_key(&block)
    }

    /// Reachable blocks in reverse postorder.
    #[must_use]
    pub fn reverse_postorder(&self) -> &[BlockId] {
        &self.rpo
    }

    /// Immediate dominator; `None` for the entry and unreachable blocks.
    #[must_use]
    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        if block == self.entry {
            return None;
        }
        self.idom.get(&block).copied()
    }

    /// Whether `a` dominates `b` (reflexively).
    #[must_use]
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if !self.is_reachable(a) || !self.is_reachable(b) {
            return false;
        }
        let mut cur = b;
        loop {
            if cur == a {
                return true;
            }
            if cur == self.entry {
                return false;
            }
            cur = self.idom[&cur];
        }
    }

    #[must_use]
    pub fn children(&self, block: BlockId) -> &[BlockId] {
        self.children.get(&block).map_or(&[], Vec::as_slice)
    }

    /// Dominator-tree preorder starting at the entry.
    #[must_use]
    pub fn preorder(&self) -> Vec<BlockId> {
        let mut order = Vec::with_capacity(self.rpo.len());
        let mut stack = vec![self.entry];
        while let Some(block) = stack.pop() {
            order.push(block);
            for &child in self.children(block) {
                stack.push(child);
            }
        }
        order
    }
}

/// Dominance frontiers of every reachable block.
#[must_use]
pub fn dominance_frontiers(
    module: &Module,
    func: FuncId,
    dom: &DomTree,
) -> FxHashMap<BlockId, Vec<BlockId>> {
    let preds = module.predecessors(func);
    let mut frontiers: FxHashMap<BlockId, Vec<BlockId>> = FxHashMap::default();
    for &block in dom.reverse_postorder() {
        let block_preds: Vec<BlockId> = preds
            .get(&block)
            .map_or(&[][..], Vec::as_slice)
            .iter()
            .copied()
            .filter(|&p| dom.is_reachable(p))
            .collect();
        if block_preds.len() < 2 {
            continue;
        }
        let Some(idom) = dom.idom(block) else {
            continue;
        };
        for pred in block_preds {
            let mut runner = pred;
            while runner != idom {
                let frontier = frontiers.entry(runner).or_default();
                if !frontier.contains(&block) {
                    frontier.push(block);
                }
                let Some(next) = dom.idom(runner) else { break };
                runner = next;
            }
        }
    }
    frontiers
}
