//! Natural-loop detection.
//!
//! A back edge is an edge `t → h` where `h` dominates `t`; the loop with
//! header `h` is `h` plus every block that reaches a latch `t` without
//! passing through `h`. Loops sharing a header are merged. Nesting is
//! discovered by header inclusion.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::ir::{BlockId, FuncId, Module};

use super::dominance::DomTree;

#[derive(Debug)]
pub struct Loop {
    pub header: BlockId,
    block_set: FxHashSet<BlockId>,
    /// Header first, then discovery order.
    order: Vec<BlockId>,
    pub latches: Vec<BlockId>,
    pub sub_loops: Vec<Loop>,
}

impl Loop {
    #[must_use]
    pub fn contains(&self, block: BlockId) -> bool {
        self.block_set.contains(&block)
    }

    #[must_use]
    pub fn blocks(&self) -> &[BlockId] {
        &self.order
    }

    /// The unique latch, if there is exactly one.
    #[must_use]
    pub fn latch(&self) -> Option<BlockId> {
        match self.latches.as_slice() {
            [latch] => Some(*latch),
            _ => None,
        }
    }

    /// The unique loop-external predecessor of the header whose only
    /// successor is the header. `None` when it does not exist (it can be
    /// synthesized; see `transform`).
    #[must_use]
    pub fn preheader(&self, module: &Module) -> Option<BlockId> {
        let func = module.block(self.header).func;
        let preds = module.predecessors(func);
        let outside: Vec<BlockId> = preds
            .get(&self.header)
            .map_or(&[][..], Vec::as_slice)
            .iter()
            .copied()
            .filter(|p| !self.contains(*p))
            .collect();
        match outside.as_slice() {
            [pred] => {
                let succs = module.successors(*pred);
                (succs.len() == 1 && succs[0] == self.header).then_some(*pred)
            }
            _ => None,
        }
    }

    /// Blocks inside the loop with at least one successor outside it.
    #[must_use]
    pub fn exiting_blocks(&self, module: &Module) -> Vec<BlockId> {
        self.order
            .iter()
            .copied()
            .filter(|&b| module.successors(b).iter().any(|s| !self.contains(*s)))
            .collect()
    }

    /// Blocks outside the loop that are successors of a block inside it.
    #[must_use]
    pub fn exit_blocks(&self, module: &Module) -> Vec<BlockId> {
        let mut exits = Vec::new();
        for &block in &self.order {
            for succ in module.successors(block) {
                if !self.contains(succ) && !exits.contains(&succ) {
                    exits.push(succ);
                }
            }
        }
        exits
    }

    #[must_use]
    pub fn exiting_block(&self, module: &Module) -> Option<BlockId> {
        match self.exiting_blocks(module).as_slice() {
            [b] => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn exit_block(&self, module: &Module) -> Option<BlockId> {
        match self.exit_blocks(module).as_slice() {
            [b] => Some(*b),
            _ => None,
        }
    }
}

/// Top-level loops of `func`, innermost loops nested in `sub_loops`.
#[must_use]
pub fn loop_forest(module: &Module, func: FuncId, dom: &DomTree) -> Vec<Loop> {
    let preds = module.predecessors(func);

    // Latches grouped by header.
    let mut latches_by_header: FxHashMap<BlockId, Vec<BlockId>> = FxHashMap::default();
    for &block in dom.reverse_postorder() {
        for succ in module.successors(block) {
            if dom.dominates(succ, block) {
                latches_by_header.entry(succ).or_default().push(block);
            }
        }
    }

    let mut loops: Vec<Loop> = Vec::new();
    for (&header, latches) in &latches_by_header {
        let mut block_set = FxHashSet::default();
        let mut order = vec![header];
        block_set.insert(header);
        let mut worklist: Vec<BlockId> = latches.clone();
        while let Some(block) = worklist.pop() {
            if !block_set.insert(block) {
                continue;
            }
            order.push(block);
            for &pred in preds.get(&block).map_or(&[][..], Vec::as_slice) {
                if dom.is_reachable(pred) {
                    worklist.push(pred);
                }
            }
        }
        loops.push(Loop {
            header,
            block_set,
            order,
            latches: latches.clone(),
            sub_loops: Vec::new(),
        });
    }

    // Smallest loops first so each loop attaches to its direct parent.
    loops.sort_by_key(|l| l.order.len());
    let mut forest: Vec<Loop> = Vec::new();
    for lp in loops {
        let mut parent: Option<usize> = None;
        let mut best = usize::MAX;
        for (i, candidate) in forest.iter().enumerate() {
            if candidate.header != lp.header
                && candidate.contains(lp.header)
                && candidate.order.len() < best
            {
                parent = Some(i);
                best = candidate.order.len();
            }
        }
        match parent {
            Some(i) => attach(&mut forest[i], lp),
            None => forest.push(lp),
        }
    }
    // Deterministic order for iteration.
    forest.sort_by_key(|l| l.header);
    forest
}

/// Push `child` into the smallest loop of `parent`'s subtree containing
/// its header.
fn attach(parent: &mut Loop, child: Loop) {
    for sub in &mut parent.sub_loops {
        if sub.contains(child.header) {
            attach(sub, child);
            return;
        }
    }
    parent.sub_loops.push(child);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::dominance::dominator_tree;
    use crate::ir::{ICmpPred, InstKind, Linkage, ParamData, Value};

    /// entry → cond ⇄ body, cond → end: one loop, header cond, latch body.
    #[test]
    fn detects_a_simple_while_loop() {
        let mut module = Module::new("t");
        let i32_ty = module.types.i32();
        let fn_ty = module.types.func(i32_ty, vec![i32_ty]);
        let func = module.add_function(
            "f",
            fn_ty,
            Linkage::External,
            vec![ParamData {
                name: "n".into(),
                ty: i32_ty,
            }],
        );
        let entry = module.add_block(func, "entry");
        let cond = module.add_block(func, "while.cond");
        let body = module.add_block(func, "while.body");
        let end = module.add_block(func, "while.end");

        module.push_inst(entry, InstKind::Br { target: cond });
        let cmp = module.push_inst(
            cond,
            InstKind::ICmp {
                pred: ICmpPred::Slt,
                lhs: Value::ConstInt {
                    ty: i32_ty,
                    value: 0,
                },
                rhs: Value::Param(func, 0),
            },
        );
        module.push_inst(
            cond,
            InstKind::CondBr {
                cond: Value::Inst(cmp),
                then_dest: body,
                else_dest: end,
            },
        );
        module.push_inst(body, InstKind::Br { target: cond });
        module.push_inst(
            end,
            InstKind::Ret {
                value: Some(Value::ConstInt {
                    ty: i32_ty,
                    value: 0,
                }),
            },
        );

        let dom = dominator_tree(&module, func);
        let forest = loop_forest(&module, func, &dom);
        assert_eq!(forest.len(), 1);
        let lp = &forest[0];
        assert_eq!(lp.header, cond);
        assert_eq!(lp.latch(), Some(body));
        assert_eq!(lp.preheader(&module), Some(entry));
        assert_eq!(lp.exiting_block(&module), Some(cond));
        assert_eq!(lp.exit_block(&module), Some(end));
        assert!(lp.sub_loops.is_empty());
        assert!(lp.contains(cond) && lp.contains(body));
        assert!(!lp.contains(entry) && !lp.contains(end));
    }
}
