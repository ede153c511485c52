//! Conservative control-flow graph.
//!
//! A BFS from the entry that collapses conditional branches whose outcome
//! is already decidable: a condition that is a constant `i1`, or an `icmp`
//! of two integer constants, contributes only the taken edge. Control-flow
//! simplification uses this to detect one-sided branches after constant
//! propagation.

use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;

use crate::ir::{BlockId, FuncId, ICmpPred, InstKind, Module, Value};

pub type ConservativeCfg = FxHashMap<BlockId, FxHashSet<BlockId>>;

/// Evaluate an `icmp` predicate over two signed constants.
#[must_use]
pub fn eval_icmp(pred: ICmpPred, lhs: i64, rhs: i64) -> bool {
    match pred {
        ICmpPred::Eq => lhs == rhs,
        ICmpPred::Ne => lhs != rhs,
        ICmpPred::Slt => lhs < rhs,
        ICmpPred::Sle => lhs <= rhs,
        ICmpPred::Sgt => lhs > rhs,
        ICmpPred::Sge => lhs >= rhs,
    }
}

/// The branch taken by a conditional whose condition is decidable, if any.
fn decided_branch(module: &Module, cond: Value) -> Option<bool> {
    match cond {
        Value::ConstInt { value, .. } => Some(value != 0),
        Value::Inst(id) => match module.kind(id) {
            InstKind::ICmp { pred, lhs, rhs } => {
                let lhs = lhs.as_const_int()?;
                let rhs = rhs.as_const_int()?;
                Some(eval_icmp(*pred, lhs, rhs))
            }
            _ => None,
        },
        _ => None,
    }
}

/// Successor edges of every block reachable from the entry, with decidable
/// conditional branches collapsed to the taken edge.
#[must_use]
pub fn conservative_cfg(module: &Module, func: FuncId) -> ConservativeCfg {
    let mut cfg: ConservativeCfg = FxHashMap::default();
    let Some(entry) = module.func(func).entry() else {
        return cfg;
    };

    let mut visited = FxHashSet::default();
    let mut worklist = VecDeque::new();
    worklist.push_back(entry);
    while let Some(block) = worklist.pop_front() {
        if !visited.insert(block) {
            continue;
        }
        let edges = cfg.entry(block).or_default();
        let Some(term) = module.terminator(block) else {
            continue;
        };
        let mut targets: Vec<BlockId> = Vec::new();
        match module.kind(term) {
            InstKind::Br { target } => targets.push(*target),
            InstKind::CondBr {
                cond,
                then_dest,
                else_dest,
            } => match decided_branch(module, *cond) {
                Some(true) => targets.push(*then_dest),
                Some(false) => targets.push(*else_dest),
                None => {
                    targets.push(*then_dest);
                    if else_dest != then_dest {
                        targets.push(*else_dest);
                    }
                }
            },
            _ => {}
        }
        for target in targets {
            edges.insert(target);
            if !visited.contains(&target) {
                worklist.push_back(target);
            }
        }
    }
    cfg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Linkage;

    #[test]
    fn constant_condition_collapses_to_one_edge() {
        let mut module = Module::new("t");
        let i32_ty = module.types.i32();
        let void = module.types.void();
        let fn_ty = module.types.func(void, vec![]);
        let func = module.add_function("f", fn_ty, Linkage::External, vec![]);
        let entry = module.add_block(func, "entry");
        let then_bb = module.add_block(func, "then");
        let else_bb = module.add_block(func, "else");

        let cmp = module.push_inst(
            entry,
            InstKind::ICmp {
                pred: ICmpPred::Slt,
                lhs: Value::ConstInt {
                    ty: i32_ty,
                    value: 1,
                },
                rhs: Value::ConstInt {
                    ty: i32_ty,
                    value: 2,
                },
            },
        );
        module.push_inst(
            entry,
            InstKind::CondBr {
                cond: Value::Inst(cmp),
                then_dest: then_bb,
                else_dest: else_bb,
            },
        );
        module.push_inst(then_bb, InstKind::Ret { value: None });
        module.push_inst(else_bb, InstKind::Ret { value: None });

        let cfg = conservative_cfg(&module, func);
        assert_eq!(cfg[&entry].len(), 1);
        assert!(cfg[&entry].contains(&then_bb));
        // The untaken arm is never reached by the BFS.
        assert!(!cfg.contains_key(&else_bb));
        assert!(cfg.contains_key(&then_bb));
    }
}
