//! Call graph: for each function, the set of functions it calls.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::ir::{FuncId, InstKind, Module};

pub type CallGraph = FxHashMap<FuncId, FxHashSet<FuncId>>;

#[must_use]
pub fn call_graph(module: &Module) -> CallGraph {
    let mut graph: CallGraph = FxHashMap::default();
    for func in module.func_ids() {
        if module.func(func).is_declaration() {
            continue;
        }
        let callees = graph.entry(func).or_default();
        for &block in &module.func(func).blocks {
            for &inst in &module.block(block).insts {
                if let InstKind::Call { callee, .. } = module.kind(inst) {
                    callees.insert(*callee);
                }
            }
        }
    }
    graph
}

/// Whether `func` can reach itself through the call graph (it sits on a
/// direct or indirect recursion cycle).
#[must_use]
pub fn on_cycle(graph: &CallGraph, func: FuncId) -> bool {
    let mut visited = FxHashSet::default();
    let mut worklist = vec![func];
    while let Some(cur) = worklist.pop() {
        if let Some(callees) = graph.get(&cur) {
            for &callee in callees {
                if callee == func {
                    return true;
                }
                if visited.insert(callee) {
                    worklist.push(callee);
                }
            }
        }
    }
    false
}
