//! Common subexpression elimination.
//!
//! Block-local by design, with one dominance-aware exception:
//!
//! 1. Store→load forwarding: a load from an address the block has already
//!    stored to yields the stored value; a repeated store of the same
//!    value to the same address is dropped.
//! 2. Available expressions: `(op, canonical lhs, canonical rhs)` maps to
//!    the first instruction computing it. A load operand canonicalizes to
//!    its address, so two loads of an unmodified address feed the same
//!    entry; any store (or call) invalidates the load-backed entries.
//! 3. Runs of `((x+c1)+c2)+c3` with constant right operands fold to one
//!    addition when longer than two.
//! 4. Runs of `((x+v)+v)+v` fold to `x + v*n` when longer than five.
//! 5. Structurally equivalent GEPs merge when the earlier one's block
//!    dominates the later one's.
//!
//! Loads orphaned by a rewrite are erased at the end of the pass.

use rustc_hash::FxHashMap;

use crate::analysis::dominator_tree;
use crate::error::Result;
use crate::ir::{BinOp, BlockId, InstId, InstKind, Module, Value};

use super::{AnalysisCache, ModulePass, PreservedAnalyses};

pub struct CommonSubexprElimination;

impl ModulePass for CommonSubexprElimination {
    fn name(&self) -> &'static str {
        "cse"
    }

    fn run(&mut self, module: &mut Module, _cache: &mut AnalysisCache) -> Result<PreservedAnalyses> {
        let mut removed = 0usize;
        let mut orphans: Vec<InstId> = Vec::new();
        for func in module.func_ids() {
            if module.func(func).is_declaration() {
                continue;
            }
            for block in module.func(func).blocks.clone() {
                removed += forward_stores(module, block);
                removed += available_expressions(module, block, &mut orphans);
                removed += fold_const_add_chains(module, block);
                removed += fold_repeated_add_chains(module, block);
            }
            removed += dedupe_geps(module, func);
        }
        for load in orphans {
            if !module.inst(load).dead && module.inst(load).uses.is_empty() {
                module.erase_inst(load);
                removed += 1;
            }
        }
        tracing::debug!(removed, "cse finished");
        Ok(if removed == 0 {
            PreservedAnalyses::All
        } else {
            PreservedAnalyses::None
        })
    }
}

/// Forward the last store per address to subsequent loads in the block and
/// drop duplicate stores. Calls may write memory, so they clear the map.
fn forward_stores(module: &mut Module, block: BlockId) -> usize {
    let mut removed = 0usize;
    let mut last_store: FxHashMap<Value, Value> = FxHashMap::default();
    for inst in module.block(block).insts.clone() {
        if module.inst(inst).dead {
            continue;
        }
        match module.kind(inst).clone() {
            InstKind::Store { value, ptr } => {
                if last_store.get(&ptr) == Some(&value) {
                    module.erase_inst(inst);
                    removed += 1;
                } else {
                    last_store.insert(ptr, value);
                }
            }
            InstKind::Load { ptr, .. } => {
                if let Some(&value) = last_store.get(&ptr) {
                    module.replace_all_uses_with(inst, value);
                    module.erase_inst(inst);
                    removed += 1;
                }
            }
            InstKind::Call { .. } => last_store.clear(),
            _ => {}
        }
    }
    removed
}

/// Canonical operand: a load stands for its address.
fn canonical(module: &Module, value: Value) -> (Value, bool) {
    if let Some(inst) = value.as_inst()
        && let InstKind::Load { ptr, .. } = module.kind(inst)
    {
        return (*ptr, true);
    }
    (value, false)
}

fn available_expressions(module: &mut Module, block: BlockId, orphans: &mut Vec<InstId>) -> usize {
    let mut removed = 0usize;
    let mut avail: FxHashMap<(BinOp, Value, Value), (InstId, bool)> = FxHashMap::default();
    for inst in module.block(block).insts.clone() {
        if module.inst(inst).dead {
            continue;
        }
        match module.kind(inst).clone() {
            InstKind::Store { .. } | InstKind::Call { .. } => {
                avail.retain(|_, (_, load_backed)| !*load_backed);
            }
            InstKind::Binary { op, lhs, rhs } => {
                let (key_l, lb_l) = canonical(module, lhs);
                let (key_r, lb_r) = canonical(module, rhs);
                let load_backed = lb_l || lb_r;
                match avail.get(&(op, key_l, key_r)) {
                    Some(&(existing, _)) => {
                        module.replace_all_uses_with(inst, Value::Inst(existing));
                        module.erase_inst(inst);
                        removed += 1;
                        for operand in [lhs, rhs] {
                            if let Some(load) = operand.as_inst()
                                && matches!(module.kind(load), InstKind::Load { .. })
                            {
                                orphans.push(load);
                            }
                        }
                    }
                    None => {
                        avail.insert((op, key_l, key_r), (inst, load_backed));
                    }
                }
            }
            _ => {}
        }
    }
    removed
}

/// Maximal run starting at `start`: each next instruction is an `add`
/// whose lhs is the previous run member with that member used nowhere
/// else, and whose rhs satisfies `accept`.
fn add_run(
    module: &Module,
    insts: &[InstId],
    start: usize,
    accept: impl Fn(&Module, Value) -> bool,
) -> Vec<InstId> {
    let mut run: Vec<InstId> = Vec::new();
    for &inst in &insts[start..] {
        if module.inst(inst).dead {
            break;
        }
        let InstKind::Binary { op: BinOp::Add, lhs, rhs } = *module.kind(inst) else {
            break;
        };
        if !accept(module, rhs) {
            break;
        }
        match run.last() {
            None => run.push(inst),
            Some(&prev) => {
                if lhs == Value::Inst(prev) && module.inst(prev).uses.len() == 1 {
                    run.push(inst);
                } else {
                    break;
                }
            }
        }
    }
    run
}

/// `((x+c1)+c2)+c3 → x + (c1+c2+c3)` for runs longer than two.
fn fold_const_add_chains(module: &mut Module, block: BlockId) -> usize {
    let mut removed = 0usize;
    let mut start = 0usize;
    loop {
        let insts = module.block(block).insts.clone();
        if start >= insts.len() {
            return removed;
        }
        let run = add_run(module, &insts, start, |_, rhs| rhs.as_const_int().is_some());
        if run.len() <= 2 {
            start += run.len().max(1);
            continue;
        }
        let InstKind::Binary { lhs: init, .. } = *module.kind(run[0]) else {
            unreachable!("run members are adds");
        };
        let ty = module.value_type(init);
        let total: i64 = run
            .iter()
            .filter_map(|&i| match module.kind(i) {
                InstKind::Binary { rhs, .. } => rhs.as_const_int(),
                _ => None,
            })
            .sum();
        let tail = run[run.len() - 1];
        let pos = insts.iter().position(|&i| i == tail).unwrap_or(0);
        let folded = module.insert_inst(
            block,
            pos + 1,
            InstKind::Binary {
                op: BinOp::Add,
                lhs: init,
                rhs: Value::ConstInt { ty, value: total },
            },
        );
        module.replace_all_uses_with(tail, Value::Inst(folded));
        for &dead in run.iter().rev() {
            module.erase_inst(dead);
        }
        removed += run.len();
        start = 0;
    }
}

/// `((x+v)+v)+v → x + v*n` for runs longer than five.
fn fold_repeated_add_chains(module: &mut Module, block: BlockId) -> usize {
    let mut removed = 0usize;
    let mut start = 0usize;
    loop {
        let insts = module.block(block).insts.clone();
        if start >= insts.len() {
            return removed;
        }
        // Pin the run to the first member's rhs.
        let Some(&first) = insts.get(start) else {
            return removed;
        };
        let step = match module.kind(first) {
            InstKind::Binary {
                op: BinOp::Add,
                rhs,
                ..
            } if !module.inst(first).dead && rhs.as_const_int().is_none() => *rhs,
            _ => {
                start += 1;
                continue;
            }
        };
        let run = add_run(module, &insts, start, |_, rhs| rhs == step);
        if run.len() <= 5 {
            start += run.len().max(1);
            continue;
        }
        let InstKind::Binary { lhs: init, .. } = *module.kind(run[0]) else {
            unreachable!("run members are adds");
        };
        let ty = module.value_type(step);
        let n = run.len() as i64;
        let tail = run[run.len() - 1];
        let pos = insts.iter().position(|&i| i == tail).unwrap_or(0);
        let scaled = module.insert_inst(
            block,
            pos + 1,
            InstKind::Binary {
                op: BinOp::Mul,
                lhs: step,
                rhs: Value::ConstInt { ty, value: n },
            },
        );
        let folded = module.insert_inst(
            block,
            pos + 2,
            InstKind::Binary {
                op: BinOp::Add,
                lhs: init,
                rhs: Value::Inst(scaled),
            },
        );
        module.replace_all_uses_with(tail, Value::Inst(folded));
        for &dead in run.iter().rev() {
            module.erase_inst(dead);
        }
        removed += run.len();
        start = 0;
    }
}

/// Merge structurally equal GEPs when the earlier dominates the later.
fn dedupe_geps(module: &mut Module, func: crate::ir::FuncId) -> usize {
    let mut removed = 0usize;
    let dom = dominator_tree(module, func);
    let mut kept: Vec<InstId> = Vec::new();
    for &block in &module.func(func).blocks.clone() {
        for inst in module.block(block).insts.clone() {
            if module.inst(inst).dead || !matches!(module.kind(inst), InstKind::Gep { .. }) {
                continue;
            }
            let mut replaced = false;
            for &earlier in &kept {
                if !geps_equivalent(module, earlier, inst) {
                    continue;
                }
                let earlier_block = module.inst(earlier).block;
                let dominated = if earlier_block == block {
                    let insts = &module.block(block).insts;
                    let a = insts.iter().position(|&i| i == earlier);
                    let b = insts.iter().position(|&i| i == inst);
                    matches!((a, b), (Some(a), Some(b)) if a < b)
                } else {
                    dom.dominates(earlier_block, block)
                };
                if dominated {
                    module.replace_all_uses_with(inst, Value::Inst(earlier));
                    module.erase_inst(inst);
                    removed += 1;
                    replaced = true;
                    break;
                }
            }
            if !replaced {
                kept.push(inst);
            }
        }
    }
    removed
}

fn geps_equivalent(module: &Module, a: InstId, b: InstId) -> bool {
    let (
        InstKind::Gep {
            source_ty: ty_a,
            base: base_a,
            indices: idx_a,
        },
        InstKind::Gep {
            source_ty: ty_b,
            base: base_b,
            indices: idx_b,
        },
    ) = (module.kind(a), module.kind(b))
    else {
        return false;
    };
    ty_a == ty_b && base_a == base_b && idx_a == idx_b
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Builder, Linkage, verify_module};
    use crate::transform::run_pass;

    fn unary_fn(module: &mut Module) -> (crate::ir::BlockId, Value) {
        let i32_ty = module.types.i32();
        let fn_ty = module.types.func(i32_ty, vec![i32_ty]);
        let func = module.add_function(
            "f",
            fn_ty,
            Linkage::External,
            vec![crate::ir::ParamData {
                name: "x".into(),
                ty: i32_ty,
            }],
        );
        let entry = module.add_block(func, "entry");
        (entry, Value::Param(func, 0))
    }

    #[test]
    fn forwards_store_to_following_load() {
        let mut module = Module::new("t");
        let i32_ty = module.types.i32();
        let (entry, x) = unary_fn(&mut module);
        let mut b = Builder::new(&mut module);
        b.position_at_end(entry);
        let slot = b.build_alloca(i32_ty);
        b.build_store(x, slot);
        let load = b.build_load(i32_ty, slot);
        b.build_ret(load);

        let mut cache = AnalysisCache::default();
        run_pass(&mut CommonSubexprElimination, &mut module, &mut cache).unwrap();
        verify_module(&module).unwrap();
        let last = *module.block(entry).insts.last().unwrap();
        assert_eq!(*module.kind(last), InstKind::Ret { value: Some(x) });
    }

    #[test]
    fn equal_loads_make_binops_shareable() {
        let mut module = Module::new("t");
        let i32_ty = module.types.i32();
        let global = module.add_global("g", i32_ty, Linkage::External, None, false);
        let (entry, x) = unary_fn(&mut module);
        let mut b = Builder::new(&mut module);
        b.position_at_end(entry);
        let l1 = b.build_load(i32_ty, Value::Global(global));
        let a1 = b.build_binary(BinOp::Add, x, l1);
        let l2 = b.build_load(i32_ty, Value::Global(global));
        let a2 = b.build_binary(BinOp::Add, x, l2);
        let sum = b.build_binary(BinOp::Mul, a1, a2);
        b.build_ret(sum);

        let mut cache = AnalysisCache::default();
        let changed = run_pass(&mut CommonSubexprElimination, &mut module, &mut cache).unwrap();
        assert!(changed);
        verify_module(&module).unwrap();
        // The second add collapses onto the first and the orphaned second
        // load disappears.
        let adds = module
            .block(entry)
            .insts
            .iter()
            .filter(|&&i| matches!(module.kind(i), InstKind::Binary { op: BinOp::Add, .. }))
            .count();
        let loads = module
            .block(entry)
            .insts
            .iter()
            .filter(|&&i| matches!(module.kind(i), InstKind::Load { .. }))
            .count();
        assert_eq!(adds, 1);
        assert_eq!(loads, 1);
    }

    #[test]
    fn store_invalidates_load_backed_expressions() {
        let mut module = Module::new("t");
        let i32_ty = module.types.i32();
        let global = module.add_global("g", i32_ty, Linkage::External, None, false);
        let (entry, x) = unary_fn(&mut module);
        let mut b = Builder::new(&mut module);
        b.position_at_end(entry);
        let l1 = b.build_load(i32_ty, Value::Global(global));
        let a1 = b.build_binary(BinOp::Add, x, l1);
        b.build_store(a1, Value::Global(global));
        let l2 = b.build_load(i32_ty, Value::Global(global));
        let a2 = b.build_binary(BinOp::Add, x, l2);
        let sum = b.build_binary(BinOp::Mul, a1, a2);
        b.build_ret(sum);

        let mut cache = AnalysisCache::default();
        run_pass(&mut CommonSubexprElimination, &mut module, &mut cache).unwrap();
        verify_module(&module).unwrap();
        // Both adds must survive: the store changed @g in between.
        let adds = module
            .block(entry)
            .insts
            .iter()
            .filter(|&&i| matches!(module.kind(i), InstKind::Binary { op: BinOp::Add, .. }))
            .count();
        assert_eq!(adds, 2);
    }

    #[test]
    fn folds_long_constant_add_chain() {
        let mut module = Module::new("t");
        let i32_ty = module.types.i32();
        let (entry, x) = unary_fn(&mut module);
        let mut b = Builder::new(&mut module);
        b.position_at_end(entry);
        let mut acc = x;
        for c in [1, 2, 3, 4] {
            let k = b.const_int(i32_ty, c);
            acc = b.build_binary(BinOp::Add, acc, k);
        }
        b.build_ret(acc);

        let mut cache = AnalysisCache::default();
        run_pass(&mut CommonSubexprElimination, &mut module, &mut cache).unwrap();
        verify_module(&module).unwrap();
        let insts = &module.block(entry).insts;
        assert_eq!(insts.len(), 2);
        assert_eq!(
            *module.kind(insts[0]),
            InstKind::Binary {
                op: BinOp::Add,
                lhs: x,
                rhs: Value::ConstInt {
                    ty: i32_ty,
                    value: 10
                }
            }
        );
    }

    #[test]
    fn folds_repeated_variable_adds_to_multiply() {
        let mut module = Module::new("t");
        let i32_ty = module.types.i32();
        let fn_ty = module.types.func(i32_ty, vec![i32_ty, i32_ty]);
        let func = module.add_function(
            "f",
            fn_ty,
            Linkage::External,
            vec![
                crate::ir::ParamData {
                    name: "x".into(),
                    ty: i32_ty,
                },
                crate::ir::ParamData {
                    name: "v".into(),
                    ty: i32_ty,
                },
            ],
        );
        let entry = module.add_block(func, "entry");
        let x = Value::Param(func, 0);
        let v = Value::Param(func, 1);
        let mut b = Builder::new(&mut module);
        b.position_at_end(entry);
        let mut acc = x;
        for _ in 0..6 {
            acc = b.build_binary(BinOp::Add, acc, v);
        }
        b.build_ret(acc);

        let mut cache = AnalysisCache::default();
        run_pass(&mut CommonSubexprElimination, &mut module, &mut cache).unwrap();
        verify_module(&module).unwrap();
        let insts = &module.block(entry).insts;
        assert_eq!(insts.len(), 3);
        assert_eq!(
            *module.kind(insts[0]),
            InstKind::Binary {
                op: BinOp::Mul,
                lhs: v,
                rhs: Value::ConstInt {
                    ty: i32_ty,
                    value: 6
                }
            }
        );
    }

    #[test]
    fn duplicate_geps_merge_under_dominance() {
        let mut module = Module::new("t");
        let i32_ty = module.types.i32();
        let i64_ty = module.types.i64();
        let arr_ty = module.types.array(i32_ty, 4);
        let fn_ty = module.types.func(i32_ty, vec![]);
        let func = module.add_function("f", fn_ty, Linkage::External, vec![]);
        let entry = module.add_block(func, "entry");
        let mut b = Builder::new(&mut module);
        b.position_at_end(entry);
        let base = b.build_alloca(arr_ty);
        let zero = b.const_int(i64_ty, 0);
        let one = b.const_int(i64_ty, 1);
        let g1 = b.build_gep(arr_ty, base, [zero, one]);
        let g2 = b.build_gep(arr_ty, base, [zero, one]);
        let c = b.const_int(i32_ty, 5);
        b.build_store(c, g1);
        let l = b.build_load(i32_ty, g2);
        b.build_ret(l);

        let mut cache = AnalysisCache::default();
        run_pass(&mut CommonSubexprElimination, &mut module, &mut cache).unwrap();
        verify_module(&module).unwrap();
        let geps = module
            .block(entry)
            .insts
            .iter()
            .filter(|&&i| matches!(module.kind(i), InstKind::Gep { .. }))
            .count();
        assert_eq!(geps, 1);
    }
}
