//! Memory-to-register promotion (SSA construction).
//!
//! Promotes integer allocas that are only ever loaded from and stored to.
//! For each such alloca the set of defining blocks is computed, empty phis
//! are inserted at its iterated dominance frontier, and a dominator-tree
//! preorder walk rewrites loads to the reaching value while recording
//! stores. Paths without a dominating store see `undef`. Dead phis,
//! stores, loads and the allocas themselves are erased afterwards.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::analysis::{dominance_frontiers, dominator_tree};
use crate::error::Result;
use crate::ir::{BlockId, FuncId, InstId, InstKind, Module, TypeId, Value};

use super::{AnalysisCache, ModulePass, PreservedAnalyses};

pub struct Mem2Reg;

impl ModulePass for Mem2Reg {
    fn name(&self) -> &'static str {
        "mem2reg"
    }

    fn run(&mut self, module: &mut Module, _cache: &mut AnalysisCache) -> Result<PreservedAnalyses> {
        let mut promoted = 0usize;
        for func in module.func_ids() {
            if module.func(func).is_declaration() {
                continue;
            }
            promoted += promote_function(module, func);
        }
        tracing::debug!(promoted, "mem2reg finished");
        Ok(if promoted == 0 {
            PreservedAnalyses::All
        } else {
            PreservedAnalyses::None
        })
    }
}

/// An alloca is promotable when it allocates an integer and every user is
/// a load from it or a store *to* it (its address never escapes into a
/// store value, a call or a GEP).
fn promotable(module: &Module, alloca: InstId) -> Option<TypeId> {
    let InstKind::Alloca { ty } = *module.kind(alloca) else {
        return None;
    };
    if !module.types.is_int(ty) {
        return None;
    }
    for &user in &module.inst(alloca).uses {
        match module.kind(user) {
            InstKind::Load { .. } => {}
            InstKind::Store { value, .. } => {
                if *value == Value::Inst(alloca) {
                    return None;
                }
            }
            _ => return None,
        }
    }
    Some(ty)
}

fn promote_function(module: &mut Module, func: FuncId) -> usize {
    let mut allocas: Vec<(InstId, TypeId)> = Vec::new();
    for &block in &module.func(func).blocks {
        for &inst in &module.block(block).insts {
            if let Some(ty) = promotable(module, inst) {
                allocas.push((inst, ty));
            }
        }
    }
    if allocas.is_empty() {
        return 0;
    }

    // Unused allocas are simply deleted.
    allocas.retain(|&(alloca, _)| {
        if module.inst(alloca).uses.is_empty() {
            module.erase_inst(alloca);
            false
        } else {
            true
        }
    });
    if allocas.is_empty() {
        return 0;
    }

    let dom = dominator_tree(module, func);
    let frontiers = dominance_frontiers(module, func, &dom);
    let alloca_set: FxHashSet<InstId> = allocas.iter().map(|&(a, _)| a).collect();

    // Blocks storing to each alloca.
    let mut def_blocks: FxHashMap<InstId, Vec<BlockId>> = FxHashMap::default();
    for &(alloca, _) in &allocas {
        let mut blocks: Vec<BlockId> = Vec::new();
        for &user in &module.inst(alloca).uses {
            if let InstKind::Store { .. } = module.kind(user) {
                let block = module.inst(user).block;
                if !blocks.contains(&block) {
                    blocks.push(block);
                }
            }
        }
        def_blocks.insert(alloca, blocks);
    }

    // Insert empty phis at the iterated dominance frontier of the defs.
    let mut phi_alloca: FxHashMap<InstId, InstId> = FxHashMap::default();
    let mut block_phis: FxHashMap<BlockId, Vec<(InstId, InstId)>> = FxHashMap::default();
    for &(alloca, ty) in &allocas {
        let mut placed: FxHashSet<BlockId> = FxHashSet::default();
        let mut worklist = def_blocks[&alloca].clone();
        while let Some(def_block) = worklist.pop() {
            for &frontier in frontiers.get(&def_block).map_or(&[][..], Vec::as_slice) {
                if !placed.insert(frontier) {
                    continue;
                }
                let phi = module.insert_inst(
                    frontier,
                    0,
                    InstKind::Phi {
                        ty,
                        incomings: Vec::new(),
                    },
                );
                phi_alloca.insert(phi, alloca);
                block_phis.entry(frontier).or_default().push((phi, alloca));
                // The phi itself defines the alloca in its block.
                worklist.push(frontier);
            }
        }
    }

    // Rename along the dominator tree, seeding every alloca with undef.
    let mut erase: Vec<InstId> = Vec::new();
    let mut initial: FxHashMap<InstId, Value> = FxHashMap::default();
    for &(alloca, ty) in &allocas {
        initial.insert(alloca, Value::Undef(ty));
    }
    let entry = dom.entry();
    let mut stack: Vec<(BlockId, FxHashMap<InstId, Value>)> = vec![(entry, initial)];
    let mut visited: FxHashSet<BlockId> = FxHashSet::default();
    while let Some((block, mut incoming)) = stack.pop() {
        if !visited.insert(block) {
            continue;
        }
        for inst in module.block(block).insts.clone() {
            if module.inst(inst).dead {
                continue;
            }
            match module.kind(inst).clone() {
                InstKind::Phi { .. } => {
                    if let Some(&alloca) = phi_alloca.get(&inst) {
                        incoming.insert(alloca, Value::Inst(inst));
                    }
                }
                InstKind::Load { ptr, .. } => {
                    if let Some(alloca) = ptr.as_inst().filter(|a| alloca_set.contains(a)) {
                        let value = incoming[&alloca];
                        module.replace_all_uses_with(inst, value);
                        module.erase_inst(inst);
                    }
                }
                InstKind::Store { value, ptr } => {
                    if let Some(alloca) = ptr.as_inst().filter(|a| alloca_set.contains(a)) {
                        incoming.insert(alloca, value);
                        module.erase_inst(inst);
                    }
                }
                _ => {}
            }
        }
        // Feed this block's reaching values into successor phis.
        for succ in module.successors(block) {
            if let Some(phis) = block_phis.get(&succ) {
                for &(phi, alloca) in &phis.clone() {
                    module.add_incoming(phi, incoming[&alloca], block);
                }
            }
        }
        for &child in dom.children(block) {
            stack.push((child, incoming.clone()));
        }
    }

    // Loads and stores in unreachable blocks still pin the allocas; erase
    // them (their values are never observable).
    for &block in &module.func(func).blocks.clone() {
        if dom.is_reachable(block) {
            continue;
        }
        for inst in module.block(block).insts.clone() {
            if module.inst(inst).dead {
                continue;
            }
            match module.kind(inst).clone() {
                InstKind::Load { ty, ptr } => {
                    if ptr.as_inst().is_some_and(|a| alloca_set.contains(&a)) {
                        module.replace_all_uses_with(inst, Value::Undef(ty));
                        module.erase_inst(inst);
                    }
                }
                InstKind::Store { ptr, .. } => {
                    if ptr.as_inst().is_some_and(|a| alloca_set.contains(&a)) {
                        module.erase_inst(inst);
                    }
                }
                _ => {}
            }
        }
    }

    // Phis whose block has unreachable predecessor edges still need an
    // incoming entry per predecessor.
    let preds = module.predecessors(func);
    for (&phi, _) in &phi_alloca {
        if module.inst(phi).dead {
            continue;
        }
        let block = module.inst(phi).block;
        let InstKind::Phi { ty, incomings } = module.kind(phi).clone() else {
            continue;
        };
        let covered: FxHashSet<BlockId> = incomings.iter().map(|&(_, b)| b).collect();
        for &pred in preds.get(&block).map_or(&[][..], Vec::as_slice) {
            if !covered.contains(&pred) {
                module.add_incoming(phi, Value::Undef(ty), pred);
            }
        }
    }

    let count = allocas.len();
    for (alloca, _) in allocas {
        erase.push(alloca);
    }
    for inst in erase {
        module.erase_inst(inst);
    }

    // Drop phis that ended up unused, cascading through phi-only cycles.
    let mut changed = true;
    while changed {
        changed = false;
        for &phi in &phi_alloca.keys().copied().collect::<Vec<_>>() {
            if module.inst(phi).dead {
                continue;
            }
            let uses = &module.inst(phi).uses;
            if uses.is_empty() || (uses.len() == 1 && uses.contains(&phi)) {
                if let InstKind::Phi { ty, .. } = *module.kind(phi) {
                    module.replace_all_uses_with(phi, Value::Undef(ty));
                }
                module.erase_inst(phi);
                changed = true;
            }
        }
    }

    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, Builder, ICmpPred, Linkage, verify_module};
    use crate::transform::run_pass;

    /// Build: x = alloca; store 1; if (p) store 2; load x → phi at merge.
    #[test]
    fn promotes_scalar_with_phi_at_join() {
        let mut module = Module::new("t");
        let i32_ty = module.types.i32();
        let fn_ty = module.types.func(i32_ty, vec![i32_ty]);
        let func = module.add_function(
            "f",
            fn_ty,
            Linkage::External,
            vec![crate::ir::ParamData {
                name: "p".into(),
                ty: i32_ty,
            }],
        );
        let entry = module.add_block(func, "entry");
        let then_bb = module.add_block(func, "then");
        let merge = module.add_block(func, "merge");

        let mut b = Builder::new(&mut module);
        b.position_at_end(entry);
        let slot = b.build_alloca(i32_ty);
        let one = b.const_int(i32_ty, 1);
        let two = b.const_int(i32_ty, 2);
        let zero = b.const_int(i32_ty, 0);
        b.build_store(one, slot);
        let cmp = b.build_icmp(ICmpPred::Ne, Value::Param(func, 0), zero);
        b.build_cond_br(cmp, then_bb, merge);
        b.position_at_end(then_bb);
        b.build_store(two, slot);
        b.build_br(merge);
        b.position_at_end(merge);
        let load = b.build_load(i32_ty, slot);
        b.build_ret(load);

        let mut cache = AnalysisCache::default();
        let changed = run_pass(&mut Mem2Reg, &mut module, &mut cache).unwrap();
        assert!(changed);
        verify_module(&module).unwrap();

        // No promotable alloca remains, and the merge block starts with a
        // phi over {1 from entry, 2 from then}.
        for &block in &module.func(func).blocks {
            for &inst in &module.block(block).insts {
                assert!(!matches!(module.kind(inst), InstKind::Alloca { .. }));
                assert!(!matches!(module.kind(inst), InstKind::Load { .. }));
            }
        }
        let first = module.block(merge).insts[0];
        let InstKind::Phi { incomings, .. } = module.kind(first) else {
            panic!("expected a phi at the merge point");
        };
        let mut values: Vec<i64> = incomings
            .iter()
            .filter_map(|&(v, _)| v.as_const_int())
            .collect();
        values.sort_unstable();
        assert_eq!(values, vec![1, 2]);
    }

    /// An alloca whose address escapes into a call stays in memory form.
    #[test]
    fn leaves_escaping_allocas_alone() {
        let mut module = Module::new("t");
        let i32_ty = module.types.i32();
        let ptr = module.types.ptr();
        let void = module.types.void();
        let sink_ty = module.types.func(void, vec![ptr]);
        let sink = module.add_function(
            "sink",
            sink_ty,
            Linkage::External,
            vec![crate::ir::ParamData {
                name: "p".into(),
                ty: ptr,
            }],
        );
        let fn_ty = module.types.func(i32_ty, vec![]);
        let func = module.add_function("f", fn_ty, Linkage::External, vec![]);
        let entry = module.add_block(func, "entry");
        let mut b = Builder::new(&mut module);
        b.position_at_end(entry);
        let slot = b.build_alloca(i32_ty);
        let one = b.const_int(i32_ty, 1);
        b.build_store(one, slot);
        b.build_call(sink, [slot]);
        let load = b.build_load(i32_ty, slot);
        b.build_ret(load);

        let mut cache = AnalysisCache::default();
        run_pass(&mut Mem2Reg, &mut module, &mut cache).unwrap();
        verify_module(&module).unwrap();
        assert!(
            module
                .block(entry)
                .insts
                .iter()
                .any(|&i| matches!(module.kind(i), InstKind::Alloca { .. }))
        );
    }

    /// A load on a path with no store sees undef.
    #[test]
    fn undominated_load_becomes_undef() {
        let mut module = Module::new("t");
        let i32_ty = module.types.i32();
        let fn_ty = module.types.func(i32_ty, vec![]);
        let func = module.add_function("f", fn_ty, Linkage::External, vec![]);
        let entry = module.add_block(func, "entry");
        let mut b = Builder::new(&mut module);
        b.position_at_end(entry);
        let slot = b.build_alloca(i32_ty);
        let load = b.build_load(i32_ty, slot);
        b.build_ret(load);

        let mut cache = AnalysisCache::default();
        run_pass(&mut Mem2Reg, &mut module, &mut cache).unwrap();
        verify_module(&module).unwrap();
        let ret = module.block(entry).insts[0];
        assert_eq!(
            *module.kind(ret),
            InstKind::Ret {
                value: Some(Value::Undef(i32_ty))
            }
        );
    }
}
