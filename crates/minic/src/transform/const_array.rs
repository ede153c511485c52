//! Local constant-array promotion.
//!
//! A local array qualifies when every access is explicit: all GEPs into it
//! use constant indices, every store through them stores a constant, and
//! its address never escapes (no call arguments, no non-GEP users). Loads
//! then forward the value of the latest dominating store to the same
//! element. When every load could be forwarded, the array's GEPs, stores
//! and loads are deleted outright; otherwise everything stays and only
//! the forwarded loads become redundant.
//!
//! This pays off after unrolling, which turns induction-variable indices
//! into constants.

use rustc_hash::FxHashSet;

use crate::analysis::dominator_tree;
use crate::error::Result;
use crate::ir::{FuncId, InstId, InstKind, Module, Value};

use super::{AnalysisCache, ModulePass, PreservedAnalyses};

pub struct PromoteConstArrays;

impl ModulePass for PromoteConstArrays {
    fn name(&self) -> &'static str {
        "promote-const-arrays"
    }

    fn run(&mut self, module: &mut Module, _cache: &mut AnalysisCache) -> Result<PreservedAnalyses> {
        let mut forwarded = 0usize;
        for func in module.func_ids() {
            if module.func(func).is_declaration() {
                continue;
            }
            forwarded += promote_in_function(module, func);
        }
        tracing::debug!(forwarded, "constant-array promotion finished");
        Ok(if forwarded == 0 {
            PreservedAnalyses::All
        } else {
            PreservedAnalyses::None
        })
    }
}

/// The alloca (or other non-GEP value) at the bottom of a GEP chain.
fn gep_root(module: &Module, mut value: Value) -> Value {
    while let Some(inst) = value.as_inst() {
        match module.kind(inst) {
            InstKind::Gep { base, .. } => value = *base,
            _ => break,
        }
    }
    value
}

fn gep_is_explicit(module: &Module, gep: InstId) -> bool {
    let InstKind::Gep { base, indices, .. } = module.kind(gep) else {
        return false;
    };
    if indices.iter().any(|idx| idx.as_const_int().is_none()) {
        return false;
    }
    match base.as_inst() {
        Some(inner) if matches!(module.kind(inner), InstKind::Gep { .. }) => {
            gep_is_explicit(module, inner)
        }
        _ => true,
    }
}

/// Structural equality over constant-indexed GEP chains.
fn geps_equivalent(module: &Module, a: InstId, b: InstId) -> bool {
    if a == b {
        return true;
    }
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
    if ty_a != ty_b || idx_a.len() != idx_b.len() {
        return false;
    }
    for (x, y) in idx_a.iter().zip(idx_b.iter()) {
        match (x.as_const_int(), y.as_const_int()) {
            (Some(x), Some(y)) if x == y => {}
            _ => return false,
        }
    }
    match (base_a.as_inst(), base_b.as_inst()) {
        (Some(x), Some(y))
            if matches!(module.kind(x), InstKind::Gep { .. })
                && matches!(module.kind(y), InstKind::Gep { .. }) =>
        {
            geps_equivalent(module, x, y)
        }
        _ => base_a == base_b,
    }
}

fn promote_in_function(module: &mut Module, func: FuncId) -> usize {
    // Entry-block array allocas.
    let Some(entry) = module.func(func).entry() else {
        return 0;
    };
    let mut arrays: FxHashSet<InstId> = FxHashSet::default();
    for &inst in &module.block(entry).insts {
        if let InstKind::Alloca { ty } = *module.kind(inst)
            && module.types.is_array(ty)
        {
            arrays.insert(inst);
        }
    }
    if arrays.is_empty() {
        return 0;
    }

    // Disqualify arrays with any implicit access.
    let mut unclear: FxHashSet<InstId> = FxHashSet::default();
    for &alloca in &arrays {
        for &user in &module.inst(alloca).uses {
            if !matches!(module.kind(user), InstKind::Gep { .. }) {
                unclear.insert(alloca);
            }
        }
    }
    for &block in &module.func(func).blocks {
        for &inst in &module.block(block).insts {
            match module.kind(inst) {
                InstKind::Gep { .. } => {
                    let root = gep_root(module, Value::Inst(inst));
                    if let Some(alloca) = root.as_inst()
                        && arrays.contains(&alloca)
                        && !gep_is_explicit(module, inst)
                    {
                        unclear.insert(alloca);
                    }
                }
                InstKind::Store { value, ptr } => {
                    let root = gep_root(module, *ptr);
                    if let Some(alloca) = root.as_inst()
                        && arrays.contains(&alloca)
                        && value.as_const_int().is_none()
                    {
                        unclear.insert(alloca);
                    }
                }
                InstKind::Call { args, .. } => {
                    for &arg in args {
                        if let Some(alloca) = gep_root(module, arg).as_inst()
                            && arrays.contains(&alloca)
                        {
                            unclear.insert(alloca);
                        }
                    }
                }
                _ => {}
            }
        }
    }
    arrays.retain(|a| !unclear.contains(a));
    if arrays.is_empty() {
        return 0;
    }

    let dom = dominator_tree(module, func);

    // Program-order (gep, store) pairs per qualified array; loads forward
    // from the latest dominating equivalent store.
    let mut stores: Vec<(InstId, InstId)> = Vec::new();
    let mut doomed: Vec<(InstId, InstId)> = Vec::new(); // (array, inst)
    let mut partial: FxHashSet<InstId> = FxHashSet::default();
    let mut forwarded = 0usize;

    for &block in &module.func(func).blocks.clone() {
        for inst in module.block(block).insts.clone() {
            if module.inst(inst).dead {
                continue;
            }
            match module.kind(inst).clone() {
                InstKind::Store { ptr, .. } => {
                    let Some(gep) = ptr.as_inst() else { continue };
                    if !matches!(module.kind(gep), InstKind::Gep { .. }) {
                        continue;
                    }
                    let Some(alloca) = gep_root(module, ptr).as_inst() else {
                        continue;
                    };
                    if !arrays.contains(&alloca) {
                        continue;
                    }
                    stores.push((gep, inst));
                    doomed.push((alloca, inst));
                }
                InstKind::Load { ptr, .. } => {
                    let Some(gep) = ptr.as_inst() else { continue };
                    if !matches!(module.kind(gep), InstKind::Gep { .. }) {
                        continue;
                    }
                    let Some(alloca) = gep_root(module, ptr).as_inst() else {
                        continue;
                    };
                    if !arrays.contains(&alloca) {
                        continue;
                    }
                    let reaching = stores.iter().rev().find(|&&(store_gep, store)| {
                        geps_equivalent(module, store_gep, gep)
                            && store_dominates(module, &dom, store, inst)
                    });
                    match reaching {
                        Some(&(_, store)) => {
                            if let InstKind::Store { value, .. } = *module.kind(store) {
                                module.replace_all_uses_with(inst, value);
                                doomed.push((alloca, inst));
                                forwarded += 1;
                            }
                        }
                        None => {
                            partial.insert(alloca);
                        }
                    }
                }
                InstKind::Gep { .. } => {
                    if let Some(alloca) = gep_root(module, Value::Inst(inst)).as_inst()
                        && arrays.contains(&alloca)
                    {
                        doomed.push((alloca, inst));
                    }
                }
                _ => {}
            }
        }
    }

    // Fully-resolved arrays lose all their access instructions; GEPs go
    // last and in reverse so chained bases are already unused.
    for &(alloca, inst) in &doomed {
        if partial.contains(&alloca) || module.inst(inst).dead {
            continue;
        }
        if !matches!(module.kind(inst), InstKind::Gep { .. }) {
            module.erase_inst(inst);
        }
    }
    for &(alloca, inst) in doomed.iter().rev() {
        if partial.contains(&alloca) || module.inst(inst).dead {
            continue;
        }
        if matches!(module.kind(inst), InstKind::Gep { .. }) && module.inst(inst).uses.is_empty() {
            module.erase_inst(inst);
        }
    }

    forwarded
}

fn store_dominates(module: &Module, dom: &crate::analysis::DomTree, store: InstId, load: InstId) -> bool {
    let store_block = module.inst(store).block;
    let load_block = module.inst(load).block;
    if store_block == load_block {
        let insts = &module.block(store_block).insts;
        let a = insts.iter().position(|&i| i == store);
        let b = insts.iter().position(|&i| i == load);
        matches!((a, b), (Some(a), Some(b)) if a < b)
    } else {
        dom.dominates(store_block, load_block)
    }
}
