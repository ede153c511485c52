//! Dead-code elimination.
//!
//! Three store-centric rewrites:
//!
//! 1. Stores to private globals that are never read anywhere cascade away
//!    together with the instructions that only fed them. Stores to
//!    external globals are observable side effects and stay.
//! 2. Stores to scalar stack slots with no reaching load (per the
//!    store→loads chains) are dropped. Stores to globals and through GEPs
//!    (arrays) are preserved.
//! 3. Allocas with no remaining users are dropped.

use rustc_hash::FxHashSet;
use std::collections::VecDeque;

use crate::error::Result;
use crate::ir::{GlobalId, InstId, InstKind, Linkage, Module, Value};

use super::{AnalysisCache, ModulePass, PreservedAnalyses};

pub struct DeadCodeElimination;

impl ModulePass for DeadCodeElimination {
    fn name(&self) -> &'static str {
        "dce"
    }

    fn run(&mut self, module: &mut Module, cache: &mut AnalysisCache) -> Result<PreservedAnalyses> {
        let mut removed = 0usize;
        removed += remove_unread_global_stores(module);

        // Stores whose value never reaches a load.
        let reached: FxHashSet<InstId> = cache
            .store_to_loads(module)
            .keys()
            .copied()
            .collect();
        for func in module.func_ids() {
            for block in module.func(func).blocks.clone() {
                for inst in module.block(block).insts.clone() {
                    if module.inst(inst).dead {
                        continue;
                    }
                    let InstKind::Store { ptr, .. } = *module.kind(inst) else {
                        continue;
                    };
                    // Only scalar stack slots: globals are observable and
                    // array stores may be read through a different GEP.
                    let Some(target) = ptr.as_inst() else {
                        continue;
                    };
                    if !matches!(module.kind(target), InstKind::Alloca { .. }) {
                        continue;
                    }
                    if !reached.contains(&inst) {
                        module.erase_inst(inst);
                        removed += 1;
                    }
                }
            }
        }

        // Allocas nobody uses any more.
        for func in module.func_ids() {
            for block in module.func(func).blocks.clone() {
                for inst in module.block(block).insts.clone() {
                    if !module.inst(inst).dead
                        && matches!(module.kind(inst), InstKind::Alloca { .. })
                        && module.inst(inst).uses.is_empty()
                    {
                        module.erase_inst(inst);
                        removed += 1;
                    }
                }
            }
        }

        tracing::debug!(removed, "dce finished");
        Ok(if removed == 0 {
            PreservedAnalyses::All
        } else {
            PreservedAnalyses::None
        })
    }
}

/// Whether the global's value can be observed: loaded directly, addressed
/// through a GEP, passed to a call, stored as data, or externally visible.
fn global_is_read(module: &Module, global: GlobalId) -> bool {
    if module.global(global).linkage == Linkage::External {
        return true;
    }
    for &user in &module.global(global).uses {
        match module.kind(user) {
            InstKind::Store { value, ptr } => {
                if *value == Value::Global(global) || ptr.as_global() != Some(global) {
                    return true;
                }
            }
            _ => return true,
        }
    }
    false
}

/// Erasable producers for cascade deletion: no side effects, no control
/// flow.
fn cascadable(kind: &InstKind) -> bool {
    matches!(
        kind,
        InstKind::Binary { .. }
            | InstKind::ICmp { .. }
            | InstKind::Load { .. }
            | InstKind::Gep { .. }
            | InstKind::SExt { .. }
    )
}

fn remove_unread_global_stores(module: &mut Module) -> usize {
    let mut queue: VecDeque<InstId> = VecDeque::new();
    for global in module.global_ids() {
        if global_is_read(module, global) {
            continue;
        }
        for &user in &module.global(global).uses.clone() {
            if matches!(module.kind(user), InstKind::Store { .. }) {
                queue.push_back(user);
            }
        }
    }

    let mut removed = 0usize;
    while let Some(inst) = queue.pop_front() {
        if module.inst(inst).dead {
            continue;
        }
        let operands = module.operands(inst);
        module.erase_inst(inst);
        removed += 1;
        for operand in operands {
            if let Some(producer) = operand.as_inst()
                && !module.inst(producer).dead
                && module.inst(producer).uses.is_empty()
                && cascadable(module.kind(producer))
            {
                queue.push_back(producer);
            }
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, Builder, Constant, verify_module};
    use crate::transform::run_pass;

    #[test]
    fn unreached_store_to_slot_is_removed() {
        let mut module = Module::new("t");
        let i32_ty = module.types.i32();
        let fn_ty = module.types.func(i32_ty, vec![]);
        let func = module.add_function("f", fn_ty, Linkage::External, vec![]);
        let entry = module.add_block(func, "entry");
        let mut b = Builder::new(&mut module);
        b.position_at_end(entry);
        let slot = b.build_alloca(i32_ty);
        let one = b.const_int(i32_ty, 1);
        b.build_store(one, slot);
        b.build_ret(one);

        let mut cache = AnalysisCache::default();
        run_pass(&mut DeadCodeElimination, &mut module, &mut cache).unwrap();
        verify_module(&module).unwrap();
        // Store gone, then the orphaned alloca too.
        assert_eq!(module.block(entry).insts.len(), 1);
    }

    #[test]
    fn store_to_external_global_survives() {
        let mut module = Module::new("t");
        let i32_ty = module.types.i32();
        let global = module.add_global(
            "g",
            i32_ty,
            Linkage::External,
            Some(Constant::Zero(i32_ty)),
            false,
        );
        let fn_ty = module.types.func(i32_ty, vec![]);
        let func = module.add_function("f", fn_ty, Linkage::External, vec![]);
        let entry = module.add_block(func, "entry");
        let mut b = Builder::new(&mut module);
        b.position_at_end(entry);
        let five = b.const_int(i32_ty, 5);
        b.build_store(five, Value::Global(global));
        b.build_ret(five);

        let mut cache = AnalysisCache::default();
        let changed = run_pass(&mut DeadCodeElimination, &mut module, &mut cache).unwrap();
        assert!(!changed);
        assert_eq!(module.block(entry).insts.len(), 2);
    }

    #[test]
    fn unread_private_global_store_cascades() {
        let mut module = Module::new("t");
        let i32_ty = module.types.i32();
        let global = module.add_global(
            "cached",
            i32_ty,
            Linkage::Private,
            Some(Constant::Zero(i32_ty)),
            false,
        );
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
        let x = Value::Param(func, 0);
        let mut b = Builder::new(&mut module);
        b.position_at_end(entry);
        let two = b.const_int(i32_ty, 2);
        let scaled = b.build_binary(BinOp::Mul, x, two);
        b.build_store(scaled, Value::Global(global));
        b.build_ret(x);

        let mut cache = AnalysisCache::default();
        run_pass(&mut DeadCodeElimination, &mut module, &mut cache).unwrap();
        verify_module(&module).unwrap();
        // Store and the mul feeding it both disappear.
        assert_eq!(module.block(entry).insts.len(), 1);
    }
}
