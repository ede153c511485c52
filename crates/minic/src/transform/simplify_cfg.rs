//! Control-flow simplification.
//!
//! Per function: rewrite conditional branches that the conservative CFG
//! proves one-sided into unconditional ones (dropping the dead `icmp` when
//! nothing else uses it), delete blocks unreachable from the entry along
//! with their phi entries in surviving successors, and iteratively merge a
//! block into its unique unconditional successor when that successor has
//! no other predecessors.

use rustc_hash::FxHashSet;

use crate::analysis::conservative_cfg;
use crate::error::Result;
use crate::ir::{BlockId, FuncId, InstKind, Module, Value};

use super::{AnalysisCache, ModulePass, PreservedAnalyses};

pub struct SimplifyCfg;

impl ModulePass for SimplifyCfg {
    fn name(&self) -> &'static str {
        "simplify-cfg"
    }

    fn run(&mut self, module: &mut Module, _cache: &mut AnalysisCache) -> Result<PreservedAnalyses> {
        let mut changes = 0usize;
        for func in module.func_ids() {
            if module.func(func).is_declaration() {
                continue;
            }
            changes += fold_one_sided_branches(module, func);
            changes += remove_unreachable_blocks(module, func);
            changes += merge_block_chains(module, func);
        }
        tracing::debug!(changes, "cfg simplification finished");
        Ok(if changes == 0 {
            PreservedAnalyses::All
        } else {
            PreservedAnalyses::None
        })
    }
}

fn fold_one_sided_branches(module: &mut Module, func: FuncId) -> usize {
    let cfg = conservative_cfg(module, func);
    let mut changes = 0usize;
    for block in module.func(func).blocks.clone() {
        let Some(edges) = cfg.get(&block) else {
            continue;
        };
        let Some(term) = module.terminator(block) else {
            continue;
        };
        let InstKind::CondBr {
            cond,
            then_dest,
            else_dest,
        } = *module.kind(term)
        else {
            continue;
        };
        if edges.len() != 1 {
            continue;
        }
        let target = *edges.iter().next().expect("single edge");
        let dropped = if target == then_dest { else_dest } else { then_dest };
        if dropped != target {
            remove_phi_edges(module, dropped, block);
        }
        module.mutate_inst(term, |kind| *kind = InstKind::Br { target });
        if let Some(cmp) = cond.as_inst()
            && matches!(module.kind(cmp), InstKind::ICmp { .. })
            && module.inst(cmp).uses.is_empty()
        {
            module.erase_inst(cmp);
        }
        changes += 1;
    }
    changes
}

fn remove_phi_edges(module: &mut Module, block: BlockId, pred: BlockId) {
    for inst in module.block(block).insts.clone() {
        if matches!(module.kind(inst), InstKind::Phi { .. }) {
            module.remove_incoming(inst, pred);
        } else {
            break;
        }
    }
}

fn remove_unreachable_blocks(module: &mut Module, func: FuncId) -> usize {
    let mut reachable: FxHashSet<BlockId> = FxHashSet::default();
    let Some(entry) = module.func(func).entry() else {
        return 0;
    };
    let mut worklist = vec![entry];
    while let Some(block) = worklist.pop() {
        if !reachable.insert(block) {
            continue;
        }
        for succ in module.successors(block) {
            worklist.push(succ);
        }
    }

    let dead: Vec<BlockId> = module
        .func(func)
        .blocks
        .iter()
        .copied()
        .filter(|b| !reachable.contains(b))
        .collect();
    for &block in &dead {
        for succ in module.successors(block) {
            if reachable.contains(&succ) {
                remove_phi_edges(module, succ, block);
            }
        }
    }
    let removed = dead.len();
    for block in dead {
        module.erase_block(block);
    }
    removed
}

fn merge_block_chains(module: &mut Module, func: FuncId) -> usize {
    let mut merges = 0usize;
    loop {
        let preds = module.predecessors(func);
        let mut merged = false;
        for block in module.func(func).blocks.clone() {
            if module.block(block).dead {
                continue;
            }
            let Some(term) = module.terminator(block) else {
                continue;
            };
            let InstKind::Br { target } = *module.kind(term) else {
                continue;
            };
            if target == block {
                continue;
            }
            if preds.get(&target).map_or(&[][..], Vec::as_slice) != [block] {
                continue;
            }

            // Single predecessor means single-incoming phis; inline them.
            for inst in module.block(target).insts.clone() {
                let InstKind::Phi { incomings, .. } = module.kind(inst) else {
                    break;
                };
                let value = incomings.first().map_or(Value::NullPtr, |&(v, _)| v);
                module.replace_all_uses_with(inst, value);
                module.erase_inst(inst);
            }

            module.erase_inst(term);
            for inst in module.block(target).insts.clone() {
                let pos = module.block(block).insts.len();
                module.move_inst(inst, block, pos);
            }
            for succ in module.successors(block) {
                module.retarget_phi_edges(succ, target, block);
            }
            module.erase_block(target);
            merges += 1;
            merged = true;
            break;
        }
        if !merged {
            return merges;
        }
    }
}
