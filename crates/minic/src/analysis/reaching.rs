//! Reaching-definition chains between stores and loads.
//!
//! A forward dataflow over each function's blocks, run as a two-iteration
//! fixed point: the second sweep propagates facts across back edges, which
//! is sufficient for the block shapes this front-end produces. Per block
//! the analysis carries a map from address value to the set of stores
//! currently defining it; joining predecessors unions their out-maps, and
//! a store kills every prior definition of its address.

use rustc_hash::FxHashMap;

use crate::ir::{FuncId, InstId, InstKind, Module, Value};

/// For every store, the loads it can reach.
pub type StoreToLoads = FxHashMap<InstId, Vec<InstId>>;
/// For every load, the stores that can reach it.
pub type LoadToStores = FxHashMap<InstId, Vec<InstId>>;

fn for_each_pair(module: &Module, func: FuncId, mut record: impl FnMut(InstId, InstId)) {
    let preds = module.predecessors(func);
    // Out-map of every processed block: address → reaching stores.
    let mut block_out: FxHashMap<crate::ir::BlockId, FxHashMap<Value, Vec<InstId>>> =
        FxHashMap::default();

    for _ in 0..2 {
        for &block in &module.func(func).blocks {
            let mut defs: FxHashMap<Value, Vec<InstId>> = FxHashMap::default();
            for &pred in preds.get(&block).map_or(&[][..], Vec::as_slice) {
                if let Some(out) = block_out.get(&pred) {
                    for (addr, stores) in out {
                        let entry = defs.entry(*addr).or_default();
                        for store in stores {
                            if !entry.contains(store) {
                                entry.push(*store);
                            }
                        }
                    }
                }
            }

            for &inst in &module.block(block).insts {
                match module.kind(inst) {
                    InstKind::Store { ptr, .. } => {
                        defs.insert(*ptr, vec![inst]);
                    }
                    InstKind::Load { ptr, .. } => {
                        if let Some(stores) = defs.get(ptr) {
                            for &store in stores {
                                record(store, inst);
                            }
                        }
                    }
                    _ => {}
                }
            }
            block_out.insert(block, defs);
        }
    }
}

/// Store→loads chains for the whole module. Pairings are deduplicated.
#[must_use]
pub fn store_to_loads(module: &Module) -> StoreToLoads {
    let mut chains: StoreToLoads = FxHashMap::default();
    for func in module.func_ids() {
        if module.func(func).is_declaration() {
            continue;
        }
        for_each_pair(module, func, |store, load| {
            let loads = chains.entry(store).or_default();
            if !loads.contains(&load) {
                loads.push(load);
            }
        });
    }
    chains
}

/// Load→stores chains for the whole module. Pairings are deduplicated.
#[must_use]
pub fn load_to_stores(module: &Module) -> LoadToStores {
    let mut chains: LoadToStores = FxHashMap::default();
    for func in module.func_ids() {
        if module.func(func).is_declaration() {
            continue;
        }
        for_each_pair(module, func, |store, load| {
            let stores = chains.entry(load).or_default();
            if !stores.contains(&store) {
                stores.push(store);
            }
        });
    }
    chains
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, Builder, ICmpPred, Linkage, Module};

    /// entry stores, both branch arms load; the branch-arm store kills the
    /// entry store on that path only.
    #[test]
    fn stores_reach_loads_across_branches() {
        let mut module = Module::new("t");
        let i32_ty = module.types.i32();
        let fn_ty = module.types.func(i32_ty, vec![]);
        let func = module.add_function("f", fn_ty, Linkage::External, vec![]);
        let entry = module.add_block(func, "entry");
        let then_bb = module.add_block(func, "then");
        let merge = module.add_block(func, "merge");

        let mut b = Builder::new(&mut module);
        b.position_at_end(entry);
        let slot = b.build_alloca(i32_ty);
        let zero = b.const_int(i32_ty, 0);
        let one = b.const_int(i32_ty, 1);
        let store0 = b.build_store(zero, slot);
        let load_e = b.build_load(i32_ty, slot);
        let cmp = b.build_icmp(ICmpPred::Ne, load_e, zero);
        b.build_cond_br(cmp, then_bb, merge);

        b.position_at_end(then_bb);
        let store1 = b.build_store(one, slot);
        b.build_br(merge);

        b.position_at_end(merge);
        let load_m = b.build_load(i32_ty, slot);
        let sum = b.build_binary(BinOp::Add, load_m, one);
        b.build_ret(sum);

        let chains = store_to_loads(&module);
        let load_e = load_e.as_inst().unwrap();
        let load_m = load_m.as_inst().unwrap();
        // store0 reaches the entry load and (via the fall-through edge) the
        // merge load; store1 reaches only the merge load.
        assert!(chains[&store0].contains(&load_e));
        assert!(chains[&store0].contains(&load_m));
        assert_eq!(chains[&store1], vec![load_m]);

        let back = load_to_stores(&module);
        assert_eq!(back[&load_e], vec![store0]);
        assert!(back[&load_m].contains(&store0) && back[&load_m].contains(&store1));
    }
}
