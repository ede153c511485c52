//! Structural well-formedness checker.
//!
//! Validates the module invariants after construction and between passes:
//! terminator placement, phi/predecessor agreement, use-list consistency
//! and SSA dominance. Violations are `Error::Internal`; the pipeline
//! treats them as fatal.

use rustc_hash::FxHashSet;

use crate::analysis::dominator_tree;
use crate::error::{Error, Result};
use crate::ir::{FuncId, InstId, InstKind, Module, Value};

pub fn verify_module(module: &Module) -> Result<()> {
    for func in module.func_ids() {
        if !module.func(func).is_declaration() {
            verify_function(module, func)?;
        }
    }
    Ok(())
}

fn err(func_name: &str, msg: &str) -> Error {
    Error::Internal(format!("verifier: @{func_name}: {msg}"))
}

fn verify_function(module: &Module, func: FuncId) -> Result<()> {
    let data = module.func(func);
    let name = &data.name;
    let preds = module.predecessors(func);

    if let Some(entry) = data.entry()
        && !preds.get(&entry).is_none_or(Vec::is_empty)
    {
        return Err(err(name, "entry block has predecessors"));
    }

    for &block in &data.blocks {
        let insts = &module.block(block).insts;
        let Some((&last, rest)) = insts.split_last() else {
            return Err(err(name, &format!("block {} is empty", block.index())));
        };
        if !module.kind(last).is_terminator() {
            return Err(err(
                name,
                &format!("block {} does not end with a terminator", block.index()),
            ));
        }
        let mut leading_phis = true;
        for &inst in rest {
            if module.kind(inst).is_terminator() {
                return Err(err(
                    name,
                    &format!("instruction follows a terminator in block {}", block.index()),
                ));
            }
            if matches!(module.kind(inst), InstKind::Phi { .. }) {
                if !leading_phis {
                    return Err(err(
                        name,
                        &format!("phi not at the start of block {}", block.index()),
                    ));
                }
            } else {
                leading_phis = false;
            }
        }

        for succ in module.successors(block) {
            if module.block(succ).func != func || module.block(succ).dead {
                return Err(err(name, "terminator targets a block outside the function"));
            }
        }

        for &inst in insts {
            verify_inst(module, func, inst)?;
        }
    }

    verify_dominance(module, func)
}

fn verify_inst(module: &Module, func: FuncId, inst: InstId) -> Result<()> {
    let name = &module.func(func).name;
    if module.inst(inst).dead {
        return Err(err(name, "block references an erased instruction"));
    }

    // Use-list consistency, forward direction.
    let mut ok = true;
    module.kind(inst).each_operand(|v| match v {
        Value::Inst(def) => {
            if module.inst(def).dead || !module.inst(def).uses.contains(&inst) {
                ok = false;
            }
        }
        Value::Global(g) => {
            if !module.global(g).uses.contains(&inst) {
                ok = false;
            }
        }
        Value::Func(f) => {
            if !module.func(f).uses.contains(&inst) {
                ok = false;
            }
        }
        _ => {}
    });
    if let InstKind::Call { callee, .. } = module.kind(inst)
        && !module.func(*callee).uses.contains(&inst)
    {
        ok = false;
    }
    if !ok {
        return Err(err(
            name,
            &format!("operand of %v{} is missing the use-list entry", inst.index()),
        ));
    }

    // Reverse direction: every recorded user actually references us.
    for &user in &module.inst(inst).uses {
        if module.inst(user).dead {
            return Err(err(
                name,
                &format!("%v{} is used by an erased instruction", inst.index()),
            ));
        }
        let mut found = false;
        module.kind(user).each_operand(|v| {
            if v == Value::Inst(inst) {
                found = true;
            }
        });
        if !found {
            return Err(err(
                name,
                &format!("stale use-list entry on %v{}", inst.index()),
            ));
        }
    }

    // Phi shape: incoming blocks equal the predecessor set, incoming types
    // equal the phi type.
    if let InstKind::Phi { ty, incomings } = module.kind(inst) {
        let block = module.inst(inst).block;
        let preds = module.predecessors(func);
        let pred_set: FxHashSet<_> = preds
            .get(&block)
            .map_or(&[][..], Vec::as_slice)
            .iter()
            .copied()
            .collect();
        let incoming_set: FxHashSet<_> = incomings.iter().map(|&(_, b)| b).collect();
        if pred_set != incoming_set || incomings.len() != pred_set.len() {
            return Err(err(
                name,
                &format!(
                    "phi %v{} incoming blocks do not match predecessors",
                    inst.index()
                ),
            ));
        }
        for &(value, _) in incomings {
            if module.value_type(value) != *ty {
                return Err(err(
                    name,
                    &format!("phi %v{} has an incoming value of a different type", inst.index()),
                ));
            }
        }
    }

    Ok(())
}

/// SSA dominance: every definition dominates each of its uses. Phi uses
/// count at the end of the incoming block; uses inside unreachable blocks
/// are not checked.
fn verify_dominance(module: &Module, func: FuncId) -> Result<()> {
    let name = &module.func(func).name;
    let dom = dominator_tree(module, func);
    for &block in &module.func(func).blocks {
        if !dom.is_reachable(block) {
            continue;
        }
        let insts = &module.block(block).insts;
        for (pos, &inst) in insts.iter().enumerate() {
            if let InstKind::Phi { incomings, .. } = module.kind(inst) {
                for &(value, incoming) in incomings {
                    if let Value::Inst(def) = value {
                        let def_block = module.inst(def).block;
                        if !dom.dominates(def_block, incoming) {
                            return Err(err(
                                name,
                                &format!(
                                    "phi %v{} incoming %v{} does not dominate its edge",
                                    inst.index(),
                                    def.index()
                                ),
                            ));
                        }
                    }
                }
                continue;
            }
            let mut bad = None;
            module.kind(inst).each_operand(|v| {
                if let Value::Inst(def) = v {
                    let def_block = module.inst(def).block;
                    let dominated = if def_block == block {
                        insts.iter().position(|&i| i == def).is_some_and(|p| p < pos)
                    } else {
                        dom.dominates(def_block, block)
                    };
                    if !dominated && bad.is_none() {
                        bad = Some(def);
                    }
                }
            });
            if let Some(def) = bad {
                return Err(err(
                    name,
                    &format!(
                        "%v{} uses %v{} which does not dominate it",
                        inst.index(),
                        def.index()
                    ),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, Builder, Linkage, Module};

    #[test]
    fn accepts_a_well_formed_function() {
        let mut module = Module::new("t");
        let i32_ty = module.types.i32();
        let fn_ty = module.types.func(i32_ty, vec![]);
        let func = module.add_function("f", fn_ty, Linkage::External, vec![]);
        let entry = module.add_block(func, "entry");
        let mut b = Builder::new(&mut module);
        b.position_at_end(entry);
        let one = b.const_int(i32_ty, 1);
        let add = b.build_binary(BinOp::Add, one, one);
        b.build_ret(add);
        verify_module(&module).unwrap();
    }

    #[test]
    fn rejects_a_block_without_terminator() {
        let mut module = Module::new("t");
        let i32_ty = module.types.i32();
        let fn_ty = module.types.func(i32_ty, vec![]);
        let func = module.add_function("f", fn_ty, Linkage::External, vec![]);
        let entry = module.add_block(func, "entry");
        let mut b = Builder::new(&mut module);
        b.position_at_end(entry);
        let one = b.const_int(i32_ty, 1);
        b.build_binary(BinOp::Add, one, one);
        assert!(verify_module(&module).is_err());
    }

    #[test]
    fn rejects_use_before_definition() {
        let mut module = Module::new("t");
        let i32_ty = module.types.i32();
        let fn_ty = module.types.func(i32_ty, vec![]);
        let func = module.add_function("f", fn_ty, Linkage::External, vec![]);
        let entry = module.add_block(func, "entry");
        let mut b = Builder::new(&mut module);
        b.position_at_end(entry);
        let one = b.const_int(i32_ty, 1);
        let add = b.build_binary(BinOp::Add, one, one);
        let ret = b.build_ret(add);
        // Move the definition after its use.
        let add_id = add.as_inst().unwrap();
        module.move_inst(add_id, entry, 2);
        let _ = ret;
        assert!(verify_module(&module).is_err());
    }
}
