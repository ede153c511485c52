//! Function inlining.
//!
//! A callee is inlined when it has a body, sits on no call-graph cycle
//! reaching itself, and is straight-line (its single block ends in `ret`
//! with no branches anywhere). The callee's instructions are cloned in
//! front of the call with parameters mapped to arguments; cloned allocas
//! are hoisted into the caller's entry block, and the callee's return
//! value replaces the call. Functions left without callers are removed,
//! except `main` and synthesized global constructors.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::analysis::on_cycle;
use crate::error::{Error, Result};
use crate::ir::{FuncId, InstId, InstKind, Module, Value};

use super::{AnalysisCache, ModulePass, PreservedAnalyses};

pub struct FunctionInliner;

impl ModulePass for FunctionInliner {
    fn name(&self) -> &'static str {
        "inline"
    }

    fn run(&mut self, module: &mut Module, cache: &mut AnalysisCache) -> Result<PreservedAnalyses> {
        let graph = cache.call_graph(module).clone();

        // Inlineable verdict per callee, shared across call sites.
        let mut verdicts: FxHashMap<FuncId, bool> = FxHashMap::default();
        let mut inlineable = |module: &Module, callee: FuncId| -> bool {
            *verdicts
                .entry(callee)
                .or_insert_with(|| straight_line(module, callee) && !on_cycle(&graph, callee))
        };

        let mut call_sites: Vec<InstId> = Vec::new();
        for func in module.func_ids() {
            for &block in &module.func(func).blocks {
                for &inst in &module.block(block).insts {
                    if let InstKind::Call { callee, .. } = *module.kind(inst)
                        && inlineable(module, callee)
                    {
                        call_sites.push(inst);
                    }
                }
            }
        }

        let inlined = call_sites.len();
        for call in call_sites {
            inline_call(module, call)?;
        }

        // Drop functions nobody references any more.
        let ctor_funcs: FxHashSet<FuncId> = module.ctors.iter().map(|&(f, _)| f).collect();
        let mut removed = 0usize;
        for func in module.func_ids() {
            if module.func(func).uses.is_empty()
                && module.func(func).name != "main"
                && !ctor_funcs.contains(&func)
            {
                module.remove_function(func);
                removed += 1;
            }
        }

        tracing::debug!(inlined, removed, "inlining finished");
        Ok(if inlined + removed == 0 {
            PreservedAnalyses::All
        } else {
            PreservedAnalyses::None
        })
    }
}

/// A defined callee whose body contains no branch instruction: one block
/// ending in `ret`.
fn straight_line(module: &Module, callee: FuncId) -> bool {
    let data = module.func(callee);
    if data.is_declaration() || data.blocks.len() != 1 {
        return false;
    }
    for &block in &data.blocks {
        for &inst in &module.block(block).insts {
            if matches!(
                module.kind(inst),
                InstKind::Br { .. } | InstKind::CondBr { .. } | InstKind::Unreachable
            ) {
                return false;
            }
        }
    }
    true
}

fn resolve(map: &FxHashMap<InstId, Value>, callee: FuncId, args: &[Value], value: Value) -> Value {
    match value {
        Value::Inst(id) => map.get(&id).copied().unwrap_or(value),
        Value::Param(func, i) if func == callee => args[i as usize],
        _ => value,
    }
}

fn inline_call(module: &mut Module, call: InstId) -> Result<()> {
    let InstKind::Call { callee, args } = module.kind(call).clone() else {
        return Err(Error::Internal("inline target is not a call".into()));
    };
    let caller_block = module.inst(call).block;
    let caller = module.block(caller_block).func;
    let caller_entry = module
        .func(caller)
        .entry()
        .ok_or_else(|| Error::Internal("caller without an entry block".into()))?;

    let mut map: FxHashMap<InstId, Value> = FxHashMap::default();
    let mut ret_value: Option<Value> = None;

    for &block in &module.func(callee).blocks.clone() {
        for inst in module.block(block).insts.clone() {
            let kind = module.kind(inst).clone();
            match kind {
                InstKind::Ret { value } => {
                    ret_value = value.map(|v| resolve(&map, callee, &args, v));
                }
                InstKind::Alloca { ty } => {
                    let clone = module.insert_inst(caller_entry, 0, InstKind::Alloca { ty });
                    map.insert(inst, Value::Inst(clone));
                }
                mut kind => {
                    kind_map_operands(&mut kind, &map, callee, &args);
                    let pos = module
                        .block(caller_block)
                        .insts
                        .iter()
                        .position(|&i| i == call)
                        .ok_or_else(|| Error::Internal("call detached from its block".into()))?;
                    let clone = module.insert_inst(caller_block, pos, kind);
                    map.insert(inst, Value::Inst(clone));
                }
            }
        }
    }

    if let Some(value) = ret_value {
        module.replace_all_uses_with(call, value);
    }
    module.erase_inst(call);
    Ok(())
}

fn kind_map_operands(
    kind: &mut InstKind,
    map: &FxHashMap<InstId, Value>,
    callee: FuncId,
    args: &[Value],
) {
    let remap = |v: &mut Value| *v = resolve(map, callee, args, *v);
    match kind {
        InstKind::Load { ptr, .. } => remap(ptr),
        InstKind::Store { value, ptr } => {
            remap(value);
            remap(ptr);
        }
        InstKind::Binary { lhs, rhs, .. } | InstKind::ICmp { lhs, rhs, .. } => {
            remap(lhs);
            remap(rhs);
        }
        InstKind::Gep { base, indices, .. } => {
            remap(base);
            for idx in indices {
                remap(idx);
            }
        }
        InstKind::SExt { value, .. } => remap(value),
        InstKind::Call { args: call_args, .. } => {
            for arg in call_args {
                remap(arg);
            }
        }
        InstKind::Alloca { .. }
        | InstKind::Phi { .. }
        | InstKind::Br { .. }
        | InstKind::CondBr { .. }
        | InstKind::Ret { .. }
        | InstKind::Unreachable => {}
    }
}
