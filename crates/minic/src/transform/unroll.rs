//! Full loop unrolling.
//!
//! A countable loop — single exiting block (the header), single latch, no
//! subloops, `i < N` header condition over a phi with a constant init and
//! a constant-step latch increment, trip count in (0, 80], and no other
//! conditional branches — is replaced by a straight-line block containing
//! the body copied once per iteration. The induction phi is substituted by
//! its constant per-iteration value and binary operations on constants
//! fold during the copy.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::analysis::{Loop, dominator_tree, loop_forest};
use crate::error::Result;
use crate::ir::{BinOp, BlockId, FuncId, ICmpPred, InstId, InstKind, Module, TypeId, Value};

use super::const_prop::{fold_binop, norm};
use super::{AnalysisCache, ModulePass, PreservedAnalyses};

/// Loops longer than this stay rolled.
const MAX_TRIP_COUNT: i64 = 80;

pub struct LoopUnroll;

impl ModulePass for LoopUnroll {
    fn name(&self) -> &'static str {
        "loop-unroll"
    }

    fn run(&mut self, module: &mut Module, _cache: &mut AnalysisCache) -> Result<PreservedAnalyses> {
        let mut unrolled = 0usize;
        for func in module.func_ids() {
            if module.func(func).is_declaration() {
                continue;
            }
            // One loop at a time; unrolling invalidates the loop forest.
            loop {
                let dom = dominator_tree(module, func);
                let forest = loop_forest(module, func, &dom);
                let mut innermost: Vec<&Loop> = Vec::new();
                collect_innermost(&forest, &mut innermost);
                let plan = innermost.iter().find_map(|lp| plan_unroll(module, lp));
                match plan {
                    Some(plan) => {
                        apply_unroll(module, func, &plan);
                        unrolled += 1;
                    }
                    None => break,
                }
            }
        }
        tracing::debug!(unrolled, "loop unrolling finished");
        Ok(if unrolled == 0 {
            PreservedAnalyses::All
        } else {
            PreservedAnalyses::None
        })
    }
}

fn collect_innermost<'f>(forest: &'f [Loop], out: &mut Vec<&'f Loop>) {
    for lp in forest {
        if lp.sub_loops.is_empty() {
            out.push(lp);
        } else {
            collect_innermost(&lp.sub_loops, out);
        }
    }
}

struct UnrollPlan {
    header: BlockId,
    preheader: BlockId,
    exit: BlockId,
    /// Loop body blocks in execution order (header excluded).
    chain: Vec<BlockId>,
    loop_blocks: Vec<BlockId>,
    /// Header phis with their preheader and latch incoming values.
    phis: Vec<(InstId, Value, Value)>,
    increment: InstId,
    induction_ty: TypeId,
    init: i64,
    step: i64,
    trips: i64,
}

fn plan_unroll(module: &Module, lp: &Loop) -> Option<UnrollPlan> {
    let header = lp.header;
    let preheader = lp.preheader(module)?;
    let latch = lp.latch()?;
    if lp.exiting_block(module)? != header {
        return None;
    }
    let exit = lp.exit_block(module)?;

    // Header terminator: `br i1 (icmp slt %i, N), body, exit`.
    let term = module.terminator(header)?;
    let InstKind::CondBr {
        cond,
        then_dest,
        else_dest,
    } = *module.kind(term)
    else {
        return None;
    };
    if else_dest != exit || !lp.contains(then_dest) {
        return None;
    }
    let cmp = cond.as_inst()?;
    let InstKind::ICmp {
        pred: ICmpPred::Slt,
        lhs,
        rhs,
    } = *module.kind(cmp)
    else {
        return None;
    };
    let induction = lhs.as_inst()?;
    if module.inst(induction).block != header
        || !matches!(module.kind(induction), InstKind::Phi { .. })
    {
        return None;
    }
    let bound = rhs.as_const_int()?;

    // No comparisons (hence no conditional branches) outside the header,
    // and only plain data flow in the latch.
    for &block in lp.blocks() {
        for &inst in &module.block(block).insts {
            if matches!(module.kind(inst), InstKind::ICmp { .. }) && block != header {
                return None;
            }
        }
    }
    for &inst in &module.block(latch).insts {
        if !matches!(
            module.kind(inst),
            InstKind::Load { .. }
                | InstKind::Store { .. }
                | InstKind::Binary { .. }
                | InstKind::Gep { .. }
                | InstKind::SExt { .. }
                | InstKind::Call { .. }
                | InstKind::Br { .. }
        ) {
            return None;
        }
    }

    // Collect header phis and find the induction increment.
    let mut phis: Vec<(InstId, Value, Value)> = Vec::new();
    let mut increment: Option<InstId> = None;
    let mut init: Option<i64> = None;
    let mut induction_ty = None;
    for &inst in &module.block(header).insts {
        let InstKind::Phi { ty, incomings } = module.kind(inst) else {
            break;
        };
        let mut from_pre = None;
        let mut from_latch = None;
        for &(value, block) in incomings {
            if block == preheader {
                from_pre = Some(value);
            } else if block == latch {
                from_latch = Some(value);
            } else {
                return None;
            }
        }
        let (pre, back) = (from_pre?, from_latch?);
        if inst == induction {
            init = Some(pre.as_const_int()?);
            induction_ty = Some(*ty);
            let add = back.as_inst()?;
            let InstKind::Binary {
                op: BinOp::Add,
                lhs,
                rhs,
            } = *module.kind(add)
            else {
                return None;
            };
            if lhs != Value::Inst(induction) {
                return None;
            }
            let _step = rhs.as_const_int()?;
            increment = Some(add);
        }
        phis.push((inst, pre, back));
    }
    let increment = increment?;
    let init = init?;
    let induction_ty = induction_ty?;
    let InstKind::Binary { rhs: step_v, .. } = *module.kind(increment) else {
        return None;
    };
    let step = step_v.as_const_int()?;
    if step <= 0 {
        return None;
    }

    // Latch-fed phi values must not be other header phis (a cyclic
    // permutation the copy map cannot express).
    let phi_set: FxHashSet<InstId> = phis.iter().map(|&(p, _, _)| p).collect();
    for &(_, _, back) in &phis {
        if back.as_inst().is_some_and(|b| phi_set.contains(&b) ) {
            return None;
        }
    }

    let diff = bound - init;
    let trips = diff.div_euclid(step) + i64::from(diff.rem_euclid(step) != 0);
    if trips <= 0 || trips > MAX_TRIP_COUNT {
        return None;
    }

    // The body must be a straight chain from the branch target back to
    // the header, covering the whole loop.
    let mut chain = Vec::new();
    let mut cur = then_dest;
    let mut seen = FxHashSet::default();
    loop {
        if !seen.insert(cur) {
            return None;
        }
        chain.push(cur);
        let succs = module.successors(cur);
        let [next] = succs.as_slice() else {
            return None;
        };
        if *next == header {
            break;
        }
        cur = *next;
    }
    if chain.len() + 1 != lp.blocks().len() {
        return None;
    }

    Some(UnrollPlan {
        header,
        preheader,
        exit,
        chain,
        loop_blocks: lp.blocks().to_vec(),
        phis,
        increment,
        induction_ty,
        init,
        step,
        trips,
    })
}

fn resolve(map: &FxHashMap<InstId, Value>, value: Value) -> Value {
    match value {
        Value::Inst(id) => map.get(&id).copied().unwrap_or(value),
        _ => value,
    }
}

fn apply_unroll(module: &mut Module, func: FuncId, plan: &UnrollPlan) {
    let unrolled = module.add_block_before(func, plan.header, "unroll");

    // Enter the straight-line copy instead of the loop.
    if let Some(term) = module.terminator(plan.preheader) {
        module.mutate_inst(term, |kind| {
            if let InstKind::Br { target } = kind {
                *target = unrolled;
            }
        });
    }

    let mut map: FxHashMap<InstId, Value> = FxHashMap::default();
    for &(phi, pre, _) in &plan.phis {
        map.insert(phi, pre);
    }

    let bits = module.types.bit_width(plan.induction_ty).unwrap_or(32);
    for t in 0..plan.trips {
        for &block in &plan.chain {
            for inst in module.block(block).insts.clone() {
                let kind = module.kind(inst).clone();
                if kind.is_terminator() {
                    continue;
                }
                if inst == plan.increment {
                    let value = norm(bits, plan.init.wrapping_add((t + 1).wrapping_mul(plan.step)));
                    map.insert(
                        inst,
                        Value::ConstInt {
                            ty: plan.induction_ty,
                            value,
                        },
                    );
                    continue;
                }
                copy_inst(module, unrolled, inst, kind, &mut map);
            }
        }
        // Next iteration reads the latch-fed values.
        for &(phi, _, back) in &plan.phis {
            let value = resolve(&map, back);
            map.insert(phi, value);
        }
    }
    module.push_inst(
        unrolled,
        InstKind::Br {
            target: plan.exit,
        },
    );

    // Rewire every external user of a loop value to its final copy, then
    // retire the loop blocks.
    for &block in &plan.loop_blocks {
        for inst in module.block(block).insts.clone() {
            if let Some(&value) = map.get(&inst) {
                module.replace_all_uses_with(inst, value);
            }
        }
    }
    module.retarget_phi_edges(plan.exit, plan.header, unrolled);
    for &block in &plan.loop_blocks {
        module.erase_block(block);
    }
}

fn copy_inst(
    module: &mut Module,
    dest: BlockId,
    original: InstId,
    kind: InstKind,
    map: &mut FxHashMap<InstId, Value>,
) {
    match kind {
        InstKind::Binary { op, lhs, rhs } => {
            let l = resolve(map, lhs);
            let r = resolve(map, rhs);
            if let (Some(lc), Some(rc)) = (l.as_const_int(), r.as_const_int()) {
                let ty = module.value_type(l);
                if let Some(bits) = module.types.bit_width(ty)
                    && let Some(value) = fold_binop(op, bits, lc, rc)
                {
                    map.insert(original, Value::ConstInt { ty, value });
                    return;
                }
            }
            let clone = module.push_inst(dest, InstKind::Binary { op, lhs: l, rhs: r });
            map.insert(original, Value::Inst(clone));
        }
        InstKind::SExt { value, ty } => {
            let v = resolve(map, value);
            if let Some(c) = v.as_const_int() {
                let src_bits = module.types.bit_width(module.value_type(v)).unwrap_or(64);
                let dst_bits = module.types.bit_width(ty).unwrap_or(64);
                let widened = if src_bits == 1 { c & 1 } else { c };
                map.insert(
                    original,
                    Value::ConstInt {
                        ty,
                        value: norm(dst_bits, widened),
                    },
                );
                return;
            }
            let clone = module.push_inst(dest, InstKind::SExt { value: v, ty });
            map.insert(original, Value::Inst(clone));
        }
        InstKind::Load { ty, ptr } => {
            let ptr = resolve(map, ptr);
            let clone = module.push_inst(dest, InstKind::Load { ty, ptr });
            map.insert(original, Value::Inst(clone));
        }
        InstKind::Store { value, ptr } => {
            let value = resolve(map, value);
            let ptr = resolve(map, ptr);
            module.push_inst(dest, InstKind::Store { value, ptr });
        }
        InstKind::Gep {
            source_ty,
            base,
            indices,
        } => {
            let base = resolve(map, base);
            let indices = indices.iter().map(|&idx| resolve(map, idx)).collect();
            let clone = module.push_inst(
                dest,
                InstKind::Gep {
                    source_ty,
                    base,
                    indices,
                },
            );
            map.insert(original, Value::Inst(clone));
        }
        InstKind::Call { callee, args } => {
            let args = args.iter().map(|&arg| resolve(map, arg)).collect();
            let clone = module.push_inst(dest, InstKind::Call { callee, args });
            map.insert(original, Value::Inst(clone));
        }
        // ICmp and phi bodies are rejected during planning; terminators
        // are skipped by the caller.
        _ => {}
    }
}
