//! Loop-invariant code motion.
//!
//! Loops are processed innermost first. A fixed-point sweep classifies
//! instructions whose operands are defined outside the loop (or already
//! classified invariant); a classified instruction is hoisted when it is
//! safe to execute speculatively or its block dominates every exiting
//! block. Loads additionally require that nothing in the loop (including
//! anything reachable through calls) stores to their address; calls
//! require an idempotent callee. Hoisted instructions land in the loop
//! preheader in their original order. A missing preheader is synthesized
//! first.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::analysis::{DomTree, Loop, dominator_tree, loop_forest};
use crate::error::Result;
use crate::ir::{BinOp, BlockId, FuncId, InstId, InstKind, Module, Value};

use super::{AnalysisCache, ModulePass, PreservedAnalyses};

pub struct LoopInvariantCodeMotion;

impl ModulePass for LoopInvariantCodeMotion {
    fn name(&self) -> &'static str {
        "licm"
    }

    fn run(&mut self, module: &mut Module, _cache: &mut AnalysisCache) -> Result<PreservedAnalyses> {
        let mut hoisted = 0usize;
        let mut synthesized = 0usize;
        for func in module.func_ids() {
            if module.func(func).is_declaration() {
                continue;
            }
            synthesized += ensure_preheaders(module, func);
            let dom = dominator_tree(module, func);
            let forest = loop_forest(module, func, &dom);
            let mut ctx = Hoister {
                module: &mut *module,
                dom: &dom,
                visited: FxHashSet::default(),
                idempotent: FxHashMap::default(),
            };
            for lp in &forest {
                hoisted += ctx.process_loop(lp);
            }
        }
        tracing::debug!(hoisted, synthesized, "licm finished");
        Ok(if hoisted + synthesized == 0 {
            PreservedAnalyses::All
        } else {
            PreservedAnalyses::None
        })
    }
}

/// Create missing preheaders: a fresh block that becomes the unique
/// loop-external predecessor of each loop header. Returns how many were
/// created.
fn ensure_preheaders(module: &mut Module, func: FuncId) -> usize {
    let mut created = 0usize;
    loop {
        let dom = dominator_tree(module, func);
        let forest = loop_forest(module, func, &dom);
        let mut headers: Vec<BlockId> = Vec::new();
        let mut stack: Vec<&Loop> = forest.iter().collect();
        while let Some(lp) = stack.pop() {
            if lp.preheader(module).is_none() {
                headers.push(lp.header);
            }
            stack.extend(lp.sub_loops.iter());
        }
        let Some(&header) = headers.first() else {
            return created;
        };
        // Recompute the loop for this header to get a fresh block set.
        let dom = dominator_tree(module, func);
        let forest = loop_forest(module, func, &dom);
        let Some(lp) = find_loop(&forest, header) else {
            return created;
        };
        synthesize_preheader(module, func, lp);
        created += 1;
    }
}

fn find_loop<'f>(forest: &'f [Loop], header: BlockId) -> Option<&'f Loop> {
    for lp in forest {
        if lp.header == header {
            return Some(lp);
        }
        if let Some(found) = find_loop(&lp.sub_loops, header) {
            return Some(found);
        }
    }
    None
}

fn synthesize_preheader(module: &mut Module, func: FuncId, lp: &Loop) {
    let header = lp.header;
    let preds = module.predecessors(func);
    let outside: Vec<BlockId> = preds
        .get(&header)
        .map_or(&[][..], Vec::as_slice)
        .iter()
        .copied()
        .filter(|p| !lp.contains(*p))
        .collect();

    let preheader = module.add_block_before(func, header, "preheader");

    // Retarget every loop-external edge into the header.
    for &pred in &outside {
        if let Some(term) = module.terminator(pred) {
            module.mutate_inst(term, |kind| match kind {
                InstKind::Br { target } => {
                    if *target == header {
                        *target = preheader;
                    }
                }
                InstKind::CondBr {
                    then_dest,
                    else_dest,
                    ..
                } => {
                    if *then_dest == header {
                        *then_dest = preheader;
                    }
                    if *else_dest == header {
                        *else_dest = preheader;
                    }
                }
                _ => {}
            });
        }
    }

    // Reroute header phi entries from the external predecessors through
    // the new block, merging multiple entries with a phi of their own.
    for inst in module.block(header).insts.clone() {
        let InstKind::Phi { ty, incomings } = module.kind(inst).clone() else {
            break;
        };
        let external: Vec<(Value, BlockId)> = incomings
            .iter()
            .copied()
            .filter(|&(_, b)| outside.contains(&b))
            .collect();
        match external.as_slice() {
            [] => {}
            [(value, _)] => {
                let value = *value;
                module.mutate_inst(inst, |kind| {
                    if let InstKind::Phi { incomings, .. } = kind {
                        incomings.retain(|&(_, b)| !outside.contains(&b));
                        incomings.push((value, preheader));
                    }
                });
            }
            _ => {
                let merge = module.insert_inst(
                    preheader,
                    0,
                    InstKind::Phi {
                        ty,
                        incomings: external.clone(),
                    },
                );
                module.mutate_inst(inst, |kind| {
                    if let InstKind::Phi { incomings, .. } = kind {
                        incomings.retain(|&(_, b)| !outside.contains(&b));
                        incomings.push((Value::Inst(merge), preheader));
                    }
                });
            }
        }
    }

    module.push_inst(preheader, InstKind::Br { target: header });
}

struct Hoister<'a> {
    module: &'a mut Module,
    dom: &'a DomTree,
    /// Blocks already handled by an inner loop.
    visited: FxHashSet<BlockId>,
    idempotent: FxHashMap<FuncId, bool>,
}

impl Hoister<'_> {
    fn process_loop(&mut self, lp: &Loop) -> usize {
        let mut hoisted = 0usize;
        for sub in &lp.sub_loops {
            hoisted += self.process_loop(sub);
        }

        let mut invariant: Vec<InstId> = Vec::new();
        let mut inv_set: FxHashSet<InstId> = FxHashSet::default();
        let exiting = lp.exiting_blocks(self.module);
        loop {
            let mut grew = false;
            for &block in lp.blocks() {
                if self.visited.contains(&block) {
                    continue;
                }
                for inst in self.module.block(block).insts.clone() {
                    if inv_set.contains(&inst) || self.module.inst(inst).dead {
                        continue;
                    }
                    if self.is_invariant(inst, lp, &inv_set, &exiting) {
                        invariant.push(inst);
                        inv_set.insert(inst);
                        grew = true;
                    }
                }
            }
            if !grew {
                break;
            }
        }

        if let Some(preheader) = lp.preheader(self.module) {
            for inst in &invariant {
                let pos = self
                    .module
                    .terminator(preheader)
                    .and_then(|t| {
                        self.module
                            .block(preheader)
                            .insts
                            .iter()
                            .position(|&i| i == t)
                    })
                    .unwrap_or_else(|| self.module.block(preheader).insts.len());
                self.module.move_inst(*inst, preheader, pos);
                hoisted += 1;
            }
        }

        for &block in lp.blocks() {
            self.visited.insert(block);
        }
        hoisted
    }

    fn is_invariant(
        &mut self,
        inst: InstId,
        lp: &Loop,
        inv_set: &FxHashSet<InstId>,
        exiting: &[BlockId],
    ) -> bool {
        let block = self.module.inst(inst).block;
        match self.module.kind(inst).clone() {
            // Control flow, comparisons feeding branches, widening casts
            // and allocas stay where they are.
            InstKind::Phi { .. }
            | InstKind::Br { .. }
            | InstKind::CondBr { .. }
            | InstKind::Ret { .. }
            | InstKind::Unreachable
            | InstKind::ICmp { .. }
            | InstKind::SExt { .. }
            | InstKind::Alloca { .. } => false,
            InstKind::Binary { op, lhs, rhs } => {
                if !self.operand_invariant(lhs, lp, inv_set)
                    || !self.operand_invariant(rhs, lp, inv_set)
                {
                    return false;
                }
                // Division can trap; only hoist when it runs on every
                // iteration anyway.
                let speculatable = !matches!(op, BinOp::SDiv | BinOp::SRem)
                    || matches!(rhs.as_const_int(), Some(c) if c != 0);
                speculatable || self.dominates_all(block, exiting)
            }
            InstKind::Gep { base, indices, .. } => {
                self.operand_invariant(base, lp, inv_set)
                    && indices
                        .iter()
                        .all(|&idx| self.operand_invariant(idx, lp, inv_set))
            }
            InstKind::Load { ptr, .. } => {
                self.operand_invariant(ptr, lp, inv_set)
                    && !self.address_written_in_loop(ptr, lp)
            }
            InstKind::Store { value, ptr } => {
                self.dominates_all(block, exiting)
                    && self.operand_invariant(value, lp, inv_set)
                    && self.operand_invariant(ptr, lp, inv_set)
            }
            InstKind::Call { callee, args } => {
                if self.module.func(callee).is_declaration() {
                    return false;
                }
                if !self.call_idempotent(callee, &args) {
                    return false;
                }
                args.iter()
                    .all(|&arg| self.operand_invariant(arg, lp, inv_set))
            }
        }
    }

    fn dominates_all(&self, block: BlockId, exiting: &[BlockId]) -> bool {
        exiting.iter().all(|&e| self.dom.dominates(block, e))
    }

    /// Defined outside the loop or already classified invariant.
    fn operand_invariant(&self, value: Value, lp: &Loop, inv_set: &FxHashSet<InstId>) -> bool {
        match value {
            Value::Inst(inst) => {
                if matches!(self.module.kind(inst), InstKind::Alloca { .. }) {
                    return true;
                }
                let block = self.module.inst(inst).block;
                !lp.contains(block) || inv_set.contains(&inst)
            }
            _ => true,
        }
    }

    /// Strip GEPs down to the underlying base address.
    fn root_address(&self, mut value: Value) -> Value {
        while let Some(inst) = value.as_inst() {
            match self.module.kind(inst) {
                InstKind::Gep { base, .. } => value = *base,
                _ => break,
            }
        }
        value
    }

    /// Whether anything inside the loop (including through calls) may
    /// store to the address' root.
    fn address_written_in_loop(&mut self, ptr: Value, lp: &Loop) -> bool {
        let root = self.root_address(ptr);
        for &block in lp.blocks() {
            for &inst in &self.module.block(block).insts.clone() {
                match self.module.kind(inst).clone() {
                    InstKind::Store { ptr: dest, .. } => {
                        if self.root_address(dest) == root {
                            return true;
                        }
                    }
                    InstKind::Call { callee, args } => {
                        let mut seen = FxHashSet::default();
                        if self.call_may_write(callee, &args, root, &mut seen) {
                            return true;
                        }
                    }
                    _ => {}
                }
            }
        }
        false
    }

    fn call_may_write(
        &self,
        callee: FuncId,
        args: &[Value],
        root: Value,
        seen: &mut FxHashSet<FuncId>,
    ) -> bool {
        // Passing the address (or a projection of it) hands out write
        // access.
        for &arg in args {
            if arg == root || self.root_address(arg) == root {
                return true;
            }
        }
        let Value::Global(_) = root else {
            return false;
        };
        if !seen.insert(callee) {
            return false;
        }
        for &block in &self.module.func(callee).blocks {
            for &inst in &self.module.block(block).insts {
                match self.module.kind(inst) {
                    InstKind::Store { ptr, .. } => {
                        if self.root_address(*ptr) == root {
                            return true;
                        }
                    }
                    InstKind::Call {
                        callee: inner,
                        args: inner_args,
                    } => {
                        if self.call_may_write(*inner, inner_args, root, seen) {
                            return true;
                        }
                    }
                    _ => {}
                }
            }
        }
        false
    }

    /// A call is idempotent when no argument aliases memory and the
    /// callee (transitively) writes neither globals nor through pointers.
    /// The callee under analysis is tentatively idempotent to break
    /// recursion.
    fn call_idempotent(&mut self, callee: FuncId, args: &[Value]) -> bool {
        for &arg in args {
            match arg {
                Value::Global(_) => return false,
                Value::Inst(inst)
                    if matches!(self.module.kind(inst), InstKind::Gep { .. }) =>
                {
                    return false;
                }
                _ => {}
            }
        }
        self.callee_idempotent(callee)
    }

    fn callee_idempotent(&mut self, callee: FuncId) -> bool {
        if let Some(&known) = self.idempotent.get(&callee) {
            return known;
        }
        if self.module.func(callee).is_declaration() {
            self.idempotent.insert(callee, true);
            return true;
        }
        self.idempotent.insert(callee, true);
        let mut verdict = true;
        'scan: for &block in &self.module.func(callee).blocks.clone() {
            for inst in self.module.block(block).insts.clone() {
                match self.module.kind(inst).clone() {
                    InstKind::Gep { .. } => {
                        verdict = false;
                        break 'scan;
                    }
                    InstKind::Store { ptr, .. } => {
                        let writes_memory = ptr.as_global().is_some()
                            || ptr
                                .as_inst()
                                .is_some_and(|p| matches!(self.module.kind(p), InstKind::Gep { .. }));
                        if writes_memory {
                            verdict = false;
                            break 'scan;
                        }
                    }
                    InstKind::Load { ptr, .. } => {
                        if ptr
                            .as_inst()
                            .is_some_and(|p| matches!(self.module.kind(p), InstKind::Gep { .. }))
                        {
                            verdict = false;
                            break 'scan;
                        }
                    }
                    InstKind::Call { callee: inner, args } => {
                        if !self.call_idempotent(inner, &args) {
                            verdict = false;
                            break 'scan;
                        }
                    }
                    _ => {}
                }
            }
        }
        self.idempotent.insert(callee, verdict);
        verdict
    }
}
