//! Constant propagation.
//!
//! Two cooperating rewrites:
//!
//! 1. Loads of globals that are never stored to anywhere in the module
//!    are replaced by their constant integer initializer.
//! 2. Instructions whose operands are all constant integers (`BinOp`,
//!    `ICmp`, `SExt`) fold to an immediate, iterated to a local fixed
//!    point. Division and remainder by zero are left alone.
//!
//! Arithmetic wraps at the operand bit width, matching two's-complement
//! execution.

use rustc_hash::FxHashSet;

use crate::analysis::eval_icmp;
use crate::error::Result;
use crate::ir::{BinOp, Constant, GlobalId, InstKind, Module, Value};

use super::{AnalysisCache, ModulePass, PreservedAnalyses};

pub struct ConstantPropagation;

impl ModulePass for ConstantPropagation {
    fn name(&self) -> &'static str {
        "constant-propagation"
    }

    fn run(&mut self, module: &mut Module, _cache: &mut AnalysisCache) -> Result<PreservedAnalyses> {
        let globals = propagate_globals(module);
        let folded = fold_instructions(module);
        tracing::debug!(globals, folded, "constant propagation finished");
        Ok(if globals + folded == 0 {
            PreservedAnalyses::All
        } else {
            PreservedAnalyses::None
        })
    }
}

/// Sign-extend `value` from `bits` into the i64 carrier; `i1` carries 0/1.
#[must_use]
pub fn norm(bits: u32, value: i64) -> i64 {
    match bits {
        1 => value & 1,
        64 => value,
        _ => {
            let shift = 64 - bits;
            (value << shift) >> shift
        }
    }
}

/// Fold a binary operation at a given width. `None` when the operation is
/// not foldable (division by zero, out-of-range shift).
#[must_use]
pub fn fold_binop(op: BinOp, bits: u32, lhs: i64, rhs: i64) -> Option<i64> {
    let raw = match op {
        BinOp::Add => lhs.wrapping_add(rhs),
        BinOp::Sub => lhs.wrapping_sub(rhs),
        BinOp::Mul => lhs.wrapping_mul(rhs),
        BinOp::SDiv => {
            if rhs == 0 {
                return None;
            }
            lhs.wrapping_div(rhs)
        }
        BinOp::SRem => {
            if rhs == 0 {
                return None;
            }
            lhs.wrapping_rem(rhs)
        }
        BinOp::Shl => {
            if !(0..i64::from(bits)).contains(&rhs) {
                return None;
            }
            lhs.wrapping_shl(rhs as u32)
        }
        BinOp::AShr => {
            if !(0..i64::from(bits)).contains(&rhs) {
                return None;
            }
            lhs.wrapping_shr(rhs as u32)
        }
        BinOp::And => lhs & rhs,
        BinOp::Or => lhs | rhs,
    };
    Some(norm(bits, raw))
}

fn propagate_globals(module: &mut Module) -> usize {
    // A store anywhere (including synthesized constructors) disqualifies
    // the global.
    let mut modified: FxHashSet<GlobalId> = FxHashSet::default();
    for func in module.func_ids() {
        for &block in &module.func(func).blocks {
            for &inst in &module.block(block).insts {
                if let InstKind::Store { ptr, .. } = module.kind(inst)
                    && let Some(global) = ptr.as_global()
                {
                    modified.insert(global);
                }
            }
        }
    }

    let mut replaced = 0usize;
    for func in module.func_ids() {
        for block in module.func(func).blocks.clone() {
            for inst in module.block(block).insts.clone() {
                if module.inst(inst).dead {
                    continue;
                }
                let InstKind::Load { ptr, .. } = *module.kind(inst) else {
                    continue;
                };
                let Some(global) = ptr.as_global() else {
                    continue;
                };
                if modified.contains(&global) {
                    continue;
                }
                if let Some(Constant::Int { ty, value }) = module.global(global).init {
                    module.replace_all_uses_with(inst, Value::ConstInt { ty, value });
                    module.erase_inst(inst);
                    replaced += 1;
                }
            }
        }
    }
    replaced
}

fn fold_instructions(module: &mut Module) -> usize {
    let mut folded = 0usize;
    loop {
        let mut round = 0usize;
        for func in module.func_ids() {
            for block in module.func(func).blocks.clone() {
                for inst in module.block(block).insts.clone() {
                    if module.inst(inst).dead {
                        continue;
                    }
                    if let Some(value) = fold_inst(module, inst) {
                        module.replace_all_uses_with(inst, value);
                        module.erase_inst(inst);
                        round += 1;
                    }
                }
            }
        }
        folded += round;
        if round == 0 {
            return folded;
        }
    }
}

fn fold_inst(module: &Module, inst: crate::ir::InstId) -> Option<Value> {
    match *module.kind(inst) {
        InstKind::Binary { op, lhs, rhs } => {
            let l = lhs.as_const_int()?;
            let r = rhs.as_const_int()?;
            let ty = module.value_type(lhs);
            let bits = module.types.bit_width(ty)?;
            let value = fold_binop(op, bits, l, r)?;
            Some(Value::ConstInt { ty, value })
        }
        InstKind::ICmp { pred, lhs, rhs } => {
            let l = lhs.as_const_int()?;
            let r = rhs.as_const_int()?;
            Some(Value::ConstInt {
                ty: module.types.i1(),
                value: i64::from(eval_icmp(pred, l, r)),
            })
        }
        InstKind::SExt { value, ty } => {
            let v = value.as_const_int()?;
            let src_bits = module.types.bit_width(module.value_type(value))?;
            let dst_bits = module.types.bit_width(ty)?;
            // i1 widens to 0/1, everything else sign-extends; narrowing
            // truncates.
            let widened = if src_bits == 1 { v & 1 } else { v };
            Some(Value::ConstInt {
                ty,
                value: norm(dst_bits, widened),
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Builder, Linkage};
    use crate::transform::run_pass;

    #[test]
    fn folds_constant_expressions_to_ret() {
        let mut module = Module::new("t");
        let i32_ty = module.types.i32();
        let fn_ty = module.types.func(i32_ty, vec![]);
        let func = module.add_function("main", fn_ty, Linkage::External, vec![]);
        let entry = module.add_block(func, "entry");
        let mut b = Builder::new(&mut module);
        b.position_at_end(entry);
        let one = b.const_int(i32_ty, 1);
        let two = b.const_int(i32_ty, 2);
        let add = b.build_binary(BinOp::Add, one, two);
        let mul = b.build_binary(BinOp::Mul, add, two);
        b.build_ret(mul);

        let mut cache = AnalysisCache::default();
        run_pass(&mut ConstantPropagation, &mut module, &mut cache).unwrap();
        let insts = &module.block(entry).insts;
        assert_eq!(insts.len(), 1);
        assert_eq!(
            *module.kind(insts[0]),
            InstKind::Ret {
                value: Some(Value::ConstInt {
                    ty: i32_ty,
                    value: 6
                })
            }
        );
    }

    #[test]
    fn unmodified_global_loads_fold_to_initializer() {
        let mut module = Module::new("t");
        let i32_ty = module.types.i32();
        let global = module.add_global(
            "g",
            i32_ty,
            Linkage::External,
            Some(Constant::Int {
                ty: i32_ty,
                value: 7,
            }),
            false,
        );
        let fn_ty = module.types.func(i32_ty, vec![]);
        let func = module.add_function("main", fn_ty, Linkage::External, vec![]);
        let entry = module.add_block(func, "entry");
        let mut b = Builder::new(&mut module);
        b.position_at_end(entry);
        let load = b.build_load(i32_ty, Value::Global(global));
        b.build_ret(load);

        let mut cache = AnalysisCache::default();
        run_pass(&mut ConstantPropagation, &mut module, &mut cache).unwrap();
        let insts = &module.block(entry).insts;
        assert_eq!(insts.len(), 1);
        assert_eq!(
            *module.kind(insts[0]),
            InstKind::Ret {
                value: Some(Value::ConstInt {
                    ty: i32_ty,
                    value: 7
                })
            }
        );
    }

    #[test]
    fn stored_global_is_not_propagated() {
        let mut module = Module::new("t");
        let i32_ty = module.types.i32();
        let global = module.add_global(
            "g",
            i32_ty,
            Linkage::External,
            Some(Constant::Int {
                ty: i32_ty,
                value: 7,
            }),
            false,
        );
        let fn_ty = module.types.func(i32_ty, vec![]);
        let func = module.add_function("main", fn_ty, Linkage::External, vec![]);
        let entry = module.add_block(func, "entry");
        let mut b = Builder::new(&mut module);
        b.position_at_end(entry);
        let nine = b.const_int(i32_ty, 9);
        b.build_store(nine, Value::Global(global));
        let load = b.build_load(i32_ty, Value::Global(global));
        b.build_ret(load);

        let mut cache = AnalysisCache::default();
        run_pass(&mut ConstantPropagation, &mut module, &mut cache).unwrap();
        assert!(
            module
                .block(entry)
                .insts
                .iter()
                .any(|&i| matches!(module.kind(i), InstKind::Load { .. }))
        );
    }

    #[test]
    fn division_by_zero_is_left_alone() {
        assert_eq!(fold_binop(BinOp::SDiv, 32, 5, 0), None);
        assert_eq!(fold_binop(BinOp::SRem, 32, 5, 0), None);
        assert_eq!(fold_binop(BinOp::Add, 32, i64::from(i32::MAX), 1), Some(i64::from(i32::MIN)));
    }
}
