//! Strength reduction.
//!
//! `x * 2^k` becomes `x << k` (either operand side), and `x % 2^k` for a
//! positive power-of-two divisor becomes `x - ((x / 2^k) << k)`, which is
//! exact for all signed `x` because it reuses the (kept) signed division.
//! `sdiv` itself is never turned into a shift: an arithmetic right shift
//! rounds toward negative infinity and disagrees with C's
//! truncate-toward-zero for negative dividends.

use crate::error::Result;
use crate::ir::{BinOp, InstKind, Module, Value};

use super::{AnalysisCache, ModulePass, PreservedAnalyses};

pub struct StrengthReduction;

impl ModulePass for StrengthReduction {
    fn name(&self) -> &'static str {
        "strength-reduction"
    }

    fn run(&mut self, module: &mut Module, _cache: &mut AnalysisCache) -> Result<PreservedAnalyses> {
        let mut reduced = 0usize;
        for func in module.func_ids() {
            for block in module.func(func).blocks.clone() {
                for inst in module.block(block).insts.clone() {
                    if module.inst(inst).dead {
                        continue;
                    }
                    reduced += usize::from(reduce(module, inst));
                }
            }
        }
        tracing::debug!(reduced, "strength reduction finished");
        Ok(if reduced == 0 {
            PreservedAnalyses::All
        } else {
            PreservedAnalyses::None
        })
    }
}

/// `log2` of a positive power of two.
fn power_of_two_log(value: i64) -> Option<i64> {
    (value > 0 && value & (value - 1) == 0).then(|| i64::from(63 - value.leading_zeros() as i32))
}

fn reduce(module: &mut Module, inst: crate::ir::InstId) -> bool {
    let InstKind::Binary { op, lhs, rhs } = *module.kind(inst) else {
        return false;
    };
    let block = module.inst(inst).block;
    let pos = module
        .block(block)
        .insts
        .iter()
        .position(|&i| i == inst)
        .unwrap_or(0);
    let ty = module.value_type(lhs);

    match op {
        BinOp::Mul => {
            // One constant power-of-two operand, one non-constant.
            let (var, log) = match (lhs.as_const_int(), rhs.as_const_int()) {
                (None, Some(c)) => (lhs, power_of_two_log(c)),
                (Some(c), None) => (rhs, power_of_two_log(c)),
                _ => return false,
            };
            let Some(log) = log else { return false };
            let shift = module.insert_inst(
                block,
                pos + 1,
                InstKind::Binary {
                    op: BinOp::Shl,
                    lhs: var,
                    rhs: Value::ConstInt { ty, value: log },
                },
            );
            module.replace_all_uses_with(inst, Value::Inst(shift));
            module.erase_inst(inst);
            true
        }
        BinOp::SRem => {
            let Some(divisor) = rhs.as_const_int() else {
                return false;
            };
            if lhs.as_const_int().is_some() {
                return false;
            }
            let Some(log) = power_of_two_log(divisor) else {
                return false;
            };
            // x % 2^k  →  x - ((x / 2^k) << k)
            let quot = module.insert_inst(
                block,
                pos + 1,
                InstKind::Binary {
                    op: BinOp::SDiv,
                    lhs,
                    rhs: Value::ConstInt { ty, value: divisor },
                },
            );
            let shifted = module.insert_inst(
                block,
                pos + 2,
                InstKind::Binary {
                    op: BinOp::Shl,
                    lhs: Value::Inst(quot),
                    rhs: Value::ConstInt { ty, value: log },
                },
            );
            let diff = module.insert_inst(
                block,
                pos + 3,
                InstKind::Binary {
                    op: BinOp::Sub,
                    lhs,
                    rhs: Value::Inst(shifted),
                },
            );
            module.replace_all_uses_with(inst, Value::Inst(diff));
            module.erase_inst(inst);
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Builder, Linkage, verify_module};
    use crate::transform::run_pass;

    fn unary_fn(module: &mut Module) -> (crate::ir::FuncId, crate::ir::BlockId, Value) {
        let i32_ty = module.types.i32();
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
        (func, entry, Value::Param(func, 0))
    }

    #[test]
    fn multiply_by_power_of_two_becomes_shift() {
        let mut module = Module::new("t");
        let i32_ty = module.types.i32();
        let (_, entry, x) = unary_fn(&mut module);
        let mut b = Builder::new(&mut module);
        b.position_at_end(entry);
        let eight = b.const_int(i32_ty, 8);
        let m = b.build_binary(BinOp::Mul, x, eight);
        b.build_ret(m);

        let mut cache = AnalysisCache::default();
        run_pass(&mut StrengthReduction, &mut module, &mut cache).unwrap();
        verify_module(&module).unwrap();
        let insts = &module.block(entry).insts;
        assert_eq!(
            *module.kind(insts[0]),
            InstKind::Binary {
                op: BinOp::Shl,
                lhs: x,
                rhs: Value::ConstInt {
                    ty: i32_ty,
                    value: 3
                }
            }
        );
    }

    #[test]
    fn srem_by_power_of_two_expands() {
        let mut module = Module::new("t");
        let i32_ty = module.types.i32();
        let (_, entry, x) = unary_fn(&mut module);
        let mut b = Builder::new(&mut module);
        b.position_at_end(entry);
        let thirty_two = b.const_int(i32_ty, 32);
        let m = b.build_binary(BinOp::SRem, x, thirty_two);
        b.build_ret(m);

        let mut cache = AnalysisCache::default();
        run_pass(&mut StrengthReduction, &mut module, &mut cache).unwrap();
        verify_module(&module).unwrap();
        let kinds: Vec<_> = module
            .block(entry)
            .insts
            .iter()
            .map(|&i| match module.kind(i) {
                InstKind::Binary { op, .. } => format!("{op}"),
                InstKind::Ret { .. } => "ret".into(),
                _ => "other".into(),
            })
            .collect();
        assert_eq!(kinds, vec!["sdiv", "shl", "sub", "ret"]);
    }

    #[test]
    fn sdiv_is_left_alone() {
        let mut module = Module::new("t");
        let i32_ty = module.types.i32();
        let (_, entry, x) = unary_fn(&mut module);
        let mut b = Builder::new(&mut module);
        b.position_at_end(entry);
        let eight = b.const_int(i32_ty, 8);
        let d = b.build_binary(BinOp::SDiv, x, eight);
        b.build_ret(d);

        let mut cache = AnalysisCache::default();
        let changed = run_pass(&mut StrengthReduction, &mut module, &mut cache).unwrap();
        assert!(!changed);
    }

    #[test]
    fn non_power_of_two_is_left_alone() {
        assert_eq!(power_of_two_log(6), None);
        assert_eq!(power_of_two_log(-8), None);
        assert_eq!(power_of_two_log(0), None);
        assert_eq!(power_of_two_log(1), Some(0));
        assert_eq!(power_of_two_log(1024), Some(10));
    }
}
