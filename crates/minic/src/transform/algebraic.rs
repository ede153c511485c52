//! Algebraic identities.
//!
//! `x+0`, `0+x`, `x-0`, `x*1`, `1*x`, `x*0`, `0*x`, `0/x`, `x/1`, `x%1`
//! simplify without touching the other operand. Signed division by zero on
//! the `0/x` rule follows the source language's undefined behavior: the
//! quotient is folded to zero regardless of `x`.

use crate::error::Result;
use crate::ir::{BinOp, InstKind, Module, Value};

use super::{AnalysisCache, ModulePass, PreservedAnalyses};

pub struct AlgebraicIdentities;

impl ModulePass for AlgebraicIdentities {
    fn name(&self) -> &'static str {
        "algebraic-identities"
    }

    fn run(&mut self, module: &mut Module, _cache: &mut AnalysisCache) -> Result<PreservedAnalyses> {
        let mut simplified = 0usize;
        for func in module.func_ids() {
            for block in module.func(func).blocks.clone() {
                for inst in module.block(block).insts.clone() {
                    if module.inst(inst).dead {
                        continue;
                    }
                    let InstKind::Binary { op, lhs, rhs } = *module.kind(inst) else {
                        continue;
                    };
                    if let Some(value) = simplify(module, op, lhs, rhs) {
                        module.replace_all_uses_with(inst, value);
                        module.erase_inst(inst);
                        simplified += 1;
                    }
                }
            }
        }
        tracing::debug!(simplified, "algebraic identities finished");
        Ok(if simplified == 0 {
            PreservedAnalyses::All
        } else {
            PreservedAnalyses::None
        })
    }
}

fn simplify(module: &Module, op: BinOp, lhs: Value, rhs: Value) -> Option<Value> {
    let lc = lhs.as_const_int();
    let rc = rhs.as_const_int();
    let ty = module.value_type(lhs);
    let zero = Value::ConstInt { ty, value: 0 };
    match op {
        BinOp::Add => match (lc, rc) {
            (_, Some(0)) => Some(lhs),
            (Some(0), _) => Some(rhs),
            _ => None,
        },
        BinOp::Sub => (rc == Some(0)).then_some(lhs),
        BinOp::Mul => match (lc, rc) {
            (_, Some(1)) => Some(lhs),
            (Some(1), _) => Some(rhs),
            (_, Some(0)) | (Some(0), _) => Some(zero),
            _ => None,
        },
        BinOp::SDiv => match (lc, rc) {
            (Some(0), _) => Some(zero),
            (_, Some(1)) => Some(lhs),
            _ => None,
        },
        BinOp::SRem => (rc == Some(1)).then_some(zero),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Builder, Linkage};
    use crate::transform::run_pass;

    #[test]
    fn removes_identity_operations() {
        let mut module = Module::new("t");
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
        let x = Value::Param(func, 0);
        let mut b = Builder::new(&mut module);
        b.position_at_end(entry);
        let zero = b.const_int(i32_ty, 0);
        let one = b.const_int(i32_ty, 1);
        let a = b.build_binary(BinOp::Add, x, zero); // x + 0 → x
        let m = b.build_binary(BinOp::Mul, a, one); // (x+0) * 1 → x
        let d = b.build_binary(BinOp::SDiv, m, one); // x / 1 → x
        b.build_ret(d);

        let mut cache = AnalysisCache::default();
        let changed = run_pass(&mut AlgebraicIdentities, &mut module, &mut cache).unwrap();
        assert!(changed);
        let insts = &module.block(entry).insts;
        assert_eq!(insts.len(), 1);
        assert_eq!(*module.kind(insts[0]), InstKind::Ret { value: Some(x) });
    }

    #[test]
    fn multiply_by_zero_folds_to_zero() {
        let mut module = Module::new("t");
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
        let x = Value::Param(func, 0);
        let mut b = Builder::new(&mut module);
        b.position_at_end(entry);
        let zero = b.const_int(i32_ty, 0);
        let m = b.build_binary(BinOp::Mul, x, zero);
        b.build_ret(m);

        let mut cache = AnalysisCache::default();
        run_pass(&mut AlgebraicIdentities, &mut module, &mut cache).unwrap();
        let insts = &module.block(entry).insts;
        assert_eq!(
            *module.kind(insts[0]),
            InstKind::Ret {
                value: Some(Value::ConstInt {
                    ty: i32_ty,
                    value: 0
                })
            }
        );
    }
}
