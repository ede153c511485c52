//! Property tests: the pipeline folds arbitrary constant expressions to
//! the interpreted value, and never produces ill-formed IR doing so.

use minic::asg::{Expr, TypeExpr};
use minic::ir::InstKind;
use minic::test_support::*;
use minic::{emit_ir, run_default_pipeline, verify_module};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Tree {
    Leaf(i32),
    Add(Box<Tree>, Box<Tree>),
    Sub(Box<Tree>, Box<Tree>),
    Mul(Box<Tree>, Box<Tree>),
    Neg(Box<Tree>),
}

fn tree_strategy() -> impl Strategy<Value = Tree> {
    let leaf = any::<i32>().prop_map(Tree::Leaf);
    leaf.prop_recursive(4, 24, 3, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone())
                .prop_map(|(a, b)| Tree::Add(Box::new(a), Box::new(b))),
            (inner.clone(), inner.clone())
                .prop_map(|(a, b)| Tree::Sub(Box::new(a), Box::new(b))),
            (inner.clone(), inner.clone())
                .prop_map(|(a, b)| Tree::Mul(Box::new(a), Box::new(b))),
            inner.prop_map(|a| Tree::Neg(Box::new(a))),
        ]
    })
}

/// Two's-complement reference semantics.
fn eval(tree: &Tree) -> i32 {
    match tree {
        Tree::Leaf(v) => *v,
        Tree::Add(a, b) => eval(a).wrapping_add(eval(b)),
        Tree::Sub(a, b) => eval(a).wrapping_sub(eval(b)),
        Tree::Mul(a, b) => eval(a).wrapping_mul(eval(b)),
        Tree::Neg(a) => eval(a).wrapping_neg(),
    }
}

fn to_expr(tree: &Tree) -> Expr {
    match tree {
        Tree::Leaf(v) => lit(i64::from(*v)),
        Tree::Add(a, b) => add(to_expr(a), to_expr(b)),
        Tree::Sub(a, b) => sub(to_expr(a), to_expr(b)),
        Tree::Mul(a, b) => mul(to_expr(a), to_expr(b)),
        Tree::Neg(a) => neg(to_expr(a)),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// `int main() { return <tree>; }` optimizes to `ret <eval(tree)>`.
    #[test]
    fn pipeline_folds_to_interpreted_value(tree in tree_strategy()) {
        let tu = translation_unit([func(
            "main",
            TypeExpr::Int,
            vec![],
            block([ret(to_expr(&tree))]),
        )]);
        let mut module = emit_ir(&tu, "prop").unwrap();
        verify_module(&module).expect("emitted module is well formed");
        run_default_pipeline(&mut module).unwrap();
        verify_module(&module).expect("optimized module is well formed");

        let main = module.find_function("main").unwrap();
        let blocks = &module.func(main).blocks;
        prop_assert_eq!(blocks.len(), 1);
        let insts = &module.block(blocks[0]).insts;
        prop_assert_eq!(insts.len(), 1);
        let InstKind::Ret { value: Some(value) } = *module.kind(insts[0]) else {
            return Err(TestCaseError::fail("expected a ret of a value"));
        };
        prop_assert_eq!(value.as_const_int(), Some(i64::from(eval(&tree))));
    }

    /// Emission is deterministic for arbitrary expression bodies.
    #[test]
    fn emission_is_deterministic(tree in tree_strategy()) {
        let make = || {
            let tu = translation_unit([func(
                "main",
                TypeExpr::Int,
                vec![],
                block([ret(to_expr(&tree))]),
            )]);
            emit_ir(&tu, "prop").unwrap().to_string()
        };
        prop_assert_eq!(make(), make());
    }
}
