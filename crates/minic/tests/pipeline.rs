//! End-to-end pipeline behavior on small programs.

use minic::analysis::{dominator_tree, loop_forest};
use minic::asg::TypeExpr;
use minic::ir::{InstKind, Module, Value};
use minic::test_support::*;
use minic::{emit_ir, run_default_pipeline, verify_module};

fn int() -> TypeExpr {
    TypeExpr::Int
}

fn optimized(tu: &minic::asg::TranslationUnit) -> Module {
    let mut module = emit_ir(tu, "pipeline").unwrap();
    verify_module(&module).unwrap();
    run_default_pipeline(&mut module).unwrap();
    verify_module(&module).unwrap();
    module
}

fn single_block_ret(module: &Module, name: &str) -> Option<i64> {
    let func = module.find_function(name)?;
    let blocks = &module.func(func).blocks;
    if blocks.len() != 1 {
        return None;
    }
    let insts = &module.block(blocks[0]).insts;
    let last = *insts.last()?;
    match *module.kind(last) {
        InstKind::Ret { value: Some(value) } => value.as_const_int(),
        _ => None,
    }
}

/// `int main(){ return 1+2; }` → `ret i32 3`.
#[test]
fn constant_expression_folds_to_ret() {
    let tu = translation_unit([func(
        "main",
        int(),
        vec![],
        block([ret(add(lit(1), lit(2)))]),
    )]);
    let module = optimized(&tu);
    assert_eq!(single_block_ret(&module, "main"), Some(3));
}

/// `int g=0; int main(){ g=5; return g; }` → the store to the observable
/// global stays, the load forwards to 5.
#[test]
fn global_store_survives_and_load_forwards() {
    let tu = translation_unit([
        global("g", int(), Some(lit(0))),
        func(
            "main",
            int(),
            vec![],
            block([
                expr_stmt(assign(var("g", int()), lit(5))),
                ret(rv(var("g", int()))),
            ]),
        ),
    ]);
    let module = optimized(&tu);
    let main = module.find_function("main").unwrap();
    let blocks = &module.func(main).blocks;
    assert_eq!(blocks.len(), 1);
    let insts = &module.block(blocks[0]).insts;
    assert_eq!(insts.len(), 2);
    let g = module.find_global("g").unwrap();
    assert_eq!(
        *module.kind(insts[0]),
        InstKind::Store {
            value: Value::ConstInt {
                ty: module.types.i32(),
                value: 5
            },
            ptr: Value::Global(g),
        }
    );
    assert_eq!(
        *module.kind(insts[1]),
        InstKind::Ret {
            value: Some(Value::ConstInt {
                ty: module.types.i32(),
                value: 5
            })
        }
    );
}

/// Scenario 4: the counted loop fully unrolls and folds to `ret i32 6`.
#[test]
fn counted_loop_reduces_to_a_constant() {
    let tu = translation_unit([func(
        "main",
        int(),
        vec![],
        block([
            decl_stmt("s", int(), Some(lit(0))),
            decl_stmt("i", int(), Some(lit(0))),
            while_stmt(
                lt(rv(var("i", int())), lit(4)),
                block([
                    expr_stmt(assign(
                        var("s", int()),
                        add(rv(var("s", int())), rv(var("i", int()))),
                    )),
                    expr_stmt(assign(
                        var("i", int()),
                        add(rv(var("i", int())), lit(1)),
                    )),
                ]),
            ),
            ret(rv(var("s", int()))),
        ]),
    )]);
    let module = optimized(&tu);
    assert_eq!(single_block_ret(&module, "main"), Some(6));
}

/// Scenario 5: with a dynamic bound the loop survives, but the invariant
/// `a[0]` load sits outside it.
#[test]
fn invariant_load_is_hoisted_out_of_the_surviving_loop() {
    let a_ptr = TypeExpr::Ptr(Box::new(int()));
    let arr = TypeExpr::Array(Box::new(int()), 4);
    let tu = translation_unit([
        global("data", arr.clone(), Some(init_list([lit(1), lit(2)]))),
        func(
            "f",
            int(),
            vec![param("a", a_ptr.clone()), param("n", int())],
            block([
                decl_stmt("s", int(), Some(lit(0))),
                decl_stmt("i", int(), Some(lit(0))),
                while_stmt(
                    lt(rv(var("i", int())), rv(var("n", int()))),
                    block([
                        expr_stmt(assign(
                            var("s", int()),
                            add(
                                rv(var("s", int())),
                                rv(index(rv(var("a", a_ptr.clone())), lit(0))),
                            ),
                        )),
                        expr_stmt(assign(
                            var("i", int()),
                            add(rv(var("i", int())), lit(1)),
                        )),
                    ]),
                ),
                ret(rv(var("s", int()))),
            ]),
        ),
        func(
            "main",
            int(),
            vec![],
            block([ret(call(
                "f",
                [decay(var("data", arr.clone())), lit(3)],
                int(),
            ))]),
        ),
    ]);
    let module = optimized(&tu);
    let f = module.find_function("f").expect("f is called, so it stays");
    let dom = dominator_tree(&module, f);
    let forest = loop_forest(&module, f, &dom);
    assert_eq!(forest.len(), 1);
    let lp = &forest[0];
    for &block in lp.blocks() {
        for &inst in &module.block(block).insts {
            assert!(
                !matches!(module.kind(inst), InstKind::Load { .. }),
                "loads must be hoisted out of the loop"
            );
        }
    }
}

/// Scenario 6: `add` inlines into `main`, folds, and disappears.
#[test]
fn straight_line_callee_inlines_and_folds() {
    let tu = translation_unit([
        func(
            "add",
            int(),
            vec![param("x", int()), param("y", int())],
            block([ret(add(rv(var("x", int())), rv(var("y", int()))))]),
        ),
        func(
            "main",
            int(),
            vec![],
            block([ret(call("add", [lit(2), lit(3)], int()))]),
        ),
    ]);
    let module = optimized(&tu);
    assert_eq!(single_block_ret(&module, "main"), Some(5));
    assert!(module.find_function("add").is_none());
}

/// Strength reduction shows up in the final IR: `n * 8` ends as a shift.
#[test]
fn multiplication_by_power_of_two_ends_as_shift() {
    let tu = translation_unit([func(
        "main",
        int(),
        vec![param("n", int())],
        block([ret(mul(rv(var("n", int())), lit(8)))]),
    )]);
    let module = optimized(&tu);
    let text = module.to_string();
    assert!(text.contains("shl i32"), "expected a shift in:\n{text}");
    assert!(!text.contains("mul i32"));
}

/// The pipeline is idempotent beyond its fixed point.
#[test]
fn pipeline_is_idempotent() {
    let programs = [
        translation_unit([func(
            "main",
            int(),
            vec![],
            block([
                decl_stmt("s", int(), Some(lit(0))),
                decl_stmt("i", int(), Some(lit(0))),
                while_stmt(
                    lt(rv(var("i", int())), lit(10)),
                    block([
                        expr_stmt(assign(
                            var("s", int()),
                            add(rv(var("s", int())), rv(var("i", int()))),
                        )),
                        expr_stmt(assign(
                            var("i", int()),
                            add(rv(var("i", int())), lit(2)),
                        )),
                    ]),
                ),
                ret(rv(var("s", int()))),
            ]),
        )]),
        translation_unit([
            global("g", int(), Some(lit(1))),
            func(
                "main",
                int(),
                vec![param("a", int()), param("b", int())],
                block([
                    if_else(
                        logical_and(rv(var("a", int())), rv(var("b", int()))),
                        block([ret(rv(var("g", int())))]),
                        block([ret(lit(0))]),
                    ),
                ]),
            ),
        ]),
    ];
    for tu in &programs {
        let mut module = emit_ir(tu, "idem").unwrap();
        run_default_pipeline(&mut module).unwrap();
        let once = module.to_string();
        run_default_pipeline(&mut module).unwrap();
        let twice = module.to_string();
        pretty_assertions::assert_eq!(once, twice);
    }
}

/// A constructor-initialized global is not constant-propagated, and the
/// constructor body survives the pipeline.
#[test]
fn constructor_initialized_global_is_preserved() {
    let tu = translation_unit([
        global("base", int(), Some(lit(3))),
        global("derived", int(), Some(add(rv(var("base", int())), lit(1)))),
        func(
            "main",
            int(),
            vec![],
            block([ret(rv(var("derived", int())))]),
        ),
    ]);
    let module = optimized(&tu);
    assert_eq!(module.ctors.len(), 1);
    let ctor = module.ctors[0].0;
    assert!(!module.func(ctor).is_declaration());
    // main still loads @derived: the ctor stores to it at startup.
    let main = module.find_function("main").unwrap();
    let entry = module.func(main).entry().unwrap();
    assert!(
        module
            .block(entry)
            .insts
            .iter()
            .any(|&i| matches!(module.kind(i), InstKind::Load { .. }))
    );
}
