//! ASG construction helpers for tests.
//!
//! Building a typed ASG by hand is noisy; these helpers keep test inputs
//! close to the source they describe:
//!
//! ```rust
//! use minic::test_support::*;
//! use minic::asg::TypeExpr;
//!
//! let int = TypeExpr::Int;
//! let main = func(
//!     "main",
//!     int.clone(),
//!     vec![],
//!     block([ret(add(lit(1), lit(2)))]),
//! );
//! let module = minic::emit_ir(&translation_unit([main]), "demo").unwrap();
//! assert!(module.to_string().contains("define i32 @main()"));
//! ```
//!
//! Only available in tests or with the `test-support` feature.

use crate::asg::{
    BinaryOp, CastKind, Decl, Expr, ExprKind, FunctionDecl, Param, Stmt, TranslationUnit, TypeExpr,
    UnaryOp, VarDecl,
};

// ── Expressions ──

#[must_use]
pub fn lit(value: i64) -> Expr {
    Expr {
        ty: TypeExpr::Int,
        kind: ExprKind::IntLit(value),
    }
}

#[must_use]
pub fn lit_ty(value: i64, ty: TypeExpr) -> Expr {
    Expr {
        ty,
        kind: ExprKind::IntLit(value),
    }
}

/// A reference to a named declaration (an lvalue).
#[must_use]
pub fn var(name: &str, ty: TypeExpr) -> Expr {
    Expr {
        ty,
        kind: ExprKind::DeclRef(name.to_owned()),
    }
}

/// Wrap an lvalue in the implicit load.
#[must_use]
pub fn rv(e: Expr) -> Expr {
    Expr {
        ty: e.ty.clone(),
        kind: ExprKind::Cast(CastKind::LValueToRValue, Box::new(e)),
    }
}

/// Array-to-pointer decay.
#[must_use]
pub fn decay(e: Expr) -> Expr {
    let elem = e
        .ty
        .element()
        .cloned()
        .unwrap_or(TypeExpr::Int);
    Expr {
        ty: TypeExpr::Ptr(Box::new(elem)),
        kind: ExprKind::Cast(CastKind::ArrayToPointerDecay, Box::new(e)),
    }
}

/// Integral widening/narrowing cast.
#[must_use]
pub fn int_cast(e: Expr, ty: TypeExpr) -> Expr {
    Expr {
        ty,
        kind: ExprKind::Cast(CastKind::IntegralCast, Box::new(e)),
    }
}

/// `base[idx]` (an lvalue of the element type).
#[must_use]
pub fn index(base: Expr, idx: Expr) -> Expr {
    let elem = base
        .ty
        .element()
        .cloned()
        .unwrap_or(TypeExpr::Int);
    Expr {
        ty: elem,
        kind: ExprKind::Binary(BinaryOp::Index, Box::new(base), Box::new(idx)),
    }
}

#[must_use]
pub fn assign(lhs: Expr, rhs: Expr) -> Expr {
    Expr {
        ty: lhs.ty.clone(),
        kind: ExprKind::Binary(BinaryOp::Assign, Box::new(lhs), Box::new(rhs)),
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr {
        ty: lhs.ty.clone(),
        kind: ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)),
    }
}

#[must_use]
pub fn add(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Add, lhs, rhs)
}

#[must_use]
pub fn sub(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Sub, lhs, rhs)
}

#[must_use]
pub fn mul(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Mul, lhs, rhs)
}

#[must_use]
pub fn div(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Div, lhs, rhs)
}

#[must_use]
pub fn rem(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Rem, lhs, rhs)
}

fn compare(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr {
        ty: TypeExpr::Int,
        kind: ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)),
    }
}

#[must_use]
pub fn lt(lhs: Expr, rhs: Expr) -> Expr {
    compare(BinaryOp::Lt, lhs, rhs)
}

#[must_use]
pub fn le(lhs: Expr, rhs: Expr) -> Expr {
    compare(BinaryOp::Le, lhs, rhs)
}

#[must_use]
pub fn gt(lhs: Expr, rhs: Expr) -> Expr {
    compare(BinaryOp::Gt, lhs, rhs)
}

#[must_use]
pub fn ge(lhs: Expr, rhs: Expr) -> Expr {
    compare(BinaryOp::Ge, lhs, rhs)
}

#[must_use]
pub fn eq(lhs: Expr, rhs: Expr) -> Expr {
    compare(BinaryOp::Eq, lhs, rhs)
}

#[must_use]
pub fn ne(lhs: Expr, rhs: Expr) -> Expr {
    compare(BinaryOp::Ne, lhs, rhs)
}

#[must_use]
pub fn logical_and(lhs: Expr, rhs: Expr) -> Expr {
    compare(BinaryOp::LogicalAnd, lhs, rhs)
}

#[must_use]
pub fn logical_or(lhs: Expr, rhs: Expr) -> Expr {
    compare(BinaryOp::LogicalOr, lhs, rhs)
}

#[must_use]
pub fn not(e: Expr) -> Expr {
    Expr {
        ty: TypeExpr::Int,
        kind: ExprKind::Unary(UnaryOp::Not, Box::new(e)),
    }
}

#[must_use]
pub fn neg(e: Expr) -> Expr {
    Expr {
        ty: e.ty.clone(),
        kind: ExprKind::Unary(UnaryOp::Neg, Box::new(e)),
    }
}

/// `callee(args...)`, resolving the callee by name.
#[must_use]
pub fn call(callee: &str, args: impl IntoIterator<Item = Expr>, ret: TypeExpr) -> Expr {
    let callee_expr = Expr {
        ty: TypeExpr::Func {
            ret: Box::new(ret.clone()),
            params: vec![],
        },
        kind: ExprKind::DeclRef(callee.to_owned()),
    };
    Expr {
        ty: ret,
        kind: ExprKind::Call {
            callee: Box::new(callee_expr),
            args: args.into_iter().collect(),
        },
    }
}

#[must_use]
pub fn init_list(items: impl IntoIterator<Item = Expr>) -> Expr {
    Expr {
        ty: TypeExpr::Int,
        kind: ExprKind::InitList(items.into_iter().collect()),
    }
}

#[must_use]
pub fn implicit_init() -> Expr {
    Expr {
        ty: TypeExpr::Int,
        kind: ExprKind::ImplicitInit,
    }
}

// ── Statements ──

#[must_use]
pub fn block(stmts: impl IntoIterator<Item = Stmt>) -> Stmt {
    Stmt::Compound(stmts.into_iter().collect())
}

#[must_use]
pub fn expr_stmt(e: Expr) -> Stmt {
    Stmt::Expr(e)
}

#[must_use]
pub fn ret(e: Expr) -> Stmt {
    Stmt::Return(Some(e))
}

#[must_use]
pub fn ret_void() -> Stmt {
    Stmt::Return(None)
}

#[must_use]
pub fn decl_stmt(name: &str, ty: TypeExpr, init: Option<Expr>) -> Stmt {
    Stmt::Decl(vec![VarDecl {
        name: name.to_owned(),
        ty,
        init,
    }])
}

#[must_use]
pub fn if_stmt(cond: Expr, then_stmt: Stmt) -> Stmt {
    Stmt::If {
        cond,
        then_stmt: Box::new(then_stmt),
        else_stmt: None,
    }
}

#[must_use]
pub fn if_else(cond: Expr, then_stmt: Stmt, else_stmt: Stmt) -> Stmt {
    Stmt::If {
        cond,
        then_stmt: Box::new(then_stmt),
        else_stmt: Some(Box::new(else_stmt)),
    }
}

#[must_use]
pub fn while_stmt(cond: Expr, body: Stmt) -> Stmt {
    Stmt::While {
        cond,
        body: Box::new(body),
    }
}

#[must_use]
pub fn break_stmt() -> Stmt {
    Stmt::Break
}

#[must_use]
pub fn continue_stmt() -> Stmt {
    Stmt::Continue
}

// ── Declarations ──

#[must_use]
pub fn param(name: &str, ty: TypeExpr) -> Param {
    Param {
        name: name.to_owned(),
        ty,
    }
}

#[must_use]
pub fn func(name: &str, ret: TypeExpr, params: Vec<Param>, body: Stmt) -> Decl {
    Decl::Func(FunctionDecl {
        name: name.to_owned(),
        ret,
        params,
        body: Some(body),
    })
}

#[must_use]
pub fn func_decl(name: &str, ret: TypeExpr, params: Vec<Param>) -> Decl {
    Decl::Func(FunctionDecl {
        name: name.to_owned(),
        ret,
        params,
        body: None,
    })
}

#[must_use]
pub fn global(name: &str, ty: TypeExpr, init: Option<Expr>) -> Decl {
    Decl::Var(VarDecl {
        name: name.to_owned(),
        ty,
        init,
    })
}

#[must_use]
pub fn translation_unit(decls: impl IntoIterator<Item = Decl>) -> TranslationUnit {
    TranslationUnit {
        decls: decls.into_iter().collect(),
    }
}
