//! Typed abstract semantic graph consumed by IR emission.
//!
//! This is the interface to the external front-end: a resolved, typed
//! representation of a C subset. Every expression node carries its type,
//! and implicit conversions (lvalue loads, integral widening, array decay)
//! appear as explicit [`CastKind`] nodes so the lowering rules are total.

/// A source-level type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeExpr {
    /// 32-bit `int`.
    Int,
    /// 8-bit `char`.
    Char,
    /// 32-bit `long`.
    Long,
    /// 64-bit `long long`.
    LongLong,
    Void,
    Ptr(Box<TypeExpr>),
    Array(Box<TypeExpr>, u64),
    Func {
        ret: Box<TypeExpr>,
        params: Vec<TypeExpr>,
    },
}

impl TypeExpr {
    /// Element type behind a pointer or array, if any.
    #[must_use]
    pub fn element(&self) -> Option<&TypeExpr> {
        match self {
            TypeExpr::Ptr(inner) | TypeExpr::Array(inner, _) => Some(inner),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(self, TypeExpr::Array(..))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    /// Logical `!`.
    Not,
    Neg,
    Pos,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Assign,
    /// Array subscript `a[i]`.
    Index,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LogicalAnd,
    LogicalOr,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CastKind {
    LValueToRValue,
    IntegralCast,
    ArrayToPointerDecay,
    FunctionToPointerDecay,
    NoOp,
}

#[derive(Clone, Debug)]
pub struct Expr {
    pub ty: TypeExpr,
    pub kind: ExprKind,
}

#[derive(Clone, Debug)]
pub enum ExprKind {
    IntLit(i64),
    /// Reference to a named declaration; lowers to its address.
    DeclRef(String),
    Paren(Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Cast(CastKind, Box<Expr>),
    /// Braced initializer; only valid as a declaration initializer.
    InitList(Vec<Expr>),
    /// Zero-fill sentinel inside an initializer list.
    ImplicitInit,
}

#[derive(Clone, Debug)]
pub enum Stmt {
    Compound(Vec<Stmt>),
    Return(Option<Expr>),
    Null,
    Decl(Vec<VarDecl>),
    Expr(Expr),
    If {
        cond: Expr,
        then_stmt: Box<Stmt>,
        else_stmt: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    Break,
    Continue,
}

#[derive(Clone, Debug)]
pub struct VarDecl {
    pub name: String,
    pub ty: TypeExpr,
    pub init: Option<Expr>,
}

#[derive(Clone, Debug)]
pub struct Param {
    pub name: String,
    pub ty: TypeExpr,
}

#[derive(Clone, Debug)]
pub struct FunctionDecl {
    pub name: String,
    pub ret: TypeExpr,
    pub params: Vec<Param>,
    pub body: Option<Stmt>,
}

#[derive(Clone, Debug)]
pub enum Decl {
    Var(VarDecl),
    Func(FunctionDecl),
}

#[derive(Clone, Debug, Default)]
pub struct TranslationUnit {
    pub decls: Vec<Decl>,
}
