//! ASG → IR lowering.
//!
//! Walks a typed translation unit and produces a fully-populated module:
//! one function per function declaration, one global per file-scope
//! variable. Control flow is emitted in SSA-ready form (allocas + loads +
//! stores; mem2reg introduces phis later).
//!
//! # Short-circuit emission
//!
//! `&&`/`||` keep a stack of pending conditional edges: the lhs of a
//! short-circuit operator is lowered into a `CondBr` whose "stop checking"
//! target is unknown until the enclosing `if`/`while` materializes its
//! blocks. Each pending edge stores the condition with the polarity
//! "true = continue to the next check", so committing one is always
//! `CondBr(cond, rhs_check, other)`: `other` is the false target for an
//! `&&` lhs and the true target for an `||` lhs. Operators commit
//! opposite-kind edges pushed while lowering their own lhs (depth marks,
//! not "most recent"), and the enclosing statement drains the rest once
//! its targets exist.
//!
//! # Terminator policy
//!
//! After `return`/`break`/`continue` the emitter opens a fresh unnamed
//! block for the (dead) statements that follow; control-flow
//! simplification removes those blocks later. Blocks parked on the
//! break/continue stacks are terminated by the enclosing `while`.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::asg::{
    BinaryOp, CastKind, Decl, Expr, ExprKind, FunctionDecl, Stmt, TranslationUnit, TypeExpr,
    UnaryOp, VarDecl,
};
use crate::error::{Error, Result};
use crate::ir::{
    BinOp, BlockId, Builder, Constant, FuncId, ICmpPred, Linkage, Module, ParamData, TypeId, Value,
};

/// Lower a translation unit into a fresh module.
pub fn emit_ir(tu: &TranslationUnit, module_id: &str) -> Result<Module> {
    let mut module = Module::new(module_id);
    let mut emitter = Emitter::new(&mut module);
    emitter.translation_unit(tu)?;
    drop(emitter);
    tracing::debug!(module = module_id, "emitted IR module");
    Ok(module)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum EdgeKind {
    AndLhs,
    OrLhs,
}

struct PendingEdge {
    source: BlockId,
    /// True means "continue to the next check".
    cond: Value,
    kind: EdgeKind,
    rhs: BlockId,
}

struct Emitter<'m> {
    b: Builder<'m>,
    scopes: Vec<FxHashMap<String, Value>>,
    cur_func: Option<FuncId>,
    entry_block: Option<BlockId>,
    /// Insertion index for the next alloca in the entry block.
    alloca_pos: usize,
    loop_depth: usize,
    break_blocks: Vec<BlockId>,
    continue_blocks: Vec<BlockId>,
    /// Blocks parked on the break/continue stacks; they must not receive
    /// a fall-through branch from an enclosing `if`.
    pending_term: FxHashSet<BlockId>,
    sc_stack: Vec<PendingEdge>,
}

impl<'m> Emitter<'m> {
    fn new(module: &'m mut Module) -> Self {
        Self {
            b: Builder::new(module),
            scopes: Vec::new(),
            cur_func: None,
            entry_block: None,
            alloca_pos: 0,
            loop_depth: 0,
            break_blocks: Vec::new(),
            continue_blocks: Vec::new(),
            pending_term: FxHashSet::default(),
            sc_stack: Vec::new(),
        }
    }

    fn translation_unit(&mut self, tu: &TranslationUnit) -> Result<()> {
        for decl in &tu.decls {
            match decl {
                Decl::Var(var) => self.global_var(var)?,
                Decl::Func(func) => self.function_decl(func)?,
            }
        }
        Ok(())
    }

    // ── Small helpers ──

    fn cur_block(&self) -> BlockId {
        self.b
            .current_block()
            .expect("emitter has an insertion block")
    }

    fn new_block(&mut self, name: &str) -> BlockId {
        let func = self.cur_func.expect("emitter is inside a function");
        self.b.module().add_block(func, name)
    }

    fn has_terminator(&self, block: BlockId) -> bool {
        self.b.module_ref().block_has_terminator(block)
    }

    fn lower_type(&mut self, ty: &TypeExpr) -> Result<TypeId> {
        let types = &mut self.b.module().types;
        Ok(match ty {
            TypeExpr::Int | TypeExpr::Long => types.i32(),
            TypeExpr::Char => types.i8(),
            TypeExpr::LongLong => types.i64(),
            TypeExpr::Void => types.void(),
            TypeExpr::Ptr(_) => types.ptr(),
            TypeExpr::Array(elem, len) => {
                let elem = self.lower_type(elem)?;
                self.b.module().types.array(elem, *len)
            }
            TypeExpr::Func { ret, params } => {
                let ret = self.lower_type(ret)?;
                let params = params
                    .iter()
                    .map(|p| self.lower_type(p))
                    .collect::<Result<Vec<_>>>()?;
                self.b.module().types.func(ret, params)
            }
        })
    }

    fn zero_value(&self, ty: TypeId) -> Value {
        let types = &self.b.module_ref().types;
        if types.is_int(ty) {
            Value::ConstInt { ty, value: 0 }
        } else if matches!(types.get(ty), crate::ir::Type::Ptr) {
            Value::NullPtr
        } else {
            Value::Undef(ty)
        }
    }

    /// Allocate a stack slot in the function entry block, keeping all
    /// allocas grouped at its top.
    fn alloc_local(&mut self, ty: TypeId) -> Value {
        let entry = self.entry_block.expect("emitter is inside a function");
        let pos = self.alloca_pos;
        self.alloca_pos += 1;
        self.b.build_alloca_in(entry, pos, ty)
    }

    /// Coerce an integer value to `i1` with `icmp ne v, 0`.
    fn to_bool(&mut self, value: Value) -> Value {
        let ty = self.b.module_ref().value_type(value);
        if ty == self.b.module_ref().types.i1() {
            return value;
        }
        let zero = Value::ConstInt { ty, value: 0 };
        self.b.build_icmp(ICmpPred::Ne, value, zero)
    }

    /// Coerce and invert: `icmp eq v, 0`.
    fn to_bool_inverted(&mut self, value: Value) -> Value {
        let ty = self.b.module_ref().value_type(value);
        let zero = Value::ConstInt { ty, value: 0 };
        self.b.build_icmp(ICmpPred::Eq, value, zero)
    }

    // ── Short-circuit plumbing ──

    /// Commit pending edges of `kind` pushed at or above `mark`; their
    /// remaining target is now known to be `other`.
    fn commit_kind(&mut self, mark: usize, kind: EdgeKind, other: BlockId) {
        let mut kept = Vec::new();
        for edge in self.sc_stack.split_off(mark) {
            if edge.kind == kind {
                self.b.push_point();
                self.b.position_at_end(edge.source);
                self.b.build_cond_br(edge.cond, edge.rhs, other);
                self.b.pop_point();
            } else {
                kept.push(edge);
            }
        }
        self.sc_stack.extend(kept);
    }

    /// Drain every pending edge at or above `mark` now that both branch
    /// targets of the enclosing condition exist.
    fn drain(&mut self, mark: usize, true_target: BlockId, false_target: BlockId) {
        self.commit_kind(mark, EdgeKind::AndLhs, false_target);
        self.commit_kind(mark, EdgeKind::OrLhs, true_target);
    }

    /// Lower an expression in a context where pending short-circuit edges
    /// must not escape (statement boundaries, initializers).
    fn rvalue_expr(&mut self, e: &Expr) -> Result<Value> {
        let mark = self.sc_stack.len();
        let value = self.expr(e)?;
        if self.sc_stack.len() != mark {
            return Err(Error::Unsupported(
                "short-circuit operator outside a branch condition".into(),
            ));
        }
        Ok(value)
    }

    // ── Expressions ──

    fn expr(&mut self, e: &Expr) -> Result<Value> {
        match &e.kind {
            ExprKind::IntLit(v) => {
                let ty = self.lower_type(&e.ty)?;
                Ok(Value::ConstInt { ty, value: *v })
            }
            ExprKind::DeclRef(name) => self.decl_ref(name),
            ExprKind::Paren(inner) => self.expr(inner),
            ExprKind::Unary(op, inner) => self.unary(*op, inner),
            ExprKind::Binary(op, lhs, rhs) => self.binary(*op, lhs, rhs, e),
            ExprKind::Call { callee, args } => self.call(callee, args),
            ExprKind::Cast(kind, inner) => self.cast(*kind, inner, e),
            ExprKind::InitList(_) | ExprKind::ImplicitInit => Err(Error::InvalidInput(
                "initializer list outside a declaration".into(),
            )),
        }
    }

    /// The address (or handle) of a named declaration.
    fn decl_ref(&mut self, name: &str) -> Result<Value> {
        for scope in self.scopes.iter().rev() {
            if let Some(&value) = scope.get(name) {
                return Ok(value);
            }
        }
        if let Some(global) = self.b.module_ref().find_global(name) {
            return Ok(Value::Global(global));
        }
        if let Some(func) = self.b.module_ref().find_function(name) {
            return Ok(Value::Func(func));
        }
        Err(Error::InvalidInput(format!("unresolved reference '{name}'")))
    }

    fn unary(&mut self, op: UnaryOp, inner: &Expr) -> Result<Value> {
        let value = self.expr(inner)?;
        Ok(match op {
            UnaryOp::Not => {
                let b = self.to_bool(value);
                let i1 = self.b.module_ref().types.i1();
                let fls = Value::ConstInt { ty: i1, value: 0 };
                self.b.build_icmp(ICmpPred::Eq, b, fls)
            }
            UnaryOp::Neg => {
                let ty = self.b.module_ref().value_type(value);
                let zero = Value::ConstInt { ty, value: 0 };
                self.b.build_binary(BinOp::Sub, zero, value)
            }
            UnaryOp::Pos => value,
        })
    }

    fn binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr, whole: &Expr) -> Result<Value> {
        match op {
            BinaryOp::Assign => {
                let value = self.expr(rhs)?;
                let addr = self.expr(lhs)?;
                self.b.build_store(value, addr);
                Ok(value)
            }
            BinaryOp::Index => {
                let base = self.expr(lhs)?;
                let idx = self.expr(rhs)?;
                let i64_ty = self.b.module_ref().types.i64();
                // Constant indices are materialized at i64 directly; only
                // computed indices need a widening instruction.
                let idx = if self.b.module_ref().value_type(idx) == i64_ty {
                    idx
                } else if let Some(value) = idx.as_const_int() {
                    Value::ConstInt { ty: i64_ty, value }
                } else {
                    self.b.build_sext(idx, i64_ty)
                };
                let elem_ty = self.lower_type(&whole.ty)?;
                Ok(self.b.build_gep(elem_ty, base, [idx]))
            }
            BinaryOp::Add
            | BinaryOp::Sub
            | BinaryOp::Mul
            | BinaryOp::Div
            | BinaryOp::Rem => {
                let l = self.expr(lhs)?;
                let r = self.expr(rhs)?;
                let op = match op {
                    BinaryOp::Add => BinOp::Add,
                    BinaryOp::Sub => BinOp::Sub,
                    BinaryOp::Mul => BinOp::Mul,
                    BinaryOp::Div => BinOp::SDiv,
                    _ => BinOp::SRem,
                };
                Ok(self.b.build_binary(op, l, r))
            }
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => {
                let l = self.expr(lhs)?;
                let r = self.expr(rhs)?;
                let pred = match op {
                    BinaryOp::Eq => ICmpPred::Eq,
                    BinaryOp::Ne => ICmpPred::Ne,
                    BinaryOp::Lt => ICmpPred::Slt,
                    BinaryOp::Le => ICmpPred::Sle,
                    BinaryOp::Gt => ICmpPred::Sgt,
                    _ => ICmpPred::Sge,
                };
                Ok(self.b.build_icmp(pred, l, r))
            }
            BinaryOp::LogicalAnd => {
                let mark = self.sc_stack.len();
                let va = self.expr(lhs)?;
                let va = self.to_bool(va);
                let source = self.cur_block();
                let rhs_bb = self.new_block("land.rhs");
                // An `||` inside our lhs continues into this check once
                // its lhs is true.
                self.commit_kind(mark, EdgeKind::OrLhs, rhs_bb);
                self.sc_stack.push(PendingEdge {
                    source,
                    cond: va,
                    kind: EdgeKind::AndLhs,
                    rhs: rhs_bb,
                });
                self.b.position_at_end(rhs_bb);
                self.expr(rhs)
            }
            BinaryOp::LogicalOr => {
                let mark = self.sc_stack.len();
                let va = self.expr(lhs)?;
                let inv = self.to_bool_inverted(va);
                let source = self.cur_block();
                let rhs_bb = self.new_block("lor.rhs");
                // An `&&` inside our lhs short-circuits on false into this
                // check.
                self.commit_kind(mark, EdgeKind::AndLhs, rhs_bb);
                self.sc_stack.push(PendingEdge {
                    source,
                    cond: inv,
                    kind: EdgeKind::OrLhs,
                    rhs: rhs_bb,
                });
                self.b.position_at_end(rhs_bb);
                self.expr(rhs)
            }
        }
    }

    fn call(&mut self, callee: &Expr, args: &[Expr]) -> Result<Value> {
        let name = callee_name(callee)?;
        let func = self
            .b
            .module_ref()
            .find_function(name)
            .ok_or_else(|| Error::InvalidInput(format!("call to unknown function '{name}'")))?;
        let mut lowered = Vec::with_capacity(args.len());
        for arg in args {
            lowered.push(self.expr(arg)?);
        }
        Ok(self.b.build_call(func, lowered))
    }

    fn cast(&mut self, kind: CastKind, inner: &Expr, whole: &Expr) -> Result<Value> {
        match kind {
            CastKind::LValueToRValue => {
                let addr = self.expr(inner)?;
                let ty = self.lower_type(&inner.ty)?;
                Ok(self.b.build_load(ty, addr))
            }
            CastKind::IntegralCast => {
                let value = self.expr(inner)?;
                let dst = self.lower_type(&whole.ty)?;
                if self.b.module_ref().value_type(value) == dst {
                    Ok(value)
                } else {
                    Ok(self.b.build_sext(value, dst))
                }
            }
            CastKind::ArrayToPointerDecay => {
                let addr = self.expr(inner)?;
                let arr_ty = self.lower_type(&inner.ty)?;
                let i64_ty = self.b.module_ref().types.i64();
                let zero = Value::ConstInt {
                    ty: i64_ty,
                    value: 0,
                };
                Ok(self.b.build_gep(arr_ty, addr, [zero, zero]))
            }
            CastKind::FunctionToPointerDecay | CastKind::NoOp => self.expr(inner),
        }
    }

    // ── Statements ──

    fn stmt(&mut self, s: &Stmt) -> Result<()> {
        match s {
            Stmt::Compound(stmts) => {
                self.scopes.push(FxHashMap::default());
                for sub in stmts {
                    self.stmt(sub)?;
                }
                self.scopes.pop();
                Ok(())
            }
            Stmt::Return(e) => {
                match e {
                    Some(e) => {
                        let value = self.rvalue_expr(e)?;
                        self.b.build_ret(value);
                    }
                    None => {
                        self.b.build_ret_void();
                    }
                }
                let dead = self.new_block("");
                self.b.position_at_end(dead);
                Ok(())
            }
            Stmt::Null => Ok(()),
            Stmt::Decl(decls) => {
                for decl in decls {
                    self.local_var(decl)?;
                }
                Ok(())
            }
            Stmt::Expr(e) => {
                self.rvalue_expr(e)?;
                Ok(())
            }
            Stmt::If {
                cond,
                then_stmt,
                else_stmt,
            } => self.if_stmt(cond, then_stmt, else_stmt.as_deref()),
            Stmt::While { cond, body } => self.while_stmt(cond, body),
            Stmt::Break => {
                if self.loop_depth == 0 {
                    return Err(Error::InvalidInput("break outside a loop".into()));
                }
                let block = self.cur_block();
                self.break_blocks.push(block);
                self.pending_term.insert(block);
                let dead = self.new_block("");
                self.b.position_at_end(dead);
                Ok(())
            }
            Stmt::Continue => {
                if self.loop_depth == 0 {
                    return Err(Error::InvalidInput("continue outside a loop".into()));
                }
                let block = self.cur_block();
                self.continue_blocks.push(block);
                self.pending_term.insert(block);
                let dead = self.new_block("");
                self.b.position_at_end(dead);
                Ok(())
            }
        }
    }

    fn if_stmt(&mut self, cond: &Expr, then_stmt: &Stmt, else_stmt: Option<&Stmt>) -> Result<()> {
        let mark = self.sc_stack.len();
        let vc = self.expr(cond)?;
        let vc = self.to_bool(vc);
        let cond_tail = self.cur_block();

        let then_bb = self.new_block("if.then");
        let else_bb = self.new_block("if.else");
        if !self.has_terminator(cond_tail) {
            self.b.position_at_end(cond_tail);
            self.b.build_cond_br(vc, then_bb, else_bb);
        }
        self.drain(mark, then_bb, else_bb);

        self.b.position_at_end(then_bb);
        self.stmt(then_stmt)?;
        let then_tail = self.cur_block();

        self.b.position_at_end(else_bb);
        if let Some(else_stmt) = else_stmt {
            self.stmt(else_stmt)?;
        }
        let else_tail = self.cur_block();

        let end_bb = self.new_block("if.end");
        for tail in [then_tail, else_tail] {
            if !self.has_terminator(tail) && !self.pending_term.contains(&tail) {
                self.b.position_at_end(tail);
                self.b.build_br(end_bb);
            }
        }
        self.b.position_at_end(end_bb);
        Ok(())
    }

    fn while_stmt(&mut self, cond: &Expr, body: &Stmt) -> Result<()> {
        let cond_bb = self.new_block("while.cond");
        self.b.build_br(cond_bb);
        self.b.position_at_end(cond_bb);

        let mark = self.sc_stack.len();
        let vc = self.expr(cond)?;
        let vc = self.to_bool(vc);
        let cond_tail = self.cur_block();

        let body_bb = self.new_block("while.body");
        // `||` lhs edges can commit now; `&&` lhs edges wait for the end
        // block.
        self.commit_kind(mark, EdgeKind::OrLhs, body_bb);

        let break_mark = self.break_blocks.len();
        let continue_mark = self.continue_blocks.len();
        self.loop_depth += 1;
        self.b.position_at_end(body_bb);
        self.stmt(body)?;
        self.loop_depth -= 1;
        let body_tail = self.cur_block();
        if !self.has_terminator(body_tail) && !self.pending_term.contains(&body_tail) {
            self.b.position_at_end(body_tail);
            self.b.build_br(cond_bb);
        }

        let end_bb = self.new_block("while.end");
        self.commit_kind(mark, EdgeKind::AndLhs, end_bb);
        for block in self.break_blocks.split_off(break_mark) {
            self.pending_term.remove(&block);
            self.b.position_at_end(block);
            self.b.build_br(end_bb);
        }
        for block in self.continue_blocks.split_off(continue_mark) {
            self.pending_term.remove(&block);
            self.b.position_at_end(block);
            self.b.build_br(cond_bb);
        }
        if !self.has_terminator(cond_tail) {
            self.b.position_at_end(cond_tail);
            self.b.build_cond_br(vc, body_bb, end_bb);
        }
        self.b.position_at_end(end_bb);
        Ok(())
    }

    // ── Declarations ──

    fn local_var(&mut self, decl: &VarDecl) -> Result<()> {
        let ty = self.lower_type(&decl.ty)?;
        let slot = self.alloc_local(ty);
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(decl.name.clone(), slot);
        }
        let Some(init) = &decl.init else {
            return Ok(());
        };
        if decl.ty.is_array() {
            self.init_array(slot, ty, init, &decl.name)
        } else {
            match init.kind {
                ExprKind::InitList(_) | ExprKind::ImplicitInit => Err(Error::InvalidInput(
                    format!("aggregate initializer for scalar '{}'", decl.name),
                )),
                _ => {
                    let value = self.rvalue_expr(init)?;
                    self.b.build_store(value, slot);
                    Ok(())
                }
            }
        }
    }

    /// Store every element of a (possibly nested) initializer list,
    /// zero-filling the remainder.
    fn init_array(&mut self, base: Value, arr_ty: TypeId, init: &Expr, name: &str) -> Result<()> {
        let (dims, _) = array_shape(self.b.module_ref(), arr_ty);
        let flat = flatten_init(self.b.module_ref(), arr_ty, init, name)?;
        let i64_ty = self.b.module_ref().types.i64();
        for (pos, item) in flat.iter().enumerate() {
            let mut indices = vec![Value::ConstInt {
                ty: i64_ty,
                value: 0,
            }];
            let mut rem = pos as u64;
            let mut stride: u64 = dims.iter().product();
            for &dim in &dims {
                stride /= dim;
                indices.push(Value::ConstInt {
                    ty: i64_ty,
                    value: (rem / stride) as i64,
                });
                rem %= stride;
            }
            let addr = self.b.build_gep(arr_ty, base, indices);
            let elem_ty = scalar_elem_ty(self.b.module_ref(), arr_ty);
            let value = match *item {
                Some(e) => self.rvalue_expr(e)?,
                None => Value::ConstInt {
                    ty: elem_ty,
                    value: 0,
                },
            };
            self.b.build_store(value, addr);
        }
        Ok(())
    }

    fn global_var(&mut self, decl: &VarDecl) -> Result<()> {
        let ty = self.lower_type(&decl.ty)?;
        let global = self.b.module().add_global(
            &decl.name,
            ty,
            Linkage::External,
            Some(Constant::Zero(ty)),
            false,
        );
        let Some(init) = &decl.init else {
            return Ok(());
        };
        // A constant-expressible initializer is attached directly; anything
        // else runs in a synthesized module constructor.
        if decl.ty.is_array() {
            if let Some(constant) = const_array_init(self.b.module_ref(), ty, init) {
                self.b.module().global_mut(global).init = Some(constant);
                return Ok(());
            }
        } else if let Some(value) = const_eval(init) {
            self.b.module().global_mut(global).init = Some(Constant::Int { ty, value });
            return Ok(());
        }
        self.emit_global_ctor(global, ty, decl, init)
    }

    fn emit_global_ctor(
        &mut self,
        global: crate::ir::GlobalId,
        ty: TypeId,
        decl: &VarDecl,
        init: &Expr,
    ) -> Result<()> {
        let void = self.b.module_ref().types.void();
        let ctor_ty = self.b.module().types.func(void, vec![]);
        let name = format!("{}_ctor", decl.name);
        let func = self
            .b
            .module()
            .add_function(&name, ctor_ty, Linkage::Private, vec![]);
        let entry = self.b.module().add_block(func, "entry");

        let saved_func = self.cur_func.take();
        let saved_entry = self.entry_block.take();
        let saved_pos = self.alloca_pos;
        self.b.push_point();
        self.cur_func = Some(func);
        self.entry_block = Some(entry);
        self.alloca_pos = 0;
        self.b.position_at_end(entry);

        if decl.ty.is_array() {
            self.init_array(Value::Global(global), ty, init, &decl.name)?;
        } else {
            let value = self.rvalue_expr(init)?;
            self.b.build_store(value, Value::Global(global));
        }
        self.b.build_ret_void();

        self.b.pop_point();
        self.cur_func = saved_func;
        self.entry_block = saved_entry;
        self.alloca_pos = saved_pos;
        self.b.module().ctors.push((func, 0));
        Ok(())
    }

    fn function_decl(&mut self, decl: &FunctionDecl) -> Result<()> {
        let ret = self.lower_type(&decl.ret)?;
        let mut param_tys = Vec::with_capacity(decl.params.len());
        let mut params = Vec::with_capacity(decl.params.len());
        for p in &decl.params {
            let ty = self.lower_type(&p.ty)?;
            param_tys.push(ty);
            params.push(ParamData {
                name: p.name.clone(),
                ty,
            });
        }
        let fn_ty = self.b.module().types.func(ret, param_tys);

        let func = match self.b.module_ref().find_function(&decl.name) {
            Some(existing) => {
                if !self.b.module_ref().func(existing).is_declaration() && decl.body.is_some() {
                    return Err(Error::InvalidInput(format!(
                        "redefinition of function '{}'",
                        decl.name
                    )));
                }
                existing
            }
            None => self
                .b
                .module()
                .add_function(&decl.name, fn_ty, Linkage::External, params),
        };

        let Some(body) = &decl.body else {
            return Ok(());
        };

        let entry = self.b.module().add_block(func, "entry");
        self.cur_func = Some(func);
        self.entry_block = Some(entry);
        self.alloca_pos = 0;
        self.b.position_at_end(entry);
        self.scopes.push(FxHashMap::default());

        // Parameters get an `.addr` slot in the entry block; references go
        // through it like any other local.
        for (i, p) in decl.params.iter().enumerate() {
            let ty = self.lower_type(&p.ty)?;
            let slot = self.alloc_local(ty);
            self.b.build_store(Value::Param(func, i as u32), slot);
            if let Some(scope) = self.scopes.last_mut() {
                scope.insert(p.name.clone(), slot);
            }
        }

        self.stmt(body)?;

        // Close the function: a missing return is UB at source level, but
        // the IR must be well formed.
        let tail = self.cur_block();
        if !self.has_terminator(tail) {
            self.b.position_at_end(tail);
            if ret == self.b.module_ref().types.void() {
                self.b.build_ret_void();
            } else {
                let zero = self.zero_value(ret);
                self.b.build_ret(zero);
            }
        }

        self.scopes.pop();
        self.cur_func = None;
        self.entry_block = None;
        Ok(())
    }
}

/// Function name behind the (possibly decayed, parenthesized) callee.
fn callee_name(callee: &Expr) -> Result<&str> {
    match &callee.kind {
        ExprKind::DeclRef(name) => Ok(name),
        ExprKind::Paren(inner) | ExprKind::Cast(_, inner) => callee_name(inner),
        _ => Err(Error::InvalidInput("unsupported callee expression".into())),
    }
}

/// Dimensions and flat capacity of a (possibly nested) array type.
fn array_shape(module: &Module, arr_ty: TypeId) -> (Vec<u64>, u64) {
    let mut dims = Vec::new();
    let mut ty = arr_ty;
    while let Some((elem, len)) = module.types.array_parts(ty) {
        dims.push(len);
        ty = elem;
    }
    let capacity = dims.iter().product();
    (dims, capacity)
}

fn scalar_elem_ty(module: &Module, arr_ty: TypeId) -> TypeId {
    let mut ty = arr_ty;
    while let Some((elem, _)) = module.types.array_parts(ty) {
        ty = elem;
    }
    ty
}

/// Flatten an initializer list into a dense row-major element vector;
/// `None` entries are zero-filled. Supports nested braces (each sub-list
/// covers one sub-aggregate) and flat lists, and the `ImplicitInit`
/// remainder sentinel. Overflowing the capacity is fatal.
fn flatten_init<'e>(
    module: &Module,
    arr_ty: TypeId,
    init: &'e Expr,
    name: &str,
) -> Result<Vec<Option<&'e Expr>>> {
    let (dims, capacity) = array_shape(module, arr_ty);
    let mut flat: Vec<Option<&'e Expr>> = vec![None; capacity as usize];
    fill_region(&dims, 0, 0, capacity, init, &mut flat, name)?;
    Ok(flat)
}

fn fill_region<'e>(
    dims: &[u64],
    depth: usize,
    start: u64,
    end: u64,
    init: &'e Expr,
    flat: &mut [Option<&'e Expr>],
    name: &str,
) -> Result<()> {
    match &init.kind {
        ExprKind::ImplicitInit => Ok(()),
        ExprKind::InitList(items) => {
            // Stride of one sub-aggregate at this depth.
            let stride: u64 = dims.iter().skip(depth + 1).product();
            let mut cursor = start;
            for item in items {
                match &item.kind {
                    ExprKind::ImplicitInit => {
                        cursor = end;
                    }
                    ExprKind::InitList(_) if depth + 1 < dims.len() => {
                        if cursor + stride > end {
                            return Err(Error::InitOutOfRange { name: name.into() });
                        }
                        fill_region(dims, depth + 1, cursor, cursor + stride, item, flat, name)?;
                        cursor += stride;
                    }
                    ExprKind::InitList(_) => {
                        return Err(Error::InvalidInput(format!(
                            "braces nested too deeply in initializer for '{name}'"
                        )));
                    }
                    _ => {
                        if cursor >= end {
                            return Err(Error::InitOutOfRange { name: name.into() });
                        }
                        flat[cursor as usize] = Some(item);
                        cursor += 1;
                    }
                }
            }
            Ok(())
        }
        _ => Err(Error::InvalidInput(format!(
            "scalar initializer for array '{name}'"
        ))),
    }
}

/// Evaluate a pure constant expression, if it is one.
fn const_eval(e: &Expr) -> Option<i64> {
    match &e.kind {
        ExprKind::IntLit(v) => Some(*v),
        ExprKind::Paren(inner) => const_eval(inner),
        ExprKind::Unary(op, inner) => {
            let v = const_eval(inner)?;
            Some(match op {
                UnaryOp::Not => i64::from(v == 0),
                UnaryOp::Neg => v.wrapping_neg(),
                UnaryOp::Pos => v,
            })
        }
        ExprKind::Binary(op, lhs, rhs) => {
            let l = const_eval(lhs)?;
            let r = const_eval(rhs)?;
            Some(match op {
                BinaryOp::Add => l.wrapping_add(r),
                BinaryOp::Sub => l.wrapping_sub(r),
                BinaryOp::Mul => l.wrapping_mul(r),
                BinaryOp::Div => {
                    if r == 0 {
                        return None;
                    }
                    l.wrapping_div(r)
                }
                BinaryOp::Rem => {
                    if r == 0 {
                        return None;
                    }
                    l.wrapping_rem(r)
                }
                BinaryOp::Eq => i64::from(l == r),
                BinaryOp::Ne => i64::from(l != r),
                BinaryOp::Lt => i64::from(l < r),
                BinaryOp::Le => i64::from(l <= r),
                BinaryOp::Gt => i64::from(l > r),
                BinaryOp::Ge => i64::from(l >= r),
                BinaryOp::LogicalAnd => i64::from(l != 0 && r != 0),
                BinaryOp::LogicalOr => i64::from(l != 0 || r != 0),
                BinaryOp::Assign | BinaryOp::Index => return None,
            })
        }
        ExprKind::Cast(CastKind::IntegralCast | CastKind::NoOp, inner) => const_eval(inner),
        _ => None,
    }
}

/// Build a constant aggregate when every initializer element is a pure
/// constant expression.
fn const_array_init(module: &Module, arr_ty: TypeId, init: &Expr) -> Option<Constant> {
    let flat = flatten_init(module, arr_ty, init, "<const>").ok()?;
    let mut values = Vec::with_capacity(flat.len());
    for item in &flat {
        match item {
            Some(e) => values.push(const_eval(e)?),
            None => values.push(0),
        }
    }
    Some(build_const_array(module, arr_ty, &values, 0).0)
}

fn build_const_array(module: &Module, ty: TypeId, values: &[i64], offset: usize) -> (Constant, usize) {
    if let Some((elem, len)) = module.types.array_parts(ty) {
        let mut elems = Vec::with_capacity(len as usize);
        let mut cursor = offset;
        for _ in 0..len {
            let (c, next) = build_const_array(module, elem, values, cursor);
            elems.push(c);
            cursor = next;
        }
        (Constant::Array { ty, elems }, cursor)
    } else {
        (
            Constant::Int {
                ty,
                value: values.get(offset).copied().unwrap_or(0),
            },
            offset + 1,
        )
    }
}
