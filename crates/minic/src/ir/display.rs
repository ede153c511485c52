//! LLVM-style textual rendering of the IR.
//!
//! The output follows LLVM's textual conventions closely enough for a
//! downstream consumer: typed operands, block labels, phi `[ value, %label ]`
//! pairs, opaque `ptr`, `getelementptr inbounds` with a source element type,
//! and an `@llvm.global_ctors` array for the module constructor list.
//!
//! Labels and SSA names are derived from arena indices, which keeps
//! printing deterministic for structurally identical modules.

use std::fmt;

use super::module::{
    BinOp, BlockId, Constant, FuncId, GlobalId, ICmpPred, InstId, InstKind, Linkage, Module, Value,
};
use super::types::{Type, TypeId};

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::SDiv => "sdiv",
            BinOp::SRem => "srem",
            BinOp::Shl => "shl",
            BinOp::AShr => "ashr",
            BinOp::And => "and",
            BinOp::Or => "or",
        };
        f.write_str(s)
    }
}

impl fmt::Display for ICmpPred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ICmpPred::Eq => "eq",
            ICmpPred::Ne => "ne",
            ICmpPred::Slt => "slt",
            ICmpPred::Sle => "sle",
            ICmpPred::Sgt => "sgt",
            ICmpPred::Sge => "sge",
        };
        f.write_str(s)
    }
}

struct TypeFmt<'a>(&'a Module, TypeId);

impl fmt::Display for TypeFmt<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let TypeFmt(module, ty) = *self;
        match module.types.get(ty) {
            Type::Int(bits) => write!(f, "i{bits}"),
            Type::Void => f.write_str("void"),
            Type::Ptr => f.write_str("ptr"),
            Type::Array { elem, len } => {
                write!(f, "[{len} x {}]", TypeFmt(module, *elem))
            }
            Type::Func { ret, params } => {
                write!(f, "{} (", TypeFmt(module, *ret))?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", TypeFmt(module, *p))?;
                }
                f.write_str(")")
            }
        }
    }
}

struct ValueFmt<'a>(&'a Module, Value);

impl fmt::Display for ValueFmt<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ValueFmt(module, value) = *self;
        match value {
            Value::Inst(id) => write!(f, "%v{}", id.index()),
            Value::Param(func, i) => {
                let param = &module.func(func).params[i as usize];
                if param.name.is_empty() {
                    write!(f, "%arg{i}")
                } else {
                    write!(f, "%{}", param.name)
                }
            }
            Value::ConstInt { value, .. } => write!(f, "{value}"),
            Value::NullPtr => f.write_str("null"),
            Value::Undef(_) => f.write_str("undef"),
            Value::Global(id) => write!(f, "@{}", module.global(id).name),
            Value::Func(id) => write!(f, "@{}", module.func(id).name),
        }
    }
}

/// Typed operand, e.g. `i32 %v3`.
struct TypedValueFmt<'a>(&'a Module, Value);

impl fmt::Display for TypedValueFmt<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let TypedValueFmt(module, value) = *self;
        write!(
            f,
            "{} {}",
            TypeFmt(module, module.value_type(value)),
            ValueFmt(module, value)
        )
    }
}

fn label(module: &Module, block: BlockId) -> String {
    let name = &module.block(block).name;
    if name.is_empty() {
        format!("bb{}", block.index())
    } else {
        format!("{name}{}", block.index())
    }
}

struct ConstFmt<'a>(&'a Module, &'a Constant);

impl fmt::Display for ConstFmt<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ConstFmt(module, constant) = *self;
        match constant {
            Constant::Int { value, .. } => write!(f, "{value}"),
            Constant::Zero(_) => f.write_str("zeroinitializer"),
            Constant::Array { ty, elems } => {
                let Some((elem_ty, _)) = module.types.array_parts(*ty) else {
                    return f.write_str("zeroinitializer");
                };
                f.write_str("[")?;
                for (i, elem) in elems.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{} {}", TypeFmt(module, elem_ty), ConstFmt(module, elem))?;
                }
                f.write_str("]")
            }
        }
    }
}

fn fmt_inst(f: &mut fmt::Formatter<'_>, module: &Module, id: InstId) -> fmt::Result {
    let v = |value: Value| ValueFmt(module, value);
    let tv = |value: Value| TypedValueFmt(module, value);
    let t = |ty: TypeId| TypeFmt(module, ty);
    match module.kind(id) {
        InstKind::Alloca { ty } => write!(f, "%v{} = alloca {}", id.index(), t(*ty)),
        InstKind::Load { ty, ptr } => {
            write!(f, "%v{} = load {}, {}", id.index(), t(*ty), tv(*ptr))
        }
        InstKind::Store { value, ptr } => write!(f, "store {}, {}", tv(*value), tv(*ptr)),
        InstKind::Binary { op, lhs, rhs } => {
            let ty = module.value_type(*lhs);
            write!(
                f,
                "%v{} = {op} {} {}, {}",
                id.index(),
                t(ty),
                v(*lhs),
                v(*rhs)
            )
        }
        InstKind::ICmp { pred, lhs, rhs } => {
            let ty = module.value_type(*lhs);
            write!(
                f,
                "%v{} = icmp {pred} {} {}, {}",
                id.index(),
                t(ty),
                v(*lhs),
                v(*rhs)
            )
        }
        InstKind::Gep {
            source_ty,
            base,
            indices,
        } => {
            write!(
                f,
                "%v{} = getelementptr inbounds {}, {}",
                id.index(),
                t(*source_ty),
                tv(*base)
            )?;
            for idx in indices {
                write!(f, ", {}", tv(*idx))?;
            }
            Ok(())
        }
        InstKind::SExt { value, ty } => {
            write!(f, "%v{} = sext {} to {}", id.index(), tv(*value), t(*ty))
        }
        InstKind::Call { callee, args } => {
            let ret = module
                .types
                .func_ret(module.func(*callee).ty)
                .unwrap_or_else(|| module.types.void());
            if matches!(module.types.get(ret), Type::Void) {
                write!(f, "call void @{}(", module.func(*callee).name)?;
            } else {
                write!(
                    f,
                    "%v{} = call {} @{}(",
                    id.index(),
                    t(ret),
                    module.func(*callee).name
                )?;
            }
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", tv(*arg))?;
            }
            f.write_str(")")
        }
        InstKind::Phi { ty, incomings } => {
            write!(f, "%v{} = phi {} ", id.index(), t(*ty))?;
            for (i, (value, block)) in incomings.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "[ {}, %{} ]", v(*value), label(module, *block))?;
            }
            Ok(())
        }
        InstKind::Br { target } => write!(f, "br label %{}", label(module, *target)),
        InstKind::CondBr {
            cond,
            then_dest,
            else_dest,
        } => write!(
            f,
            "br i1 {}, label %{}, label %{}",
            v(*cond),
            label(module, *then_dest),
            label(module, *else_dest)
        ),
        InstKind::Ret { value: Some(value) } => write!(f, "ret {}", tv(*value)),
        InstKind::Ret { value: None } => f.write_str("ret void"),
        InstKind::Unreachable => f.write_str("unreachable"),
    }
}

fn fmt_global(f: &mut fmt::Formatter<'_>, module: &Module, id: GlobalId) -> fmt::Result {
    let global = module.global(id);
    let kind = match (global.linkage, global.is_const) {
        (Linkage::External, false) => "global",
        (Linkage::External, true) => "constant",
        (Linkage::Private, false) => "private global",
        (Linkage::Private, true) => "private constant",
    };
    write!(f, "@{} = {kind} {}", global.name, TypeFmt(module, global.ty))?;
    match &global.init {
        Some(Constant::Zero(_)) | None => f.write_str(" zeroinitializer")?,
        Some(init) => write!(f, " {}", ConstFmt(module, init))?,
    }
    writeln!(f)
}

fn fmt_function(f: &mut fmt::Formatter<'_>, module: &Module, id: FuncId) -> fmt::Result {
    let func = module.func(id);
    let ret = module
        .types
        .func_ret(func.ty)
        .unwrap_or_else(|| module.types.void());
    let keyword = if func.is_declaration() {
        "declare"
    } else {
        "define"
    };
    let linkage = match func.linkage {
        Linkage::External => "",
        Linkage::Private => "private ",
    };
    write!(
        f,
        "{keyword} {linkage}{} @{}(",
        TypeFmt(module, ret),
        func.name
    )?;
    for (i, param) in func.params.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(
            f,
            "{} {}",
            TypeFmt(module, param.ty),
            ValueFmt(module, Value::Param(id, i as u32))
        )?;
    }
    if func.is_declaration() {
        return writeln!(f, ")");
    }
    writeln!(f, ") {{")?;
    for &block in &func.blocks {
        writeln!(f, "{}:", label(module, block))?;
        for &inst in &module.block(block).insts {
            f.write_str("  ")?;
            fmt_inst(f, module, inst)?;
            writeln!(f)?;
        }
    }
    writeln!(f, "}}")
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; ModuleID = '{}'", self.name)?;
        for id in self.global_ids() {
            fmt_global(f, self, id)?;
        }
        if !self.ctors.is_empty() {
            write!(
                f,
                "@llvm.global_ctors = appending global [{} x {{ i32, ptr, ptr }}] [",
                self.ctors.len()
            )?;
            for (i, (func, priority)) in self.ctors.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(
                    f,
                    "{{ i32, ptr, ptr }} {{ i32 {priority}, ptr @{}, ptr null }}",
                    self.func(*func).name
                )?;
            }
            writeln!(f, "]")?;
        }
        for id in self.func_ids() {
            writeln!(f)?;
            fmt_function(f, self, id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::{BinOp, Builder, Linkage, Module};

    #[test]
    fn renders_a_minimal_function() {
        let mut module = Module::new("demo");
        let i32_ty = module.types.i32();
        let fn_ty = module.types.func(i32_ty, vec![]);
        let func = module.add_function("main", fn_ty, Linkage::External, vec![]);
        let entry = module.add_block(func, "entry");
        let mut b = Builder::new(&mut module);
        b.position_at_end(entry);
        let one = b.const_int(i32_ty, 1);
        let two = b.const_int(i32_ty, 2);
        let add = b.build_binary(BinOp::Add, one, two);
        b.build_ret(add);

        let text = module.to_string();
        assert!(text.contains("define i32 @main()"));
        assert!(text.contains("add i32 1, 2"));
        assert!(text.contains("ret i32 %v0"));
    }
}
