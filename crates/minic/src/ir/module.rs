//! Arena-based IR data model.
//!
//! The module owns four arenas (functions, globals, basic blocks,
//! instructions) addressed by `u32` newtype handles. Cyclic relations
//! (value ↔ use-list, block ↔ phi incoming edge) are index sets instead of
//! pointers, which keeps `replace_all_uses_with` O(users) and erasure a
//! tombstone write.
//!
//! Use-lists are maintained invariantly: every operand mutation goes
//! through the `Module` APIs below (or the [`Builder`](super::Builder) on
//! top of them), which link and unlink the corresponding use entries.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use super::types::{Type, TypeCtx, TypeId};

macro_rules! arena_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(transparent)]
        pub struct $name(pub(crate) u32);

        impl $name {
            #[inline]
            #[must_use]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

arena_id!(
    /// Handle to an instruction in the module arena.
    InstId
);
arena_id!(
    /// Handle to a basic block in the module arena.
    BlockId
);
arena_id!(
    /// Handle to a function in the module arena.
    FuncId
);
arena_id!(
    /// Handle to a global variable in the module arena.
    GlobalId
);

/// A polymorphic value handle.
///
/// Instruction results, parameters, globals and functions are arena
/// references; constants and `undef` are immediates, so rewriting an
/// operand to a constant never allocates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    Inst(InstId),
    /// The `i`-th parameter of a function.
    Param(FuncId, u32),
    ConstInt {
        ty: TypeId,
        value: i64,
    },
    NullPtr,
    Undef(TypeId),
    Global(GlobalId),
    Func(FuncId),
}

impl Value {
    #[inline]
    #[must_use]
    pub fn as_inst(self) -> Option<InstId> {
        match self {
            Value::Inst(id) => Some(id),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_const_int(self) -> Option<i64> {
        match self {
            Value::ConstInt { value, .. } => Some(value),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_global(self) -> Option<GlobalId> {
        match self {
            Value::Global(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    SDiv,
    SRem,
    Shl,
    AShr,
    And,
    Or,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ICmpPred {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
}

/// An IR instruction.
///
/// `SExt` widens by sign extension, except from `i1` where it produces 0/1
/// (booleans have no sign); a narrowing destination truncates to the low
/// bits.
#[derive(Clone, Debug, PartialEq)]
pub enum InstKind {
    Alloca {
        ty: TypeId,
    },
    Load {
        ty: TypeId,
        ptr: Value,
    },
    Store {
        value: Value,
        ptr: Value,
    },
    Binary {
        op: BinOp,
        lhs: Value,
        rhs: Value,
    },
    ICmp {
        pred: ICmpPred,
        lhs: Value,
        rhs: Value,
    },
    Gep {
        source_ty: TypeId,
        base: Value,
        indices: SmallVec<[Value; 2]>,
    },
    SExt {
        value: Value,
        ty: TypeId,
    },
    Call {
        callee: FuncId,
        args: SmallVec<[Value; 4]>,
    },
    Phi {
        ty: TypeId,
        incomings: Vec<(Value, BlockId)>,
    },
    Br {
        target: BlockId,
    },
    CondBr {
        cond: Value,
        then_dest: BlockId,
        else_dest: BlockId,
    },
    Ret {
        value: Option<Value>,
    },
    Unreachable,
}

impl InstKind {
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstKind::Br { .. }
                | InstKind::CondBr { .. }
                | InstKind::Ret { .. }
                | InstKind::Unreachable
        )
    }

    /// Visit every `Value` operand. The callee of a `Call` is a function
    /// handle, not a `Value`, and is tracked separately.
    pub fn each_operand(&self, mut f: impl FnMut(Value)) {
        match self {
            InstKind::Alloca { .. } | InstKind::Br { .. } | InstKind::Unreachable => {}
            InstKind::Load { ptr, .. } => f(*ptr),
            InstKind::Store { value, ptr } => {
                f(*value);
                f(*ptr);
            }
            InstKind::Binary { lhs, rhs, .. } | InstKind::ICmp { lhs, rhs, .. } => {
                f(*lhs);
                f(*rhs);
            }
            InstKind::Gep { base, indices, .. } => {
                f(*base);
                for idx in indices {
                    f(*idx);
                }
            }
            InstKind::SExt { value, .. } => f(*value),
            InstKind::Call { args, .. } => {
                for arg in args {
                    f(*arg);
                }
            }
            InstKind::Phi { incomings, .. } => {
                for (value, _) in incomings {
                    f(*value);
                }
            }
            InstKind::CondBr { cond, .. } => f(*cond),
            InstKind::Ret { value } => {
                if let Some(value) = value {
                    f(*value);
                }
            }
        }
    }

    fn each_operand_mut(&mut self, mut f: impl FnMut(&mut Value)) {
        match self {
            InstKind::Alloca { .. } | InstKind::Br { .. } | InstKind::Unreachable => {}
            InstKind::Load { ptr, .. } => f(ptr),
            InstKind::Store { value, ptr } => {
                f(value);
                f(ptr);
            }
            InstKind::Binary { lhs, rhs, .. } | InstKind::ICmp { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            InstKind::Gep { base, indices, .. } => {
                f(base);
                for idx in indices {
                    f(idx);
                }
            }
            InstKind::SExt { value, .. } => f(value),
            InstKind::Call { args, .. } => {
                for arg in args {
                    f(arg);
                }
            }
            InstKind::Phi { incomings, .. } => {
                for (value, _) in incomings {
                    f(value);
                }
            }
            InstKind::CondBr { cond, .. } => f(cond),
            InstKind::Ret { value } => {
                if let Some(value) = value {
                    f(value);
                }
            }
        }
    }
}

#[derive(Debug)]
pub struct InstData {
    pub kind: InstKind,
    pub block: BlockId,
    /// Instructions whose operands reference this instruction's result.
    pub uses: FxHashSet<InstId>,
    pub dead: bool,
}

#[derive(Debug)]
pub struct BlockData {
    /// Debugging label; not required to be unique.
    pub name: String,
    pub func: FuncId,
    pub insts: Vec<InstId>,
    pub dead: bool,
}

#[derive(Clone, Debug)]
pub struct ParamData {
    /// Advisory name.
    pub name: String,
    pub ty: TypeId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Linkage {
    External,
    Private,
}

#[derive(Debug)]
pub struct FunctionData {
    pub name: String,
    /// A `Type::Func` id.
    pub ty: TypeId,
    pub linkage: Linkage,
    pub params: Vec<ParamData>,
    /// Ordered blocks; empty for a declaration. The first block is the
    /// entry and has no predecessors.
    pub blocks: Vec<BlockId>,
    /// Call sites referencing this function.
    pub uses: FxHashSet<InstId>,
    pub dead: bool,
}

impl FunctionData {
    #[must_use]
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    #[must_use]
    pub fn entry(&self) -> Option<BlockId> {
        self.blocks.first().copied()
    }
}

/// A constant initializer for a global variable.
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Int { ty: TypeId, value: i64 },
    Zero(TypeId),
    Array { ty: TypeId, elems: Vec<Constant> },
}

#[derive(Debug)]
pub struct GlobalData {
    pub name: String,
    /// The value type of the global (its address is `ptr`).
    pub ty: TypeId,
    pub linkage: Linkage,
    pub init: Option<Constant>,
    pub is_const: bool,
    /// Instructions referencing this global's address.
    pub uses: FxHashSet<InstId>,
}

/// A typed IR module: ordered globals and functions plus the shared type
/// interner and the module-level constructor list.
#[derive(Debug)]
pub struct Module {
    pub name: String,
    pub types: TypeCtx,
    funcs: Vec<FunctionData>,
    globals: Vec<GlobalData>,
    blocks: Vec<BlockData>,
    insts: Vec<InstData>,
    /// `(function, priority)` pairs run at module initialization, in order.
    pub ctors: Vec<(FuncId, u16)>,
}

impl Module {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            types: TypeCtx::new(),
            funcs: Vec::new(),
            globals: Vec::new(),
            blocks: Vec::new(),
            insts: Vec::new(),
            ctors: Vec::new(),
        }
    }

    // ── Functions and globals ──

    pub fn add_function(
        &mut self,
        name: &str,
        ty: TypeId,
        linkage: Linkage,
        params: Vec<ParamData>,
    ) -> FuncId {
        let id = FuncId(self.funcs.len() as u32);
        self.funcs.push(FunctionData {
            name: name.to_owned(),
            ty,
            linkage,
            params,
            blocks: Vec::new(),
            uses: FxHashSet::default(),
            dead: false,
        });
        id
    }

    #[must_use]
    pub fn find_function(&self, name: &str) -> Option<FuncId> {
        self.funcs
            .iter()
            .position(|f| !f.dead && f.name == name)
            .map(|i| FuncId(i as u32))
    }

    pub fn add_global(
        &mut self,
        name: &str,
        ty: TypeId,
        linkage: Linkage,
        init: Option<Constant>,
        is_const: bool,
    ) -> GlobalId {
        let id = GlobalId(self.globals.len() as u32);
        self.globals.push(GlobalData {
            name: name.to_owned(),
            ty,
            linkage,
            init,
            is_const,
            uses: FxHashSet::default(),
        });
        id
    }

    #[must_use]
    pub fn find_global(&self, name: &str) -> Option<GlobalId> {
        self.globals
            .iter()
            .position(|g| g.name == name)
            .map(|i| GlobalId(i as u32))
    }

    #[inline]
    #[must_use]
    pub fn func(&self, id: FuncId) -> &FunctionData {
        &self.funcs[id.index()]
    }

    #[inline]
    pub fn func_mut(&mut self, id: FuncId) -> &mut FunctionData {
        &mut self.funcs[id.index()]
    }

    #[inline]
    #[must_use]
    pub fn global(&self, id: GlobalId) -> &GlobalData {
        &self.globals[id.index()]
    }

    #[inline]
    pub fn global_mut(&mut self, id: GlobalId) -> &mut GlobalData {
        &mut self.globals[id.index()]
    }

    /// Live function ids in declaration order.
    #[must_use]
    pub fn func_ids(&self) -> Vec<FuncId> {
        (0..self.funcs.len())
            .map(|i| FuncId(i as u32))
            .filter(|id| !self.funcs[id.index()].dead)
            .collect()
    }

    #[must_use]
    pub fn global_ids(&self) -> Vec<GlobalId> {
        (0..self.globals.len()).map(|i| GlobalId(i as u32)).collect()
    }

    /// Remove a function and all its blocks from the module.
    pub fn remove_function(&mut self, id: FuncId) {
        let blocks = std::mem::take(&mut self.func_mut(id).blocks);
        for block in blocks {
            let insts = std::mem::take(&mut self.blocks[block.index()].insts);
            for inst in insts {
                self.unlink_operands(inst);
                let data = &mut self.insts[inst.index()];
                data.dead = true;
                data.uses.clear();
            }
            self.blocks[block.index()].dead = true;
        }
        self.funcs[id.index()].dead = true;
        self.funcs[id.index()].uses.clear();
    }

    // ── Blocks ──

    pub fn add_block(&mut self, func: FuncId, name: &str) -> BlockId {
        let id = self.alloc_block(func, name);
        self.funcs[func.index()].blocks.push(id);
        id
    }

    /// Insert a new block immediately before `before` in the function's
    /// block order.
    pub fn add_block_before(&mut self, func: FuncId, before: BlockId, name: &str) -> BlockId {
        let id = self.alloc_block(func, name);
        let blocks = &mut self.funcs[func.index()].blocks;
        let pos = blocks.iter().position(|&b| b == before).unwrap_or(blocks.len());
        blocks.insert(pos, id);
        id
    }

    fn alloc_block(&mut self, func: FuncId, name: &str) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BlockData {
            name: name.to_owned(),
            func,
            insts: Vec::new(),
            dead: false,
        });
        id
    }

    #[inline]
    #[must_use]
    pub fn block(&self, id: BlockId) -> &BlockData {
        &self.blocks[id.index()]
    }

    #[inline]
    pub fn block_mut(&mut self, id: BlockId) -> &mut BlockData {
        &mut self.blocks[id.index()]
    }

    /// Delete a block: erase its instructions, detach it from the function
    /// and tombstone it. Operand links of the erased instructions are
    /// removed; the caller is responsible for external uses of their
    /// results.
    pub fn erase_block(&mut self, id: BlockId) {
        let insts = std::mem::take(&mut self.blocks[id.index()].insts);
        for inst in insts {
            self.unlink_operands(inst);
            let data = &mut self.insts[inst.index()];
            data.dead = true;
            data.uses.clear();
        }
        let func = self.blocks[id.index()].func;
        self.funcs[func.index()].blocks.retain(|&b| b != id);
        self.blocks[id.index()].dead = true;
    }

    /// The terminator of a block, if its last instruction is one.
    #[must_use]
    pub fn terminator(&self, block: BlockId) -> Option<InstId> {
        let last = *self.blocks[block.index()].insts.last()?;
        self.insts[last.index()].kind.is_terminator().then_some(last)
    }

    #[must_use]
    pub fn block_has_terminator(&self, block: BlockId) -> bool {
        self.terminator(block).is_some()
    }

    /// Successor blocks derived from the terminator.
    #[must_use]
    pub fn successors(&self, block: BlockId) -> SmallVec<[BlockId; 2]> {
        let mut succs = SmallVec::new();
        if let Some(term) = self.terminator(block) {
            match &self.insts[term.index()].kind {
                InstKind::Br { target } => succs.push(*target),
                InstKind::CondBr {
                    then_dest,
                    else_dest,
                    ..
                } => {
                    succs.push(*then_dest);
                    if else_dest != then_dest {
                        succs.push(*else_dest);
                    }
                }
                _ => {}
            }
        }
        succs
    }

    /// Predecessor map for a function, derived from terminators.
    #[must_use]
    pub fn predecessors(&self, func: FuncId) -> FxHashMap<BlockId, Vec<BlockId>> {
        let mut preds: FxHashMap<BlockId, Vec<BlockId>> = FxHashMap::default();
        for &block in &self.funcs[func.index()].blocks {
            preds.entry(block).or_default();
        }
        for &block in &self.funcs[func.index()].blocks {
            for succ in self.successors(block) {
                preds.entry(succ).or_default().push(block);
            }
        }
        preds
    }

    // ── Instructions ──

    #[inline]
    #[must_use]
    pub fn inst(&self, id: InstId) -> &InstData {
        &self.insts[id.index()]
    }

    #[inline]
    #[must_use]
    pub fn kind(&self, id: InstId) -> &InstKind {
        &self.insts[id.index()].kind
    }

    /// Create an instruction and insert it at `pos` within `block`,
    /// linking operand use-lists.
    pub fn insert_inst(&mut self, block: BlockId, pos: usize, kind: InstKind) -> InstId {
        let id = InstId(self.insts.len() as u32);
        self.insts.push(InstData {
            kind,
            block,
            uses: FxHashSet::default(),
            dead: false,
        });
        let insts = &mut self.blocks[block.index()].insts;
        let pos = pos.min(insts.len());
        insts.insert(pos, id);
        self.link_operands(id);
        id
    }

    pub fn push_inst(&mut self, block: BlockId, kind: InstKind) -> InstId {
        let pos = self.blocks[block.index()].insts.len();
        self.insert_inst(block, pos, kind)
    }

    /// Erase an instruction: unlink its operands, detach it from its block
    /// and tombstone it. Replace remaining uses first
    /// ([`Module::replace_all_uses_with`]); the verifier rejects dangling
    /// references.
    pub fn erase_inst(&mut self, id: InstId) {
        self.unlink_operands(id);
        let block = self.insts[id.index()].block;
        self.blocks[block.index()].insts.retain(|&i| i != id);
        let data = &mut self.insts[id.index()];
        data.dead = true;
        data.uses.clear();
    }

    /// Move an instruction to `pos` within `dest` (use-lists are
    /// unaffected; only placement changes).
    pub fn move_inst(&mut self, id: InstId, dest: BlockId, pos: usize) {
        let src = self.insts[id.index()].block;
        self.blocks[src.index()].insts.retain(|&i| i != id);
        let insts = &mut self.blocks[dest.index()].insts;
        let pos = pos.min(insts.len());
        insts.insert(pos, id);
        self.insts[id.index()].block = dest;
    }

    /// Operands of an instruction (excluding the callee of a call).
    #[must_use]
    pub fn operands(&self, id: InstId) -> SmallVec<[Value; 4]> {
        let mut out = SmallVec::new();
        self.insts[id.index()].kind.each_operand(|v| out.push(v));
        out
    }

    /// Rewrite the instruction in place through `f`, keeping use-lists
    /// consistent.
    pub fn mutate_inst(&mut self, id: InstId, f: impl FnOnce(&mut InstKind)) {
        self.unlink_operands(id);
        f(&mut self.insts[id.index()].kind);
        self.link_operands(id);
    }

    /// Replace every use of `old`'s result with `new`.
    pub fn replace_all_uses_with(&mut self, old: InstId, new: Value) {
        let users: Vec<InstId> = self.insts[old.index()].uses.iter().copied().collect();
        for user in users {
            self.unlink_operands(user);
            self.insts[user.index()].kind.each_operand_mut(|v| {
                if *v == Value::Inst(old) {
                    *v = new;
                }
            });
            self.link_operands(user);
        }
    }

    /// Result type of an instruction; `None` for non-producing kinds.
    #[must_use]
    pub fn result_ty(&self, id: InstId) -> Option<TypeId> {
        match &self.insts[id.index()].kind {
            InstKind::Alloca { .. } | InstKind::Gep { .. } => Some(self.types.ptr()),
            InstKind::Load { ty, .. } | InstKind::SExt { ty, .. } | InstKind::Phi { ty, .. } => {
                Some(*ty)
            }
            InstKind::Binary { lhs, .. } => Some(self.value_type(*lhs)),
            InstKind::ICmp { .. } => Some(self.types.i1()),
            InstKind::Call { callee, .. } => {
                let ret = self.types.func_ret(self.funcs[callee.index()].ty)?;
                (!matches!(self.types.get(ret), Type::Void)).then_some(ret)
            }
            InstKind::Store { .. }
            | InstKind::Br { .. }
            | InstKind::CondBr { .. }
            | InstKind::Ret { .. }
            | InstKind::Unreachable => None,
        }
    }

    /// Type of any value. Non-producing instruction results and void calls
    /// report `void`.
    #[must_use]
    pub fn value_type(&self, value: Value) -> TypeId {
        match value {
            Value::Inst(id) => self.result_ty(id).unwrap_or_else(|| self.types.void()),
            Value::Param(func, i) => self.funcs[func.index()].params[i as usize].ty,
            Value::ConstInt { ty, .. } | Value::Undef(ty) => ty,
            Value::NullPtr | Value::Global(_) | Value::Func(_) => self.types.ptr(),
        }
    }

    // ── Phi helpers ──

    pub fn add_incoming(&mut self, phi: InstId, value: Value, block: BlockId) {
        self.mutate_inst(phi, |kind| {
            if let InstKind::Phi { incomings, .. } = kind {
                incomings.push((value, block));
            }
        });
    }

    /// Drop the incoming entry for `pred`, if any.
    pub fn remove_incoming(&mut self, phi: InstId, pred: BlockId) {
        self.mutate_inst(phi, |kind| {
            if let InstKind::Phi { incomings, .. } = kind {
                incomings.retain(|&(_, b)| b != pred);
            }
        });
    }

    /// Retarget incoming edges of every phi in `block` from `old_pred` to
    /// `new_pred`.
    pub fn retarget_phi_edges(&mut self, block: BlockId, old_pred: BlockId, new_pred: BlockId) {
        for inst in self.blocks[block.index()].insts.clone() {
            if let InstKind::Phi { .. } = self.insts[inst.index()].kind {
                self.mutate_inst(inst, |kind| {
                    if let InstKind::Phi { incomings, .. } = kind {
                        for (_, b) in incomings {
                            if *b == old_pred {
                                *b = new_pred;
                            }
                        }
                    }
                });
            } else {
                break;
            }
        }
    }

    // ── Use-list plumbing ──

    fn link_operands(&mut self, user: InstId) {
        let kind = self.insts[user.index()].kind.clone();
        kind.each_operand(|v| self.add_use(v, user));
        if let InstKind::Call { callee, .. } = kind {
            self.funcs[callee.index()].uses.insert(user);
        }
    }

    fn unlink_operands(&mut self, user: InstId) {
        let kind = self.insts[user.index()].kind.clone();
        kind.each_operand(|v| self.remove_use(v, user));
        if let InstKind::Call { callee, .. } = kind {
            self.funcs[callee.index()].uses.remove(&user);
        }
    }

    fn add_use(&mut self, def: Value, user: InstId) {
        match def {
            Value::Inst(id) => {
                self.insts[id.index()].uses.insert(user);
            }
            Value::Global(id) => {
                self.globals[id.index()].uses.insert(user);
            }
            Value::Func(id) => {
                self.funcs[id.index()].uses.insert(user);
            }
            _ => {}
        }
    }

    // Use sets deduplicate multiple operands referencing the same value,
    // so unlinking removes the entry once; callers always unlink the whole
    // operand list and relink after mutation.
    fn remove_use(&mut self, def: Value, user: InstId) {
        match def {
            Value::Inst(id) => {
                self.insts[id.index()].uses.remove(&user);
            }
            Value::Global(id) => {
                self.globals[id.index()].uses.remove(&user);
            }
            Value::Func(id) => {
                self.funcs[id.index()].uses.remove(&user);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_module() -> (Module, FuncId, BlockId) {
        let mut module = Module::new("t");
        let i32_ty = module.types.i32();
        let fn_ty = module.types.func(i32_ty, vec![]);
        let func = module.add_function("f", fn_ty, Linkage::External, vec![]);
        let entry = module.add_block(func, "entry");
        (module, func, entry)
    }

    #[test]
    fn insert_links_use_lists() {
        let (mut module, _, entry) = test_module();
        let i32_ty = module.types.i32();
        let one = Value::ConstInt {
            ty: i32_ty,
            value: 1,
        };
        let a = module.push_inst(
            entry,
            InstKind::Binary {
                op: BinOp::Add,
                lhs: one,
                rhs: one,
            },
        );
        let b = module.push_inst(
            entry,
            InstKind::Binary {
                op: BinOp::Mul,
                lhs: Value::Inst(a),
                rhs: Value::Inst(a),
            },
        );
        assert!(module.inst(a).uses.contains(&b));
        assert!(module.inst(b).uses.is_empty());
    }

    #[test]
    fn rauw_rewrites_all_operands_and_uses() {
        let (mut module, _, entry) = test_module();
        let i32_ty = module.types.i32();
        let one = Value::ConstInt {
            ty: i32_ty,
            value: 1,
        };
        let a = module.push_inst(
            entry,
            InstKind::Binary {
                op: BinOp::Add,
                lhs: one,
                rhs: one,
            },
        );
        let b = module.push_inst(
            entry,
            InstKind::Binary {
                op: BinOp::Mul,
                lhs: Value::Inst(a),
                rhs: Value::Inst(a),
            },
        );
        let three = Value::ConstInt {
            ty: i32_ty,
            value: 3,
        };
        module.replace_all_uses_with(a, three);
        assert!(module.inst(a).uses.is_empty());
        assert_eq!(
            *module.kind(b),
            InstKind::Binary {
                op: BinOp::Mul,
                lhs: three,
                rhs: three,
            }
        );
        module.erase_inst(a);
        assert!(module.inst(a).dead);
        assert_eq!(module.block(entry).insts, vec![b]);
    }

    #[test]
    fn successors_follow_terminators() {
        let (mut module, func, entry) = test_module();
        let then_bb = module.add_block(func, "then");
        let else_bb = module.add_block(func, "else");
        let i1 = module.types.i1();
        module.push_inst(
            entry,
            InstKind::CondBr {
                cond: Value::ConstInt { ty: i1, value: 1 },
                then_dest: then_bb,
                else_dest: else_bb,
            },
        );
        let succs = module.successors(entry);
        assert_eq!(succs.as_slice(), &[then_bb, else_bb]);
        let preds = module.predecessors(func);
        assert_eq!(preds[&then_bb], vec![entry]);
        assert_eq!(preds[&else_bb], vec![entry]);
        assert!(preds[&entry].is_empty());
    }
}
