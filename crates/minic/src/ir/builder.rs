//! Cursor-based instruction builder.
//!
//! The builder holds an explicit insertion point (block + position) over a
//! mutably borrowed [`Module`] and creates one instruction per call,
//! linking operand use-lists and advancing the cursor. No folding happens
//! here; constant folding is an optimization pass.

use smallvec::SmallVec;

use super::module::{BinOp, BlockId, FuncId, ICmpPred, InstId, InstKind, Module, Value};
use super::types::TypeId;

pub struct Builder<'m> {
    module: &'m mut Module,
    point: Option<(BlockId, usize)>,
    saved: Vec<Option<(BlockId, usize)>>,
}

impl<'m> Builder<'m> {
    pub fn new(module: &'m mut Module) -> Self {
        Self {
            module,
            point: None,
            saved: Vec::new(),
        }
    }

    #[inline]
    pub fn module(&mut self) -> &mut Module {
        self.module
    }

    #[inline]
    #[must_use]
    pub fn module_ref(&self) -> &Module {
        self.module
    }

    // ── Cursor control ──

    pub fn position_at_end(&mut self, block: BlockId) {
        let len = self.module.block(block).insts.len();
        self.point = Some((block, len));
    }

    pub fn position_at_start(&mut self, block: BlockId) {
        self.point = Some((block, 0));
    }

    pub fn position_before(&mut self, inst: InstId) {
        let block = self.module.inst(inst).block;
        let pos = self.pos_of(block, inst);
        self.point = Some((block, pos));
    }

    pub fn position_after(&mut self, inst: InstId) {
        let block = self.module.inst(inst).block;
        let pos = self.pos_of(block, inst);
        self.point = Some((block, pos + 1));
    }

    fn pos_of(&self, block: BlockId, inst: InstId) -> usize {
        self.module
            .block(block)
            .insts
            .iter()
            .position(|&i| i == inst)
            .unwrap_or(0)
    }

    /// Save the cursor so nested emission can restore it.
    pub fn push_point(&mut self) {
        self.saved.push(self.point);
    }

    pub fn pop_point(&mut self) {
        if let Some(point) = self.saved.pop() {
            self.point = point;
        }
    }

    #[must_use]
    pub fn current_block(&self) -> Option<BlockId> {
        self.point.map(|(b, _)| b)
    }

    fn emit(&mut self, kind: InstKind) -> InstId {
        let (block, pos) = self.point.expect("builder has no insertion point");
        let id = self.module.insert_inst(block, pos, kind);
        self.point = Some((block, pos + 1));
        id
    }

    // ── Instruction constructors ──

    pub fn build_alloca(&mut self, ty: TypeId) -> Value {
        Value::Inst(self.emit(InstKind::Alloca { ty }))
    }

    /// Insert an alloca at a fixed position of `block` (typically the top
    /// of the entry block) without moving the cursor. The cursor and any
    /// saved points are shifted if the insertion lands before them.
    pub fn build_alloca_in(&mut self, block: BlockId, pos: usize, ty: TypeId) -> Value {
        let id = self.module.insert_inst(block, pos, InstKind::Alloca { ty });
        for point in self.saved.iter_mut().chain(std::iter::once(&mut self.point)) {
            if let Some((b, p)) = point
                && *b == block
                && pos <= *p
            {
                *p += 1;
            }
        }
        Value::Inst(id)
    }

    pub fn build_load(&mut self, ty: TypeId, ptr: Value) -> Value {
        Value::Inst(self.emit(InstKind::Load { ty, ptr }))
    }

    pub fn build_store(&mut self, value: Value, ptr: Value) -> InstId {
        self.emit(InstKind::Store { value, ptr })
    }

    pub fn build_binary(&mut self, op: BinOp, lhs: Value, rhs: Value) -> Value {
        Value::Inst(self.emit(InstKind::Binary { op, lhs, rhs }))
    }

    pub fn build_icmp(&mut self, pred: ICmpPred, lhs: Value, rhs: Value) -> Value {
        Value::Inst(self.emit(InstKind::ICmp { pred, lhs, rhs }))
    }

    pub fn build_gep(
        &mut self,
        source_ty: TypeId,
        base: Value,
        indices: impl IntoIterator<Item = Value>,
    ) -> Value {
        let indices: SmallVec<[Value; 2]> = indices.into_iter().collect();
        Value::Inst(self.emit(InstKind::Gep {
            source_ty,
            base,
            indices,
        }))
    }

    pub fn build_sext(&mut self, value: Value, ty: TypeId) -> Value {
        Value::Inst(self.emit(InstKind::SExt { value, ty }))
    }

    pub fn build_call(&mut self, callee: FuncId, args: impl IntoIterator<Item = Value>) -> Value {
        let args: SmallVec<[Value; 4]> = args.into_iter().collect();
        Value::Inst(self.emit(InstKind::Call { callee, args }))
    }

    pub fn build_phi(&mut self, ty: TypeId) -> InstId {
        self.emit(InstKind::Phi {
            ty,
            incomings: Vec::new(),
        })
    }

    pub fn build_br(&mut self, target: BlockId) -> InstId {
        self.emit(InstKind::Br { target })
    }

    pub fn build_cond_br(&mut self, cond: Value, then_dest: BlockId, else_dest: BlockId) -> InstId {
        self.emit(InstKind::CondBr {
            cond,
            then_dest,
            else_dest,
        })
    }

    pub fn build_ret(&mut self, value: Value) -> InstId {
        self.emit(InstKind::Ret { value: Some(value) })
    }

    pub fn build_ret_void(&mut self) -> InstId {
        self.emit(InstKind::Ret { value: None })
    }

    pub fn build_unreachable(&mut self) -> InstId {
        self.emit(InstKind::Unreachable)
    }

    // ── Convenience ──

    #[must_use]
    pub fn const_int(&self, ty: TypeId, value: i64) -> Value {
        Value::ConstInt { ty, value }
    }
}
