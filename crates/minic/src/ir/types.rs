//! Interned IR types.
//!
//! Types are value-equal and deduplicated through [`TypeCtx`], so a
//! [`TypeId`] comparison is a type-equality check. The common scalar types
//! are pre-interned and available without mutable access.

use rustc_hash::FxHashMap;

/// Handle to an interned [`Type`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeId(u32);

impl TypeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// An IR type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    /// Integer of bit width 1, 8, 32 or 64.
    Int(u8),
    Void,
    /// Opaque pointer; no pointee type is carried.
    Ptr,
    Array {
        elem: TypeId,
        len: u64,
    },
    Func {
        ret: TypeId,
        params: Vec<TypeId>,
    },
}

/// Type interning context, one per [`Module`](super::Module).
#[derive(Debug)]
pub struct TypeCtx {
    types: Vec<Type>,
    lookup: FxHashMap<Type, TypeId>,
    void: TypeId,
    i1: TypeId,
    i8: TypeId,
    i32: TypeId,
    i64: TypeId,
    ptr: TypeId,
}

impl Default for TypeCtx {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeCtx {
    #[must_use]
    pub fn new() -> Self {
        let mut ctx = Self {
            types: Vec::new(),
            lookup: FxHashMap::default(),
            void: TypeId(0),
            i1: TypeId(0),
            i8: TypeId(0),
            i32: TypeId(0),
            i64: TypeId(0),
            ptr: TypeId(0),
        };
        ctx.void = ctx.intern(Type::Void);
        ctx.i1 = ctx.intern(Type::Int(1));
        ctx.i8 = ctx.intern(Type::Int(8));
        ctx.i32 = ctx.intern(Type::Int(32));
        ctx.i64 = ctx.intern(Type::Int(64));
        ctx.ptr = ctx.intern(Type::Ptr);
        ctx
    }

    pub fn intern(&mut self, ty: Type) -> TypeId {
        if let Some(&id) = self.lookup.get(&ty) {
            return id;
        }
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty.clone());
        self.lookup.insert(ty, id);
        id
    }

    #[inline]
    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.index()]
    }

    #[inline]
    pub fn void(&self) -> TypeId {
        self.void
    }

    #[inline]
    pub fn i1(&self) -> TypeId {
        self.i1
    }

    #[inline]
    pub fn i8(&self) -> TypeId {
        self.i8
    }

    #[inline]
    pub fn i32(&self) -> TypeId {
        self.i32
    }

    #[inline]
    pub fn i64(&self) -> TypeId {
        self.i64
    }

    #[inline]
    pub fn ptr(&self) -> TypeId {
        self.ptr
    }

    pub fn int(&mut self, bits: u8) -> TypeId {
        match bits {
            1 => self.i1,
            8 => self.i8,
            32 => self.i32,
            64 => self.i64,
            _ => self.intern(Type::Int(bits)),
        }
    }

    pub fn array(&mut self, elem: TypeId, len: u64) -> TypeId {
        self.intern(Type::Array { elem, len })
    }

    pub fn func(&mut self, ret: TypeId, params: Vec<TypeId>) -> TypeId {
        self.intern(Type::Func { ret, params })
    }

    /// Bit width of an integer type, `None` for every other variant.
    pub fn bit_width(&self, id: TypeId) -> Option<u32> {
        match self.get(id) {
            Type::Int(bits) => Some(u32::from(*bits)),
            _ => None,
        }
    }

    pub fn is_int(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Int(_))
    }

    pub fn is_array(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Array { .. })
    }

    pub fn array_parts(&self, id: TypeId) -> Option<(TypeId, u64)> {
        match self.get(id) {
            Type::Array { elem, len } => Some((*elem, *len)),
            _ => None,
        }
    }

    pub fn func_ret(&self, id: TypeId) -> Option<TypeId> {
        match self.get(id) {
            Type::Func { ret, .. } => Some(*ret),
            _ => None,
        }
    }

    pub fn func_params(&self, id: TypeId) -> Option<&[TypeId]> {
        match self.get(id) {
            Type::Func { params, .. } => Some(params),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_dedupes_structurally_equal_types() {
        let mut ctx = TypeCtx::new();
        let a = ctx.array(ctx.i32(), 4);
        let b = ctx.array(ctx.i32(), 4);
        let c = ctx.array(ctx.i32(), 8);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn common_scalars_are_preinterned() {
        let mut ctx = TypeCtx::new();
        assert_eq!(ctx.int(32), ctx.i32());
        assert_eq!(ctx.int(1), ctx.i1());
        assert_eq!(ctx.bit_width(ctx.i64()), Some(64));
        assert_eq!(ctx.bit_width(ctx.ptr()), None);
    }
}
