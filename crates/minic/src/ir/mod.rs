//! Typed, block-structured IR: data model, builder, printer, verifier.

pub mod builder;
pub mod display;
pub mod module;
pub mod types;
pub mod verify;

pub use builder::Builder;
pub use module::{
    BinOp, BlockId, Constant, FuncId, FunctionData, GlobalData, GlobalId, ICmpPred, InstData,
    InstId, InstKind, Linkage, Module, ParamData, Value,
};
pub use types::{Type, TypeCtx, TypeId};
pub use verify::verify_module;
