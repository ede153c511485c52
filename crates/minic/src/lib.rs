#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::too_many_lines,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

//! SSA middle-end for a C subset.
//!
//! The crate consumes a typed ASG from the front-end ([`asg`]), lowers it
//! to a block-structured SSA-style IR ([`emit`], [`ir`]), and optimizes
//! the module through a fixed pass pipeline ([`transform`], backed by the
//! analyses in [`analysis`]).

pub mod analysis;
pub mod asg;
pub mod emit;
pub mod error;
pub mod ir;
pub mod transform;

/// ASG construction helpers for writing tests.
///
/// Only available when running tests or when the `test-support` feature
/// is enabled.
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use emit::emit_ir;
pub use error::{Error, Result};
pub use ir::{Builder, Module, verify_module};
pub use transform::{AnalysisCache, ModulePass, PreservedAnalyses, run_default_pipeline};
