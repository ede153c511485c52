//! Transform passes and the pipeline driver.
//!
//! Each pass is a [`ModulePass`]: `(module, analysis cache) →
//! PreservedAnalyses`. A pass that changed the module reports
//! `PreservedAnalyses::None`, which both drives the fixed-point rounds and
//! invalidates cached analyses. The module is uniquely owned by the driver
//! and mutably borrowed by one pass at a time; a fatal error aborts the
//! pipeline.

pub mod algebraic;
pub mod const_array;
pub mod const_prop;
pub mod cse;
pub mod dce;
pub mod inline;
pub mod licm;
pub mod mem2reg;
pub mod simplify_cfg;
pub mod strength_reduction;
pub mod unroll;

pub use algebraic::AlgebraicIdentities;
pub use const_array::PromoteConstArrays;
pub use const_prop::ConstantPropagation;
pub use cse::CommonSubexprElimination;
pub use dce::DeadCodeElimination;
pub use inline::FunctionInliner;
pub use licm::LoopInvariantCodeMotion;
pub use mem2reg::Mem2Reg;
pub use simplify_cfg::SimplifyCfg;
pub use strength_reduction::StrengthReduction;
pub use unroll::LoopUnroll;

use crate::analysis::{CallGraph, StoreToLoads, call_graph, store_to_loads};
use crate::error::{Error, Result};
use crate::ir::Module;

/// What a pass left intact. Analysis-only passes preserve everything; a
/// transform that rewrote the module preserves nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreservedAnalyses {
    All,
    None,
}

/// Memoized module-level analysis results, invalidated whenever a pass
/// changes the module.
#[derive(Default)]
pub struct AnalysisCache {
    store_to_loads: Option<StoreToLoads>,
    call_graph: Option<CallGraph>,
}

impl AnalysisCache {
    pub fn store_to_loads(&mut self, module: &Module) -> &StoreToLoads {
        self.store_to_loads
            .get_or_insert_with(|| store_to_loads(module))
    }

    pub fn call_graph(&mut self, module: &Module) -> &CallGraph {
        self.call_graph.get_or_insert_with(|| call_graph(module))
    }

    pub fn invalidate(&mut self) {
        self.store_to_loads = None;
        self.call_graph = None;
    }
}

pub trait ModulePass {
    fn name(&self) -> &'static str;
    fn run(&mut self, module: &mut Module, cache: &mut AnalysisCache) -> Result<PreservedAnalyses>;
}

/// Run one pass and invalidate the cache if it changed the module.
/// Returns whether it did.
pub fn run_pass(
    pass: &mut dyn ModulePass,
    module: &mut Module,
    cache: &mut AnalysisCache,
) -> Result<bool> {
    let preserved = pass.run(module, cache)?;
    let changed = preserved == PreservedAnalyses::None;
    if changed {
        cache.invalidate();
    }
    tracing::debug!(pass = pass.name(), changed, "pass finished");
    Ok(changed)
}

/// Bound for the scalar-cleanup fixed point. The shapes this front-end
/// produces converge in a handful of rounds; exceeding the bound means a
/// rewrite oscillates.
const MAX_SCALAR_ROUNDS: usize = 16;

/// Constant propagation + algebraic identities + CSE + DCE until nothing
/// changes.
pub fn run_scalar_cleanup(module: &mut Module, cache: &mut AnalysisCache) -> Result<()> {
    for _ in 0..MAX_SCALAR_ROUNDS {
        let mut changed = false;
        changed |= run_pass(&mut ConstantPropagation, module, cache)?;
        changed |= run_pass(&mut AlgebraicIdentities, module, cache)?;
        changed |= run_pass(&mut CommonSubexprElimination, module, cache)?;
        changed |= run_pass(&mut DeadCodeElimination, module, cache)?;
        if !changed {
            return Ok(());
        }
    }
    Err(Error::Internal(
        "scalar cleanup did not reach a fixed point".into(),
    ))
}

/// The default pipeline:
/// mem2reg → constant propagation → CFG simplification → inlining →
/// scalar cleanup → LICM → loop unrolling → constant-array promotion →
/// scalar cleanup → strength reduction → CFG simplification.
pub fn run_default_pipeline(module: &mut Module) -> Result<()> {
    let cache = &mut AnalysisCache::default();
    run_pass(&mut Mem2Reg, module, cache)?;
    run_pass(&mut ConstantPropagation, module, cache)?;
    run_pass(&mut SimplifyCfg, module, cache)?;
    run_pass(&mut FunctionInliner, module, cache)?;
    run_scalar_cleanup(module, cache)?;
    run_pass(&mut LoopInvariantCodeMotion, module, cache)?;
    run_pass(&mut LoopUnroll, module, cache)?;
    run_pass(&mut PromoteConstArrays, module, cache)?;
    run_scalar_cleanup(module, cache)?;
    run_pass(&mut StrengthReduction, module, cache)?;
    run_pass(&mut SimplifyCfg, module, cache)?;
    Ok(())
}
