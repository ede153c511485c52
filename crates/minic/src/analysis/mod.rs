//! Analyses over the IR module.
//!
//! Analyses are pure: they never mutate the module. Transform passes
//! obtain them through the `AnalysisCache` in [`crate::transform`], which
//! invalidates cached results when a pass reports that it changed the
//! module.

pub mod call_graph;
pub mod cfg;
pub mod dominance;
pub mod loops;
pub mod reaching;

pub use call_graph::{CallGraph, call_graph, on_cycle};
pub use cfg::{ConservativeCfg, conservative_cfg, eval_icmp};
pub use dominance::{DomTree, dominance_frontiers, dominator_tree};
pub use loops::{Loop, loop_forest};
pub use reaching::{LoadToStores, StoreToLoads, load_to_stores, store_to_loads};
