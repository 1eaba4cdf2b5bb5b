//! Dataflow analysis framework.
//!
//! This module provides the generic pieces of a forward dataflow analysis:
//!
//! - [`MeetSemiLattice`] and [`Lattice`], the algebra states must satisfy
//! - [`DataFlowAnalysis`], implemented by a concrete analysis
//! - [`DataFlowSolver`], the worklist fixpoint iteration
//! - [`DataflowState`], the locals-plus-stack state the bytecode scanner works on
//!
//! # Example
//!
//! ```rust,ignore
//! use dotreach::analysis::{ControlFlowGraph, DataFlowSolver};
//!
//! let cfg = ControlFlowGraph::build(&body, method)?;
//! let mut solver = DataFlowSolver::new(analysis, config.max_iterations);
//! let results = solver.solve(&cfg)?;
//! println!("converged after {} visits", results.iterations);
//! ```

mod framework;
mod lattice;
mod solver;
mod state;

pub use framework::{AnalysisResults, DataFlowAnalysis};
pub use lattice::{Lattice, MeetSemiLattice};
pub use solver::DataFlowSolver;
pub use state::{DataflowState, LocalKey, LocalsMap, OperandStack};
